//! HTTP request handlers

use super::protocol::SUBPROTOCOL;
use super::socket::handle_socket;
use super::AppState;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
    routing::get,
    Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // jambonz connects here, one socket per call
        .route("/socket", get(upgrade_socket))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

async fn upgrade_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state.config))
}

async fn get_version() -> &'static str {
    concat!("voice-handoff ", env!("CARGO_PKG_VERSION"))
}
