//! Voice Handoff - AI voice agent with escalation to a human
//!
//! Serves the jambonz WebSocket API: each call is handed to an Ultravox
//! conversation, and when the conversation asks for it the caller is
//! transferred to a human agent.

mod api;
mod config;
mod hooks;
mod runtime;
mod state_machine;
mod verbs;

use api::{create_router, AppState};
use config::Config;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "voice_handoff=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(log_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    // Configuration
    let config = Config::from_env()?;

    if config.conversation.api_key.is_none() {
        tracing::warn!("ULTRAVOX_API_KEY not set. Calls will be apologised to and hung up.");
    }
    match &config.agent {
        Some(agent) => tracing::info!(
            number = %agent.number,
            trunk = ?agent.trunk,
            transfer_delay_secs = config.transfer_delay.as_secs(),
            confirm_hook = config.use_confirm_hook,
            summary_delivery = ?config.summary_delivery,
            "Human agent configured"
        ),
        None => tracing::warn!("HUMAN_AGENT_NUMBER not set. Transfer requests will be declined."),
    }

    let port = config.port;
    let app = create_router(AppState::new(config)).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Voice handoff server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `RUST_LOG` wins, then `LOGLEVEL`, then the built-in default
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOGLEVEL")
                .map_err(|e| e.to_string())
                .and_then(|level| {
                    EnvFilter::try_new(format!("voice_handoff={level},tower_http={level}"))
                        .map_err(|e| e.to_string())
                })
        })
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into())
}
