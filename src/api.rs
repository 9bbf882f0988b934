//! WebSocket API for the telephony platform

mod handlers;
mod protocol;
mod socket;

pub use handlers::create_router;

use crate::config::Config;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}
