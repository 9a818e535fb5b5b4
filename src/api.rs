//! HTTP surface
//!
//! Receives Bot API webhook updates and exposes health and version
//! endpoints.

mod handlers;

pub use handlers::create_router;

use crate::bot::Dispatcher;
use crate::wizard::SessionStore;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionStore>,
    /// Expected webhook path segment and secret header
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        sessions: Arc<SessionStore>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            dispatcher,
            sessions,
            webhook_secret,
        }
    }
}
