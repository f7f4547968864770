//! Application state for the viewer service.

use std::sync::Arc;

use common::config::AppConfig;

use crate::resolver::Resolver;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub resolver: Arc<Resolver>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig, resolver: Resolver) -> Self {
        Self {
            config,
            resolver: Arc::new(resolver),
        }
    }
}
