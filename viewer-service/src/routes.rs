//! Route module.

use axum::{
    routing::get,
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::dispatch_get).post(handlers::dispatch_post))
        .route("/api/health", get(handlers::health_check))
}
