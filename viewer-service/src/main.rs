//! Database viewer service.
//!
//! Provides web-based database browsing and editing:
//! - per-request connection resolution through an ordered provider chain
//! - table listing, pagination, and single-table insert/update/delete
//! - SQL dump export for one table or the whole database

mod browser;
mod driver;
mod export;
mod handlers;
mod resolver;
mod routes;
mod state;

use std::sync::Arc;

use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use common::models::ConnectionSettings;
use resolver::Resolver;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "viewer-service";
const DEFAULT_PORT: u16 = 8080;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Database Viewer API",
        version = "0.1.0",
        description = "Web-based database browsing and editing service"
    ),
    paths(
        handlers::dispatch_get,
        handlers::dispatch_post,
        handlers::health_check,
    ),
    components(schemas(
        handlers::BrowsePayload,
        handlers::TableView,
        handlers::RecordPayload,
        handlers::HealthResponse,
        common::models::ColumnDescriptor,
        common::models::TableDescriptor,
    )),
    tags(
        (name = "viewer", description = "Browsing and editing endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything else
    load_dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load configuration
    let mut config = AppConfig::load_with_service(SERVICE_NAME);
    config.port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    // Connection settings come from the optional local settings file
    let settings = match ConnectionSettings::load(&config.settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %config.settings_path, error = %e, "settings file unusable, using defaults");
            ConnectionSettings::default()
        }
    };

    // Hosts with encrypted credential files swap in their own
    // decryptor; the passthrough covers plaintext deployments.
    let resolver = Resolver::new(settings, &config)
        .with_primary_decryptor(Arc::new(resolver::credentials::PlaintextDecryptor));
    let state = AppState::new(config.clone(), resolver);

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "starting service");

    let listener = TcpListener::bind(&addr).await.expect("failed to bind address");
    axum::serve(listener, app).await.expect("failed to start service");
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Load .env file from the working directory (best-effort, no error if missing).
fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    if env_path.exists() {
        if let Ok(content) = std::fs::read_to_string(env_path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    let value = value.trim();
                    // Only set if not already set by the environment
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
        }
    }
}
