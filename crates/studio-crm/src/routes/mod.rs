//! REST API
//!
//! Everything except `/health`, registration and login sits behind a bearer
//! token. Locally stored documents are served read-only under the configured
//! public path.

mod auth;
mod clients;
mod dashboard;
mod documents;
mod payments;
mod projects;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::auth::AuthUser;
use crate::config::StorageConfig;
use crate::state::AppState;

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(clients::routes())
        .merge(projects::routes())
        .merge(payments::routes())
        .merge(documents::routes())
        .merge(dashboard::routes())
        .route_layer(middleware::from_extractor_with_state::<AuthUser, _>(
            state.clone(),
        ));

    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    let mut app = Router::new()
        .route("/health", get(health))
        .merge(auth::routes())
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state.clone());

    if let StorageConfig::Local { dir, public_path } = &state.config.storage {
        app = app.nest_service(public_path, ServeDir::new(dir));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    app.layer(TraceLayer::new_for_http()).layer(cors)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
