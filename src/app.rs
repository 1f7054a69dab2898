use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Settings;
use crate::middleware::{RequestIdLayers, X_REQUEST_ID};
use crate::routes;
use crate::services::{BackendClient, Challans, LocalStore, OfflineQueue};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub backend: BackendClient,
    pub store: LocalStore,
    pub offline: OfflineQueue,
    pub challans: Challans,
}

impl AppState {
    pub fn new(settings: Settings, backend: BackendClient, store: LocalStore) -> anyhow::Result<Arc<Self>> {
        let offline = OfflineQueue::new(store.clone());
        let challans = Challans::new(settings.company_name.clone())?;
        Ok(Arc::new(Self {
            settings,
            backend,
            store,
            offline,
            challans,
        }))
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(&state.settings);

    // Build trace layer (use DEBUG for spans to reduce overhead at INFO level)
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    // Request ID layers
    let request_ids = RequestIdLayers::new();

    // Uploads are the largest bodies we accept
    let body_limit = state.settings.import_max_bytes;

    // Build router (routes at root level, no /api prefix)
    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(request_ids.propagate)
        .layer(trace_layer)
        .layer(request_ids.set)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // In dev mode, use longer preflight cache to reduce OPTIONS requests
    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static(X_REQUEST_ID),
        ]))
        .expose_headers([
            axum::http::header::CONTENT_DISPOSITION,
            axum::http::HeaderName::from_static(X_REQUEST_ID),
        ])
        .allow_credentials(true)
        .max_age(max_age)
}
