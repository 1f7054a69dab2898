use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
    /// `None` when the queue cannot be read
    pub pending_operations: Option<usize>,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub backend: String,
    pub store: String,
    pub store_kind: &'static str,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (backend_result, store_result, pending) = tokio::join!(
        state.backend.health_check(),
        state.store.health_check(),
        state.offline.pending_count(),
    );

    let backend_status = if backend_result.is_ok() { "ok" } else { "unreachable" };
    // A queue that cannot be read is as bad as no store
    if let Err(e) = &pending {
        tracing::warn!(error = %e, "Offline queue unreadable");
    }
    let store_ok = store_result.is_ok() && pending.is_ok();
    let store_status = if store_ok { "ok" } else { "error" };

    // Without the store nothing can be cached or queued
    let status = match (backend_result.is_ok(), store_ok) {
        (true, true) => "healthy",
        (_, true) => "degraded",
        (_, false) => "unhealthy",
    };

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                backend: backend_status.to_string(),
                store: store_status.to_string(),
                store_kind: state.store.backend_name(),
            },
            pending_operations: pending.ok(),
        }),
    )
}
