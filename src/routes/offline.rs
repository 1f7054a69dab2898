//! Offline queue inspection and manual replay

use axum::extract::{Path, State};
use std::sync::Arc;

use crate::api::{DataResponse, NoContent};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::error::ApiResult;
use crate::services::offline::{OperationView, ReplayReport};

/// GET /offline/queue
pub async fn list_queue(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<Vec<OperationView>>> {
    Ok(DataResponse::new(state.offline.list().await?))
}

/// DELETE /offline/queue/:op_id
pub async fn discard_operation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(op_id): Path<String>,
) -> ApiResult<NoContent> {
    state.offline.discard(&op_id).await?;
    tracing::info!(user_id = ?auth.user_id, operation_id = %op_id, "Discarded queued operation");
    Ok(NoContent)
}

/// POST /offline/sync
pub async fn sync_now(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<ReplayReport>> {
    tracing::info!(user_id = ?auth.user_id, "Manual offline sync requested");
    let report = state.offline.replay(&state.backend).await?;
    Ok(DataResponse::new(report))
}
