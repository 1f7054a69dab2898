use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::Value;
use std::sync::Arc;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::error::ApiResult;
use crate::services::CallContext;

/// Cash and stock a user is accountable for, passed through from the backend
pub async fn get_accountability(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<DataResponse<Value>> {
    let ctx = CallContext::new(&auth, &headers);
    let report = state
        .backend
        .get_item(&format!("/api/users/{}/accountability", id), ctx)
        .await?;
    Ok(DataResponse::new(report))
}
