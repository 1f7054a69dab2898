use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{entity_id, fetch_record, today, write_or_queue};
use crate::api::{DataResponse, Download, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::retailers::{filter_retailers, Retailer, RetailerInput, RetailerQuery};
use crate::error::ApiResult;
use crate::services::export::{self, CSV_CONTENT_TYPE};
use crate::services::offline::{OperationKind, Resource};
use crate::services::CallContext;

/// List retailers, searchable by name, owner, phone and address
pub async fn list_retailers(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RetailerQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Paginated<Retailer>> {
    let ctx = CallContext::new(&auth, &headers);
    let listed = state
        .offline
        .fetch_list::<Retailer>(&state.backend, Resource::Retailers, &[], ctx)
        .await?;
    let retailers = filter_retailers(listed.items, &query);

    Ok(Paginated::from_items(retailers, &pagination).with_meta(json!({ "offline": listed.offline })))
}

pub async fn get_retailer(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DataResponse<Retailer>> {
    let id = entity_id(&id)?;
    let ctx = CallContext::new(&auth, &headers);
    let retailer = fetch_record(&state, Resource::Retailers, &id, ctx).await?;
    Ok(DataResponse::new(retailer))
}

pub async fn create_retailer(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(input): Json<RetailerInput>,
) -> ApiResult<Response> {
    input.validate()?;
    tracing::info!(user_id = ?auth.user_id, name = %input.name, "Creating retailer");

    let ctx = CallContext::new(&auth, &headers);
    let payload = serde_json::to_value(&input).map_err(anyhow::Error::from)?;
    write_or_queue(&state, Resource::Retailers, OperationKind::Create, None, payload, ctx).await
}

pub async fn update_retailer(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<RetailerInput>,
) -> ApiResult<Response> {
    input.validate()?;
    let id = entity_id(&id)?;
    tracing::info!(user_id = ?auth.user_id, retailer_id = %id, "Updating retailer");

    let ctx = CallContext::new(&auth, &headers);
    let payload = serde_json::to_value(&input).map_err(anyhow::Error::from)?;
    write_or_queue(&state, Resource::Retailers, OperationKind::Update, Some(id), payload, ctx).await
}

pub async fn delete_retailer(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = entity_id(&id)?;
    tracing::info!(user_id = ?auth.user_id, retailer_id = %id, "Deleting retailer");

    let ctx = CallContext::new(&auth, &headers);
    write_or_queue(&state, Resource::Retailers, OperationKind::Delete, Some(id), Value::Null, ctx).await
}

pub async fn export_retailers(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RetailerQuery>,
) -> ApiResult<Download> {
    let ctx = CallContext::new(&auth, &headers);
    let listed = state
        .offline
        .fetch_list::<Retailer>(&state.backend, Resource::Retailers, &[], ctx)
        .await?;
    let retailers = filter_retailers(listed.items, &query);

    Ok(Download {
        content_type: CSV_CONTENT_TYPE,
        disposition: export::attachment(&format!("retailers-{}.csv", today())),
        body: export::retailers_csv(&retailers)?,
    })
}
