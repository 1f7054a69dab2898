use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::{Created, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::purchases::{filter_purchases, CreatePurchaseRequest, Purchase, PurchaseQuery};
use crate::error::ApiResult;
use crate::services::offline::Resource;
use crate::services::CallContext;

pub async fn list_purchases(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PurchaseQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Paginated<Purchase>> {
    let ctx = CallContext::new(&auth, &headers);
    let listed = state
        .offline
        .fetch_list::<Purchase>(&state.backend, Resource::Purchases, &[], ctx)
        .await?;
    let mut purchases = filter_purchases(listed.items, &query);
    purchases.sort_by(|a, b| b.date().cmp(&a.date()).then(b.id.cmp(&a.id)));

    Ok(Paginated::from_items(purchases, &pagination).with_meta(json!({ "offline": listed.offline })))
}

pub async fn create_purchase(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePurchaseRequest>,
) -> ApiResult<Created<Value>> {
    let payload = req.into_payload()?;
    tracing::info!(
        user_id = ?auth.user_id,
        supplier_id = payload.supplier_id,
        total = %payload.total_amount,
        "Creating purchase"
    );

    let ctx = CallContext::new(&auth, &headers);
    let created = state
        .backend
        .post(Resource::Purchases.path(), &payload, ctx)
        .await?;
    Ok(Created(created))
}
