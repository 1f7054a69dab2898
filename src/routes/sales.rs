use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Html,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{fetch_record, PrintQuery};
use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::sales::{filter_sales, CreateSaleRequest, Sale, SaleQuery, SaleReturnPayload, SaleReturnRequest};
use crate::domain::EntityId;
use crate::error::ApiResult;
use crate::services::offline::Resource;
use crate::services::CallContext;

/// List sales; search covers invoice number and retailer
pub async fn list_sales(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SaleQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Paginated<Sale>> {
    let ctx = CallContext::new(&auth, &headers);
    let listed = state
        .offline
        .fetch_list::<Sale>(&state.backend, Resource::Sales, &[], ctx)
        .await?;
    let mut sales = filter_sales(listed.items, &query);
    sales.sort_by(|a, b| b.date().cmp(&a.date()).then(b.id.cmp(&a.id)));

    Ok(Paginated::from_items(sales, &pagination).with_meta(json!({ "offline": listed.offline })))
}

pub async fn get_sale(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<DataResponse<Sale>> {
    let ctx = CallContext::new(&auth, &headers);
    let sale = fetch_record(&state, Resource::Sales, &EntityId::Id(id), ctx).await?;
    Ok(DataResponse::new(sale))
}

/// Create a sale; line and invoice totals are computed before forwarding
pub async fn create_sale(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSaleRequest>,
) -> ApiResult<Created<Value>> {
    let payload = req.into_payload()?;
    tracing::info!(
        user_id = ?auth.user_id,
        retailer_id = payload.retailer_id,
        total = %payload.total_amount,
        "Creating sale"
    );

    let ctx = CallContext::new(&auth, &headers);
    let created = state.backend.post(Resource::Sales.path(), &payload, ctx).await?;
    Ok(Created(created))
}

#[derive(Debug, Serialize)]
pub struct SaleReturnResponse {
    pub sale_id: i64,
    #[serde(rename = "return")]
    pub priced: SaleReturnPayload,
    pub result: Value,
}

/// Record returned goods against a sale
pub async fn return_sale(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SaleReturnRequest>,
) -> ApiResult<Created<SaleReturnResponse>> {
    let ctx = CallContext::new(&auth, &headers);
    let sale: Sale = state
        .backend
        .get_item(&format!("{}/{}", Resource::Sales.path(), id), ctx)
        .await?;
    let priced = req.price_against(&sale)?;

    tracing::info!(
        user_id = ?auth.user_id,
        sale_id = id,
        amount = %priced.total_return_amount,
        "Recording sale return"
    );

    let result = state
        .backend
        .post(&format!("{}/{}/return", Resource::Sales.path(), id), &priced, ctx)
        .await?;

    Ok(Created(SaleReturnResponse {
        sale_id: id,
        priced,
        result,
    }))
}

/// Printable challan for one sale
pub async fn sale_challan(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(print): Query<PrintQuery>,
) -> ApiResult<Html<String>> {
    let ctx = CallContext::new(&auth, &headers);
    let sale: Sale = fetch_record(&state, Resource::Sales, &EntityId::Id(id), ctx).await?;
    Ok(Html(state.challans.sale(&sale, print.print)?))
}
