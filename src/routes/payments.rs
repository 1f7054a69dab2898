use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::payments::{
    filter_payments, receivables_view, CreatePaymentRequest, Payment, PaymentQuery, Receivable,
    ReceivablesView,
};
use crate::domain::purchases::Purchase;
use crate::error::ApiResult;
use crate::services::offline::Resource;
use crate::services::CallContext;

pub async fn list_payments(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaymentQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Paginated<Payment>> {
    let ctx = CallContext::new(&auth, &headers);
    let listed = state
        .offline
        .fetch_list::<Payment>(&state.backend, Resource::Payments, &[], ctx)
        .await?;
    let mut payments = filter_payments(listed.items, &query);
    payments.sort_by(|a, b| b.date().cmp(&a.date()).then(b.id.cmp(&a.id)));

    Ok(Paginated::from_items(payments, &pagination).with_meta(json!({ "offline": listed.offline })))
}

pub async fn create_payment(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePaymentRequest>,
) -> ApiResult<Created<Value>> {
    req.validate()?;
    tracing::info!(
        user_id = ?auth.user_id,
        retailer_id = req.retailer_id,
        amount = %req.amount,
        "Recording payment"
    );

    let ctx = CallContext::new(&auth, &headers);
    let created = state.backend.post(Resource::Payments.path(), &req, ctx).await?;
    Ok(Created(created))
}

/// Retailer dues alongside supplier dues derived from purchases
pub async fn get_receivables(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<ReceivablesView>> {
    let ctx = CallContext::new(&auth, &headers);
    let (receivables, purchases) = tokio::try_join!(
        state.backend.get_list::<Receivable>("/api/receivables", &[], ctx),
        state
            .offline
            .fetch_list::<Purchase>(&state.backend, Resource::Purchases, &[], ctx),
    )?;

    Ok(DataResponse::new(receivables_view(receivables, &purchases.items)?))
}
