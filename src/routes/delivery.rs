use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Html,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{fetch_record, PrintQuery};
use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::delivery::{filter_routes, CreateRouteRequest, Route, RouteQuery, RouteSummary};
use crate::domain::reconciliation::{
    reconcile_route as reconcile, ReconcileRequest, ReconciliationSubmission, RouteReconciliation,
};
use crate::domain::EntityId;
use crate::error::ApiResult;
use crate::services::offline::Resource;
use crate::services::CallContext;

pub async fn list_routes(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RouteQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Paginated<RouteSummary>> {
    let ctx = CallContext::new(&auth, &headers);
    let listed = state
        .offline
        .fetch_list::<Route>(&state.backend, Resource::Routes, &[], ctx)
        .await?;
    let mut routes: Vec<RouteSummary> = filter_routes(listed.items, &query)
        .iter()
        .map(RouteSummary::from)
        .collect();
    routes.sort_by(|a, b| b.route_date.cmp(&a.route_date).then(b.id.cmp(&a.id)));

    Ok(Paginated::from_items(routes, &pagination).with_meta(json!({ "offline": listed.offline })))
}

async fn load_route(state: &AppState, id: i64, ctx: CallContext<'_>) -> ApiResult<Route> {
    fetch_record(state, Resource::Routes, &EntityId::Id(id), ctx).await
}

pub async fn get_route(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<DataResponse<Route>> {
    let ctx = CallContext::new(&auth, &headers);
    Ok(DataResponse::new(load_route(&state, id, ctx).await?))
}

pub async fn create_route(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRouteRequest>,
) -> ApiResult<Created<Value>> {
    req.validate()?;
    tracing::info!(
        user_id = ?auth.user_id,
        name = %req.name,
        sales = req.sale_ids.len(),
        "Creating delivery route"
    );

    let ctx = CallContext::new(&auth, &headers);
    let created = state.backend.post(Resource::Routes.path(), &req, ctx).await?;
    Ok(Created(created))
}

/// Reconciliation figures before anything has been collected
pub async fn get_reconciliation(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<DataResponse<RouteReconciliation>> {
    let ctx = CallContext::new(&auth, &headers);
    let route = load_route(&state, id, ctx).await?;
    Ok(DataResponse::new(reconcile(&route, &[], None)?))
}

/// Compute reconciliation for entered collections and returns without saving
pub async fn preview_reconciliation(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ReconcileRequest>,
) -> ApiResult<DataResponse<RouteReconciliation>> {
    let ctx = CallContext::new(&auth, &headers);
    let route = load_route(&state, id, ctx).await?;
    Ok(DataResponse::new(reconcile(&route, &req.sales, req.notes)?))
}

/// Compute reconciliation and submit the figures to the backend
pub async fn reconcile_route(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ReconcileRequest>,
) -> ApiResult<DataResponse<RouteReconciliation>> {
    let ctx = CallContext::new(&auth, &headers);
    let route: Route = state
        .backend
        .get_item(&format!("{}/{}", Resource::Routes.path(), id), ctx)
        .await?;
    let view = reconcile(&route, &req.sales, req.notes)?;

    tracing::info!(
        user_id = ?auth.user_id,
        route_id = id,
        expected = %view.total_expected,
        collected = %view.total_collected,
        returns = %view.total_returns,
        discrepancy = %view.discrepancy,
        "Submitting route reconciliation"
    );

    let submission = ReconciliationSubmission::from(&view);
    let _: Value = state
        .backend
        .post(&format!("{}/{}/reconcile", Resource::Routes.path(), id), &submission, ctx)
        .await?;

    Ok(DataResponse::new(view))
}

/// Printable challan covering every sale on the route
pub async fn route_challan(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(print): Query<PrintQuery>,
) -> ApiResult<Html<String>> {
    let ctx = CallContext::new(&auth, &headers);
    let route = load_route(&state, id, ctx).await?;
    Ok(Html(state.challans.route(&route, print.print)?))
}
