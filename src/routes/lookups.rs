//! Reference data for the forms: warehouses, categories, suppliers and units.
//!
//! Lists come back sorted by name and fall back to the last snapshot when the
//! backend is unreachable. Creates go straight to the backend.

use axum::{extract::State, http::HeaderMap, Json};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::api::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::lookups::{sort_by_name, Category, NewLookup, Supplier, Unit, Warehouse};
use crate::error::ApiResult;
use crate::services::offline::Resource;
use crate::services::CallContext;

async fn list_lookup<T: DeserializeOwned + Serialize>(
    state: &AppState,
    resource: Resource,
    ctx: CallContext<'_>,
    name: impl Fn(&T) -> &str,
) -> ApiResult<DataResponse<Vec<T>>> {
    let mut items = state
        .offline
        .fetch_list::<T>(&state.backend, resource, &[], ctx)
        .await?
        .items;
    sort_by_name(&mut items, name);
    Ok(DataResponse::new(items))
}

async fn create_lookup(
    state: &AppState,
    resource: Resource,
    auth: &RequireAuth,
    ctx: CallContext<'_>,
    req: NewLookup,
) -> ApiResult<Created<Value>> {
    req.validate()?;
    tracing::info!(user_id = ?auth.user_id, kind = resource.key(), name = %req.name, "Creating lookup");

    let created = state.backend.post(resource.path(), &req, ctx).await?;
    Ok(Created(created))
}

pub async fn list_warehouses(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<Vec<Warehouse>>> {
    let ctx = CallContext::new(&auth, &headers);
    list_lookup::<Warehouse>(&state, Resource::Warehouses, ctx, |w| w.name.as_str()).await
}

pub async fn create_warehouse(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewLookup>,
) -> ApiResult<Created<Value>> {
    let ctx = CallContext::new(&auth, &headers);
    create_lookup(&state, Resource::Warehouses, &auth, ctx, req).await
}

pub async fn list_categories(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<Vec<Category>>> {
    let ctx = CallContext::new(&auth, &headers);
    list_lookup::<Category>(&state, Resource::Categories, ctx, |c| c.name.as_str()).await
}

pub async fn create_category(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewLookup>,
) -> ApiResult<Created<Value>> {
    let ctx = CallContext::new(&auth, &headers);
    create_lookup(&state, Resource::Categories, &auth, ctx, req).await
}

pub async fn list_suppliers(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<Vec<Supplier>>> {
    let ctx = CallContext::new(&auth, &headers);
    list_lookup::<Supplier>(&state, Resource::Suppliers, ctx, |s| s.name.as_str()).await
}

pub async fn create_supplier(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewLookup>,
) -> ApiResult<Created<Value>> {
    let ctx = CallContext::new(&auth, &headers);
    create_lookup(&state, Resource::Suppliers, &auth, ctx, req).await
}

pub async fn list_units(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DataResponse<Vec<Unit>>> {
    let ctx = CallContext::new(&auth, &headers);
    list_lookup::<Unit>(&state, Resource::Units, ctx, |u| u.name.as_str()).await
}

pub async fn create_unit(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewLookup>,
) -> ApiResult<Created<Value>> {
    let ctx = CallContext::new(&auth, &headers);
    create_lookup(&state, Resource::Units, &auth, ctx, req).await
}
