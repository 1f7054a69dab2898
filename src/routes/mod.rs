pub mod delivery;
pub mod health;
pub mod lookups;
pub mod me;
pub mod offline;
pub mod payments;
pub mod products;
pub mod purchases;
pub mod reports;
pub mod retailers;
pub mod sales;
pub mod settings;
pub mod users;

use axum::{
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::sync::Arc;

use crate::api::{Accepted, Created, NoContent};
use crate::app::AppState;
use crate::domain::EntityId;
use crate::error::{ApiError, ApiResult};
use crate::services::offline::{OperationKind, Resource};
use crate::services::CallContext;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Protected routes
        .route("/me", get(me::get_me))
        // Products
        .route("/products", get(products::list_products).post(products::create_product))
        .route("/products/export", get(products::export_products))
        .route("/products/import", post(products::import_products))
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Retailers
        .route("/retailers", get(retailers::list_retailers).post(retailers::create_retailer))
        .route("/retailers/export", get(retailers::export_retailers))
        .route(
            "/retailers/:id",
            get(retailers::get_retailer)
                .put(retailers::update_retailer)
                .delete(retailers::delete_retailer),
        )
        // Sales
        .route("/sales", get(sales::list_sales).post(sales::create_sale))
        .route("/sales/:id", get(sales::get_sale))
        .route("/sales/:id/return", post(sales::return_sale))
        .route("/sales/:id/challan", get(sales::sale_challan))
        // Purchases
        .route("/purchases", get(purchases::list_purchases).post(purchases::create_purchase))
        // Delivery routes and reconciliation
        .route("/routes", get(delivery::list_routes).post(delivery::create_route))
        .route("/routes/:id", get(delivery::get_route))
        .route("/routes/:id/reconciliation", get(delivery::get_reconciliation))
        .route(
            "/routes/:id/reconciliation/preview",
            post(delivery::preview_reconciliation),
        )
        .route("/routes/:id/reconcile", post(delivery::reconcile_route))
        .route("/routes/:id/challan", get(delivery::route_challan))
        // Payments
        .route("/payments", get(payments::list_payments).post(payments::create_payment))
        .route("/receivables", get(payments::get_receivables))
        // Reports
        .route("/reports/sales", get(reports::sales_report))
        .route("/reports/sales/export", get(reports::export_sales_report))
        // Lookups
        .route("/warehouses", get(lookups::list_warehouses).post(lookups::create_warehouse))
        .route("/categories", get(lookups::list_categories).post(lookups::create_category))
        .route("/suppliers", get(lookups::list_suppliers).post(lookups::create_supplier))
        .route("/units", get(lookups::list_units).post(lookups::create_unit))
        // Users
        .route("/users/:id/accountability", get(users::get_accountability))
        // Settings
        .route(
            "/settings/sms",
            get(settings::get_sms_settings).put(settings::update_sms_settings),
        )
        // Offline queue
        .route("/offline/queue", get(offline::list_queue))
        .route("/offline/queue/:op_id", delete(offline::discard_operation))
        .route("/offline/sync", post(offline::sync_now))
}

/// `?print=true` on challan pages
#[derive(Debug, Deserialize, Default)]
pub struct PrintQuery {
    #[serde(default)]
    pub print: bool,
}

/// Path id that may be a backend id or a temporary one.
pub(crate) fn entity_id(raw: &str) -> ApiResult<EntityId> {
    raw.parse().map_err(ApiError::BadRequest)
}

/// Fetch one record of a snapshot-backed resource. Temporary ids, and any id
/// while the backend is unreachable, are answered from the snapshot.
pub(crate) async fn fetch_record<T: DeserializeOwned>(
    state: &AppState,
    resource: Resource,
    id: &EntityId,
    ctx: CallContext<'_>,
) -> ApiResult<T> {
    let not_found = || ApiError::NotFound(format!("{} {} not found", resource.key(), id));

    if id.is_temp() {
        return state.offline.find(resource, id).await.ok_or_else(not_found);
    }

    let path = format!("{}/{}", resource.path(), id);
    match state.backend.get_item(&path, ctx).await {
        Err(e) if e.is_offline() => match state.offline.find(resource, id).await {
            Some(record) => Ok(record),
            None => Err(e),
        },
        other => other,
    }
}

/// Send a product or retailer write to the backend, queueing it when the
/// backend is unreachable. Writes against temporary ids never reach the
/// backend; they fold into the pending create.
pub(crate) async fn write_or_queue(
    state: &AppState,
    resource: Resource,
    kind: OperationKind,
    id: Option<EntityId>,
    payload: Value,
    ctx: CallContext<'_>,
) -> ApiResult<Response> {
    let reason = match &id {
        Some(EntityId::Temp(_)) => "record not yet synced".to_string(),
        _ => {
            let path = match &id {
                Some(id) => format!("{}/{}", resource.path(), id),
                None => resource.path().to_string(),
            };
            let sent = match kind {
                OperationKind::Create => state
                    .backend
                    .post::<_, Value>(&path, &payload, ctx)
                    .await
                    .map(|created| Created(created).into_response()),
                OperationKind::Update => state
                    .backend
                    .put::<_, Value>(&path, &payload, ctx)
                    .await
                    .map(|updated| Json(updated).into_response()),
                OperationKind::Delete => state
                    .backend
                    .delete(&path, ctx)
                    .await
                    .map(|_| NoContent.into_response()),
            };
            match sent {
                Err(e) if e.is_offline() => e.to_string(),
                other => return other,
            }
        }
    };

    let outcome = state
        .offline
        .enqueue(resource, kind, id, payload, ctx.token, &reason)
        .await?;
    Ok(Accepted(outcome).into_response())
}

/// Date stamp for download filenames.
pub(crate) fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
