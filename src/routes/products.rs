use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{entity_id, fetch_record, today, write_or_queue};
use crate::api::{DataResponse, Download, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::lookups::{Category, Unit};
use crate::domain::products::{filter_products, inventory_summary, Product, ProductInput, ProductQuery};
use crate::error::{ApiError, ApiResult};
use crate::services::export::{self, RowError, CSV_CONTENT_TYPE};
use crate::services::offline::{OperationKind, Resource};
use crate::services::CallContext;

/// List products with search, stock and category filters
pub async fn list_products(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Paginated<Product>> {
    let ctx = CallContext::new(&auth, &headers);
    let threshold = state.settings.low_stock_threshold;

    let listed = state
        .offline
        .fetch_list::<Product>(&state.backend, Resource::Products, &[], ctx)
        .await?;
    let summary = inventory_summary(&listed.items, threshold);
    let products = filter_products(listed.items, &query, threshold);

    tracing::debug!(
        user_id = ?auth.user_id,
        matched = products.len(),
        offline = listed.offline,
        "Listing products"
    );

    Ok(Paginated::from_items(products, &pagination).with_meta(json!({
        "offline": listed.offline,
        "low_stock_threshold": threshold,
        "summary": summary,
    })))
}

pub async fn get_product(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DataResponse<Product>> {
    let id = entity_id(&id)?;
    let ctx = CallContext::new(&auth, &headers);
    let product = fetch_record(&state, Resource::Products, &id, ctx).await?;
    Ok(DataResponse::new(product))
}

pub async fn create_product(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(input): Json<ProductInput>,
) -> ApiResult<Response> {
    input.validate()?;
    tracing::info!(user_id = ?auth.user_id, name = %input.name, "Creating product");

    let ctx = CallContext::new(&auth, &headers);
    let payload = serde_json::to_value(&input).map_err(anyhow::Error::from)?;
    write_or_queue(&state, Resource::Products, OperationKind::Create, None, payload, ctx).await
}

pub async fn update_product(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<ProductInput>,
) -> ApiResult<Response> {
    input.validate()?;
    let id = entity_id(&id)?;
    tracing::info!(user_id = ?auth.user_id, product_id = %id, "Updating product");

    let ctx = CallContext::new(&auth, &headers);
    let payload = serde_json::to_value(&input).map_err(anyhow::Error::from)?;
    write_or_queue(&state, Resource::Products, OperationKind::Update, Some(id), payload, ctx).await
}

pub async fn delete_product(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = entity_id(&id)?;
    tracing::info!(user_id = ?auth.user_id, product_id = %id, "Deleting product");

    let ctx = CallContext::new(&auth, &headers);
    write_or_queue(&state, Resource::Products, OperationKind::Delete, Some(id), Value::Null, ctx).await
}

/// Download the (filtered) catalogue as CSV
pub async fn export_products(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<Download> {
    let ctx = CallContext::new(&auth, &headers);
    let listed = state
        .offline
        .fetch_list::<Product>(&state.backend, Resource::Products, &[], ctx)
        .await?;
    let products = filter_products(listed.items, &query, state.settings.low_stock_threshold);

    Ok(Download {
        content_type: CSV_CONTENT_TYPE,
        disposition: export::attachment(&format!("products-{}.csv", today())),
        body: export::products_csv(&products)?,
    })
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub queued: usize,
    pub failed: Vec<RowError>,
}

/// Import products from an uploaded CSV or spreadsheet (`file` field)
pub async fn import_products(
    auth: RequireAuth,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportReport>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
            upload = Some((filename, bytes.to_vec()));
            break;
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::invalid("file", "Choose a CSV or Excel file to import"))?;

    let ctx = CallContext::new(&auth, &headers);
    let mut parsed = export::parse_products(&filename, bytes)?;
    if parsed.needs_lookups() {
        let (categories, units) = tokio::try_join!(
            state
                .offline
                .fetch_list::<Category>(&state.backend, Resource::Categories, &[], ctx),
            state
                .offline
                .fetch_list::<Unit>(&state.backend, Resource::Units, &[], ctx),
        )?;
        parsed.resolve_names(&categories.items, &units.items);
    }
    tracing::info!(
        user_id = ?auth.user_id,
        filename = %filename,
        rows = parsed.rows.len(),
        rejected = parsed.errors.len(),
        "Importing products"
    );

    let mut report = ImportReport {
        created: 0,
        queued: 0,
        failed: parsed.errors,
    };

    for export::ImportRow { line: row, input, .. } in parsed.rows {
        let payload = serde_json::to_value(&input).map_err(anyhow::Error::from)?;
        match state.backend.post::<_, Value>(Resource::Products.path(), &payload, ctx).await {
            Ok(_) => report.created += 1,
            Err(e) if e.is_offline() => {
                state
                    .offline
                    .enqueue(
                        Resource::Products,
                        OperationKind::Create,
                        None,
                        payload,
                        ctx.token,
                        &e.to_string(),
                    )
                    .await?;
                report.queued += 1;
            }
            Err(e @ ApiError::Unauthorized(_)) => return Err(e),
            Err(ApiError::Validation { message, errors }) => report.failed.push(RowError {
                row,
                message: errors
                    .values()
                    .flatten()
                    .next()
                    .cloned()
                    .unwrap_or(message),
            }),
            Err(e) => report.failed.push(RowError {
                row,
                message: e.to_string(),
            }),
        }
    }

    report.failed.sort_by_key(|e| e.row);
    Ok(Json(report))
}
