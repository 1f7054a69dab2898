//! Shared helpers for the HTTP tests: a stub backend and an app wired to it.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use fmcg_dashboard::app::{create_app, AppState};
use fmcg_dashboard::config::Settings;
use fmcg_dashboard::services::{BackendClient, LocalStore};

pub const TOKEN: &str = "test-token";

/// Token the stub backend answers 401 to on product writes
pub const EXPIRED_TOKEN: &str = "expired-token";

/// Address nothing listens on
pub const UNREACHABLE_BACKEND: &str = "http://127.0.0.1:1";

/// How long the stub backend takes to create a retailer
pub const SLOW_WRITE: Duration = Duration::from_millis(1500);

/// Requests the stub backend received, for assertions
#[derive(Clone, Default)]
pub struct Recorded {
    pub tokens: Arc<Mutex<Vec<String>>>,
    pub reconciliations: Arc<Mutex<Vec<Value>>>,
    pub created_products: Arc<Mutex<Vec<Value>>>,
    /// `PUT <id>` / `DELETE <id>` per accepted product write
    pub product_writes: Arc<Mutex<Vec<String>>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start_matches("Bearer ").to_string())
}

impl Recorded {
    fn token(&self, headers: &HeaderMap) {
        if let Some(token) = bearer(headers) {
            self.tokens.lock().push(token);
        }
    }
}

pub fn products() -> Value {
    json!([
        { "id": 1, "name": "Rice 5kg", "sku": "RICE-5", "selling_price": "450.00", "stock_quantity": "100", "category_id": 2 },
        { "id": 2, "name": "Sugar 1kg", "sku": "SUG-1", "selling_price": "120.00", "stock_quantity": "10", "category_id": 2 },
        { "id": 3, "name": "Soap", "sku": "SOAP", "selling_price": "40.00", "stock_quantity": "0", "category_id": 5 }
    ])
}

/// Route 7: sale 1 (retailer 10, previous due 500, bill 1000) and sale 2
/// (retailer 11, no previous due, bill 400).
pub fn route() -> Value {
    json!({
        "id": 7,
        "name": "North market",
        "route_date": "2024-05-01",
        "sales_rep_id": 3,
        "sales_rep": { "id": 3, "name": "Karim" },
        "status": "pending",
        "route_sales": [
            { "sale_id": 1, "previous_due": "500.00" },
            { "sale_id": 2, "previous_due": "0.00" }
        ],
        "sales": [
            {
                "id": 1,
                "invoice_number": "INV-0001",
                "retailer_id": 10,
                "retailer": { "id": 10, "name": "Rahman Store" },
                "sale_date": "2024-05-01",
                "total_amount": "1000.00",
                "items": [
                    { "id": 11, "product_id": 1, "product_name": "Rice 5kg", "quantity": "10", "unit_price": "100.00", "discount": "0", "total": "1000.00" }
                ]
            },
            {
                "id": 2,
                "invoice_number": "INV-0002",
                "retailer_id": 11,
                "retailer": { "id": 11, "name": "Bismillah Traders" },
                "sale_date": "2024-05-01",
                "total_amount": "400.00",
                "items": [
                    { "id": 21, "product_id": 2, "product_name": "Sugar 1kg", "quantity": "4", "unit_price": "100.00", "discount": "0", "total": "400.00" }
                ]
            }
        ]
    })
}

async fn list_products(State(rec): State<Recorded>, headers: HeaderMap) -> Json<Value> {
    rec.token(&headers);
    Json(json!({ "data": products() }))
}

async fn create_product(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    rec.token(&headers);
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default();
    if name == "Duplicate" {
        let errors = json!({ "sku": ["The sku has already been taken."] });
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "The given data was invalid.", "errors": errors })),
        )
            .into_response();
    }
    rec.created_products.lock().push(body.clone());
    let mut created = body;
    created["id"] = json!(99);
    (StatusCode::CREATED, Json(json!({ "data": created }))).into_response()
}

async fn update_product(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    rec.token(&headers);
    if bearer(&headers).as_deref() == Some(EXPIRED_TOKEN) {
        return unauthenticated().await;
    }
    rec.product_writes.lock().push(format!("PUT {}", id));
    let mut updated = body;
    updated["id"] = json!(id);
    Json(json!({ "data": updated })).into_response()
}

async fn delete_product(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    rec.token(&headers);
    if bearer(&headers).as_deref() == Some(EXPIRED_TOKEN) {
        return unauthenticated().await;
    }
    rec.product_writes.lock().push(format!("DELETE {}", id));
    StatusCode::NO_CONTENT.into_response()
}

async fn create_retailer_slowly(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    rec.token(&headers);
    tokio::time::sleep(SLOW_WRITE).await;
    let mut created = body;
    created["id"] = json!(55);
    (StatusCode::CREATED, Json(json!({ "data": created }))).into_response()
}

async fn get_route(State(rec): State<Recorded>, headers: HeaderMap) -> Json<Value> {
    rec.token(&headers);
    Json(json!({ "data": route() }))
}

async fn reconcile(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.token(&headers);
    rec.reconciliations.lock().push(body);
    Json(json!({ "message": "Route reconciled" }))
}

async fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Unauthenticated." })),
    )
        .into_response()
}

/// Spawn the stub backend and return its base URL.
pub async fn spawn_backend(recorded: Recorded) -> String {
    let router = Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/:id", put(update_product).delete(delete_product))
        .route("/api/retailers", post(create_retailer_slowly))
        .route("/api/routes/7", get(get_route))
        .route("/api/routes/7/reconcile", post(reconcile))
        .route("/api/sales", get(unauthenticated))
        .with_state(recorded);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub backend");
    let addr = listener.local_addr().expect("stub backend address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub backend");
    });
    format!("http://{}", addr)
}

/// App pointed at `backend_url`, sharing `store` so tests can switch a
/// backend off and keep the snapshots and queue.
pub fn app_with(backend_url: &str, store: LocalStore) -> (Router, Arc<AppState>) {
    let mut settings = Settings::with_backend(backend_url);
    settings.backend_retry_max_elapsed_ms = 0;
    let backend = BackendClient::new(backend_url, 5, 0).expect("backend client");
    let state = AppState::new(settings, backend, store).expect("app state");
    (create_app(state.clone()), state)
}

pub fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Read a decimal that was serialized as a string or a number.
pub fn dec(value: &Value) -> rust_decimal::Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        other => other.to_string().parse().expect("decimal number"),
    }
}
