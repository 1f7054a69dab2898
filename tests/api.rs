mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use std::time::{Duration, Instant};

use common::{
    app_with, body_json, body_text, dec, request, spawn_backend, Recorded, EXPIRED_TOKEN,
    SLOW_WRITE, TOKEN, UNREACHABLE_BACKEND,
};
use fmcg_dashboard::domain::EntityId;
use fmcg_dashboard::services::offline::{OperationKind, QueueOutcome, Resource};
use fmcg_dashboard::services::LocalStore;

#[tokio::test]
async fn missing_token_is_rejected() {
    let (app, _) = app_with(UNREACHABLE_BACKEND, LocalStore::memory());

    let response = app
        .oneshot(Request::get("/products").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn health_is_public_and_reports_unreachable_backend() {
    let (app, _) = app_with(UNREACHABLE_BACKEND, LocalStore::memory());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["backend"], "unreachable");
    assert_eq!(body["services"]["store_kind"], "memory");
    assert_eq!(body["pending_operations"], 0);
}

#[tokio::test]
async fn backend_unauthorized_passes_through() {
    let backend = spawn_backend(Recorded::default()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let response = app.oneshot(request("GET", "/sales", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["message"], "Unauthenticated.");
}

#[tokio::test]
async fn low_stock_filter_and_summary() {
    let recorded = Recorded::default();
    let backend = spawn_backend(recorded.clone()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let response = app
        .oneshot(request("GET", "/products?stock_filter=low", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(body["pagination"]["total_items"], 2);
    assert_eq!(body["meta"]["offline"], false);
    assert_eq!(body["meta"]["summary"]["product_count"], 3);
    assert_eq!(body["meta"]["summary"]["low_stock_count"], 2);
    assert_eq!(body["meta"]["summary"]["out_of_stock_count"], 1);

    assert_eq!(recorded.tokens.lock().as_slice(), [TOKEN.to_string()]);
}

#[tokio::test]
async fn product_export_is_a_csv_download() {
    let backend = spawn_backend(Recorded::default()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let response = app
        .oneshot(request("GET", "/products/export?search=rice", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"products-"));

    let csv = body_text(response).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("Rice 5kg"));
}

#[tokio::test]
async fn lists_fall_back_to_snapshot_when_backend_is_down() {
    let store = LocalStore::memory();
    let backend = spawn_backend(Recorded::default()).await;

    let (online, _) = app_with(&backend, store.clone());
    let response = online.oneshot(request("GET", "/products", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (offline, _) = app_with(UNREACHABLE_BACKEND, store);
    let response = offline.oneshot(request("GET", "/products", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["meta"]["offline"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn offline_without_snapshot_is_unavailable() {
    let (app, _) = app_with(UNREACHABLE_BACKEND, LocalStore::memory());

    let response = app.oneshot(request("GET", "/retailers", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "BACKEND_UNAVAILABLE");
}

#[tokio::test]
async fn offline_create_is_queued_then_replayed() {
    let store = LocalStore::memory();
    let recorded = Recorded::default();
    let backend = spawn_backend(recorded.clone()).await;

    let (offline, _) = app_with(UNREACHABLE_BACKEND, store.clone());
    let response = offline
        .clone()
        .oneshot(request(
            "POST",
            "/products",
            Some(json!({ "name": "Tea", "selling_price": "80", "stock_quantity": 20 })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "queued");
    let temp_id = body["operation"]["record_id"].as_str().unwrap().to_string();
    assert!(temp_id.starts_with("temp_"));

    // readable under its temporary id while offline
    let response = offline
        .clone()
        .oneshot(request("GET", &format!("/products/{}", temp_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["name"], "Tea");

    let response = offline
        .oneshot(request("GET", "/offline/queue", None))
        .await
        .unwrap();
    let queue = body_json(response).await;
    let ops = queue["data"].as_array().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["status"], "pending");
    assert!(ops[0].get("token").is_none());

    let (online, _) = app_with(&backend, store);
    let response = online
        .clone()
        .oneshot(request("POST", "/offline/sync", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["data"]["synced"], 1);
    assert_eq!(report["data"]["remaining"], 0);
    assert_eq!(report["data"]["interrupted"], false);

    let created = recorded.created_products.lock().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["name"], "Tea");
    assert_eq!(recorded.tokens.lock().last().map(String::as_str), Some(TOKEN));

    let response = online
        .oneshot(request("GET", "/offline/queue", None))
        .await
        .unwrap();
    assert!(body_json(response).await["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn offline_writes_are_refused_for_sales() {
    let (app, _) = app_with(UNREACHABLE_BACKEND, LocalStore::memory());

    let response = app
        .oneshot(request(
            "POST",
            "/payments",
            Some(json!({ "retailer_id": 10, "amount": 100, "payment_method": "cash" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn reconciliation_without_collections() {
    let backend = spawn_backend(Recorded::default()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let response = app
        .oneshot(request("GET", "/routes/7/reconciliation", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let view = &body_json(response).await["data"];
    assert_eq!(dec(&view["total_expected"]), Decimal::new(1900, 0));
    assert_eq!(dec(&view["total_collected"]), Decimal::ZERO);
    assert_eq!(dec(&view["discrepancy"]), Decimal::new(1900, 0));
    assert_eq!(view["sales"][0]["status"], "Unpaid");
    assert_eq!(dec(&view["sales"][0]["total_outstanding"]), Decimal::new(1500, 0));
    assert_eq!(view["retailers"].as_array().unwrap().len(), 2);
}

fn collections() -> Value {
    json!({
        "sales": [
            { "sale_id": 1, "collected_cash": 600, "returns": [{ "sale_item_id": 11, "quantity": 2 }] },
            { "sale_id": 2, "collected_cash": "400" }
        ],
        "notes": "Two bags of rice came back"
    })
}

#[tokio::test]
async fn reconciliation_preview_applies_collections_and_returns() {
    let backend = spawn_backend(Recorded::default()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let response = app
        .oneshot(request(
            "POST",
            "/routes/7/reconciliation/preview",
            Some(collections()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let view = &body_json(response).await["data"];
    assert_eq!(dec(&view["total_collected"]), Decimal::new(1000, 0));
    assert_eq!(dec(&view["total_returns"]), Decimal::new(200, 0));
    assert_eq!(dec(&view["discrepancy"]), Decimal::new(700, 0));

    let first = &view["sales"][0];
    assert_eq!(dec(&first["remaining_due"]), Decimal::new(700, 0));
    assert_eq!(first["status"], "Partial");
    assert_eq!(dec(&first["returns"][0]["return_amount"]), Decimal::new(200, 0));
    assert_eq!(view["sales"][1]["status"], "Paid");
}

#[tokio::test]
async fn reconciliation_rejects_over_return() {
    let backend = spawn_backend(Recorded::default()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let response = app
        .oneshot(request(
            "POST",
            "/routes/7/reconciliation/preview",
            Some(json!({ "sales": [{ "sale_id": 2, "returns": [{ "sale_item_id": 21, "quantity": 5 }] }] })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["errors"]["returns"].is_array());
}

#[tokio::test]
async fn reconcile_submits_computed_figures() {
    let recorded = Recorded::default();
    let backend = spawn_backend(recorded.clone()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let response = app
        .oneshot(request("POST", "/routes/7/reconcile", Some(collections())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let submitted = recorded.reconciliations.lock().clone();
    assert_eq!(submitted.len(), 1);
    let sent = &submitted[0];
    assert_eq!(dec(&sent["total_expected"]), Decimal::new(1900, 0));
    assert_eq!(dec(&sent["total_collected"]), Decimal::new(1000, 0));
    assert_eq!(dec(&sent["discrepancy"]), Decimal::new(700, 0));
    assert_eq!(sent["notes"], "Two bags of rice came back");
    assert_eq!(sent["sales"][0]["returns"][0]["sale_item_id"], 11);
}

#[tokio::test]
async fn route_challan_renders_html() {
    let backend = spawn_backend(Recorded::default()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let response = app
        .oneshot(request("GET", "/routes/7/challan?print=true", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("North market"));
    assert!(html.contains("INV-0001"));
    assert!(html.contains("window.print()"));
}

#[tokio::test]
async fn product_import_reports_row_errors() {
    let recorded = Recorded::default();
    let backend = spawn_backend(recorded.clone()).await;
    let (app, _) = app_with(&backend, LocalStore::memory());

    let csv = "name,sku,selling_price,stock_quantity\n\
               Tea,TEA-1,80,20\n\
               Duplicate,RICE-5,450,1\n\
               ,NONAME,10,1\n";
    let boundary = "X-IMPORT-BOUNDARY";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"products.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
        b = boundary,
        csv = csv
    );
    let request = Request::post("/products/import")
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["created"], 1);
    assert_eq!(report["queued"], 0);
    let failed = report["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0]["row"], 3);
    assert_eq!(failed[0]["message"], "The sku has already been taken.");
    assert_eq!(failed[1]["row"], 4);

    assert_eq!(recorded.created_products.lock().len(), 1);
}

#[tokio::test]
async fn replay_keeps_order_and_marks_rejected_writes_failed() {
    let store = LocalStore::memory();
    let recorded = Recorded::default();
    let backend = spawn_backend(recorded.clone()).await;

    let (offline, _) = app_with(UNREACHABLE_BACKEND, store.clone());
    for name in ["Duplicate", "Tea", "Coffee"] {
        let response = offline
            .clone()
            .oneshot(request("POST", "/products", Some(json!({ "name": name }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let (online, state) = app_with(&backend, store);
    let response = online
        .clone()
        .oneshot(request("POST", "/offline/sync", None))
        .await
        .unwrap();
    let report = body_json(response).await;
    assert_eq!(report["data"]["attempted"], 3);
    assert_eq!(report["data"]["synced"], 2);
    assert_eq!(report["data"]["failed"], 1);
    assert_eq!(report["data"]["remaining"], 0);

    let names: Vec<String> = recorded
        .created_products
        .lock()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Tea", "Coffee"]);

    let queue = state.offline.list().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].payload["name"], "Duplicate");
    assert!(queue[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("The given data was invalid."));

    let response = online
        .oneshot(request("GET", "/health", None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["pending_operations"], 0);
}

#[tokio::test]
async fn list_views_are_served_while_a_replay_is_in_flight() {
    let backend = spawn_backend(Recorded::default()).await;
    let (app, state) = app_with(&backend, LocalStore::memory());

    let QueueOutcome::Queued { operation } = state
        .offline
        .enqueue(
            Resource::Retailers,
            OperationKind::Create,
            None,
            json!({ "name": "City Mart", "phone": "01711000000" }),
            TOKEN,
            "offline",
        )
        .await
        .unwrap()
    else {
        panic!("expected queued outcome");
    };

    let replay = tokio::spawn({
        let state = state.clone();
        async move { state.offline.replay(&state.backend).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let response = app
        .oneshot(request("GET", "/products", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() < SLOW_WRITE / 2);

    // edit the record while its create is still on the wire
    let temp: EntityId = operation.id.parse().unwrap();
    state
        .offline
        .enqueue(
            Resource::Retailers,
            OperationKind::Update,
            Some(temp),
            json!({ "phone": "01711999999" }),
            TOKEN,
            "offline",
        )
        .await
        .unwrap();

    let report = replay.await.unwrap().unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(report.remaining, 1);

    let queue = state.offline.list().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].kind, OperationKind::Update);
    assert_eq!(queue[0].record_id, Some(EntityId::Id(55)));
    assert_eq!(queue[0].payload["phone"], "01711999999");
}

#[tokio::test]
async fn unauthorised_write_holds_back_later_writes_to_the_same_record() {
    let recorded = Recorded::default();
    let backend = spawn_backend(recorded.clone()).await;
    let (_, state) = app_with(&backend, LocalStore::memory());

    let writes = [
        (OperationKind::Update, 1, json!({ "name": "Rice 10kg" }), EXPIRED_TOKEN),
        (OperationKind::Delete, 1, Value::Null, TOKEN),
        (OperationKind::Update, 2, json!({ "name": "Sugar 2kg" }), TOKEN),
    ];
    for (kind, id, payload, token) in writes {
        state
            .offline
            .enqueue(Resource::Products, kind, Some(EntityId::Id(id)), payload, token, "offline")
            .await
            .unwrap();
    }

    let report = state.offline.replay(&state.backend).await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.remaining, 2);
    assert_eq!(*recorded.product_writes.lock(), vec!["PUT 2".to_string()]);

    let queue = state.offline.list().await.unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].kind, OperationKind::Update);
    assert_eq!(queue[0].attempts, 1);
    assert!(queue[0].last_error.is_some());
    assert_eq!(queue[1].kind, OperationKind::Delete);
    assert_eq!(queue[1].attempts, 0);
}
