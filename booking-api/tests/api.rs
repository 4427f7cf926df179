use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use booking_api::{create_router, AppState};
use booking_engine::{
    clock::{SharedClock, SystemClock},
    config::EngineConfig,
    directory::ProfileDirectory,
    engine::{BookingEngine, Collaborators},
    ledger::MemoryLedger,
    models::{Package, PackageTier, Profile},
    sessions::InMemorySessionStore,
    EngineResult,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct EchoProfiles;

#[async_trait::async_trait]
impl ProfileDirectory for EchoProfiles {
    async fn fetch_profile(&self, user_id: &str) -> EngineResult<Profile> {
        Ok(Profile {
            user_id: user_id.to_string(),
            display_name: format!("User {user_id}"),
            avatar_url: None,
        })
    }
}

async fn app() -> (Router, Arc<MemoryLedger>) {
    let clock: SharedClock = Arc::new(SystemClock);
    let ledger = Arc::new(MemoryLedger::new(clock.clone()));
    ledger
        .seed_package(Package {
            package_id: "PK-1".into(),
            service_id: "SV-1".into(),
            freelancer_id: "fl-1".into(),
            title: "Website audit".into(),
            description: "Performance and accessibility audit".into(),
            price: 1_000,
            currency: "SUI".into(),
            delivery_time_days: 3,
            revisions: 1,
            features: vec![],
            tier: PackageTier::Basic,
        })
        .await;
    ledger.fund_client("cl-1", 1_000).await;

    let engine = BookingEngine::new(
        &EngineConfig::default(),
        Collaborators {
            ledger: ledger.clone(),
            profiles: Arc::new(EchoProfiles),
            packages: ledger.clone(),
            sessions: Arc::new(InMemorySessionStore::new()),
            clock,
        },
    );
    (create_router(AppState::new(engine)), ledger)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app().await;
    let (status, body) = call(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn unknown_booking_is_404() {
    let (app, _) = app().await;
    let (status, body) = call(&app, "GET", "/api/bookings/BK-NONEXISTENT", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "NotFound");
}

#[tokio::test]
async fn booking_to_completion() {
    let (app, ledger) = app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/bookings",
        Some(json!({ "client_id": "cl-1", "package_id": "PK-1", "idempotency_key": "k-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let booking_id = body["data"]["booking_id"].as_str().unwrap().to_string();

    // Same key replays the same booking
    let (_, replay) = call(
        &app,
        "POST",
        "/api/bookings",
        Some(json!({ "client_id": "cl-1", "package_id": "PK-1", "idempotency_key": "k-1" })),
    )
    .await;
    assert_eq!(replay["data"]["booking_id"], booking_id.as_str());
    assert_eq!(ledger.debit_count().await, 1);

    ledger.activate_booking(&booking_id).await.unwrap();

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/bookings/{booking_id}/stages"),
        Some(json!({
            "freelancer_id": "fl-1",
            "stages": [
                { "title": "Crawl", "amount": 400 },
                { "title": "Report", "description": "Findings", "amount": 600 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let stage_ids: Vec<String> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["stage_id"].as_str().unwrap().to_string())
        .collect();

    for stage_id in &stage_ids {
        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/stages/{stage_id}/submit"),
            Some(json!({ "freelancer_id": "fl-1", "notes": "done" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/stages/{stage_id}/approve"),
            Some(json!({ "client_id": "cl-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["stage"]["status"], "Released");
    }

    let (status, body) = call(&app, "GET", &format!("/api/bookings/{booking_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Completed");
    assert_eq!(body["data"]["client"]["display_name"], "User cl-1");
    assert_eq!(body["data"]["package"]["title"], "Website audit");
    assert_eq!(body["data"]["escrow"]["platform_fee"], 50);
}

#[tokio::test]
async fn insufficient_funds_is_402() {
    let (app, ledger) = app().await;
    let (status, body) = call(
        &app,
        "POST",
        "/api/bookings",
        Some(json!({ "client_id": "cl-broke", "package_id": "PK-1" })),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error_kind"], "InsufficientFunds");
    assert_eq!(ledger.debit_count().await, 0);
}

#[tokio::test]
async fn stage_verbs_validate_input() {
    let (app, _) = app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/stages/ST-1/reject",
        Some(json!({ "client_id": "cl-1", "reason": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "InvalidInput");

    let (status, _) = call(
        &app,
        "POST",
        "/api/stages/ST-1/approve",
        Some(json!({ "client_id": "cl-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_by_stranger_is_403() {
    let (app, _) = app().await;
    let (_, body) = call(
        &app,
        "POST",
        "/api/bookings",
        Some(json!({ "client_id": "cl-1", "package_id": "PK-1" })),
    )
    .await;
    let booking_id = body["data"]["booking_id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/bookings/{booking_id}/cancel"),
        Some(json!({ "actor_id": "cl-2", "role": "Client", "reason": "no" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/bookings/{booking_id}/cancel"),
        Some(json!({ "actor_id": "cl-1", "role": "Client", "reason": "plans changed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payment_status"], "Refunded");

    let (status, body) = call(&app, "GET", "/api/clients/cl-1/bookings?status=Cancelled", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn provisioning_fills_placeholders() {
    let (app, ledger) = app().await;
    let (status, body) = call(
        &app,
        "POST",
        "/api/provision",
        Some(json!({ "service": { "freelancer_id": "fl-9" }, "package": { "price": 0 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let package_id = body["data"]["package_id"].as_str().unwrap();
    let package = ledger.package(package_id).await.unwrap();
    assert!(package.price > 0);
    assert_eq!(package.delivery_time_days, 7);
}
