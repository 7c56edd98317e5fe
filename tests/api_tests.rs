//! HTTP API tests driven through the router

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use clearmarket::{
    auth::issue_jwt_token, db, server::build_router, users::Role, AppContext, MarketConfig,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret-0123456789abcdef";

async fn app(rate_limits: bool) -> (Router, AppContext) {
    let pool = db::memory_pool().await.unwrap();
    let mut config = MarketConfig::new(PathBuf::from("./data"), SECRET);
    config.rate_limit.enabled = rate_limits;

    let ctx = AppContext::with_pool(config, pool);
    ctx.users.create_user("admin-1", "Ops", Role::Admin).await.unwrap();
    ctx.users.create_user("vendor-1", "Acme", Role::Vendor).await.unwrap();
    ctx.users.create_user("rep-1", "Rita", Role::FieldRep).await.unwrap();

    (build_router(ctx.clone()), ctx)
}

fn token(user_id: &str) -> String {
    issue_jwt_token(user_id, SECRET, Duration::hours(1)).unwrap()
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _ctx) = app(false).await;
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_credit_endpoints_require_auth() {
    let (app, _ctx) = app(false).await;
    let (status, body) = call(&app, Method::GET, "/api/credits/account", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AuthenticationRequired");
}

#[tokio::test]
async fn test_worked_scenario_over_http() {
    let (app, ctx) = app(false).await;
    ctx.ledger
        .purchase(
            &clearmarket::users::ActorContext::new("rep-1", Role::FieldRep),
            5,
            clearmarket::ledger::TransactionReference::new("checkout", "order-1"),
        )
        .await
        .unwrap();

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/admin/users/rep-1/credits/grant",
        Some("admin-1"),
        Some(json!({ "amount": 10, "reason": "promo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, spent) = call(
        &app,
        Method::POST,
        "/api/credits/spend",
        Some("rep-1"),
        Some(json!({ "amount": 3, "reference_type": "contact_unlock", "reference_id": "vendor-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(spent["balance_after"], 12);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/credits/spend",
        Some("rep-1"),
        Some(json!({ "amount": 20, "reference_type": "contact_unlock", "reference_id": "vendor-2" })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "InsufficientBalance");

    let (_, account) = call(&app, Method::GET, "/api/credits/account", Some("rep-1"), None).await;
    assert_eq!(account["current_balance"], 12);
}

#[tokio::test]
async fn test_admin_routes_reject_non_admins() {
    let (app, _ctx) = app(false).await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/admin/users/rep-1/credits/grant",
        Some("vendor-1"),
        Some(json!({ "amount": 10, "reason": "promo" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    // Admin endpoints carry the raw detail
    assert!(body["message"].as_str().unwrap().contains("vendor-1"));
}

#[tokio::test]
async fn test_review_rate_limit_over_http() {
    let (app, _ctx) = app(false).await;
    let review = json!({
        "reviewed_user_id": "rep-1",
        "scores": { "communication": 2, "second": 2, "third": 0 },
    });

    let (status, outcome) =
        call(&app, Method::POST, "/api/reviews", Some("vendor-1"), Some(review.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(outcome["new_score"], 54);

    let (status, body) =
        call(&app, Method::POST, "/api/reviews", Some("vendor-1"), Some(review)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "RateLimited");

    let (_, reviews) = call(&app, Method::GET, "/api/reviews/users/rep-1", Some("rep-1"), None).await;
    assert_eq!(reviews["trust_score"], 54);
    assert_eq!(reviews["categories"][1], "on_time");
    assert_eq!(reviews["reviews"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_connection_flow_over_http() {
    let (app, _ctx) = app(false).await;

    let (status, sent) = call(
        &app,
        Method::POST,
        "/api/connections",
        Some("vendor-1"),
        Some(json!({ "recipient_id": "rep-1", "personal_message": "Hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["effective_status"], "pending");
    let id = sent["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/connections/{}/respond", id),
        Some("vendor-1"),
        Some(json!({ "accept": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = call(
        &app,
        Method::POST,
        &format!("/api/connections/{}/respond", id),
        Some("rep-1"),
        Some(json!({ "accept": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "accepted");

    let (_, incoming) = call(&app, Method::GET, "/api/connections/incoming", Some("rep-1"), None).await;
    assert_eq!(incoming.as_array().unwrap().len(), 1);

    // The accepted request no longer needs an answer
    let (status, pending) = call(
        &app,
        Method::GET,
        "/api/connections/incoming?pending_only=true",
        Some("rep-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_route_is_throttled_and_reports_not_found() {
    let (app, _ctx) = app(true).await;

    let (status, body) = call(&app, Method::GET, "/api/nothing-here", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/nothing-here").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-ratelimit-limit"));
}

#[tokio::test]
async fn test_referral_flow_over_http() {
    let (app, _ctx) = app(false).await;

    let (status, referral) = call(
        &app,
        Method::POST,
        "/api/referrals",
        Some("vendor-1"),
        Some(json!({ "rep_name": "Sam Field", "rep_initials": "SF" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = referral["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/admin/referrals/{}/signed-up", id),
        Some("admin-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..2 {
        let (status, confirmed) = call(
            &app,
            Method::POST,
            &format!("/api/referrals/{}/confirm", id),
            Some("vendor-1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(confirmed["status"], "confirmed");
    }

    let (_, account) = call(&app, Method::GET, "/api/credits/account", Some("vendor-1"), None).await;
    assert_eq!(account["current_balance"], 1);
}

#[tokio::test]
async fn test_request_throttling() {
    let (app, _ctx) = app(true).await;

    let mut throttled = false;
    for _ in 0..50 {
        let (status, _) = call(&app, Method::GET, "/health", None, None).await;
        if status == StatusCode::TOO_MANY_REQUESTS {
            throttled = true;
            break;
        }
    }
    assert!(throttled);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _ctx) = app(false).await;
    call(&app, Method::GET, "/health", None, None).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("http_requests_total"));
}
