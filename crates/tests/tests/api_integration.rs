use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use crisis_api::{build_app, ApiConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "test-ops-key";

fn config() -> ApiConfig {
    ApiConfig {
        api_key: Some(API_KEY.to_string()),
        ..ApiConfig::default()
    }
}

fn scenario() -> Value {
    json!({
        "hazard": { "impact_population_total": 48210.4 },
        "demand": { "geojson": { "type": "FeatureCollection", "features": [
            { "type": "Feature", "properties": { "id": "Z1", "name": "Z1", "population": 1200, "risk": 3 } },
            { "type": "Feature", "properties": { "id": "Z2", "name": "Harbour", "population": 800, "risk": 5 } }
        ]}},
        "transport": { "riskMarginMin": 7.5, "routes": { "features": [] } },
        "shelter": { "geojson": { "features": [
            { "properties": { "capacity": 50 } },
            { "properties": { "capacity": 30 } }
        ]}},
        "event": { "type": "tsunami", "etaMin": 45, "locationName": "Bay" }
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn put_state(app: &Router, body: Value, key: Option<&str>) -> axum::response::Response {
    let mut request = Request::builder()
        .method("PUT")
        .uri("/state")
        .header("content-type", "application/json");
    if let Some(key) = key {
        request = request.header("x-api-key", key);
    }

    app.clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

async fn ask(app: &Router, query: &str) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri("/qa")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "query": query }).to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_reports_state_version() {
    let app = build_app(config()).await.expect("app should build");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = body_json(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["state_version"], 0);
}

#[tokio::test]
async fn qa_answers_from_empty_state_without_failing() {
    let app = build_app(config()).await.expect("app should build");

    let parsed = ask(&app, "What is the minimum route risk margin?").await;
    assert_eq!(parsed["answer"], "No route risk margin available.");
    assert_eq!(parsed["intent"], "route_risk_margin");

    let parsed = ask(&app, "asdkjasd").await;
    assert_eq!(parsed["intent"], "unrecognized");
    assert!(parsed["answer"]
        .as_str()
        .unwrap()
        .starts_with("I can answer about zones"));
}

#[tokio::test]
async fn state_replacement_requires_api_key() {
    let app = build_app(config()).await.expect("app should build");

    let response = put_state(&app, scenario(), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthorized");

    let response = put_state(&app, scenario(), Some("wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn replaced_state_drives_answers() {
    let app = build_app(config()).await.expect("app should build");

    let response = put_state(&app, scenario(), Some(API_KEY)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let replaced = body_json(response).await;
    assert_eq!(replaced["ok"], true);
    assert_eq!(replaced["version"], 1);

    let zone = ask(&app, "How many people do I need to move from Zone Z1?").await;
    assert_eq!(zone["answer"], "Estimated evacuees in Z1: 1,200");
    assert_eq!(zone["version"], 1);

    let priority = ask(&app, "What are the top 3 priority zones?").await;
    assert_eq!(
        priority["answer"],
        "Top priority zones:\n1. Harbour (800, risk 5)\n2. Z1 (1,200, risk 3)"
    );

    let impact = ask(&app, "What’s the estimated population in impact?").await;
    assert_eq!(impact["answer"], "Estimated population in impact: 48,210");

    let shelter = ask(&app, "What's total shelter capacity?").await;
    assert_eq!(shelter["answer"], "Total shelter capacity: 80");

    let missing = ask(&app, "How many people from Zone Q9?").await;
    assert!(missing["answer"].as_str().unwrap().contains("Q9"));
}

#[tokio::test]
async fn state_snapshot_is_replaced_wholesale() {
    let app = build_app(config()).await.expect("app should build");

    put_state(&app, scenario(), Some(API_KEY)).await;
    put_state(
        &app,
        json!({ "transport": { "riskMarginMin": 3 }, "version": 40 }),
        Some(API_KEY),
    )
    .await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = body_json(response).await;
    assert_eq!(snapshot["version"], 2);
    assert!(snapshot["updatedAt"].is_string());
    assert!(snapshot["demand"].is_null());
    assert_eq!(snapshot["transport"]["riskMarginMin"], 3);
}

#[tokio::test]
async fn malformed_question_is_a_request_failure() {
    let app = build_app(config()).await.expect("app should build");

    let request = Request::builder()
        .method("POST")
        .uri("/qa")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"question": "wrong field"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "request_failed");
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    let app = build_app(ApiConfig {
        rate_limit_window: Duration::from_secs(60),
        rate_limit_max: 1,
        trust_forwarded_for: true,
        ..config()
    })
    .await
    .expect("app should build");

    let request = |client: &str| {
        Request::builder()
            .method("POST")
            .uri("/qa")
            .header("content-type", "application/json")
            .header("x-forwarded-for", client)
            .body(Body::from(json!({ "query": "help" }).to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app.oneshot(request("198.51.100.2")).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn forwarded_header_is_ignored_unless_trusted() {
    let app = build_app(ApiConfig {
        rate_limit_window: Duration::from_secs(60),
        rate_limit_max: 1,
        ..config()
    })
    .await
    .expect("app should build");

    let request = |client: &str| {
        Request::builder()
            .method("POST")
            .uri("/qa")
            .header("content-type", "application/json")
            .header("x-forwarded-for", client)
            .body(Body::from(json!({ "query": "help" }).to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let rotated = app.oneshot(request("198.51.100.2")).await.unwrap();
    assert_eq!(rotated.status(), StatusCode::TOO_MANY_REQUESTS);
}
