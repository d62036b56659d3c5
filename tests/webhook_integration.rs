// SPDX-License-Identifier: MIT

//! Integration tests for webhook handling.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

const TEST_SECRET: &str = "test_secret"; // Matches Config::test_default()

fn create_event() -> serde_json::Value {
    json!({
        "aspect_type": "create",
        "event_time": 1234567890,
        "object_id": 12345678901_u64,
        "object_type": "activity",
        "owner_id": 123456,
        "subscription_id": 12345
    })
}

fn signed_post(body: &serde_json::Value) -> Request<Body> {
    let raw = serde_json::to_vec(body).unwrap();
    let signature = common::sign_body(TEST_SECRET, &raw);

    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("strava-signature", signature)
        .body(Body::from(raw))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_webhook_verification() {
    let (app, _state) = common::create_test_app();

    let challenge = "test_challenge_123";
    let verify_token = "test_verify_token"; // Matches Config::test_default()

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!(
                    "/webhook?hub.mode=subscribe&hub.challenge={}&hub.verify_token={}",
                    challenge, verify_token
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["hub.challenge"], challenge);
}

#[tokio::test]
async fn test_webhook_verification_wrong_token() {
    let (app, _state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=subscribe&hub.challenge=x&hub.verify_token=wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_verification_wrong_mode() {
    let (app, _state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(
                    "/webhook?hub.mode=unsubscribe&hub.challenge=x&hub.verify_token=test_verify_token",
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_verification_missing_params() {
    let (app, _state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=subscribe")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_event_create_activity_is_queued() {
    let (app, state) = common::create_test_app();

    let response = app.oneshot(signed_post(&create_event())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "queued");
    assert_eq!(json["jobId"], "123456-12345678901");

    // The job is queryable by its natural key
    assert!(state.queue.get_job("123456-12345678901").is_some());
}

#[tokio::test]
async fn test_webhook_event_missing_signature_rejected() {
    let (app, _state) = common::create_test_app();

    let raw = serde_json::to_vec(&create_event()).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(raw))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_event_tampered_body_rejected() {
    let (app, state) = common::create_test_app();

    // Signature computed over a different body than the one delivered
    let signature = common::sign_body(TEST_SECRET, br#"{"object_id": 1}"#);
    let tampered = serde_json::to_vec(&create_event()).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .header("strava-signature", signature)
                .body(Body::from(tampered))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.queue.stats().total, 0);
}

#[tokio::test]
async fn test_webhook_event_update_is_ignored() {
    let (app, state) = common::create_test_app();

    let mut event = create_event();
    event["aspect_type"] = json!("update");

    let response = app.oneshot(signed_post(&event)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ignored");
    assert_eq!(json["reason"], "not_create");
    assert_eq!(state.queue.stats().total, 0);
}

#[tokio::test]
async fn test_webhook_event_athlete_is_ignored() {
    let (app, state) = common::create_test_app();

    let mut event = create_event();
    event["object_type"] = json!("athlete");
    event["aspect_type"] = json!("update");

    let response = app.oneshot(signed_post(&event)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ignored");
    assert_eq!(json["reason"], "not_activity");
    assert_eq!(state.queue.stats().total, 0);
}

#[tokio::test]
async fn test_webhook_event_malformed_body_rejected() {
    let (app, _state) = common::create_test_app();

    let raw = b"not json".to_vec();
    let signature = common::sign_body(TEST_SECRET, &raw);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .header("strava-signature", signature)
                .body(Body::from(raw))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_queue_stats_endpoint() {
    let (app, _state) = common::create_test_app();

    let response = app
        .clone()
        .oneshot(signed_post(&create_event()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/queue/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
}
