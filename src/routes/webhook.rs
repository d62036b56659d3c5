// SPDX-License-Identifier: MIT

//! Webhook routes for Strava events.
//!
//! GET handles the one-time subscription handshake; POST receives signed
//! activity events and enqueues enrichment jobs. Signature verification is
//! HMAC-SHA256 over the raw body with a constant-time comparison. A missing
//! signature is rejected unless the explicit dev flag allows unsigned
//! deliveries.

use crate::services::processor::ActivityJob;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", get(verify).post(handle_event))
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.challenge")]
    challenge: String,
    #[serde(rename = "hub.verify_token")]
    verify_token: String,
}

/// Verification response.
#[derive(Serialize)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET).
///
/// Missing query parameters are rejected with 400 by extraction.
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    if params.mode == "subscribe" && params.verify_token == state.config.webhook_verify_token {
        tracing::info!("Webhook subscription verified");
        (
            StatusCode::OK,
            Json(VerifyResponse {
                challenge: params.challenge,
            }),
        )
            .into_response()
    } else {
        tracing::warn!(
            mode = %params.mode,
            "Webhook verification failed: invalid token"
        );
        (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "Invalid verification token"})),
        )
            .into_response()
    }
}

/// Strava webhook event payload.
#[derive(Deserialize, Debug)]
struct WebhookEvent {
    object_type: String, // "activity" or "athlete"
    object_id: u64,
    aspect_type: String, // "create", "update", "delete"
    owner_id: u64,
    #[serde(default)]
    event_time: i64,
    #[serde(default)]
    subscription_id: u64,
}

/// Event acknowledgment body.
#[derive(Serialize)]
struct EventResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(rename = "jobId", skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
}

impl EventResponse {
    fn ignored(reason: &'static str) -> Self {
        Self {
            status: "ignored",
            reason: Some(reason),
            job_id: None,
        }
    }

    fn queued(job_id: String) -> Self {
        Self {
            status: "queued",
            reason: None,
            job_id: Some(job_id),
        }
    }
}

/// Handle incoming webhook events (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match headers.get("strava-signature").and_then(|h| h.to_str().ok()) {
        Some(signature) => {
            if !verify_signature(state.config.strava_client_secret.as_bytes(), &body, signature)
            {
                tracing::warn!("Invalid webhook signature");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"error": "Invalid signature"})),
                )
                    .into_response();
            }
        }
        None => {
            if !state.config.allow_unsigned_webhooks {
                tracing::warn!("Webhook event without signature rejected");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"error": "Missing signature"})),
                )
                    .into_response();
            }
            tracing::warn!("Accepting unsigned webhook event (dev mode)");
        }
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse webhook event");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid event payload"})),
            )
                .into_response();
        }
    };

    tracing::info!(
        object_type = %event.object_type,
        object_id = event.object_id,
        aspect_type = %event.aspect_type,
        owner_id = event.owner_id,
        subscription_id = event.subscription_id,
        "Webhook event received"
    );

    // Only activity creations trigger enrichment; everything else is
    // acknowledged and dropped
    if event.object_type != "activity" {
        return Json(EventResponse::ignored("not_activity")).into_response();
    }
    if event.aspect_type != "create" {
        return Json(EventResponse::ignored("not_create")).into_response();
    }

    let job_id = format!("{}-{}", event.owner_id, event.object_id);
    state.queue.add(
        job_id.clone(),
        ActivityJob {
            activity_id: event.object_id,
            athlete_id: event.owner_id,
            event_time: event.event_time,
        },
    );

    tracing::info!(job_id = %job_id, "Queued activity for enrichment");

    Json(EventResponse::queued(job_id)).into_response()
}

/// Verify an HMAC-SHA256 hex signature over the raw body.
fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    // ct_eq handles length mismatches without leaking content timing
    signature.ct_eq(expected.as_slice()).into()
}
