// SPDX-License-Identifier: MIT

//! Strava webhook subscription management.

use crate::error::Result;
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/strava/subscribe", post(subscribe))
}

#[derive(Serialize)]
struct SubscribeResponse {
    id: u64,
}

/// Register this deployment's webhook callback with Strava.
async fn subscribe(State(state): State<Arc<AppState>>) -> Result<Json<SubscribeResponse>> {
    let callback_url = format!("{}/webhook", state.config.app_base_url);

    let subscription = state
        .strava
        .create_subscription(&callback_url, &state.config.webhook_verify_token)
        .await?;

    tracing::info!(
        subscription_id = subscription.id,
        callback = %callback_url,
        "Webhook subscription created"
    );

    Ok(Json(SubscribeResponse {
        id: subscription.id,
    }))
}
