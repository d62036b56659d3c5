// SPDX-License-Identifier: MIT

//! CGM credential and settings routes.
//!
//! Test endpoints exercise credentials against the provider without touching
//! stored state. Save endpoints encrypt secrets and upsert the user's single
//! credential slot - saving one provider replaces the other.

use crate::error::{AppError, Result};
use crate::models::{
    CgmCredentials, DexcomCredentials, LibreLinkCredentials, Settings,
};
use crate::services::cgm::dexcom::{self, DEXCOM_SERVERS};
use crate::services::cgm::librelink::{self, REGIONS};
use crate::services::cgm::ConnectionChoice;
use crate::services::crypto::encrypt_pair;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// CGM credential and settings routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/librelink/test", post(librelink_test))
        .route("/api/librelink/credentials", post(librelink_save))
        .route("/api/dexcom/test", post(dexcom_test))
        .route("/api/dexcom/credentials", post(dexcom_save))
        .route("/api/settings", put(update_settings))
}

/// Failed credential test body; `connections` present when patient
/// disambiguation is required.
#[derive(Serialize)]
struct TestFailure {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    connections: Option<Vec<ConnectionChoice>>,
}

/// Successful credential test body.
#[derive(Serialize)]
struct TestSuccess {
    success: bool,
    message: String,
    #[serde(rename = "readingsCount", skip_serializing_if = "Option::is_none")]
    readings_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
}

/// Save confirmation body.
#[derive(Serialize)]
struct SaveResponse {
    success: bool,
    message: String,
}

// ─── LibreLinkUp ─────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct LibreLinkTestRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
    region: Option<String>,
    #[serde(rename = "patientId")]
    patient_id: Option<String>,
}

#[derive(Deserialize, Validate)]
struct LibreLinkSaveRequest {
    #[serde(rename = "userId")]
    user_id: u64,
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
    region: Option<String>,
    #[serde(rename = "patientId")]
    patient_id: Option<String>,
}

fn validate_region(region: Option<&str>) -> Result<String> {
    let region = region.unwrap_or("EU");
    if !REGIONS.contains(&region) {
        return Err(AppError::BadRequest(format!("Invalid region: {}", region)));
    }
    Ok(region.to_string())
}

async fn librelink_test(Json(req): Json<LibreLinkTestRequest>) -> Result<Response> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let region = validate_region(req.region.as_deref())?;

    let result = librelink::test_connection(
        &region,
        &req.email,
        &req.password,
        req.patient_id.as_deref(),
    )
    .await;

    if !result.success {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(TestFailure {
                error: result.message,
                connections: result.connections,
            }),
        )
            .into_response());
    }

    Ok(Json(TestSuccess {
        success: true,
        message: result.message,
        readings_count: result.readings_count,
        region: result.region,
    })
    .into_response())
}

async fn librelink_save(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LibreLinkSaveRequest>,
) -> Result<Json<SaveResponse>> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let region = validate_region(req.region.as_deref())?;

    require_user(&state, req.user_id).await?;

    let (encrypted_email, encrypted_password) =
        encrypt_pair(&state.crypto, &req.email, &req.password)?;

    state
        .store
        .set_cgm_credentials(
            req.user_id,
            &CgmCredentials::Librelink(LibreLinkCredentials {
                encrypted_email,
                encrypted_password,
                region,
                patient_id: req.patient_id,
            }),
        )
        .await?;

    tracing::info!(athlete_id = req.user_id, "LibreLinkUp credentials saved");

    Ok(Json(SaveResponse {
        success: true,
        message: "LibreLinkUp credentials saved successfully".to_string(),
    }))
}

// ─── Dexcom ──────────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct DexcomTestRequest {
    #[validate(length(min = 1))]
    username: String,
    #[validate(length(min = 1))]
    password: String,
    server: Option<String>,
}

#[derive(Deserialize, Validate)]
struct DexcomSaveRequest {
    #[serde(rename = "userId")]
    user_id: u64,
    #[validate(length(min = 1))]
    username: String,
    #[validate(length(min = 1))]
    password: String,
    server: Option<String>,
}

fn validate_server(server: Option<&str>) -> Result<String> {
    let server = server.unwrap_or("shareous1.dexcom.com");
    if !DEXCOM_SERVERS.contains(&server) {
        return Err(AppError::BadRequest(format!("Invalid server: {}", server)));
    }
    Ok(server.to_string())
}

async fn dexcom_test(Json(req): Json<DexcomTestRequest>) -> Result<Response> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let server = validate_server(req.server.as_deref())?;

    let result = dexcom::test_connection(&server, &req.username, &req.password).await;

    if !result.success {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(TestFailure {
                error: result.message,
                connections: None,
            }),
        )
            .into_response());
    }

    Ok(Json(TestSuccess {
        success: true,
        message: result.message,
        readings_count: result.readings_count,
        region: None,
    })
    .into_response())
}

async fn dexcom_save(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DexcomSaveRequest>,
) -> Result<Json<SaveResponse>> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let server = validate_server(req.server.as_deref())?;

    require_user(&state, req.user_id).await?;

    let (encrypted_username, encrypted_password) =
        encrypt_pair(&state.crypto, &req.username, &req.password)?;

    state
        .store
        .set_cgm_credentials(
            req.user_id,
            &CgmCredentials::Dexcom(DexcomCredentials {
                encrypted_username,
                encrypted_password,
                server,
            }),
        )
        .await?;

    tracing::info!(athlete_id = req.user_id, "Dexcom credentials saved");

    Ok(Json(SaveResponse {
        success: true,
        message: "Dexcom credentials saved successfully".to_string(),
    }))
}

// ─── Settings ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SettingsRequest {
    #[serde(rename = "userId")]
    user_id: u64,
    #[serde(rename = "lowThreshold")]
    low_threshold: f64,
    #[serde(rename = "highThreshold")]
    high_threshold: f64,
    unit: crate::models::GlucoseUnit,
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<SaveResponse>> {
    if req.low_threshold >= req.high_threshold {
        return Err(AppError::BadRequest(
            "lowThreshold must be below highThreshold".to_string(),
        ));
    }

    require_user(&state, req.user_id).await?;

    state
        .store
        .set_settings(
            req.user_id,
            &Settings {
                low_threshold: req.low_threshold,
                high_threshold: req.high_threshold,
                unit: req.unit,
            },
        )
        .await?;

    Ok(Json(SaveResponse {
        success: true,
        message: "Settings saved".to_string(),
    }))
}

/// 404 unless the user exists.
async fn require_user(state: &AppState, athlete_id: u64) -> Result<()> {
    state
        .store
        .get_user(athlete_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("User {}", athlete_id)))
}
