// SPDX-License-Identifier: MIT

//! Dexcom Share client.
//!
//! Authentication is a two-step exchange: the publisher account is first
//! resolved to an account ID, which is then traded for a session ID. Both
//! steps can return the all-zero UUID inside an HTTP 200 - that is the
//! provider's encoding of "invalid credentials" and must be checked
//! explicitly.

use crate::error::AppError;
use crate::models::glucose::{filter_to_window, GlucoseReading};
use crate::services::cgm::ConnectionTest;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Dexcom Share application ID (fixed, shared by all Share clients).
const DEXCOM_APP_ID: &str = "d89443d2-327c-4a6f-89e5-496bbb0317db";

/// "Invalid credentials" sentinel returned inside successful responses.
const NULL_UUID: &str = "00000000-0000-0000-0000-000000000000";

const USER_AGENT: &str = "Dexcom Share/3.0.2.11";

/// Provider limits for one readings call.
const MAX_MINUTES: u32 = 1440;
const MAX_COUNT: u32 = 288;

/// Known Share server hostnames (US / outside-US).
pub const DEXCOM_SERVERS: [&str; 2] = ["share2.dexcom.com", "shareous1.dexcom.com"];

/// Dexcom Share API client.
pub struct DexcomShareClient {
    http: reqwest::Client,
    base_url: String,
    session_id: Option<String>,
}

impl DexcomShareClient {
    /// Create a client for the given Share server.
    pub fn new(server: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://{}/ShareWebServices/Services", server),
            session_id: None,
        }
    }

    /// Two-step login. The account ID from step 1 must never be used as the
    /// session ID; only step 2 yields a session.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), AppError> {
        let account_id: String = self
            .post_json(
                "/General/AuthenticatePublisherAccount",
                &serde_json::json!({
                    "applicationId": DEXCOM_APP_ID,
                    "accountName": username,
                    "password": password,
                }),
            )
            .await?;

        if account_id.is_empty() || account_id == NULL_UUID {
            return Err(AppError::CgmAuth("Invalid username or password".to_string()));
        }

        let session_id: String = self
            .post_json(
                "/General/LoginPublisherAccountById",
                &serde_json::json!({
                    "applicationId": DEXCOM_APP_ID,
                    "accountId": account_id,
                    "password": password,
                }),
            )
            .await?;

        if session_id.is_empty() || session_id == NULL_UUID {
            return Err(AppError::CgmAuth("Failed to obtain session".to_string()));
        }

        self.session_id = Some(session_id);
        Ok(())
    }

    /// Fetch the latest glucose readings.
    ///
    /// `minutes` and `max_count` are clamped to the provider maximums
    /// (1440 minutes / 288 points).
    pub async fn glucose_readings(
        &self,
        minutes: u32,
        max_count: u32,
    ) -> Result<Vec<GlucoseReading>, AppError> {
        let session_id = self
            .session_id
            .as_ref()
            .ok_or_else(|| AppError::CgmApi("Not authenticated".to_string()))?;

        let response = self
            .http
            .get(format!(
                "{}/Publisher/ReadPublisherLatestGlucoseValues",
                self.base_url
            ))
            .query(&[
                ("sessionId", session_id.as_str()),
                ("minutes", &minutes.min(MAX_MINUTES).to_string()),
                ("maxCount", &max_count.min(MAX_COUNT).to_string()),
            ])
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| AppError::CgmApi(format!("Dexcom request failed: {}", e)))?;

        let raw: Vec<DexcomReading> = Self::check_response_json(response).await?;

        raw.into_iter()
            .map(|r| {
                let timestamp = parse_dexcom_timestamp(r.wt.as_deref().or(r.dt.as_deref()))?;
                Ok(GlucoseReading {
                    timestamp,
                    value: r.value,
                })
            })
            .collect()
    }

    /// Fetch readings for a specific [start, end] window.
    ///
    /// The Share API has no native range query: we compute minutes from now
    /// back to the window start, fetch, then filter client-side.
    pub async fn readings_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GlucoseReading>, AppError> {
        let seconds_from_now = (Utc::now() - start).num_seconds().max(0);
        let minutes_from_now = ((seconds_from_now + 59) / 60) as u32;
        let all = self
            .glucose_readings(minutes_from_now.min(MAX_MINUTES), MAX_COUNT)
            .await?;

        Ok(filter_to_window(all, start, end))
    }

    /// Generic POST with JSON body.
    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::CgmApi(format!("Dexcom request failed: {}", e)))?;

        Self::check_response_json(response).await
    }

    async fn check_response_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CgmApi(format!(
                "Dexcom API error: {} - {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::CgmApi(format!("Dexcom response parse error: {}", e)))
    }
}

/// Raw reading as returned by the Share API.
#[derive(Debug, Deserialize)]
struct DexcomReading {
    /// Wall time, preferred
    #[serde(rename = "WT", default)]
    wt: Option<String>,
    /// Display time, fallback
    #[serde(rename = "DT", default)]
    dt: Option<String>,
    #[serde(rename = "Value")]
    value: f64,
}

/// Parse the Share timestamp format `"Date(<unix-ms>)"`.
fn parse_dexcom_timestamp(raw: Option<&str>) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.ok_or_else(|| AppError::CgmApi("Reading without timestamp".to_string()))?;

    let millis = raw
        .strip_prefix("Date(")
        .and_then(|s| s.strip_suffix(')'))
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            AppError::CgmApi(format!("Invalid Dexcom timestamp format: {}", raw))
        })?;

    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::CgmApi(format!("Dexcom timestamp out of range: {}", raw)))
}

/// Test Dexcom Share credentials: login, then read the last hour.
pub async fn test_connection(server: &str, username: &str, password: &str) -> ConnectionTest {
    let mut client = DexcomShareClient::new(server);

    let result = async {
        client.login(username, password).await?;
        client.glucose_readings(60, 12).await
    }
    .await;

    match result {
        Ok(readings) => ConnectionTest {
            success: true,
            message: format!(
                "Connection successful - Found {} glucose readings",
                readings.len()
            ),
            readings_count: Some(readings.len()),
            connections: None,
            region: None,
        },
        Err(e) => ConnectionTest {
            success: false,
            message: match e {
                AppError::CgmAuth(msg) => msg,
                other => other.to_string(),
            },
            readings_count: None,
            connections: None,
            region: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timestamp_epoch_millis() {
        let ts = parse_dexcom_timestamp(Some("Date(1700000000000)")).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_dexcom_timestamp(Some("2024-01-01T00:00:00Z")).is_err());
        assert!(parse_dexcom_timestamp(Some("Date(notanumber)")).is_err());
        assert!(parse_dexcom_timestamp(None).is_err());
    }

    #[test]
    fn null_uuid_is_the_invalid_credential_sentinel() {
        assert_eq!(NULL_UUID, "00000000-0000-0000-0000-000000000000");
        assert_ne!(DEXCOM_APP_ID, NULL_UUID);
    }
}
