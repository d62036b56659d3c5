// SPDX-License-Identifier: MIT

//! Strava API client for fetching and updating activities.
//!
//! Handles:
//! - Activity fetching (start time, duration, description)
//! - Activity description updates
//! - Token refresh when expired
//! - Webhook subscription management
//! - Rate limit and token-error detection

use crate::error::AppError;
use serde::Deserialize;

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://www.strava.com/api/v3".to_string(),
            oauth_url: "https://www.strava.com/oauth".to_string(),
            client_id,
            client_secret,
        }
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Update an activity's description.
    pub async fn update_activity_description(
        &self,
        access_token: &str,
        activity_id: u64,
        description: &str,
    ) -> Result<(), AppError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);

        let body = serde_json::json!({
            "description": description
        });

        let response = self
            .http
            .put(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        self.check_response(response).await?;
        Ok(())
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token refresh request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    // ─── Webhook Subscriptions ───────────────────────────────────

    /// Create a webhook push subscription.
    pub async fn create_subscription(
        &self,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<Subscription, AppError> {
        let body = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "callback_url": callback_url,
            "verify_token": verify_token,
        });

        let response = self
            .http
            .post(format!("{}/push_subscriptions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Subscription request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// List existing webhook push subscriptions.
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>, AppError> {
        let response = self
            .http
            .get(format!("{}/push_subscriptions", self.base_url))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Subscription list failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<(), AppError> {
        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        // Rate limit - retryable via the job queue
        if status.as_u16() == 429 {
            tracing::warn!("Strava rate limit hit (429)");
            return Err(AppError::StravaApi(AppError::STRAVA_RATE_LIMIT.to_string()));
        }

        // Unauthorized - token may be expired
        if status.as_u16() == 401 {
            return Err(AppError::StravaApi(
                AppError::STRAVA_TOKEN_ERROR.to_string(),
            ));
        }

        Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)))
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Strava rate limit hit (429)");
                return Err(AppError::StravaApi(AppError::STRAVA_RATE_LIMIT.to_string()));
            }

            if status.as_u16() == 401 {
                return Err(AppError::StravaApi(
                    AppError::STRAVA_TOKEN_ERROR.to_string(),
                ));
            }

            return Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
    }
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Detailed Strava activity response.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    pub name: String,
    pub sport_type: String,
    /// Activity start (RFC 3339)
    pub start_date: String,
    /// Elapsed duration in seconds
    pub elapsed_time: u64,
    pub description: Option<String>,
}

/// Webhook push subscription record.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// StravaService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::Store;
use crate::models::StravaToken;
use chrono::{DateTime, Duration, Utc};

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// High-level Strava service that manages token lifecycle and API calls.
///
/// Refreshed tokens are persisted to the store before use so subsequent jobs
/// for the same user reuse them. The enrichment queue runs a single job at a
/// time, which is what prevents two refreshes from racing; this service does
/// not take an independent lock.
#[derive(Clone)]
pub struct StravaService {
    client: StravaClient,
    store: Store,
}

impl StravaService {
    pub fn new(client_id: String, client_secret: String, store: Store) -> Self {
        Self {
            client: StravaClient::new(client_id, client_secret),
            store,
        }
    }

    // ─── Token Management ────────────────────────────────────────

    /// Get a valid (non-expired) access token for the given athlete,
    /// refreshing and persisting it first when it is about to expire.
    pub async fn valid_access_token(&self, athlete_id: u64) -> Result<String, AppError> {
        let token = self
            .store
            .get_strava_token(athlete_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Strava token for athlete {}", athlete_id)))?;

        let now = Utc::now();
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if now + margin < token.expires_at {
            return Ok(token.access_token);
        }

        tracing::info!(athlete_id, "Access token expired, refreshing");

        let refreshed = self.client.refresh_token(&token.refresh_token).await?;
        let expires_at =
            DateTime::from_timestamp(refreshed.expires_at, 0).unwrap_or_else(Utc::now);

        let updated = StravaToken {
            access_token: refreshed.access_token.clone(),
            refresh_token: refreshed.refresh_token,
            expires_at,
        };

        // Persist before use so a later job sees the new refresh token
        self.store.set_strava_token(athlete_id, &updated).await?;

        tracing::info!(athlete_id, "Token refreshed and stored");
        Ok(refreshed.access_token)
    }

    // ─── API Wrappers ────────────────────────────────────────────

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        athlete_id: u64,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        let access_token = self.valid_access_token(athlete_id).await?;
        self.client.get_activity(&access_token, activity_id).await
    }

    /// Update an activity's description.
    pub async fn update_activity_description(
        &self,
        athlete_id: u64,
        activity_id: u64,
        description: &str,
    ) -> Result<(), AppError> {
        let access_token = self.valid_access_token(athlete_id).await?;
        self.client
            .update_activity_description(&access_token, activity_id, description)
            .await
    }

    /// Create the webhook push subscription for this deployment.
    pub async fn create_subscription(
        &self,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<Subscription, AppError> {
        self.client
            .create_subscription(callback_url, verify_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_access_token_returns_unexpired_token_without_refresh() {
        let store = Store::new();
        store
            .set_strava_token(
                7,
                &StravaToken {
                    access_token: "fresh".into(),
                    refresh_token: "refresh".into(),
                    expires_at: Utc::now() + Duration::hours(2),
                },
            )
            .await
            .unwrap();

        let service = StravaService::new("id".into(), "secret".into(), store);
        let token = service.valid_access_token(7).await.unwrap();
        assert_eq!(token, "fresh");
    }

    #[tokio::test]
    async fn valid_access_token_missing_is_not_found() {
        let service = StravaService::new("id".into(), "secret".into(), Store::new());
        let err = service.valid_access_token(7).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
