// SPDX-License-Identifier: MIT

//! LibreLinkUp client.
//!
//! Login is a single bearer-token exchange, but the response may carry a
//! region redirect when the account lives on a different regional endpoint.
//! The redirect is followed as a bounded retry loop - providers do not chain
//! redirects, so anything past the cap is treated as misbehavior.

use crate::error::AppError;
use crate::models::glucose::{filter_to_window, GlucoseReading};
use crate::services::cgm::{ConnectionChoice, ConnectionTest};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};

const LLU_VERSION: &str = "4.16.0";
const LLU_PRODUCT: &str = "llu.ios";
const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU OS 17_4.1 like Mac OS X) \
    AppleWebKit/536.26 (KHTML, like Gecko) Version/17.4.1 Mobile/10A5355d Safari/8536.25";

/// Maximum region-redirect hops before giving up.
const MAX_REGION_REDIRECTS: usize = 2;

/// Supported LibreLinkUp regions.
pub const REGIONS: [&str; 13] = [
    "AE", "AP", "AU", "CA", "CN", "DE", "EU", "EU2", "FR", "JP", "LA", "RU", "US",
];

/// Resolve a region key to its API hostname.
fn region_host(region: &str) -> Option<&'static str> {
    match region {
        "AE" => Some("api-ae.libreview.io"),
        "AP" => Some("api-ap.libreview.io"),
        "AU" => Some("api-au.libreview.io"),
        "CA" => Some("api-ca.libreview.io"),
        "CN" => Some("api.libreview.cn"),
        "DE" => Some("api-de.libreview.io"),
        "EU" => Some("api-eu.libreview.io"),
        "EU2" => Some("api-eu2.libreview.io"),
        "FR" => Some("api-fr.libreview.io"),
        "JP" => Some("api-jp.libreview.io"),
        "LA" => Some("api-la.libreview.io"),
        "RU" => Some("api-ru.libreview.io"),
        "US" => Some("api-us.libreview.io"),
        _ => None,
    }
}

/// LibreLinkUp API client.
pub struct LibreLinkClient {
    http: reqwest::Client,
    region: String,
    base_url: String,
    auth_token: Option<String>,
    account_id: Option<String>,
}

impl LibreLinkClient {
    /// Create a client for the given region (falls back to EU for unknown
    /// keys; the API layer validates regions before they get here).
    pub fn new(region: &str) -> Self {
        let region = if region_host(region).is_some() {
            region.to_string()
        } else {
            "EU".to_string()
        };
        let host = region_host(&region).unwrap_or("api-eu.libreview.io");

        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://{}", host),
            region,
            auth_token: None,
            account_id: None,
        }
    }

    /// Region currently serving this client (may change after login).
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Login and obtain a bearer token, following at most
    /// [`MAX_REGION_REDIRECTS`] region redirects.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), AppError> {
        for _hop in 0..=MAX_REGION_REDIRECTS {
            let response = self
                .http
                .post(format!("{}/llu/auth/login", self.base_url))
                .headers(self.base_headers())
                .json(&serde_json::json!({ "email": email, "password": password }))
                .send()
                .await
                .map_err(|e| AppError::CgmApi(format!("LibreLinkUp request failed: {}", e)))?;

            let body: LoginResponse = check_response_json(response).await?;

            match login_step(body)? {
                LoginStep::Redirect(region) => {
                    let host = region_host(&region).ok_or_else(|| {
                        AppError::CgmApi(format!("Unknown region redirect: {}", region))
                    })?;
                    tracing::debug!(region = %region, "Following LibreLinkUp region redirect");
                    self.region = region;
                    self.base_url = format!("https://{}", host);
                }
                LoginStep::Authenticated { token, account_id } => {
                    self.auth_token = Some(token);
                    self.account_id = account_id;
                    return Ok(());
                }
            }
        }

        Err(AppError::CgmApi(
            "LibreLinkUp region redirect loop exceeded".to_string(),
        ))
    }

    /// List the account's monitored patients.
    pub async fn connections(&self) -> Result<Vec<Connection>, AppError> {
        let response: ListResponse<Connection> =
            self.get_json("/llu/connections").await?;
        Ok(response.data)
    }

    /// Fetch the recent glucose graph for a patient.
    pub async fn graph(&self, patient_id: &str) -> Result<GraphData, AppError> {
        let response: ListWrapper<GraphData> = self
            .get_json(&format!("/llu/connections/{}/graph", patient_id))
            .await?;
        Ok(response.data)
    }

    /// Fetch readings for a [start, end] window. The graph endpoint has no
    /// range parameters, so readings are filtered client-side.
    pub async fn readings_in_range(
        &self,
        patient_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GlucoseReading>, AppError> {
        let graph = self.graph(patient_id).await?;

        let readings = graph
            .graph_data
            .into_iter()
            .map(|point| {
                Ok(GlucoseReading {
                    timestamp: parse_libre_timestamp(&point.timestamp)?,
                    value: point.value_mg_per_dl,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(filter_to_window(readings, start, end))
    }

    /// Authenticated GET with provider-status checking.
    async fn get_json<T: DeserializeOwned + HasStatus>(
        &self,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let token = self
            .auth_token
            .as_ref()
            .ok_or_else(|| AppError::CgmApi("Not authenticated".to_string()))?;

        let mut headers = self.base_headers();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| AppError::CgmApi("Invalid auth token".to_string()))?,
        );
        if let Some(account_id) = &self.account_id {
            // account-id header is the SHA-256 hex of the user ID
            let hash = hex::encode(Sha256::digest(account_id.as_bytes()));
            headers.insert(
                "account-id",
                reqwest::header::HeaderValue::from_str(&hash)
                    .map_err(|_| AppError::CgmApi("Invalid account id".to_string()))?,
            );
        }

        let response = self
            .http
            .get(format!("{}{}", self.base_url, endpoint))
            .headers(headers)
            .send()
            .await
            .map_err(|e| AppError::CgmApi(format!("LibreLinkUp request failed: {}", e)))?;

        let body: T = check_response_json(response).await?;
        if body.status() != 0 {
            return Err(AppError::CgmApi(format!(
                "LibreLinkUp error (status {}) on {}",
                body.status(),
                endpoint
            )));
        }
        Ok(body)
    }

    fn base_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );
        headers.insert("version", HeaderValue::from_static(LLU_VERSION));
        headers.insert("product", HeaderValue::from_static(LLU_PRODUCT));
        headers
    }
}

/// Outcome of inspecting one login response body.
enum LoginStep {
    Redirect(String),
    Authenticated {
        token: String,
        account_id: Option<String>,
    },
}

/// Decide what a login response body means. Pure so the redirect handling
/// can be tested without a provider.
fn login_step(body: LoginResponse) -> Result<LoginStep, AppError> {
    if body.status != 0 {
        return Err(AppError::CgmAuth(format!(
            "LibreLinkUp login failed (status {})",
            body.status
        )));
    }

    let data = body
        .data
        .ok_or_else(|| AppError::CgmApi("Empty LibreLinkUp login response".to_string()))?;

    if data.redirect.unwrap_or(false) {
        let region = data
            .region
            .map(|r| r.to_uppercase())
            .ok_or_else(|| AppError::CgmApi("Redirect without region".to_string()))?;
        return Ok(LoginStep::Redirect(region));
    }

    let token = data
        .auth_ticket
        .map(|t| t.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AppError::CgmAuth("No authentication token received from LibreLinkUp".to_string())
        })?;

    Ok(LoginStep::Authenticated {
        token,
        account_id: data.user.map(|u| u.id),
    })
}

async fn check_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::CgmApi(format!(
            "LibreLinkUp API error: {} - {}",
            status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::CgmApi(format!("LibreLinkUp response parse error: {}", e)))
}

/// Parse the graph timestamp format `"M/D/YYYY h:mm:ss AM"`.
///
/// The provider sends no zone information; timestamps are taken as UTC so
/// activity windows stay deterministic across deployments.
fn parse_libre_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    NaiveDateTime::parse_from_str(raw, "%m/%d/%Y %I:%M:%S %p")
        .map(|naive| naive.and_utc())
        .map_err(|_| AppError::CgmApi(format!("Invalid LibreLinkUp timestamp: {}", raw)))
}

// ─── Response types ──────────────────────────────────────────────

trait HasStatus {
    fn status(&self) -> i64;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: i64,
    #[serde(default)]
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(default)]
    user: Option<LoginUser>,
    #[serde(rename = "authTicket", default)]
    auth_ticket: Option<AuthTicket>,
    #[serde(default)]
    redirect: Option<bool>,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthTicket {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    status: i64,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> HasStatus for ListResponse<T> {
    fn status(&self) -> i64 {
        self.status
    }
}

#[derive(Debug, Deserialize)]
struct ListWrapper<T> {
    status: i64,
    data: T,
}

impl<T> HasStatus for ListWrapper<T> {
    fn status(&self) -> i64 {
        self.status
    }
}

/// A monitored patient connection.
#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    #[serde(rename = "patientId")]
    pub patient_id: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
}

/// Glucose graph payload for one patient.
#[derive(Debug, Deserialize)]
pub struct GraphData {
    #[serde(rename = "graphData", default = "Vec::new")]
    pub graph_data: Vec<GraphPoint>,
}

/// One point in the glucose graph.
#[derive(Debug, Deserialize)]
pub struct GraphPoint {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "ValueInMgPerDl")]
    pub value_mg_per_dl: f64,
}

/// Test LibreLinkUp credentials: login, list connections, read the graph.
///
/// With several monitored patients and no pre-selected one, the caller gets
/// the connection list back to disambiguate instead of the client guessing.
pub async fn test_connection(
    region: &str,
    email: &str,
    password: &str,
    patient_id: Option<&str>,
) -> ConnectionTest {
    let mut client = LibreLinkClient::new(region);

    if let Err(e) = client.login(email, password).await {
        return failure(e);
    }

    let connections = match client.connections().await {
        Ok(c) => c,
        Err(e) => return failure(e),
    };

    if connections.is_empty() {
        return ConnectionTest {
            success: false,
            message: "No connected patients found. Please add a connection in the LibreLinkUp app."
                .to_string(),
            readings_count: None,
            connections: None,
            region: Some(client.region().to_string()),
        };
    }

    if connections.len() > 1 && patient_id.is_none() {
        return ConnectionTest {
            success: false,
            message: format!(
                "Found {} connections. Please select a patient.",
                connections.len()
            ),
            readings_count: None,
            connections: Some(
                connections
                    .iter()
                    .map(|c| ConnectionChoice {
                        id: c.patient_id.clone(),
                        name: format!("{} {}", c.first_name, c.last_name),
                    })
                    .collect(),
            ),
            region: Some(client.region().to_string()),
        };
    }

    let target = patient_id.unwrap_or(&connections[0].patient_id);
    match client.graph(target).await {
        Ok(graph) => ConnectionTest {
            success: true,
            message: format!(
                "Connection successful - Found {} glucose readings",
                graph.graph_data.len()
            ),
            readings_count: Some(graph.graph_data.len()),
            connections: None,
            region: Some(client.region().to_string()),
        },
        Err(e) => failure(e),
    }
}

fn failure(e: AppError) -> ConnectionTest {
    ConnectionTest {
        success: false,
        message: match e {
            AppError::CgmAuth(msg) => msg,
            other => other.to_string(),
        },
        readings_count: None,
        connections: None,
        region: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_body(json: serde_json::Value) -> LoginResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn login_step_rejects_nonzero_status() {
        let body = login_body(serde_json::json!({"status": 2, "data": {}}));
        match login_step(body) {
            Err(AppError::CgmAuth(msg)) => assert!(msg.contains("status 2")),
            other => panic!("expected CgmAuth, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn login_step_detects_region_redirect() {
        let body = login_body(serde_json::json!({
            "status": 0,
            "data": {"redirect": true, "region": "us"}
        }));
        match login_step(body).unwrap() {
            LoginStep::Redirect(region) => assert_eq!(region, "US"),
            LoginStep::Authenticated { .. } => panic!("expected redirect"),
        }
    }

    #[test]
    fn login_step_extracts_token_and_account() {
        let body = login_body(serde_json::json!({
            "status": 0,
            "data": {
                "user": {"id": "user-123"},
                "authTicket": {"token": "bearer-token"}
            }
        }));
        match login_step(body).unwrap() {
            LoginStep::Authenticated { token, account_id } => {
                assert_eq!(token, "bearer-token");
                assert_eq!(account_id.as_deref(), Some("user-123"));
            }
            LoginStep::Redirect(_) => panic!("expected authenticated"),
        }
    }

    #[test]
    fn login_step_missing_token_is_auth_failure() {
        let body = login_body(serde_json::json!({"status": 0, "data": {}}));
        assert!(matches!(login_step(body), Err(AppError::CgmAuth(_))));
    }

    #[test]
    fn redirect_to_unknown_region_is_an_error() {
        // The login loop resolves the host before retrying; an unknown key
        // must not silently fall back anywhere.
        assert!(region_host("XX").is_none());
        assert!(region_host("US").is_some());
    }

    #[test]
    fn unknown_region_falls_back_to_eu_at_construction() {
        let client = LibreLinkClient::new("NOPE");
        assert_eq!(client.region(), "EU");
    }

    #[test]
    fn parse_graph_timestamps() {
        let ts = parse_libre_timestamp("1/15/2025 10:30:00 AM").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-15T10:30:00+00:00");

        let pm = parse_libre_timestamp("1/15/2025 12:05:10 PM").unwrap();
        assert_eq!(pm.to_rfc3339(), "2025-01-15T12:05:10+00:00");

        let midnight = parse_libre_timestamp("1/15/2025 12:00:00 AM").unwrap();
        assert_eq!(midnight.to_rfc3339(), "2025-01-15T00:00:00+00:00");

        assert!(parse_libre_timestamp("2025-01-15T10:30:00Z").is_err());
    }
}
