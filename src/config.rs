//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and cached in memory. Security-sensitive
//! values (client secret, verify token, encryption key) have no defaults and
//! cause startup to fail when missing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Public base URL of this deployment (used for deep links and the
    /// webhook callback URL)
    pub app_base_url: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Strava OAuth client secret (also the webhook HMAC key)
    pub strava_client_secret: String,
    /// Webhook subscription verification token
    pub webhook_verify_token: String,
    /// AES-256-GCM key for credential encryption at rest (32 raw bytes)
    pub encryption_key: Vec<u8>,

    /// Accept webhook events without a signature header. Development escape
    /// hatch only; defaults to off.
    pub allow_unsigned_webhooks: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            webhook_verify_token: env::var("STRAVA_VERIFY_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_VERIFY_TOKEN"))?,
            encryption_key: decode_encryption_key(
                &env::var("APP_ENCRYPTION_KEY")
                    .map_err(|_| ConfigError::Missing("APP_ENCRYPTION_KEY"))?,
            )?,

            allow_unsigned_webhooks: env::var("GLUCOLINK_ALLOW_UNSIGNED_WEBHOOKS")
                .map(|v| v == "1")
                .unwrap_or(false),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
            port: 8080,
            strava_client_secret: "test_secret".to_string(),
            webhook_verify_token: "test_verify_token".to_string(),
            encryption_key: vec![0x42; 32],
            allow_unsigned_webhooks: false,
        }
    }
}

/// Decode and validate the base64-encoded 32-byte encryption key.
fn decode_encryption_key(encoded: &str) -> Result<Vec<u8>, ConfigError> {
    let key = BASE64
        .decode(encoded.trim())
        .map_err(|e| ConfigError::Invalid("APP_ENCRYPTION_KEY", e.to_string()))?;

    if key.len() != 32 {
        return Err(ConfigError::Invalid(
            "APP_ENCRYPTION_KEY",
            format!("expected 32 bytes, got {}", key.len()),
        ));
    }

    Ok(key)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
