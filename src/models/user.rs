//! User, token, credential, and settings models for storage and API.

use crate::models::glucose::GlucoseUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User profile, keyed by Strava athlete ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Strava athlete ID (also the store key)
    pub athlete_id: u64,
    /// Email address (may be None if not shared)
    pub email: Option<String>,
    /// When the user first connected
    pub created_at: DateTime<Utc>,
}

/// Strava OAuth tokens for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StravaToken {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

/// Which CGM provider a credential set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgmProvider {
    Librelink,
    Dexcom,
}

/// LibreLinkUp credentials (secrets encrypted at rest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibreLinkCredentials {
    pub encrypted_email: String,
    pub encrypted_password: String,
    /// Regional endpoint key ("EU", "US", ...)
    pub region: String,
    /// Pre-selected patient connection; None means "use the only connection"
    pub patient_id: Option<String>,
}

/// Dexcom Share credentials (secrets encrypted at rest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexcomCredentials {
    pub encrypted_username: String,
    pub encrypted_password: String,
    /// Share server hostname ("share2.dexcom.com" or "shareous1.dexcom.com")
    pub server: String,
}

/// A user's CGM credentials. Each user has at most one of these records, so
/// holding exactly one provider's credentials in a tagged union makes the
/// one-provider-per-user invariant structural: saving one provider replaces
/// the other in the same upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum CgmCredentials {
    Librelink(LibreLinkCredentials),
    Dexcom(DexcomCredentials),
}

impl CgmCredentials {
    pub fn provider(&self) -> CgmProvider {
        match self {
            CgmCredentials::Librelink(_) => CgmProvider::Librelink,
            CgmCredentials::Dexcom(_) => CgmProvider::Dexcom,
        }
    }
}

/// Per-user display and range settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Low threshold in mg/dL
    pub low_threshold: f64,
    /// High threshold in mg/dL
    pub high_threshold: f64,
    /// Preferred display unit
    pub unit: GlucoseUnit,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            low_threshold: 70.0,
            high_threshold: 180.0,
            unit: GlucoseUnit::MmolL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgm_credentials_tag_provider() {
        let creds = CgmCredentials::Dexcom(DexcomCredentials {
            encrypted_username: "u".into(),
            encrypted_password: "p".into(),
            server: "shareous1.dexcom.com".into(),
        });
        assert_eq!(creds.provider(), CgmProvider::Dexcom);

        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["provider"], "dexcom");
    }
}
