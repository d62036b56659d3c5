// SPDX-License-Identifier: MIT

//! CGM provider clients.
//!
//! Two providers implement the same capability set (login, fetch readings
//! for a window, test a credential set). The orchestrator selects one at
//! runtime by matching on the stored [`CgmCredentials`] tagged union rather
//! than branching on provider strings.

pub mod dexcom;
pub mod librelink;

use crate::error::AppError;
use crate::models::{CgmCredentials, GlucoseReading};
use crate::services::crypto::{decrypt_pair, CryptoService};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of exercising a credential set against its provider.
///
/// Never mutates stored state; used for validation before persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readings_count: Option<usize>,
    /// Present when the account monitors multiple patients and the caller
    /// must pick one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<ConnectionChoice>>,
    /// Region actually serving the account (after any redirect)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// A monitored patient the caller can select.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionChoice {
    pub id: String,
    pub name: String,
}

/// Fetch glucose readings for the given window using whichever provider the
/// stored credentials belong to.
pub async fn fetch_readings(
    credentials: &CgmCredentials,
    crypto: &CryptoService,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<GlucoseReading>, AppError> {
    match credentials {
        CgmCredentials::Librelink(creds) => {
            let (email, password) =
                decrypt_pair(crypto, &creds.encrypted_email, &creds.encrypted_password)?;

            let mut client = librelink::LibreLinkClient::new(&creds.region);
            client.login(&email, &password).await?;

            let connections = client.connections().await?;
            let patient_id = match &creds.patient_id {
                Some(id) => id.clone(),
                None => connections
                    .first()
                    .map(|c| c.patient_id.clone())
                    .ok_or_else(|| {
                        AppError::CgmApi("No LibreLinkUp connections found".to_string())
                    })?,
            };

            client.readings_in_range(&patient_id, start, end).await
        }
        CgmCredentials::Dexcom(creds) => {
            let (username, password) =
                decrypt_pair(crypto, &creds.encrypted_username, &creds.encrypted_password)?;

            let mut client = dexcom::DexcomShareClient::new(&creds.server);
            client.login(&username, &password).await?;

            client.readings_in_range(start, end).await
        }
    }
}
