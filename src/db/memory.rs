// SPDX-License-Identifier: MIT

//! In-memory keyed store with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage)
//! - Strava tokens
//! - CGM credentials (one tagged record per user)
//! - Settings (thresholds + display unit)
//! - Per-activity CGM snapshots and the enrichment audit log
//!
//! Every operation is async and returns `Result` so the handle stays
//! signature-compatible with a real database backend. All writes are
//! upserts: the last write for a key wins.

use crate::error::AppError;
use crate::models::{
    ActivityCgmData, ActivityUpdateLog, CgmCredentials, Settings, StravaToken, User,
};
use dashmap::DashMap;
use std::sync::Arc;

/// Shared store handle. Cloning is cheap; all clones see the same data.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    users: DashMap<u64, User>,
    strava_tokens: DashMap<u64, StravaToken>,
    /// One record per user. The tagged union enforces that a user holds at
    /// most one provider's credentials at a time.
    cgm_credentials: DashMap<u64, CgmCredentials>,
    settings: DashMap<u64, Settings>,
    activity_cgm_data: DashMap<(u64, u64), ActivityCgmData>,
    update_logs: DashMap<u64, Vec<ActivityUpdateLog>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by their Strava athlete ID.
    pub async fn get_user(&self, athlete_id: u64) -> Result<Option<User>, AppError> {
        Ok(self.inner.users.get(&athlete_id).map(|u| u.clone()))
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.inner.users.insert(user.athlete_id, user.clone());
        Ok(())
    }

    // ─── Token Operations ────────────────────────────────────────

    pub async fn get_strava_token(
        &self,
        athlete_id: u64,
    ) -> Result<Option<StravaToken>, AppError> {
        Ok(self.inner.strava_tokens.get(&athlete_id).map(|t| t.clone()))
    }

    pub async fn set_strava_token(
        &self,
        athlete_id: u64,
        token: &StravaToken,
    ) -> Result<(), AppError> {
        self.inner.strava_tokens.insert(athlete_id, token.clone());
        Ok(())
    }

    pub async fn delete_strava_token(&self, athlete_id: u64) -> Result<(), AppError> {
        self.inner.strava_tokens.remove(&athlete_id);
        Ok(())
    }

    // ─── CGM Credential Operations ───────────────────────────────

    pub async fn get_cgm_credentials(
        &self,
        athlete_id: u64,
    ) -> Result<Option<CgmCredentials>, AppError> {
        Ok(self
            .inner
            .cgm_credentials
            .get(&athlete_id)
            .map(|c| c.clone()))
    }

    /// Save CGM credentials. A single keyed slot per user means switching
    /// providers atomically removes the other provider's record.
    pub async fn set_cgm_credentials(
        &self,
        athlete_id: u64,
        credentials: &CgmCredentials,
    ) -> Result<(), AppError> {
        self.inner
            .cgm_credentials
            .insert(athlete_id, credentials.clone());
        Ok(())
    }

    pub async fn delete_cgm_credentials(&self, athlete_id: u64) -> Result<(), AppError> {
        self.inner.cgm_credentials.remove(&athlete_id);
        Ok(())
    }

    // ─── Settings Operations ─────────────────────────────────────

    pub async fn get_settings(&self, athlete_id: u64) -> Result<Option<Settings>, AppError> {
        Ok(self.inner.settings.get(&athlete_id).map(|s| s.clone()))
    }

    pub async fn set_settings(
        &self,
        athlete_id: u64,
        settings: &Settings,
    ) -> Result<(), AppError> {
        self.inner.settings.insert(athlete_id, settings.clone());
        Ok(())
    }

    // ─── Activity CGM Data Operations ────────────────────────────

    /// Store the reading snapshot for an activity (overwrite on reprocess).
    pub async fn upsert_activity_cgm_data(&self, data: &ActivityCgmData) -> Result<(), AppError> {
        self.inner
            .activity_cgm_data
            .insert((data.athlete_id, data.activity_id), data.clone());
        Ok(())
    }

    pub async fn get_activity_cgm_data(
        &self,
        athlete_id: u64,
        activity_id: u64,
    ) -> Result<Option<ActivityCgmData>, AppError> {
        Ok(self
            .inner
            .activity_cgm_data
            .get(&(athlete_id, activity_id))
            .map(|d| d.clone()))
    }

    // ─── Audit Log Operations ────────────────────────────────────

    /// Append an audit entry for a terminal enrichment outcome.
    pub async fn append_update_log(&self, entry: &ActivityUpdateLog) -> Result<(), AppError> {
        self.inner
            .update_logs
            .entry(entry.athlete_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    /// List audit entries for a user, oldest first.
    pub async fn list_update_logs(
        &self,
        athlete_id: u64,
    ) -> Result<Vec<ActivityUpdateLog>, AppError> {
        Ok(self
            .inner
            .update_logs
            .get(&athlete_id)
            .map(|l| l.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DexcomCredentials, LibreLinkCredentials};

    fn libre_creds() -> CgmCredentials {
        CgmCredentials::Librelink(LibreLinkCredentials {
            encrypted_email: "enc-email".into(),
            encrypted_password: "enc-pass".into(),
            region: "EU".into(),
            patient_id: None,
        })
    }

    fn dexcom_creds() -> CgmCredentials {
        CgmCredentials::Dexcom(DexcomCredentials {
            encrypted_username: "enc-user".into(),
            encrypted_password: "enc-pass".into(),
            server: "shareous1.dexcom.com".into(),
        })
    }

    #[tokio::test]
    async fn switching_provider_replaces_credentials() {
        let store = Store::new();

        store.set_cgm_credentials(1, &libre_creds()).await.unwrap();
        store.set_cgm_credentials(1, &dexcom_creds()).await.unwrap();

        let stored = store.get_cgm_credentials(1).await.unwrap().unwrap();
        assert!(matches!(stored, CgmCredentials::Dexcom(_)));
    }

    #[tokio::test]
    async fn activity_cgm_data_upsert_overwrites() {
        let store = Store::new();
        let now = chrono::Utc::now();

        let mut data = ActivityCgmData {
            athlete_id: 1,
            activity_id: 99,
            data_points: vec![],
            start_time: now,
            end_time: now,
            updated_at: now,
        };
        store.upsert_activity_cgm_data(&data).await.unwrap();

        data.data_points.push(crate::models::GlucoseReading {
            timestamp: now,
            value: 120.0,
        });
        store.upsert_activity_cgm_data(&data).await.unwrap();

        let stored = store.get_activity_cgm_data(1, 99).await.unwrap().unwrap();
        assert_eq!(stored.data_points.len(), 1);
    }
}
