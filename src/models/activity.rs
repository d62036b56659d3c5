// SPDX-License-Identifier: MIT

//! Per-activity CGM snapshot and audit log models.

use crate::models::glucose::GlucoseReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw reading set captured for one activity, keyed by (athlete, activity).
/// Reprocessing the same activity overwrites the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityCgmData {
    pub athlete_id: u64,
    pub activity_id: u64,
    /// Readings inside the extended activity window, sorted by timestamp
    pub data_points: Vec<GlucoseReading>,
    /// Activity start (without the context margin)
    pub start_time: DateTime<Utc>,
    /// Activity end (without the context margin)
    pub end_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal outcome of one enrichment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Success,
    Skipped,
    Error,
}

/// Audit entry written for every terminal enrichment outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityUpdateLog {
    pub athlete_id: u64,
    pub activity_id: u64,
    pub status: UpdateStatus,
    /// Human-readable reason or error message
    pub message: String,
    /// Number of glucose points written (success only)
    pub cgm_points: Option<u32>,
    pub created_at: DateTime<Utc>,
}
