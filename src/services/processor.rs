// SPDX-License-Identifier: MIT

//! Activity enrichment orchestrator.
//!
//! Handles the core workflow:
//! 1. Resolve the user, Strava token, and CGM credentials for the event
//! 2. Fetch the activity and compute its extended time window
//! 3. Fetch glucose readings from the configured CGM provider
//! 4. Compute stats and render the summary
//! 5. Prepend the summary to the activity description on Strava
//! 6. Persist the reading snapshot and write an audit entry
//!
//! Missing user/token/credentials and empty reading sets are skip outcomes,
//! not errors: they are audited once and never retried. Real failures are
//! audited and re-raised so the job queue's retry machinery takes over.

use crate::db::Store;
use crate::error::AppError;
use crate::models::glucose::format_value;
use crate::models::{
    ActivityCgmData, ActivityUpdateLog, GlucoseStats, GlucoseUnit, Thresholds, UpdateStatus,
};
use crate::services::cgm;
use crate::services::crypto::CryptoService;
use crate::services::queue::{JobError, JobQueue, QueueOptions};
use crate::services::strava::StravaService;
use chrono::{DateTime, Duration, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Extra context captured before and after the activity window.
const WINDOW_MARGIN_MINUTES: i64 = 15;

/// Marker line used to detect an already-enriched description.
const SUMMARY_MARKER: &str = "⚡ Powered by GlucoLink ⚡";

/// Payload of one enrichment job, derived from a webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityJob {
    pub activity_id: u64,
    pub athlete_id: u64,
    pub event_time: i64,
}

/// Terminal outcome of one enrichment run.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Enriched { points: usize },
    Skipped { reason: &'static str },
}

/// Runs the per-job enrichment procedure.
#[derive(Clone)]
pub struct ActivityProcessor {
    strava: StravaService,
    store: Store,
    crypto: CryptoService,
    app_base_url: String,
}

impl ActivityProcessor {
    pub fn new(
        strava: StravaService,
        store: Store,
        crypto: CryptoService,
        app_base_url: String,
    ) -> Self {
        Self {
            strava,
            store,
            crypto,
            app_base_url,
        }
    }

    /// Process one enrichment job.
    pub async fn process(&self, job: ActivityJob) -> Result<ProcessOutcome, AppError> {
        let ActivityJob {
            activity_id,
            athlete_id,
            ..
        } = job;

        tracing::info!(athlete_id, activity_id, "Processing activity");

        if self.store.get_user(athlete_id).await?.is_none() {
            // No account for this athlete; nothing to audit against either
            tracing::info!(athlete_id, "No user found for athlete");
            return Ok(ProcessOutcome::Skipped {
                reason: "User not found",
            });
        }

        if self.store.get_strava_token(athlete_id).await?.is_none() {
            return self
                .skip(athlete_id, activity_id, "No Strava token")
                .await;
        }

        let Some(credentials) = self.store.get_cgm_credentials(athlete_id).await? else {
            return self.skip(athlete_id, activity_id, "No CGM configured").await;
        };

        match self.enrich(athlete_id, activity_id, &credentials).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Audit the failure, then re-raise so the queue decides on
                // retry vs terminal failure
                self.log_update(
                    athlete_id,
                    activity_id,
                    UpdateStatus::Error,
                    &e.to_string(),
                    None,
                )
                .await;
                Err(e)
            }
        }
    }

    async fn enrich(
        &self,
        athlete_id: u64,
        activity_id: u64,
        credentials: &crate::models::CgmCredentials,
    ) -> Result<ProcessOutcome, AppError> {
        // Token refresh is handled transparently by StravaService
        let activity = self.strava.get_activity(athlete_id, activity_id).await?;

        let start = DateTime::parse_from_rfc3339(&activity.start_date)
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!(
                    "Invalid start_date for activity {}: {}",
                    activity_id,
                    e
                ))
            })?
            .with_timezone(&Utc);
        let end = start + Duration::seconds(activity.elapsed_time as i64);

        // Extend the window to capture pre/post-activity glucose context
        let margin = Duration::minutes(WINDOW_MARGIN_MINUTES);
        let mut readings =
            cgm::fetch_readings(credentials, &self.crypto, start - margin, end + margin).await?;

        if readings.is_empty() {
            return self
                .skip(athlete_id, activity_id, "No glucose data available")
                .await;
        }

        readings.sort_by_key(|r| r.timestamp);

        let settings = self.store.get_settings(athlete_id).await?.unwrap_or_default();
        let thresholds = Thresholds {
            low: settings.low_threshold,
            high: settings.high_threshold,
        };

        let Some(stats) = GlucoseStats::compute(&readings, &thresholds) else {
            return self
                .skip(athlete_id, activity_id, "Could not calculate stats")
                .await;
        };

        let already_annotated = activity
            .description
            .as_deref()
            .is_some_and(|d| d.contains(SUMMARY_MARKER));

        if already_annotated {
            tracing::debug!(activity_id, "Description already carries a summary");
        } else {
            let summary =
                build_summary(&stats, settings.unit, activity_id, &self.app_base_url);
            let new_description = prepend_summary(&summary, activity.description.as_deref());

            self.strava
                .update_activity_description(athlete_id, activity_id, &new_description)
                .await?;
        }

        let points = readings.len();
        self.store
            .upsert_activity_cgm_data(&ActivityCgmData {
                athlete_id,
                activity_id,
                data_points: readings,
                start_time: start,
                end_time: end,
                updated_at: Utc::now(),
            })
            .await?;

        self.log_update(
            athlete_id,
            activity_id,
            UpdateStatus::Success,
            &format!("Added {} glucose points", points),
            Some(points as u32),
        )
        .await;

        tracing::info!(athlete_id, activity_id, points, "Activity enriched");

        Ok(ProcessOutcome::Enriched { points })
    }

    /// Record a skip outcome and return it.
    async fn skip(
        &self,
        athlete_id: u64,
        activity_id: u64,
        reason: &'static str,
    ) -> Result<ProcessOutcome, AppError> {
        tracing::info!(athlete_id, activity_id, reason, "Skipping activity");
        self.log_update(athlete_id, activity_id, UpdateStatus::Skipped, reason, None)
            .await;
        Ok(ProcessOutcome::Skipped { reason })
    }

    /// Append an audit entry; best-effort, never fails the job.
    async fn log_update(
        &self,
        athlete_id: u64,
        activity_id: u64,
        status: UpdateStatus,
        message: &str,
        cgm_points: Option<u32>,
    ) {
        let entry = ActivityUpdateLog {
            athlete_id,
            activity_id,
            status,
            message: message.to_string(),
            cgm_points,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.append_update_log(&entry).await {
            tracing::warn!(error = %e, activity_id, "Failed to write audit entry");
        }
    }

    /// Wire this processor into a job queue, mapping error permanence onto
    /// the queue's retryable/non-retryable distinction.
    pub fn into_queue(self, options: QueueOptions) -> JobQueue<ActivityJob> {
        let processor = Arc::new(self);
        JobQueue::new(options, move |job| {
            let processor = Arc::clone(&processor);
            async move {
                match processor.process(job).await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        let message = e.to_string();
                        if e.is_permanent() {
                            Err(JobError::permanent(message))
                        } else {
                            Err(JobError::transient(message))
                        }
                    }
                }
            }
            .boxed()
        })
    }
}

/// Build the 10-block zone bar: red below range, green in range, yellow above.
fn progress_bar(below_pct: f64, above_pct: f64) -> String {
    const BLOCKS: i64 = 10;
    let low_blocks = ((below_pct / 100.0) * BLOCKS as f64).round() as i64;
    let high_blocks = ((above_pct / 100.0) * BLOCKS as f64).round() as i64;
    let in_blocks = (BLOCKS - low_blocks - high_blocks).max(0);

    format!(
        "{}{}{}",
        "🟥".repeat(low_blocks.max(0) as usize),
        "🟩".repeat(in_blocks as usize),
        "🟨".repeat(high_blocks.max(0) as usize)
    )
}

/// Render the compact summary prepended to the activity description.
fn build_summary(
    stats: &GlucoseStats,
    unit: GlucoseUnit,
    activity_id: u64,
    app_base_url: &str,
) -> String {
    let bar = progress_bar(stats.time_below_range, stats.time_above_range);

    format!(
        "🎯 {}% in Range  {}\n🩸 Avg : {} - Min : {} - Max : {}\n{}\n📈 Detailed CGM report: {}/activity/{}",
        stats.time_in_range,
        bar,
        format_value(stats.average, unit),
        format_value(stats.min, unit),
        format_value(stats.max, unit),
        SUMMARY_MARKER,
        app_base_url,
        activity_id
    )
}

/// Put the summary first, keeping any human-written description below it.
fn prepend_summary(summary: &str, existing: Option<&str>) -> String {
    match existing {
        Some(desc) if !desc.is_empty() => format!("{}\n\n{}", summary, desc),
        _ => summary.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> GlucoseStats {
        GlucoseStats {
            count: 5,
            average: 130.0,
            min: 65.0,
            max: 200.0,
            std_dev: 56.3,
            time_in_range: 40.0,
            time_below_range: 20.0,
            time_above_range: 40.0,
            coefficient_of_variation: 43.3,
        }
    }

    #[test]
    fn test_progress_bar_blocks() {
        assert_eq!(progress_bar(20.0, 40.0), "🟥🟥🟩🟩🟩🟩🟨🟨🟨🟨");
        assert_eq!(progress_bar(0.0, 0.0), "🟩🟩🟩🟩🟩🟩🟩🟩🟩🟩");
        assert_eq!(progress_bar(100.0, 0.0), "🟥🟥🟥🟥🟥🟥🟥🟥🟥🟥");
    }

    #[test]
    fn test_progress_bar_never_exceeds_ten_blocks() {
        // 55% + 55% rounds to 6 + 6 blocks; green clamps at zero
        let bar = progress_bar(55.0, 55.0);
        assert_eq!(bar.chars().count(), 12);
        assert!(!bar.contains('🟩'));
    }

    #[test]
    fn test_build_summary_mgdl() {
        let summary = build_summary(&stats(), GlucoseUnit::MgDl, 42, "https://example.com");

        assert!(summary.starts_with("🎯 40% in Range"));
        assert!(summary.contains("Avg : 130 mg/dL"));
        assert!(summary.contains("Min : 65 mg/dL"));
        assert!(summary.contains("Max : 200 mg/dL"));
        assert!(summary.contains(SUMMARY_MARKER));
        assert!(summary.contains("https://example.com/activity/42"));
    }

    #[test]
    fn test_build_summary_mmol() {
        let summary = build_summary(&stats(), GlucoseUnit::MmolL, 42, "https://example.com");
        assert!(summary.contains("Avg : 7.2 mmol/L"));
    }

    #[test]
    fn test_prepend_summary_to_none() {
        assert_eq!(prepend_summary("summary", None), "summary");
    }

    #[test]
    fn test_prepend_summary_to_empty() {
        assert_eq!(prepend_summary("summary", Some("")), "summary");
    }

    #[test]
    fn test_prepend_summary_keeps_existing_text() {
        let result = prepend_summary("summary", Some("Morning ride, felt great."));
        assert_eq!(result, "summary\n\nMorning ride, felt great.");
    }

    #[test]
    fn test_prepend_summary_keeps_multiline_text() {
        let result = prepend_summary("summary", Some("Line one.\nLine two."));
        assert_eq!(result, "summary\n\nLine one.\nLine two.");
    }

    #[test]
    fn test_summary_marker_detection() {
        let annotated = build_summary(&stats(), GlucoseUnit::MgDl, 1, "https://example.com");
        assert!(annotated.contains(SUMMARY_MARKER));
        assert!(!"Just a normal ride".contains(SUMMARY_MARKER));
    }
}
