// SPDX-License-Identifier: MIT

//! GlucoLink: enrich Strava activities with CGM glucose summaries.
//!
//! This crate provides the backend API that receives Strava webhook events,
//! fetches glucose readings from the user's CGM provider, and writes a
//! time-in-range summary back onto the activity.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Store;
use services::processor::ActivityJob;
use services::{CryptoService, JobQueue, StravaService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub queue: JobQueue<ActivityJob>,
    pub strava: StravaService,
    pub crypto: CryptoService,
}
