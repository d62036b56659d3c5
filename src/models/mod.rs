// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod activity;
pub mod glucose;
pub mod user;

pub use activity::{ActivityCgmData, ActivityUpdateLog, UpdateStatus};
pub use glucose::{GlucoseReading, GlucoseStats, GlucoseUnit, Thresholds};
pub use user::{
    CgmCredentials, CgmProvider, DexcomCredentials, LibreLinkCredentials, Settings, StravaToken,
    User,
};
