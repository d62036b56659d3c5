// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod cgm;
pub mod crypto;
pub mod processor;
pub mod queue;
pub mod strava;

pub use crypto::CryptoService;
pub use processor::{ActivityJob, ActivityProcessor, ProcessOutcome};
pub use queue::{JobQueue, JobStatus, QueueOptions};
pub use strava::StravaService;
