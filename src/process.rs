//! Filtering and averaging jobs over the scans of a run
#[macro_use]
mod progress;

pub mod average;
pub mod filter;
pub mod job;
pub mod settings;

pub use crate::process::average::{ParentIndex, RedundancyGroup, ScanAverager};
pub use crate::process::filter::ScanFilterEngine;
pub use crate::process::job::{
    average_run, filter_run, run_average_job, run_filter_job, JobError, JobOutcome,
};
pub use crate::process::progress::{
    CancellationToken, Checkpoints, LoggingProgress, NullProgress, ProgressSink, Step,
};
pub use crate::process::settings::{AverageSettings, FilterSettings, JobSettings, SettingsError};
