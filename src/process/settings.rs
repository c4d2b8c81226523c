use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::mass_error::Tolerance;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SettingsError {
    #[error("The accuracy must be a finite, non-negative number, got {0}")]
    InvalidAccuracy(f64),
    #[error("The target m/z must be a finite, positive number, got {0}")]
    InvalidTargetMz(f64),
    #[error("The intensity cutoff must be a finite, non-negative number, got {0}")]
    InvalidCutoff(f64),
    #[error("A percentage cutoff cannot exceed 100%, got {0}")]
    CutoffOutOfRange(f64),
    #[error("No {0} path was given")]
    MissingPath(&'static str),
    #[error("The source and destination are both {0}")]
    SamePath(PathBuf),
}

/// The parameters every job takes: where to read, where to write, and how
/// closely two m/z values must agree to be the same.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobSettings {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub accuracy: f64,
    pub accuracy_is_ppm: bool,
}

impl JobSettings {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source_path: P, destination_path: Q) -> Self {
        let tolerance = Tolerance::default();
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            accuracy: tolerance.accuracy,
            accuracy_is_ppm: tolerance.is_ppm(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64, is_ppm: bool) -> Self {
        self.accuracy = accuracy;
        self.accuracy_is_ppm = is_ppm;
        self
    }

    pub fn tolerance(&self) -> Tolerance {
        Tolerance::new(self.accuracy, self.accuracy_is_ppm)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(SettingsError::InvalidAccuracy(self.accuracy));
        }
        if self.source_path.as_os_str().is_empty() {
            return Err(SettingsError::MissingPath("source"));
        }
        if self.destination_path.as_os_str().is_empty() {
            return Err(SettingsError::MissingPath("destination"));
        }
        if same_file(&self.source_path, &self.destination_path) {
            return Err(SettingsError::SamePath(self.source_path.clone()));
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Parameters of a filtering job
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterSettings {
    pub job: JobSettings,
    pub target_mz: f64,
    /// An absolute intensity, or a percentage of each scan's most intense peak
    pub cutoff: f64,
    pub cutoff_is_percentage: bool,
    /// Also write the MS1 scan each kept MSn scan descends from
    pub include_parent_scan: bool,
}

impl FilterSettings {
    pub fn new(job: JobSettings, target_mz: f64) -> Self {
        Self {
            job,
            target_mz,
            cutoff: 0.0,
            cutoff_is_percentage: false,
            include_parent_scan: false,
        }
    }

    pub fn with_cutoff(mut self, cutoff: f64, is_percentage: bool) -> Self {
        self.cutoff = cutoff;
        self.cutoff_is_percentage = is_percentage;
        self
    }

    pub fn with_parent_scan(mut self, include_parent_scan: bool) -> Self {
        self.include_parent_scan = include_parent_scan;
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.job.validate()?;
        if !self.target_mz.is_finite() || self.target_mz <= 0.0 {
            return Err(SettingsError::InvalidTargetMz(self.target_mz));
        }
        if !self.cutoff.is_finite() || self.cutoff < 0.0 {
            return Err(SettingsError::InvalidCutoff(self.cutoff));
        }
        if self.cutoff_is_percentage && self.cutoff > 100.0 {
            return Err(SettingsError::CutoffOutOfRange(self.cutoff));
        }
        Ok(())
    }
}

/// Parameters of an averaging job, which needs nothing beyond [`JobSettings`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AverageSettings {
    pub job: JobSettings,
}

impl AverageSettings {
    pub fn new(job: JobSettings) -> Self {
        Self { job }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.job.validate()
    }
}
