//! `mzfilter` reads tandem mass spectrometry runs in the mzXML format and writes
//! reduced, indexed mzXML runs in one of two ways:
//!
//! - Filtering keeps only the MSn scans with an intense enough peak near a target m/z,
//!   see [`process::ScanFilterEngine`].
//! - Averaging detects MSn scans that repeatedly measured the same precursor ion and
//!   merges each such group, and all MS1 scans, into one scan, see [`process::ScanAverager`].
//!
//! The peak list arithmetic both rely on lives in [`peaks`], and the indexed
//! writer in [`io::mzxml`].
pub mod io;
pub mod mass_error;
pub mod peaks;
pub mod process;
pub mod spectrum;

pub use crate::mass_error::{MassErrorType, Tolerance};
pub use crate::peaks::PeakList;
pub use crate::spectrum::{Precursor, Scan, ScanHeader};

pub use crate::io::{MzXMLReader, MzXMLWriter, ScanSource};
pub use crate::process::{run_average_job, run_filter_job, JobOutcome};
