//! The scan data model: header metadata plus the peak list it describes
pub mod scan;
pub mod scan_properties;

pub use crate::spectrum::scan::Scan;
pub use crate::spectrum::scan_properties::{Precursor, ScanHeader, ScanPolarity};
