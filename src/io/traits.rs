use std::io;

use indexmap::IndexMap;
use thiserror::Error;

use crate::spectrum::{Scan, ScanHeader};

/// Errors that may occur when reading a scan from a [`ScanSource`]
#[derive(Debug, Error)]
pub enum ScanAccessError {
    /// A scan the source claimed to have could not be produced
    #[error("The requested scan {0} was not found")]
    ScanNotFound(u32),
    /// The scan could be located but its content could not be interpreted
    #[error("Failed to parse scan {0}: {1}")]
    ParseError(u32, String),
    /// An I/O error prevented reading the scan, even if it could be found.
    #[error("I/O error occurred while reading: {0}")]
    IOError(#[from] io::Error),
}

impl From<ScanAccessError> for io::Error {
    fn from(value: ScanAccessError) -> Self {
        let s = value.to_string();
        match value {
            ScanAccessError::ScanNotFound(_) => io::Error::new(io::ErrorKind::NotFound, s),
            ScanAccessError::ParseError(_, _) => io::Error::new(io::ErrorKind::InvalidData, s),
            ScanAccessError::IOError(e) => e,
        }
    }
}

/**
A random access source of scans addressed by their scan number.

Scan numbers run from 1 to [`ScanSource::max_scan_id`], though not every number
in that range has to exist. Missing scans are `Ok(None)`, while a scan that
exists but cannot be read is an `Err`.
*/
pub trait ScanSource {
    /// The largest scan number in the source
    fn max_scan_id(&self) -> u32;

    /// Retrieve only the header of a scan
    fn header(&mut self, num: u32) -> Result<Option<ScanHeader>, ScanAccessError> {
        Ok(self.scan(num)?.map(|scan| scan.header))
    }

    /// Retrieve the header and peak list of a scan
    fn scan(&mut self, num: u32) -> Result<Option<Scan>, ScanAccessError>;

    /// Retrieve a scan which is known to exist, treating its absence as an error
    fn require_scan(&mut self, num: u32) -> Result<Scan, ScanAccessError> {
        self.scan(num)?.ok_or(ScanAccessError::ScanNotFound(num))
    }
}

/// A [`ScanSource`] over scans held in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryScanSource {
    scans: IndexMap<u32, Scan>,
}

impl MemoryScanSource {
    pub fn new(scans: Vec<Scan>) -> Self {
        scans.into_iter().collect()
    }

    pub fn push(&mut self, scan: Scan) -> Option<Scan> {
        self.scans.insert(scan.num(), scan)
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scan> {
        self.scans.values()
    }

    pub fn get(&self, num: u32) -> Option<&Scan> {
        self.scans.get(&num)
    }
}

impl FromIterator<Scan> for MemoryScanSource {
    fn from_iter<T: IntoIterator<Item = Scan>>(iter: T) -> Self {
        let scans = iter.into_iter().map(|s| (s.num(), s)).collect();
        Self { scans }
    }
}

impl ScanSource for MemoryScanSource {
    fn max_scan_id(&self) -> u32 {
        self.scans.keys().copied().max().unwrap_or_default()
    }

    fn header(&mut self, num: u32) -> Result<Option<ScanHeader>, ScanAccessError> {
        Ok(self.scans.get(&num).map(|s| s.header.clone()))
    }

    fn scan(&mut self, num: u32) -> Result<Option<Scan>, ScanAccessError> {
        Ok(self.scans.get(&num).cloned())
    }
}
