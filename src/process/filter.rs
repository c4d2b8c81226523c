use log::debug;

use super::progress::{CancellationToken, Checkpoints, ProgressSink, Step};
use super::settings::FilterSettings;
use crate::io::{ScanAccessError, ScanSource};
use crate::mass_error::Tolerance;
use crate::spectrum::Scan;

/**
Selects the MSn scans of a run that contain a peak inside a target m/z window
whose intensity reaches a cutoff.

Scans are visited in a single ascending pass. Each MS1 scan opens a block made
of the scans that follow it up to the next scan of the same MS level. Within a
block, only scans whose precursor refers back to that MS1 scan and which hold
at least one peak are tested.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFilterEngine {
    pub target_mz: f64,
    pub tolerance: Tolerance,
    pub cutoff: f64,
    pub cutoff_is_percentage: bool,
    pub include_parent_scan: bool,
}

impl ScanFilterEngine {
    pub fn new(target_mz: f64, tolerance: Tolerance) -> Self {
        Self {
            target_mz,
            tolerance,
            cutoff: 0.0,
            cutoff_is_percentage: false,
            include_parent_scan: false,
        }
    }

    pub fn from_settings(settings: &FilterSettings) -> Self {
        Self::new(settings.target_mz, settings.job.tolerance())
            .with_cutoff(settings.cutoff, settings.cutoff_is_percentage)
            .with_parent_scan(settings.include_parent_scan)
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

    /// The m/z window searched for a qualifying peak
    pub fn interval(&self) -> (f64, f64) {
        self.tolerance.bounds(self.target_mz)
    }

    /// The minimum intensity a peak of `scan` needs to qualify
    pub fn intensity_cutoff(&self, scan: &Scan) -> f64 {
        if self.cutoff_is_percentage {
            self.cutoff * scan.peaks.max_intensity().unwrap_or_default() / 100.0
        } else {
            self.cutoff
        }
    }

    /// Whether any peak of `scan` is inside the window and at or above the cutoff
    pub fn filter_scan(&self, scan: &Scan) -> bool {
        let (low, high) = self.interval();
        let cutoff = self.intensity_cutoff(scan);
        scan.peaks
            .iter()
            .any(|(mz, intensity)| *intensity >= cutoff && *mz >= low && *mz <= high)
    }

    /// Traverse `source` and return the ids of the scans to keep, in ascending order.
    ///
    /// Gaps in the id range and scans whose peaks cannot be retrieved are recorded
    /// in `notices` rather than failing the traversal.
    pub fn select<S: ScanSource + ?Sized>(
        &self,
        source: &mut S,
        token: &CancellationToken,
        progress: &mut dyn ProgressSink,
        notices: &mut Vec<String>,
    ) -> Result<Step<Vec<u32>>, ScanAccessError> {
        let max_id = source.max_scan_id();
        let checkpoints = Checkpoints::new(max_id);
        progress.set_maximum(Some(checkpoints.count()));

        let mut kept = Vec::new();
        let mut id = 1;
        while id <= max_id {
            bail_if_cancelled!(token);
            if checkpoints.is_checkpoint(id) {
                progress.advance(&format!("Scan {id} of {max_id}"));
            }
            let Some(parent) = source.header(id)? else {
                notices.push(format!("Scan {id} is missing from the source"));
                id += 1;
                continue;
            };
            id += 1;
            if parent.ms_level != 1 {
                continue;
            }
            if self.include_parent_scan {
                kept.push(parent.num);
            }

            while id <= max_id {
                bail_if_cancelled!(token);
                let Some(header) = source.header(id)? else {
                    notices.push(format!("Scan {id} is missing from the source"));
                    id += 1;
                    continue;
                };
                if header.ms_level == parent.ms_level {
                    break;
                }
                if checkpoints.is_checkpoint(id) {
                    progress.advance(&format!("Scan {id} of {max_id}"));
                }
                if header.precursor_scan_num() == Some(parent.num) && header.peaks_count > 0 {
                    match source.scan(id)? {
                        Some(scan) => {
                            if self.filter_scan(&scan) {
                                kept.push(id);
                            }
                        }
                        None => notices.push(format!("The peaks of scan {id} could not be read")),
                    }
                }
                id += 1;
            }
        }
        debug!("Selected {} of {max_id} scans", kept.len());
        Ok(Step::Done(kept))
    }
}
