use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use log::debug;

use super::progress::{CancellationToken, ProgressSink, Step};
use crate::io::{ScanAccessError, ScanSource};
use crate::mass_error::Tolerance;
use crate::peaks::{merge_centroid, merge_profile, PeakList};
use crate::spectrum::{Scan, ScanHeader};

/// MS2 scans judged to be repeated measurements of one precursor ion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedundancyGroup {
    /// The earliest member, which names the group
    pub representative: u32,
    /// Every member in the order it was matched, starting with the representative
    pub members: Vec<u32>,
}

impl RedundancyGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The MS1 scans of a run in source order, each with the headers of the MS2
/// scans that name it as their precursor scan.
#[derive(Debug, Default, Clone)]
pub struct ParentIndex {
    groups: IndexMap<u32, Vec<ScanHeader>>,
}

impl ParentIndex {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn parents(&self) -> impl Iterator<Item = u32> + '_ {
        self.groups.keys().copied()
    }

    pub fn children(&self, parent: u32) -> Option<&[ScanHeader]> {
        self.groups.get(&parent).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[ScanHeader])> {
        self.groups.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Folds scans one at a time into a running merged peak list and the statistics
/// needed to rebuild the averaged header.
struct ScanAccumulator<'a> {
    tolerance: &'a Tolerance,
    first: Scan,
    peaks: PeakList,
    count: usize,
    start_mz: Option<f64>,
    end_mz: Option<f64>,
    tics: Vec<f64>,
    precursor_mzs: Vec<f64>,
    precursor_intensities: Vec<f64>,
}

impl<'a> ScanAccumulator<'a> {
    fn new(first: Scan, tolerance: &'a Tolerance) -> Self {
        let mut this = Self {
            tolerance,
            peaks: first.peaks.clone(),
            count: 1,
            start_mz: None,
            end_mz: None,
            tics: Vec::new(),
            precursor_mzs: Vec::new(),
            precursor_intensities: Vec::new(),
            first,
        };
        let header = this.first.header.clone();
        this.observe(&header);
        this
    }

    fn observe(&mut self, header: &ScanHeader) {
        if let Some(start) = header.start_mz {
            self.start_mz = Some(self.start_mz.map_or(start, |v| v.min(start)));
        }
        if let Some(end) = header.end_mz {
            self.end_mz = Some(self.end_mz.map_or(end, |v| v.max(end)));
        }
        if let Some(tic) = header.tot_ion_current {
            self.tics.push(tic);
        }
        if let Some(precursor) = header.precursor() {
            self.precursor_mzs.push(precursor.mz);
            self.precursor_intensities
                .push(precursor.intensity.unwrap_or_default());
        }
    }

    fn add(&mut self, scan: &Scan) {
        self.observe(&scan.header);
        self.peaks = if !self.first.header.is_centroided() && !scan.header.is_centroided() {
            merge_profile(&self.peaks, &scan.peaks)
        } else {
            merge_centroid(&self.peaks, &scan.peaks, self.tolerance)
        };
        self.count += 1;
    }

    fn finish(self) -> Scan {
        if self.count == 1 {
            return self.first;
        }
        let mut peaks = self.peaks;
        peaks.scale_intensities(self.count as f64);

        let mut header = self.first.header;
        header.start_mz = self.start_mz;
        header.end_mz = self.end_mz;
        header.low_mz = peaks.lowest_mz();
        header.high_mz = peaks.highest_mz();
        let base_peak = peaks.base_peak();
        header.base_peak_mz = base_peak.map(|(mz, _)| mz);
        header.base_peak_intensity = base_peak.map(|(_, intensity)| intensity);
        header.tot_ion_current = mean(&self.tics);

        if let Some(precursor) = header.precursor_mut() {
            let total: f64 = self.precursor_intensities.iter().sum();
            if total > 0.0 {
                precursor.mz = self
                    .precursor_mzs
                    .iter()
                    .zip(self.precursor_intensities.iter())
                    .map(|(mz, intensity)| mz * intensity)
                    .sum::<f64>()
                    / total;
            } else if let Some(mz) = mean(&self.precursor_mzs) {
                precursor.mz = mz;
            }
            if precursor.intensity.is_some() {
                precursor.intensity = mean(&self.precursor_intensities);
            }
        }
        Scan::new(header, peaks)
    }
}

/**
Collapses the redundant MS2 scans of a run into averaged scans.

The work is split into three phases, each of which polls a [`CancellationToken`]
on every iteration of its innermost loop:

1. [`ScanAverager::collect`] indexes MS2 scans under their MS1 parents.
2. [`ScanAverager::find_redundant`] groups MS2 scans of different parents that
   share activation method, charge and precursor m/z.
3. [`ScanAverager::average`] merges the MS1 scans into one scan and each group into one scan.

Grouping is first-match in traversal order, not best-match.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAverager {
    pub tolerance: Tolerance,
}

impl ScanAverager {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    /// Build the [`ParentIndex`] of `source` in one pass over its scan ids
    pub fn collect<S: ScanSource + ?Sized>(
        &self,
        source: &mut S,
        token: &CancellationToken,
        progress: &mut dyn ProgressSink,
        notices: &mut Vec<String>,
    ) -> Result<Step<ParentIndex>, ScanAccessError> {
        let max_id = source.max_scan_id();
        progress.set_maximum(Some(max_id as usize));
        let mut index = ParentIndex::default();

        for id in 1..=max_id {
            bail_if_cancelled!(token);
            progress.advance(&format!("Scan {id} of {max_id}"));
            let Some(header) = source.header(id)? else {
                notices.push(format!("Scan {id} is missing from the source"));
                continue;
            };
            match header.ms_level {
                1 => {
                    index.groups.insert(id, Vec::new());
                }
                2 if header.peaks_count > 0 => match header.precursor_scan_num() {
                    Some(parent) => match index.groups.get_mut(&parent) {
                        Some(children) => children.push(header),
                        None => notices.push(format!(
                            "Scan {id} refers to precursor scan {parent} which is not a preceding MS1 scan"
                        )),
                    },
                    None => notices.push(format!("Scan {id} does not name its precursor scan")),
                },
                _ => {}
            }
        }
        debug!(
            "Indexed {} MS2 scans under {} MS1 scans",
            index.groups.values().map(|v| v.len()).sum::<usize>(),
            index.len()
        );
        Ok(Step::Done(index))
    }

    /// Group the MS2 scans of `index` into [`RedundancyGroup`]s, ordered by representative.
    ///
    /// Each unmatched child is compared only against the children of later parents,
    /// taking at most the first unmatched equivalent from each. Every MS2 scan lands
    /// in exactly one group, possibly alone.
    pub fn find_redundant(
        &self,
        index: &ParentIndex,
        token: &CancellationToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<Step<Vec<RedundancyGroup>>, ScanAccessError> {
        progress.set_maximum(Some(index.len()));
        let mut matched: HashSet<u32> = HashSet::new();
        let mut groups: BTreeMap<u32, Vec<u32>> = BTreeMap::new();

        for (position, (parent, children)) in index.groups.iter().enumerate() {
            progress.advance(&format!("MS1 scan {parent}"));
            for child in children {
                bail_if_cancelled!(token);
                if !matched.insert(child.num) {
                    continue;
                }
                let mut members = vec![child.num];
                if let Some(precursor) = child.precursor() {
                    for later in index.groups.values().skip(position + 1) {
                        for candidate in later {
                            bail_if_cancelled!(token);
                            if matched.contains(&candidate.num) {
                                continue;
                            }
                            let same = candidate
                                .precursor()
                                .is_some_and(|p| precursor.is_same_ion(p, &self.tolerance));
                            if same {
                                matched.insert(candidate.num);
                                members.push(candidate.num);
                                break;
                            }
                        }
                    }
                }
                groups.insert(child.num, members);
            }
        }

        let groups: Vec<_> = groups
            .into_iter()
            .map(|(representative, members)| RedundancyGroup {
                representative,
                members,
            })
            .collect();
        debug!(
            "Found {} groups, {} with repeated scans",
            groups.len(),
            groups.iter().filter(|g| g.len() > 1).count()
        );
        Ok(Step::Done(groups))
    }

    /// Average `scans` in order into one scan. Returns `None` if there are none.
    ///
    /// Each scan is merged into the running result with [`merge_profile`] when
    /// neither it nor the first scan is centroided, otherwise with [`merge_centroid`].
    /// Intensities are then divided by the number of scans.
    pub fn average_scans<I: IntoIterator<Item = Scan>>(&self, scans: I) -> Option<Scan> {
        let mut scans = scans.into_iter();
        let mut accumulator = ScanAccumulator::new(scans.next()?, &self.tolerance);
        for scan in scans {
            accumulator.add(&scan);
        }
        Some(accumulator.finish())
    }

    fn average_ids<S: ScanSource + ?Sized>(
        &self,
        source: &mut S,
        ids: &[u32],
        token: &CancellationToken,
    ) -> Result<Step<Option<Scan>>, ScanAccessError> {
        let Some((first, rest)) = ids.split_first() else {
            return Ok(Step::Done(None));
        };
        let mut accumulator = ScanAccumulator::new(source.require_scan(*first)?, &self.tolerance);
        for id in rest {
            bail_if_cancelled!(token);
            let scan = source.require_scan(*id)?;
            accumulator.add(&scan);
        }
        Ok(Step::Done(Some(accumulator.finish())))
    }

    /// Produce the output scans: all MS1 scans averaged into one, followed by one
    /// averaged scan per group whose precursor now refers to that averaged MS1 scan.
    pub fn average<S: ScanSource + ?Sized>(
        &self,
        source: &mut S,
        index: &ParentIndex,
        groups: &[RedundancyGroup],
        token: &CancellationToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<Step<Vec<Scan>>, ScanAccessError> {
        progress.set_maximum(Some(groups.len() + 1));
        let mut output = Vec::with_capacity(groups.len() + 1);

        let parents: Vec<u32> = index.parents().collect();
        progress.advance("Averaging MS1 scans");
        let parent = proceed!(self.average_ids(source, &parents, token)?);
        let parent_num = parent.as_ref().map(|s| s.num());
        if let Some(parent) = parent {
            output.push(parent);
        }

        for group in groups {
            bail_if_cancelled!(token);
            progress.advance(&format!("Averaging group of scan {}", group.representative));
            if let Some(mut scan) = proceed!(self.average_ids(source, &group.members, token)?) {
                if let Some(precursor) = scan.header.precursor_mut() {
                    precursor.scan_num = parent_num;
                }
                output.push(scan);
            }
        }
        Ok(Step::Done(output))
    }
}
