/*!
Add one peak list onto another.

Both routines take a *reference* list and a list to *add* to it, and return a new
list sorted by m/z whose intensities are the sums of the two inputs. Neither
divides by the number of inputs, so averaging many lists means merging them all
and scaling the result afterwards.
*/
use log::trace;

use crate::mass_error::Tolerance;
use crate::peaks::PeakList;

/// The widest gap between neighboring points of a profile signal, ignoring gaps
/// between two zero-intensity points which are baseline runs rather than sampling.
fn max_sampling_interval(peaks: &PeakList) -> Option<f64> {
    let mzs = peaks.mzs();
    let intensities = peaks.intensities();
    let mut widest: Option<f64> = None;
    for j in 1..peaks.len() {
        if intensities[j] != 0.0 || intensities[j - 1] != 0.0 {
            let interval = mzs[j] - mzs[j - 1];
            widest = Some(widest.map_or(interval, |w| w.max(interval)));
        }
    }
    widest
}

/// Linear interpolation of the intensity at `mz` on the line through
/// `(mz_low, inten_low)` and `(mz_high, inten_high)`.
#[inline]
fn interpolate(mz_low: f64, inten_low: f64, mz_high: f64, inten_high: f64, mz: f64) -> f64 {
    (inten_high - inten_low) / (mz_high - mz_low) * (mz - mz_low) + inten_low
}

/**
Add a profile-mode peak list onto another profile-mode peak list.

For every reference point the nearest points of `add` on either side are located,
accepting only neighbors within the widest sampling interval of `add`. An exact m/z
match is summed directly, otherwise the intensity of `add` at the reference m/z is
linearly interpolated and summed. When only one neighbor is close enough, the
missing side is taken to be a zero-intensity point one sampling interval away.

Points of `add` that were never used as a neighbor are carried into the result
unchanged.
*/
pub fn merge_profile(reference: &PeakList, add: &PeakList) -> PeakList {
    debug_assert!(reference.is_sorted());
    debug_assert!(add.is_sorted());

    let n_add = add.len();
    let max_interval = max_sampling_interval(add);
    let within = |mz_a: f64, mz_b: f64| -> bool {
        max_interval.is_some_and(|w| (mz_a - mz_b).abs() <= w)
    };

    let mut used = vec![false; n_add];
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(reference.len() + n_add);

    let mut j = 0;
    for (mz_ref, inten_ref) in reference.iter() {
        let (mz_ref, inten_ref) = (*mz_ref, *inten_ref);
        while j < n_add && mz_ref > add.mz(j) {
            j += 1;
        }

        let high = if j < n_add && within(add.mz(j), mz_ref) {
            used[j] = true;
            Some((add.mz(j), add.intensity(j)))
        } else {
            None
        };

        if let Some((mz_high, inten_high)) = high {
            if mz_high == mz_ref {
                merged.push((mz_ref, inten_ref + inten_high));
                continue;
            }
        }

        let low = if j > 0 && within(add.mz(j - 1), mz_ref) {
            used[j - 1] = true;
            Some((add.mz(j - 1), add.intensity(j - 1)))
        } else {
            None
        };

        // `within` only succeeds when an interval exists
        let interval = max_interval.unwrap_or_default();
        let interpolated = match (low, high) {
            (None, None) => {
                merged.push((mz_ref, inten_ref));
                continue;
            }
            (Some((mz_low, inten_low)), Some((mz_high, inten_high))) => {
                interpolate(mz_low, inten_low, mz_high, inten_high, mz_ref)
            }
            (None, Some((mz_high, inten_high))) => {
                interpolate(mz_high - interval, 0.0, mz_high, inten_high, mz_ref)
            }
            (Some((mz_low, inten_low)), None) => {
                interpolate(mz_low, inten_low, mz_low + interval, 0.0, mz_ref)
            }
        };
        merged.push((mz_ref, inten_ref + interpolated));
    }

    merged.extend(
        add.iter()
            .zip(used.iter())
            .filter(|(_, used)| !**used)
            .map(|((mz, inten), _)| (*mz, *inten)),
    );

    PeakList::from_pairs(merged)
}

/**
Add a centroid-mode peak list onto another centroid-mode peak list.

Peaks are paired with a two-pointer walk over both lists using
[`Tolerance::is_same_peak`]. Zero-intensity reference peaks never pair. When a
reference peak moves on, the walk over `add` resumes from the first peak that the
previous reference peak paired with, so a peak of `add` may pair with several
neighboring reference peaks. Its intensity is then shared between them in
proportion to `exp(-|Δm/z|)`, favoring the closer ones.

Each pairing moves the reference peak's m/z to the intensity-weighted mean of the
two m/z values and adds the intensities. Unpaired peaks of `add` are carried into
the result unchanged.
*/
pub fn merge_centroid(reference: &PeakList, add: &PeakList, tolerance: &Tolerance) -> PeakList {
    debug_assert!(reference.is_sorted());
    debug_assert!(add.is_sorted());

    let n_ref = reference.len();
    let n_add = add.len();

    let mut ref_to_add: Vec<Vec<usize>> = vec![Vec::new(); n_ref];
    let mut add_to_ref: Vec<Vec<usize>> = vec![Vec::new(); n_add];

    let mut i = 0;
    let mut j = 0;
    while i < n_ref {
        if reference.intensity(i) == 0.0 {
            i += 1;
            continue;
        }
        if j >= n_add {
            match ref_to_add[i].first() {
                Some(first) => {
                    j = *first;
                    i += 1;
                    continue;
                }
                None => break,
            }
        }

        let mz_i = reference.mz(i);
        let mz_j = add.mz(j);
        if tolerance.is_same_peak(mz_i, mz_j) {
            ref_to_add[i].push(j);
            add_to_ref[j].push(i);
            j += 1;
        } else if mz_i < mz_j {
            if let Some(first) = ref_to_add[i].first() {
                j = *first;
            }
            i += 1;
        } else {
            j += 1;
        }
    }

    // The share of each add peak's intensity given to each of its reference peaks,
    // parallel to `add_to_ref`.
    let shares: Vec<Vec<f64>> = add_to_ref
        .iter()
        .enumerate()
        .map(|(j, refs)| {
            if refs.len() < 2 {
                return vec![1.0; refs.len()];
            }
            let mz_j = add.mz(j);
            let weights: Vec<f64> = refs
                .iter()
                .map(|i| (-(reference.mz(*i) - mz_j).abs()).exp())
                .collect();
            let total: f64 = weights.iter().sum();
            trace!("Splitting peak at {mz_j} across {} reference peaks", refs.len());
            weights.into_iter().map(|w| w / total).collect()
        })
        .collect();

    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(n_ref + n_add);
    for (i, (mz_i, inten_i)) in reference.iter().enumerate() {
        let mut mz = *mz_i;
        let mut inten = *inten_i;
        for j in ref_to_add[i].iter().copied() {
            let share = add_to_ref[j]
                .iter()
                .position(|k| *k == i)
                .map(|k| shares[j][k])
                .unwrap_or(1.0);
            let inten_j = add.intensity(j) * share;
            let total = inten + inten_j;
            if total != 0.0 {
                mz = mz * inten / total + add.mz(j) * inten_j / total;
            }
            inten = total;
        }
        merged.push((mz, inten));
    }

    merged.extend(
        add.iter()
            .zip(add_to_ref.iter())
            .filter(|(_, refs)| refs.is_empty())
            .map(|((mz, inten), _)| (*mz, *inten)),
    );

    PeakList::from_pairs(merged)
}

#[cfg(test)]
mod test {
    use super::*;

    fn total(peaks: &PeakList) -> f64 {
        peaks.total_intensity()
    }

    #[test]
    fn test_centroid_identical_single() {
        let a = PeakList::new(vec![100.0], vec![50.0]);
        let b = PeakList::new(vec![100.0], vec![50.0]);
        let merged = merge_centroid(&a, &b, &Tolerance::exact(0.01));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.mz(0), 100.0);
        assert_eq!(merged.intensity(0), 100.0);
    }

    #[test]
    fn test_centroid_disjoint() {
        let a = PeakList::new(vec![100.0, 200.0, 300.0], vec![10.0, 20.0, 30.0]);
        let b = PeakList::new(vec![150.0, 250.0], vec![1.0, 2.0]);
        let merged = merge_centroid(&a, &b, &Tolerance::ppm(10.0));
        assert_eq!(merged.len(), 5);
        assert!(merged.is_sorted());
        assert_eq!(total(&merged), total(&a) + total(&b));
        assert_eq!(merged.mzs(), &[100.0, 150.0, 200.0, 250.0, 300.0]);
    }

    #[test]
    fn test_centroid_weighted_mass() {
        let a = PeakList::new(vec![100.0, 500.0], vec![30.0, 5.0]);
        let b = PeakList::new(vec![100.2, 700.0], vec![10.0, 1.0]);
        let merged = merge_centroid(&a, &b, &Tolerance::exact(0.5));
        assert_eq!(merged.len(), 3);
        assert!((merged.mz(0) - 100.05).abs() < 1e-9);
        assert_eq!(merged.intensity(0), 40.0);
        assert_eq!(merged.mz(1), 500.0);
        assert_eq!(merged.mz(2), 700.0);
    }

    #[test]
    fn test_centroid_shared_add_peak() {
        // The add peak at 100.3 is within tolerance of both reference peaks
        let a = PeakList::new(vec![100.0, 100.5], vec![10.0, 10.0]);
        let b = PeakList::new(vec![100.3], vec![20.0]);
        let merged = merge_centroid(&a, &b, &Tolerance::exact(0.5));
        assert_eq!(merged.len(), 2);
        assert!((total(&merged) - 40.0).abs() < 1e-9);
        // The closer reference peak receives the larger share
        let gain_low = merged.intensity(0) - 10.0;
        let gain_high = merged.intensity(1) - 10.0;
        assert!(gain_high > gain_low);
        let expected_high = 20.0 * (-0.2f64).exp() / ((-0.3f64).exp() + (-0.2f64).exp());
        assert!((gain_high - expected_high).abs() < 1e-9);
    }

    #[test]
    fn test_centroid_zero_reference_skipped() {
        let a = PeakList::new(vec![100.0, 200.0], vec![0.0, 10.0]);
        let b = PeakList::new(vec![100.0, 200.0], vec![5.0, 5.0]);
        let merged = merge_centroid(&a, &b, &Tolerance::exact(0.01));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.mzs(), &[100.0, 100.0, 200.0]);
        assert_eq!(merged.intensity(2), 15.0);
        assert_eq!(total(&merged), 20.0);
    }

    #[test]
    fn test_profile_exact_match() {
        let a = PeakList::new(vec![100.0, 100.1, 100.2], vec![0.0, 5.0, 0.0]);
        let b = PeakList::new(vec![100.0, 100.1, 100.2], vec![0.0, 7.0, 0.0]);
        let merged = merge_profile(&a, &b);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.intensities(), &[0.0, 12.0, 0.0]);
    }

    #[test]
    fn test_profile_interpolated() {
        let a = PeakList::new(vec![100.05], vec![1.0]);
        let b = PeakList::new(vec![100.0, 100.1], vec![4.0, 8.0]);
        let merged = merge_profile(&a, &b);
        // Both add points bracket the reference point and are consumed
        assert_eq!(merged.len(), 1);
        assert!((merged.intensity(0) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_profile_one_sided_and_unused() {
        let a = PeakList::new(vec![99.95, 150.0], vec![1.0, 1.0]);
        let b = PeakList::new(vec![100.0, 100.1], vec![4.0, 8.0]);
        let merged = merge_profile(&a, &b);
        // 99.95 only has a high neighbor at 100.0, extrapolated towards zero at 99.9
        assert!((merged.intensity(0) - 3.0).abs() < 1e-9);
        // 150.0 has no neighbor, and 100.1 was never a neighbor of anything
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.mz(1), 100.1);
        assert_eq!(merged.intensity(1), 8.0);
        assert_eq!(merged.mz(2), 150.0);
        assert_eq!(merged.intensity(2), 1.0);
    }

    #[test]
    fn test_profile_no_interval() {
        let a = PeakList::new(vec![100.0], vec![1.0]);
        let b = PeakList::new(vec![100.5], vec![2.0]);
        let merged = merge_profile(&a, &b);
        assert_eq!(merged.mzs(), &[100.0, 100.5]);
        assert_eq!(merged.intensities(), &[1.0, 2.0]);
    }
}
