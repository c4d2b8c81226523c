use std::cmp::Ordering;
use std::iter::Zip;
use std::slice::Iter;

/**
A list of (m/z, intensity) pairs stored as two parallel arrays.

The two arrays always have the same length. Lists produced by this crate are
sorted by ascending m/z.
*/
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PeakList {
    mzs: Vec<f64>,
    intensities: Vec<f64>,
}

impl PeakList {
    /// Create a new peak list from parallel arrays.
    ///
    /// # Panics
    /// If `mzs` and `intensities` differ in length.
    pub fn new(mzs: Vec<f64>, intensities: Vec<f64>) -> Self {
        assert_eq!(
            mzs.len(),
            intensities.len(),
            "m/z and intensity arrays must be the same length"
        );
        Self { mzs, intensities }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            mzs: Vec::with_capacity(capacity),
            intensities: Vec::with_capacity(capacity),
        }
    }

    /// Build a peak list from unordered pairs, sorting them by m/z. Pairs sharing
    /// an m/z keep their relative order.
    pub fn from_pairs(mut pairs: Vec<(f64, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        let (mzs, intensities) = pairs.into_iter().unzip();
        Self { mzs, intensities }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mzs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mzs.is_empty()
    }

    #[inline]
    pub fn mzs(&self) -> &[f64] {
        &self.mzs
    }

    #[inline]
    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    #[inline]
    pub fn mz(&self, i: usize) -> f64 {
        self.mzs[i]
    }

    #[inline]
    pub fn intensity(&self, i: usize) -> f64 {
        self.intensities[i]
    }

    pub fn push(&mut self, mz: f64, intensity: f64) {
        self.mzs.push(mz);
        self.intensities.push(intensity);
    }

    pub fn iter(&self) -> Zip<Iter<'_, f64>, Iter<'_, f64>> {
        self.mzs.iter().zip(self.intensities.iter())
    }

    pub fn is_sorted(&self) -> bool {
        self.mzs.windows(2).all(|w| w[0] <= w[1])
    }

    /// The first peak with the greatest positive intensity
    pub fn base_peak(&self) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;
        for (mz, inten) in self.iter() {
            let current = best.map(|(_, i)| i).unwrap_or(0.0);
            if current < *inten {
                best = Some((*mz, *inten));
            }
        }
        best
    }

    pub fn max_intensity(&self) -> Option<f64> {
        self.intensities.iter().copied().reduce(f64::max)
    }

    pub fn total_intensity(&self) -> f64 {
        self.intensities.iter().sum()
    }

    pub fn lowest_mz(&self) -> Option<f64> {
        self.mzs.first().copied()
    }

    pub fn highest_mz(&self) -> Option<f64> {
        self.mzs.last().copied()
    }

    /// Divide every intensity by `denominator`
    pub fn scale_intensities(&mut self, denominator: f64) {
        self.intensities
            .iter_mut()
            .for_each(|i| *i /= denominator);
    }

    pub fn into_arrays(self) -> (Vec<f64>, Vec<f64>) {
        (self.mzs, self.intensities)
    }
}

impl FromIterator<(f64, f64)> for PeakList {
    fn from_iter<T: IntoIterator<Item = (f64, f64)>>(iter: T) -> Self {
        let (mzs, intensities) = iter.into_iter().unzip();
        Self { mzs, intensities }
    }
}
