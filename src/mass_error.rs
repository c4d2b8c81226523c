//! Mass accuracy, either in absolute units (Da / Th) or relative parts-per-million.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MassErrorType {
    #[default]
    Exact,
    PPM,
}

impl MassErrorType {
    /// The absolute width of `accuracy` around `reference`
    #[inline]
    pub fn width(&self, reference: f64, accuracy: f64) -> f64 {
        match self {
            Self::Exact => accuracy,
            Self::PPM => reference / 1e6 * accuracy,
        }
    }

    /// Whether `mz1` and `mz2` describe the same peak within `accuracy`.
    ///
    /// For [`MassErrorType::PPM`] the tolerance is scaled by the mean of the two values,
    /// so the test is symmetric in its arguments.
    #[inline]
    pub fn is_same_peak(&self, mz1: f64, mz2: f64, accuracy: f64) -> bool {
        let tol = self.width((mz1 + mz2) / 2.0, accuracy);
        (mz1 - mz2).abs() <= tol
    }
}

/// A mass accuracy value paired with its unit
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerance {
    pub accuracy: f64,
    pub error_type: MassErrorType,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::exact(0.5)
    }
}

impl Tolerance {
    pub fn new(accuracy: f64, is_ppm: bool) -> Self {
        let error_type = if is_ppm {
            MassErrorType::PPM
        } else {
            MassErrorType::Exact
        };
        Self {
            accuracy,
            error_type,
        }
    }

    pub fn exact(accuracy: f64) -> Self {
        Self::new(accuracy, false)
    }

    pub fn ppm(accuracy: f64) -> Self {
        Self::new(accuracy, true)
    }

    pub fn is_ppm(&self) -> bool {
        self.error_type == MassErrorType::PPM
    }

    /// See [`MassErrorType::is_same_peak`]
    #[inline]
    pub fn is_same_peak(&self, mz1: f64, mz2: f64) -> bool {
        self.error_type.is_same_peak(mz1, mz2, self.accuracy)
    }

    /// The closed interval `[target - tol, target + tol]`, where a relative tolerance
    /// is scaled by `target` alone.
    pub fn bounds(&self, target: f64) -> (f64, f64) {
        let width = self.error_type.width(target, self.accuracy);
        (target - width, target + width)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ppm_boundary() {
        let tol = Tolerance::ppm(10.0);
        assert!(tol.is_same_peak(1000.0, 1000.01));
        assert!(!tol.is_same_peak(1000.0, 1000.03));
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            (100.0, 100.0005),
            (523.2, 523.25),
            (1500.0, 1500.02),
            (200.0, 199.9),
            (999.99, 1000.0),
        ];
        for tol in [Tolerance::ppm(10.0), Tolerance::ppm(50.0), Tolerance::exact(0.01), Tolerance::exact(0.1)] {
            for (a, b) in pairs {
                assert_eq!(
                    tol.is_same_peak(a, b),
                    tol.is_same_peak(b, a),
                    "{a} vs {b} with {tol:?}"
                );
            }
        }
    }

    #[test]
    fn test_bounds() {
        let (lo, hi) = Tolerance::exact(0.5).bounds(500.0);
        assert_eq!(lo, 499.5);
        assert_eq!(hi, 500.5);

        let (lo, hi) = Tolerance::ppm(20.0).bounds(500.0);
        assert!((lo - 499.99).abs() < 1e-9);
        assert!((hi - 500.01).abs() < 1e-9);
    }
}
