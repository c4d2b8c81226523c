use std::fmt::Display;
use std::str::FromStr;

/**
Describes the polarity of a scan, as written in the `polarity` attribute of an
mzXML `<scan>` element.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanPolarity {
    Positive,
    Negative,
    Any,
}

impl ScanPolarity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ScanPolarity::Positive => "+",
            ScanPolarity::Negative => "-",
            ScanPolarity::Any => "any",
        }
    }
}

impl Display for ScanPolarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanPolarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Positive),
            "-" => Ok(Self::Negative),
            "any" => Ok(Self::Any),
            _ => Err(format!("Unrecognized polarity {s:?}")),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Describes the precursor ion an MSn scan was produced from.
pub struct Precursor {
    /// The selected ion's m/z
    pub mz: f64,
    pub intensity: Option<f64>,
    pub charge: Option<i32>,
    /// The dissociation method, e.g. `CID`, `HCD` or `ETD`
    pub activation_method: Option<String>,
    /// The `num` of the scan the precursor ion was selected from
    pub scan_num: Option<u32>,
}

impl Precursor {
    pub fn new(mz: f64, intensity: Option<f64>, charge: Option<i32>) -> Self {
        Self {
            mz,
            intensity,
            charge,
            ..Default::default()
        }
    }

    pub fn with_activation_method<S: Into<String>>(mut self, method: S) -> Self {
        self.activation_method = Some(method.into());
        self
    }

    pub fn with_scan_num(mut self, scan_num: u32) -> Self {
        self.scan_num = Some(scan_num);
        self
    }

    /// Whether two precursors were most likely isolated from the same ion: same
    /// activation method, same charge, and m/z equal within `tolerance`.
    pub fn is_same_ion(&self, other: &Precursor, tolerance: &crate::mass_error::Tolerance) -> bool {
        self.activation_method == other.activation_method
            && self.charge == other.charge
            && tolerance.is_same_peak(self.mz, other.mz)
    }
}

/**
The descriptive metadata of a single scan.

Every attribute of an mzXML `<scan>` that may be absent is an [`Option`],
and is left out when the scan is written again.
*/
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanHeader {
    pub num: u32,
    pub ms_level: u8,
    pub peaks_count: usize,

    pub polarity: Option<ScanPolarity>,
    pub scan_type: Option<String>,
    pub centroided: Option<bool>,
    pub deisotoped: Option<bool>,
    pub charge_deconvoluted: Option<bool>,
    /// The retention time exactly as the source wrote it, e.g. `PT1234.5S`
    pub retention_time: Option<String>,
    pub ionization_energy: Option<f64>,
    pub collision_energy: Option<f64>,

    pub start_mz: Option<f64>,
    pub end_mz: Option<f64>,
    pub low_mz: Option<f64>,
    pub high_mz: Option<f64>,
    pub base_peak_mz: Option<f64>,
    pub base_peak_intensity: Option<f64>,
    pub tot_ion_current: Option<f64>,

    pub precursor: Option<Precursor>,
}

impl ScanHeader {
    pub fn new(num: u32, ms_level: u8) -> Self {
        Self {
            num,
            ms_level,
            ..Default::default()
        }
    }

    pub fn precursor(&self) -> Option<&Precursor> {
        self.precursor.as_ref()
    }

    pub fn precursor_mut(&mut self) -> Option<&mut Precursor> {
        self.precursor.as_mut()
    }

    pub fn precursor_scan_num(&self) -> Option<u32> {
        self.precursor.as_ref().and_then(|p| p.scan_num)
    }

    /// Only an explicit `centroided="1"` counts, an unset flag is treated as profile data
    pub fn is_centroided(&self) -> bool {
        self.centroided == Some(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mass_error::Tolerance;

    #[test]
    fn test_polarity_parse() {
        assert_eq!("+".parse::<ScanPolarity>().unwrap(), ScanPolarity::Positive);
        assert_eq!("-".parse::<ScanPolarity>().unwrap(), ScanPolarity::Negative);
        assert_eq!(ScanPolarity::Any.to_string(), "any");
        assert!("positive".parse::<ScanPolarity>().is_err());
    }

    #[test]
    fn test_same_ion() {
        let tol = Tolerance::exact(0.01);
        let a = Precursor::new(500.0, Some(10.0), Some(2)).with_activation_method("CID");
        let b = Precursor::new(500.005, Some(1.0), Some(2)).with_activation_method("CID");
        let c = Precursor::new(500.005, Some(1.0), Some(3)).with_activation_method("CID");
        let d = Precursor::new(500.005, Some(1.0), Some(2)).with_activation_method("ETD");
        assert!(a.is_same_ion(&b, &tol));
        assert!(!a.is_same_ion(&c, &tol));
        assert!(!a.is_same_ion(&d, &tol));
    }
}
