use crate::peaks::PeakList;
use crate::spectrum::scan_properties::ScanHeader;

/// A scan's header together with its peak list
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scan {
    pub header: ScanHeader,
    pub peaks: PeakList,
}

impl Scan {
    /// Pair a header with its peaks, making `peaks_count` agree with the peak list
    pub fn new(mut header: ScanHeader, peaks: PeakList) -> Self {
        header.peaks_count = peaks.len();
        Self { header, peaks }
    }

    #[inline]
    pub fn num(&self) -> u32 {
        self.header.num
    }

    #[inline]
    pub fn ms_level(&self) -> u8 {
        self.header.ms_level
    }

    pub fn header(&self) -> &ScanHeader {
        &self.header
    }

    pub fn peaks(&self) -> &PeakList {
        &self.peaks
    }

    pub fn into_parts(self) -> (ScanHeader, PeakList) {
        (self.header, self.peaks)
    }
}
