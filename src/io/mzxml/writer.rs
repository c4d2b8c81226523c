use std::collections::HashMap;
use std::io::{self, prelude::*, BufWriter};

use log::{debug, warn};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Error as XMLError, Writer};
use thiserror::Error;

use super::binary::encode_peaks;
use crate::io::offset_index::OffsetIndex;
use crate::io::utils::HashingCountingStream;
use crate::spectrum::{Precursor, Scan};

const BUFFER_SIZE: usize = 10000;

const MZXML_NAMESPACE: &str = "http://sashimi.sourceforge.net/schema_revision/mzXML_3.2";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://sashimi.sourceforge.net/schema_revision/mzXML_3.2 http://sashimi.sourceforge.net/schema_revision/mzXML_3.2/mzXML_idx_3.2.xsd";

const SOFTWARE_NAME: &str = env!("CARGO_PKG_NAME");
const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::from_content($e, $e.len())
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let value = $value.to_string();
        $elt.push_attribute(($name, value.as_str()));
    };
}

macro_rules! opt_attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        if let Some(value) = $value {
            attrib!($name, value, $elt);
        }
    };
}

macro_rules! start_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::Start($target.borrow()))?;
    };
}

macro_rules! end_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::End($target.to_end()))?;
    };
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

#[derive(Debug, Error)]
pub enum MzXMLWriterError {
    #[error("An XML error occurred while writing: {0}")]
    XMLError(#[from] XMLError),
    #[error("An IO error occurred while writing: {0}")]
    IOError(#[from] io::Error),
    #[error("Attempted an invalid state transition from {from_state:?} to {to_state:?}")]
    StateTransitionError {
        from_state: MzXMLWriterState,
        to_state: MzXMLWriterState,
    },
    #[error("Attempted an action that is invalid in state {0:?}")]
    InvalidActionError(MzXMLWriterState),
}

impl From<MzXMLWriterError> for io::Error {
    fn from(value: MzXMLWriterError) -> Self {
        match value {
            MzXMLWriterError::IOError(e) => e,
            MzXMLWriterError::XMLError(XMLError::Io(ref e)) => {
                io::Error::new(e.kind(), value.to_string())
            }
            other => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
        }
    }
}

pub type WriterResult = Result<(), MzXMLWriterError>;

/**
The different states that [`MzXMLWriter`] can enter while writing an mzXML
document. This is only necessary for the module consumer when determining
where something may have gone wrong.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub enum MzXMLWriterState {
    Start,
    Run,
    RunClosed,
    IndexList,
    End,
}

/// Maps the scan numbers of the source run onto the consecutive numbers
/// assigned in the order scans were written.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanNumberRemap {
    numbers: HashMap<u32, u32>,
}

impl ScanNumberRemap {
    pub fn insert(&mut self, original: u32, written: u32) -> Option<u32> {
        self.numbers.insert(original, written)
    }

    pub fn get(&self, original: u32) -> Option<u32> {
        self.numbers.get(&original).copied()
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.numbers.iter().map(|(k, v)| (*k, *v))
    }
}

/**
Writes an indexed mzXML 3.2 document one scan at a time.

Scans are renumbered `1..=N` in the order they are written. A precursor
that refers to a scan written earlier is rewritten to point at that scan's
new number, and a reference to a scan that was never written is dropped.

The XML writer sits on a stream that keeps a running byte count and SHA-1
digest of everything emitted, so the `<index>`, `<indexOffset>` and `<sha1>`
trailer can be produced without seeking. [`MzXMLWriter::close`] must be called
to complete the document.
*/
pub struct MzXMLWriter<W: Write> {
    handle: Writer<HashingCountingStream<BufWriter<W>>>,
    pub state: MzXMLWriterState,
    pub scan_count: usize,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    scan_counter: u32,
    scan_numbers: ScanNumberRemap,
    offset_index: OffsetIndex,
}

impl<W: Write> MzXMLWriter<W> {
    const INDENT_SIZE: u64 = 2;

    pub fn new(file: W) -> Self {
        let handle = HashingCountingStream::new(BufWriter::with_capacity(BUFFER_SIZE, file));
        Self {
            handle: Writer::new_with_indent(handle, b' ', Self::INDENT_SIZE as usize),
            state: MzXMLWriterState::Start,
            scan_count: 0,
            start_time: None,
            end_time: None,
            scan_counter: 0,
            scan_numbers: ScanNumberRemap::default(),
            offset_index: OffsetIndex::new("scan".into()),
        }
    }

    /// The value written to `msRun`'s `scanCount`. Must be set before the first scan.
    pub fn set_scan_count(&mut self, scan_count: usize) {
        self.scan_count = scan_count;
    }

    /// The retention time bounds written to `msRun`. Must be set before the first scan.
    pub fn set_time_range(&mut self, start_time: Option<String>, end_time: Option<String>) {
        self.start_time = start_time;
        self.end_time = end_time;
    }

    pub fn offset_index(&self) -> &OffsetIndex {
        &self.offset_index
    }

    pub fn scan_numbers(&self) -> &ScanNumberRemap {
        &self.scan_numbers
    }

    pub fn scans_written(&self) -> usize {
        self.scan_counter as usize
    }

    /// The number of bytes emitted so far
    pub fn position(&self) -> u64 {
        self.handle.get_ref().position()
    }

    /// The offset at which the next start tag at `depth` will begin, past the
    /// line break and indentation the XML writer puts before it
    fn next_tag_position(&self, depth: u64) -> u64 {
        self.position() + 1 + depth * Self::INDENT_SIZE
    }

    fn write_header(&mut self) -> WriterResult {
        if self.state != MzXMLWriterState::Start {
            return Err(MzXMLWriterError::StateTransitionError {
                from_state: self.state,
                to_state: MzXMLWriterState::Run,
            });
        }
        self.handle
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = bstart!("mzXML");
        attrib!("xmlns", MZXML_NAMESPACE, root);
        attrib!("xmlns:xsi", XSI_NAMESPACE, root);
        attrib!("xsi:schemaLocation", SCHEMA_LOCATION, root);
        self.handle.write_event(Event::Start(root))?;

        let mut run = bstart!("msRun");
        attrib!("scanCount", self.scan_count, run);
        opt_attrib!("startTime", self.start_time.as_ref(), run);
        opt_attrib!("endTime", self.end_time.as_ref(), run);
        self.handle.write_event(Event::Start(run))?;

        let processing = bstart!("dataProcessing");
        start_event!(self, processing);
        let mut software = bstart!("software");
        attrib!("type", "processing", software);
        attrib!("name", SOFTWARE_NAME, software);
        attrib!("version", SOFTWARE_VERSION, software);
        self.handle.write_event(Event::Empty(software))?;
        end_event!(self, processing);

        self.state = MzXMLWriterState::Run;
        debug!("Opened mzXML run of {} scans", self.scan_count);
        Ok(())
    }

    fn write_precursor(&mut self, precursor: &Precursor) -> WriterResult {
        let Some(intensity) = precursor.intensity else {
            return Ok(());
        };
        let mut tag = bstart!("precursorMz");
        if let Some(original) = precursor.scan_num {
            match self.scan_numbers.get(original) {
                Some(written) => {
                    attrib!("precursorScanNum", written, tag);
                }
                None => {
                    debug!("Dropping reference to precursor scan {original} which was not written")
                }
            }
        }
        attrib!("precursorIntensity", intensity, tag);
        opt_attrib!("precursorCharge", precursor.charge, tag);
        opt_attrib!("activationMethod", precursor.activation_method.as_ref(), tag);
        start_event!(self, tag);
        let content = precursor.mz.to_string();
        self.handle.write_event(Event::Text(BytesText::new(&content)))?;
        end_event!(self, tag);
        Ok(())
    }

    fn write_peaks(&mut self, scan: &Scan) -> WriterResult {
        let mut tag = bstart!("peaks");
        attrib!("compressionType", "none", tag);
        attrib!("compressedLen", 0, tag);
        attrib!("precision", 32, tag);
        attrib!("byteOrder", "network", tag);
        attrib!("contentType", "m/z-int", tag);
        start_event!(self, tag);
        let content = encode_peaks(&scan.peaks);
        self.handle.write_event(Event::Text(BytesText::new(&content)))?;
        end_event!(self, tag);
        Ok(())
    }

    /// Write `scan` as the next scan of the run, assigning it the next scan number
    pub fn write_scan(&mut self, scan: &Scan) -> WriterResult {
        match self.state {
            MzXMLWriterState::Start => self.write_header()?,
            MzXMLWriterState::Run => {}
            state => return Err(MzXMLWriterError::InvalidActionError(state)),
        }
        self.scan_counter += 1;
        let num = self.scan_counter;
        if let Some(previous) = self.scan_numbers.insert(scan.num(), num) {
            warn!(
                "Scan {} was written more than once, references now point to {num} instead of {previous}",
                scan.num()
            );
        }
        self.offset_index.insert(num, self.next_tag_position(2));

        let header = &scan.header;
        let mut tag = bstart!("scan");
        attrib!("num", num, tag);
        attrib!("msLevel", header.ms_level, tag);
        attrib!("peaksCount", scan.peaks.len(), tag);
        opt_attrib!("polarity", header.polarity, tag);
        opt_attrib!("scanType", header.scan_type.as_ref(), tag);
        opt_attrib!("centroided", header.centroided.map(flag), tag);
        opt_attrib!("deisotoped", header.deisotoped.map(flag), tag);
        opt_attrib!("chargeDeconvoluted", header.charge_deconvoluted.map(flag), tag);
        opt_attrib!("retentionTime", header.retention_time.as_ref(), tag);
        opt_attrib!("ionizationEnergy", header.ionization_energy, tag);
        opt_attrib!("collisionEnergy", header.collision_energy, tag);
        opt_attrib!("startMz", header.start_mz, tag);
        opt_attrib!("endMz", header.end_mz, tag);
        opt_attrib!("lowMz", header.low_mz, tag);
        opt_attrib!("highMz", header.high_mz, tag);
        opt_attrib!("basePeakMz", header.base_peak_mz, tag);
        opt_attrib!("basePeakIntensity", header.base_peak_intensity, tag);
        opt_attrib!("totIonCurrent", header.tot_ion_current, tag);
        start_event!(self, tag);

        if let Some(precursor) = header.precursor() {
            self.write_precursor(precursor)?;
        }
        self.write_peaks(scan)?;
        end_event!(self, tag);
        Ok(())
    }

    fn write_index(&mut self) -> WriterResult {
        self.state = MzXMLWriterState::IndexList;
        let index_offset = self.next_tag_position(1);

        let mut outer = bstart!("index");
        attrib!("name", self.offset_index.name, outer);
        start_event!(self, outer);
        for (num, offset) in self.offset_index.iter() {
            let mut tag = bstart!("offset");
            attrib!("id", num, tag);
            start_event!(self, tag);
            let content = offset.to_string();
            self.handle.write_event(Event::Text(BytesText::new(&content)))?;
            end_event!(self, tag);
        }
        end_event!(self, outer);

        let tag = bstart!("indexOffset");
        start_event!(self, tag);
        let content = index_offset.to_string();
        self.handle.write_event(Event::Text(BytesText::new(&content)))?;
        end_event!(self, tag);

        let tag = bstart!("sha1");
        start_event!(self, tag);
        let content = self.handle.get_ref().compute();
        self.handle.write_event(Event::Text(BytesText::new(&content)))?;
        end_event!(self, tag);
        Ok(())
    }

    /// Complete the document, writing the index trailer if any scans were written.
    /// Calling this more than once is a no-op.
    pub fn close(&mut self) -> WriterResult {
        if self.state == MzXMLWriterState::End {
            return Ok(());
        }
        if self.state == MzXMLWriterState::Start {
            self.write_header()?;
        }
        if self.state == MzXMLWriterState::Run {
            self.handle.write_event(Event::End(BytesEnd::new("msRun")))?;
            self.state = MzXMLWriterState::RunClosed;
        }
        if !self.offset_index.is_empty() {
            self.write_index()?;
        }
        self.handle.write_event(Event::End(BytesEnd::new("mzXML")))?;
        self.handle.write_indent()?;
        self.handle.get_mut().flush()?;
        self.state = MzXMLWriterState::End;
        debug!(
            "Closed mzXML document with {} scans after {} bytes",
            self.scan_counter,
            self.position()
        );
        Ok(())
    }

    /// Flush any buffered content and return the underlying stream
    pub fn into_inner(self) -> io::Result<W> {
        self.handle
            .into_inner()
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())
    }
}
