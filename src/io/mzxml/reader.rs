use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use log::{debug, warn};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Error as XMLError, Reader};
use thiserror::Error;

use super::binary::{decode_peaks, ByteOrder, PeaksEncoding};
use crate::io::traits::{ScanAccessError, ScanSource};
use crate::peaks::PeakList;
use crate::spectrum::{Precursor, Scan, ScanHeader};

/**
The different states the [`MzXMLReader`] can enter while parsing
different phases of the document. This information is really only
needed by the module consumer to determine where in the document an
error occurred.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum MzXMLParserState {
    Start = 0,
    MsRun,
    Scan,
    PrecursorMz,
    Peaks,
    Index,
    End,
}

/**
All the ways that mzXML parsing can go wrong
*/
#[derive(Debug, Error)]
pub enum MzXMLParserError {
    #[error("An XML error {1:?} was encountered in {0:?}")]
    XMLError(MzXMLParserState, #[source] XMLError),
    #[error("An IO error {1} was encountered in {0:?}")]
    IOError(MzXMLParserState, #[source] io::Error),
    #[error("Attribute {1} has an invalid value {2:?} in {0:?}")]
    InvalidAttribute(MzXMLParserState, String, String),
    #[error("A required attribute {1} was missing in {0:?}")]
    MissingAttribute(MzXMLParserState, String),
    #[error("Failed to decode the peaks of scan {0}: {1}")]
    PeakDecodingError(u32, String),
    #[error("The document ended inside an unfinished {0:?}")]
    IncompleteDocument(MzXMLParserState),
}

impl From<MzXMLParserError> for io::Error {
    fn from(value: MzXMLParserError) -> Self {
        match value {
            MzXMLParserError::IOError(_, ref e) => io::Error::new(e.kind(), value),
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

impl From<MzXMLParserError> for ScanAccessError {
    fn from(value: MzXMLParserError) -> Self {
        match value {
            MzXMLParserError::PeakDecodingError(num, message) => {
                ScanAccessError::ParseError(num, message)
            }
            other => ScanAccessError::IOError(other.into()),
        }
    }
}

pub type ParserResult = Result<MzXMLParserState, MzXMLParserError>;

fn parse_value<T: FromStr>(
    state: MzXMLParserState,
    key: &[u8],
    value: &str,
) -> Result<T, MzXMLParserError> {
    value.trim().parse::<T>().map_err(|_| {
        MzXMLParserError::InvalidAttribute(
            state,
            String::from_utf8_lossy(key).to_string(),
            value.to_string(),
        )
    })
}

fn parse_flag(state: MzXMLParserState, key: &[u8], value: &str) -> Result<bool, MzXMLParserError> {
    match value.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(MzXMLParserError::InvalidAttribute(
            state,
            String::from_utf8_lossy(key).to_string(),
            value.to_string(),
        )),
    }
}

#[derive(Debug, Default)]
struct ScanBuilder {
    header: ScanHeader,
    has_num: bool,
    encoding: PeaksEncoding,
    peaks_text: Vec<u8>,
    precursor_text: String,
    peaks: Option<PeakList>,
}

/// Accumulates the attributes and content of `<msRun>` and its `<scan>` elements
#[derive(Debug, Default)]
struct RunBuilder {
    scan_stack: Vec<ScanBuilder>,
    scans: IndexMap<u32, Scan>,
    document_order: Vec<u32>,
    scan_count: Option<usize>,
    start_time: Option<String>,
    end_time: Option<String>,
}

impl RunBuilder {
    fn start_run(&mut self, event: &BytesStart, state: MzXMLParserState) -> ParserResult {
        for attr in event.attributes() {
            let attr = attr.map_err(|e| MzXMLParserError::XMLError(state, e.into()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| MzXMLParserError::XMLError(state, e))?;
            match attr.key.as_ref() {
                b"scanCount" => self.scan_count = Some(parse_value(state, b"scanCount", &value)?),
                b"startTime" => self.start_time = Some(value.to_string()),
                b"endTime" => self.end_time = Some(value.to_string()),
                _ => {}
            }
        }
        Ok(MzXMLParserState::MsRun)
    }

    fn start_scan(&mut self, event: &BytesStart, state: MzXMLParserState) -> ParserResult {
        let mut builder = ScanBuilder::default();
        let header = &mut builder.header;
        for attr in event.attributes() {
            let attr = attr.map_err(|e| MzXMLParserError::XMLError(state, e.into()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| MzXMLParserError::XMLError(state, e))?;
            let key = attr.key.as_ref();
            match key {
                b"num" => {
                    header.num = parse_value(state, key, &value)?;
                    builder.has_num = true;
                }
                b"msLevel" => header.ms_level = parse_value(state, key, &value)?,
                b"peaksCount" => header.peaks_count = parse_value(state, key, &value)?,
                b"polarity" => {
                    header.polarity = Some(value.parse().map_err(|_| {
                        MzXMLParserError::InvalidAttribute(
                            state,
                            "polarity".into(),
                            value.to_string(),
                        )
                    })?)
                }
                b"scanType" => header.scan_type = Some(value.to_string()),
                b"centroided" => header.centroided = Some(parse_flag(state, key, &value)?),
                b"deisotoped" => header.deisotoped = Some(parse_flag(state, key, &value)?),
                b"chargeDeconvoluted" => {
                    header.charge_deconvoluted = Some(parse_flag(state, key, &value)?)
                }
                b"retentionTime" => header.retention_time = Some(value.to_string()),
                b"ionizationEnergy" | b"ionisationEnergy" => {
                    header.ionization_energy = Some(parse_value(state, key, &value)?)
                }
                b"collisionEnergy" => header.collision_energy = Some(parse_value(state, key, &value)?),
                b"startMz" => header.start_mz = Some(parse_value(state, key, &value)?),
                b"endMz" => header.end_mz = Some(parse_value(state, key, &value)?),
                b"lowMz" => header.low_mz = Some(parse_value(state, key, &value)?),
                b"highMz" => header.high_mz = Some(parse_value(state, key, &value)?),
                b"basePeakMz" => header.base_peak_mz = Some(parse_value(state, key, &value)?),
                b"basePeakIntensity" => {
                    header.base_peak_intensity = Some(parse_value(state, key, &value)?)
                }
                b"totIonCurrent" => header.tot_ion_current = Some(parse_value(state, key, &value)?),
                _ => {}
            }
        }
        if !builder.has_num {
            return Err(MzXMLParserError::MissingAttribute(state, "num".into()));
        }
        self.document_order.push(builder.header.num);
        self.scan_stack.push(builder);
        Ok(MzXMLParserState::Scan)
    }

    fn start_precursor(&mut self, event: &BytesStart, state: MzXMLParserState) -> ParserResult {
        let mut precursor = Precursor::default();
        for attr in event.attributes() {
            let attr = attr.map_err(|e| MzXMLParserError::XMLError(state, e.into()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| MzXMLParserError::XMLError(state, e))?;
            let key = attr.key.as_ref();
            match key {
                b"precursorScanNum" => precursor.scan_num = Some(parse_value(state, key, &value)?),
                b"precursorIntensity" => precursor.intensity = Some(parse_value(state, key, &value)?),
                b"precursorCharge" => precursor.charge = Some(parse_value(state, key, &value)?),
                b"activationMethod" => precursor.activation_method = Some(value.to_string()),
                _ => {}
            }
        }
        match self.scan_stack.last_mut() {
            Some(builder) => {
                builder.precursor_text.clear();
                builder.header.precursor = Some(precursor);
                Ok(MzXMLParserState::PrecursorMz)
            }
            None => Ok(state),
        }
    }

    fn start_peaks(&mut self, event: &BytesStart, state: MzXMLParserState) -> ParserResult {
        let mut encoding = PeaksEncoding::default();
        for attr in event.attributes() {
            let attr = attr.map_err(|e| MzXMLParserError::XMLError(state, e.into()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| MzXMLParserError::XMLError(state, e))?;
            let key = attr.key.as_ref();
            match key {
                b"precision" => encoding.precision = parse_value(state, key, &value)?,
                b"byteOrder" => {
                    encoding.byte_order = match &*value {
                        "network" | "big" => ByteOrder::Network,
                        "little" => ByteOrder::Little,
                        _ => {
                            return Err(MzXMLParserError::InvalidAttribute(
                                state,
                                "byteOrder".into(),
                                value.to_string(),
                            ))
                        }
                    }
                }
                b"compressionType" => encoding.zlib_compressed = value == "zlib",
                b"contentType" | b"pairOrder" => {
                    if value != "m/z-int" {
                        warn!("Unsupported peak content type {value}, treating as m/z-int pairs")
                    }
                }
                _ => {}
            }
        }
        match self.scan_stack.last_mut() {
            Some(builder) => {
                builder.encoding = encoding;
                builder.peaks_text.clear();
                Ok(MzXMLParserState::Peaks)
            }
            None => Ok(state),
        }
    }

    pub fn start_element(&mut self, event: &BytesStart, state: MzXMLParserState) -> ParserResult {
        match event.name().as_ref() {
            b"msRun" => self.start_run(event, state),
            b"scan" => self.start_scan(event, state),
            b"precursorMz" => self.start_precursor(event, state),
            b"peaks" => self.start_peaks(event, state),
            b"index" => Ok(MzXMLParserState::Index),
            _ => Ok(state),
        }
    }

    pub fn text(&mut self, event: &BytesText, state: MzXMLParserState) -> ParserResult {
        match state {
            MzXMLParserState::PrecursorMz | MzXMLParserState::Peaks => {
                let text = event
                    .unescape()
                    .map_err(|e| MzXMLParserError::XMLError(state, e))?;
                if let Some(builder) = self.scan_stack.last_mut() {
                    if state == MzXMLParserState::Peaks {
                        builder.peaks_text.extend_from_slice(text.as_bytes());
                    } else {
                        builder.precursor_text.push_str(&text);
                    }
                }
                Ok(state)
            }
            _ => Ok(state),
        }
    }

    fn finish_scan(&mut self) -> ParserResult {
        let Some(builder) = self.scan_stack.pop() else {
            return Ok(MzXMLParserState::MsRun);
        };
        let ScanBuilder { header, peaks, .. } = builder;
        let declared = header.peaks_count;
        let num = header.num;
        let scan = Scan::new(header, peaks.unwrap_or_default());
        if declared != scan.peaks.len() {
            warn!(
                "Scan {num} declared {declared} peaks but {} were decoded",
                scan.peaks.len()
            );
        }
        if self.scans.insert(num, scan).is_some() {
            warn!("Scan number {num} occurs more than once, keeping the last");
        }
        if self.scan_stack.is_empty() {
            Ok(MzXMLParserState::MsRun)
        } else {
            Ok(MzXMLParserState::Scan)
        }
    }

    pub fn end_element(&mut self, event: &BytesEnd, state: MzXMLParserState) -> ParserResult {
        match event.name().as_ref() {
            b"precursorMz" => {
                if let Some(builder) = self.scan_stack.last_mut() {
                    let mz = parse_value(state, b"precursorMz", &builder.precursor_text)?;
                    if let Some(precursor) = builder.header.precursor.as_mut() {
                        precursor.mz = mz;
                    }
                }
                Ok(MzXMLParserState::Scan)
            }
            b"peaks" => {
                if let Some(builder) = self.scan_stack.last_mut() {
                    let peaks = decode_peaks(&builder.peaks_text, &builder.encoding)
                        .map_err(|e| MzXMLParserError::PeakDecodingError(builder.header.num, e))?;
                    builder.peaks_text.clear();
                    builder.peaks = Some(peaks);
                }
                Ok(MzXMLParserState::Scan)
            }
            b"scan" => self.finish_scan(),
            b"index" => Ok(MzXMLParserState::MsRun),
            b"msRun" => Ok(MzXMLParserState::End),
            _ => Ok(state),
        }
    }

    /// Nested scans are completed child-first, restore the order their start tags appeared in
    fn into_ordered_scans(mut self) -> IndexMap<u32, Scan> {
        let mut scans = IndexMap::with_capacity(self.scans.len());
        for num in self.document_order {
            if let Some(scan) = self.scans.swap_remove(&num) {
                scans.insert(num, scan);
            }
        }
        scans
    }
}

/**
Reads an mzXML document into memory and serves its scans by scan number.

Both the flat layout of mzXML 3.x and the nested `<scan>` layout of older
revisions are accepted. Peaks may be 32- or 64-bit, in either byte order,
and optionally zlib compressed.
*/
#[derive(Debug, Default, Clone)]
pub struct MzXMLReader {
    scans: IndexMap<u32, Scan>,
    pub scan_count: Option<usize>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl MzXMLReader {
    /// Parse an entire document from `source`
    pub fn new<R: BufRead>(source: R) -> Result<Self, MzXMLParserError> {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        let mut buffer = Vec::new();
        let mut accumulator = RunBuilder::default();
        let mut state = MzXMLParserState::Start;

        loop {
            let result = match reader.read_event_into(&mut buffer) {
                Ok(Event::Start(ref e)) => accumulator.start_element(e, state),
                Ok(Event::Empty(ref e)) => accumulator.start_element(e, state).and_then(|state| {
                    let end = e.to_end();
                    accumulator.end_element(&end, state)
                }),
                Ok(Event::End(ref e)) => accumulator.end_element(e, state),
                Ok(Event::Text(ref e)) => accumulator.text(e, state),
                Ok(Event::Eof) => break,
                Ok(_) => Ok(state),
                Err(XMLError::Io(e)) => Err(MzXMLParserError::IOError(
                    state,
                    io::Error::new(e.kind(), e.to_string()),
                )),
                Err(e) => Err(MzXMLParserError::XMLError(state, e)),
            };
            state = match result {
                Ok(state) => state,
                Err(e) => {
                    log::error!("Failed to parse mzXML document: {e}");
                    return Err(e);
                }
            };
            buffer.clear();
        }

        if !accumulator.scan_stack.is_empty() {
            return Err(MzXMLParserError::IncompleteDocument(state));
        }
        debug!("Read {} scans", accumulator.scans.len());
        if let Some(declared) = accumulator.scan_count {
            if declared != accumulator.scans.len() {
                warn!(
                    "The run declared {declared} scans but {} were read",
                    accumulator.scans.len()
                );
            }
        }
        let scan_count = accumulator.scan_count;
        let start_time = accumulator.start_time.take();
        let end_time = accumulator.end_time.take();
        Ok(Self {
            scans: accumulator.into_ordered_scans(),
            scan_count,
            start_time,
            end_time,
        })
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, MzXMLParserError> {
        let handle = fs::File::open(path.as_ref())
            .map_err(|e| MzXMLParserError::IOError(MzXMLParserState::Start, e))?;
        Self::new(BufReader::new(handle))
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn get(&self, num: u32) -> Option<&Scan> {
        self.scans.get(&num)
    }

    /// Iterate over the scans in document order
    pub fn iter(&self) -> impl Iterator<Item = &Scan> {
        self.scans.values()
    }
}

impl ScanSource for MzXMLReader {
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::mzxml::MzXMLWriter;
    use crate::spectrum::ScanPolarity;
    use std::io::prelude::*;

    const NESTED: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<mzXML xmlns="http://sashimi.sourceforge.net/schema_revision/mzXML_2.1">
  <msRun scanCount="2" startTime="PT0.5S" endTime="PT1S">
    <scan num="1" msLevel="1" peaksCount="1" polarity="+" retentionTime="PT0.5S" centroided="true" ionisationEnergy="70">
      <peaks precision="32" byteOrder="network" pairOrder="m/z-int">QsgAAEJIAAA=</peaks>
      <scan num="2" msLevel="2" peaksCount="0" collisionEnergy="35">
        <precursorMz precursorScanNum="1" precursorIntensity="1200.5" precursorCharge="2" activationMethod="CID">
          445.12
        </precursorMz>
        <peaks precision="32" byteOrder="network" pairOrder="m/z-int"></peaks>
      </scan>
    </scan>
  </msRun>
</mzXML>
"#;

    #[test_log::test]
    fn test_nested_layout() -> Result<(), MzXMLParserError> {
        let mut reader = MzXMLReader::new(NESTED.as_bytes())?;
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.scan_count, Some(2));
        assert_eq!(reader.start_time.as_deref(), Some("PT0.5S"));
        assert_eq!(reader.max_scan_id(), 2);

        let order: Vec<u32> = reader.iter().map(|s| s.num()).collect();
        assert_eq!(order, vec![1, 2]);

        let ms1 = reader.get(1).unwrap();
        assert_eq!(ms1.header.polarity, Some(ScanPolarity::Positive));
        assert_eq!(ms1.header.centroided, Some(true));
        assert_eq!(ms1.header.ionization_energy, Some(70.0));
        assert_eq!(ms1.peaks.mzs(), &[100.0]);
        assert_eq!(ms1.peaks.intensities(), &[50.0]);

        let ms2 = reader.header(2).unwrap().unwrap();
        assert_eq!(ms2.ms_level, 2);
        assert_eq!(ms2.peaks_count, 0);
        assert_eq!(ms2.collision_energy, Some(35.0));
        let precursor = ms2.precursor().unwrap();
        assert_eq!(precursor.mz, 445.12);
        assert_eq!(precursor.scan_num, Some(1));
        assert_eq!(precursor.intensity, Some(1200.5));
        assert_eq!(precursor.charge, Some(2));
        assert_eq!(precursor.activation_method.as_deref(), Some("CID"));
        Ok(())
    }

    #[test]
    fn test_invalid_documents() {
        let bad_attribute = r#"<mzXML><msRun><scan num="x" msLevel="1"></scan></msRun></mzXML>"#;
        assert!(matches!(
            MzXMLReader::new(bad_attribute.as_bytes()),
            Err(MzXMLParserError::InvalidAttribute(MzXMLParserState::MsRun, _, _))
        ));
        let bad_peaks = r#"<mzXML><msRun><scan num="1" msLevel="1"><peaks precision="32">QsgA</peaks></scan></msRun></mzXML>"#;
        assert!(matches!(
            MzXMLReader::new(bad_peaks.as_bytes()),
            Err(MzXMLParserError::PeakDecodingError(1, _))
        ));
        let missing_num = r#"<mzXML><msRun><scan msLevel="1"></scan></msRun></mzXML>"#;
        assert!(matches!(
            MzXMLReader::new(missing_num.as_bytes()),
            Err(MzXMLParserError::MissingAttribute(_, _))
        ));
    }

    #[test_log::test]
    fn test_read_written_file() -> io::Result<()> {
        let source = MzXMLReader::new(NESTED.as_bytes())?;
        let mut tmpfile = tempfile::NamedTempFile::new()?;
        {
            let mut writer = MzXMLWriter::new(tmpfile.as_file_mut());
            writer.set_scan_count(source.len());
            for scan in source.iter() {
                writer.write_scan(scan)?;
            }
            writer.close()?;
            writer.into_inner()?.flush()?;
        }

        let dup = MzXMLReader::open_path(tmpfile.path())?;
        assert_eq!(dup.len(), 2);
        for (a, b) in source.iter().zip(dup.iter()) {
            assert_eq!(a.header.num, b.header.num);
            assert_eq!(a.header.retention_time, b.header.retention_time);
            assert_eq!(a.header.ionization_energy, b.header.ionization_energy);
            assert_eq!(a.header.collision_energy, b.header.collision_energy);
            assert_eq!(a.header.precursor, b.header.precursor);
            assert_eq!(a.peaks, b.peaks);
        }
        Ok(())
    }
}
