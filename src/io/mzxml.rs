//! Implements a reader and an indexed writer for the mzXML format
//! for representing raw and processed mass spectra.

pub mod binary;
pub mod reader;
pub mod writer;

pub use crate::io::mzxml::binary::{decode_peaks, encode_peaks, ByteOrder, PeaksEncoding};
pub use crate::io::mzxml::reader::{MzXMLParserError, MzXMLParserState, MzXMLReader, ParserResult};
pub use crate::io::mzxml::writer::{
    MzXMLWriter, MzXMLWriterError, MzXMLWriterState, ScanNumberRemap, WriterResult,
};
