pub mod mzxml;
mod offset_index;
pub mod traits;
pub(crate) mod utils;

pub use crate::io::mzxml::{MzXMLParserError, MzXMLReader, MzXMLWriter, MzXMLWriterError};
pub use crate::io::offset_index::OffsetIndex;
pub use crate::io::traits::{MemoryScanSource, ScanAccessError, ScanSource};
