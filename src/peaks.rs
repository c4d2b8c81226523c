//! Peak lists and the arithmetic for combining them
pub mod merge;
pub mod peak_list;

pub use crate::peaks::merge::{merge_centroid, merge_profile};
pub use crate::peaks::peak_list::PeakList;
