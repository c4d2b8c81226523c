#[allow(unused)]
use std::io::prelude::*;

use indexmap::map::Iter;
use indexmap::IndexMap;

/**
An ordered mapping from scan number to the byte offset of that scan's
element in the file it resides in.

A wrapper around [`indexmap::IndexMap`].
*/
#[derive(Default, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OffsetIndex {
    /// The name of the index, written as the `name` attribute of `<index>`
    pub name: String,

    /// The mapping from scan number to byte offset, ordered by occurrence
    #[cfg_attr(feature = "serde", serde(with = "indexmap::map::serde_seq"))]
    pub offsets: IndexMap<u32, u64>,
}

impl OffsetIndex {
    pub fn new(name: String) -> OffsetIndex {
        OffsetIndex {
            name,
            ..Default::default()
        }
    }

    /// Insert `key` into the index with an offset value
    #[inline]
    pub fn insert(&mut self, key: u32, offset: u64) -> Option<u64> {
        self.offsets.insert(key, offset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Iterate over the keys and offsets
    pub fn iter(&self) -> Iter<'_, u32, u64> {
        self.offsets.iter()
    }

    #[cfg(feature = "serde")]
    /// Write the index out in JSON format to `writer`
    pub fn to_writer<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    #[cfg(feature = "serde")]
    /// Read an index in JSON format from `reader`
    pub fn from_reader<R: Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ordering() {
        let mut index = OffsetIndex::new("scan".into());
        assert!(index.is_empty());
        index.insert(2, 500);
        index.insert(1, 100);
        assert_eq!(index.insert(2, 600), Some(500));
        assert_eq!(index.len(), 2);
        let pairs: Vec<(u32, u64)> = index.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(pairs, vec![(2, 600), (1, 100)]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_round_trip() -> serde_json::Result<()> {
        let mut index = OffsetIndex::new("scan".into());
        index.insert(1, 250);
        index.insert(2, 1250);
        let mut buffer = Vec::new();
        index.to_writer(&mut buffer)?;
        let dup = OffsetIndex::from_reader(buffer.as_slice())?;
        assert_eq!(index, dup);
        Ok(())
    }
}
