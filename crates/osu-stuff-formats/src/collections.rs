//! Collection list (`collection.db`)
//!
//! A version number, a collection count and, per collection, a name and a
//! list of beatmap checksums. Strings use the same marker-prefixed encoding
//! as the catalog and absent strings are kept absent on rewrite.

use std::io::Write;

use tracing::{debug, info};

use crate::binary::{ByteCursor, ByteWriter};
use crate::error::{CodecError, Result};

/// Version written by current stable clients
pub const DEFAULT_COLLECTIONS_VERSION: u32 = 20240820;

/// A named list of beatmap checksums
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionRecord {
    pub name: Option<String>,
    pub checksums: Vec<Option<String>>,
}

impl CollectionRecord {
    pub fn new<I, S>(name: impl Into<String>, checksums: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: Some(name.into()),
            checksums: checksums.into_iter().map(|c| Some(c.into())).collect(),
        }
    }

    /// Name, empty when absent
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Present checksums in stored order
    pub fn iter_checksums(&self) -> impl Iterator<Item = &str> {
        self.checksums.iter().filter_map(Option::as_deref)
    }

    pub fn len(&self) -> usize {
        self.checksums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }

    pub fn contains(&self, checksum: &str) -> bool {
        self.iter_checksums().any(|c| c == checksum)
    }

    /// Append a checksum unless it is already listed
    pub fn push(&mut self, checksum: impl Into<String>) -> bool {
        let checksum = checksum.into();
        if self.contains(&checksum) {
            return false;
        }
        self.checksums.push(Some(checksum));
        true
    }

    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let name = cursor.read_string()?;
        let count = cursor.read_u32()? as usize;
        let mut checksums = Vec::with_capacity(count.min(cursor.remaining()));
        for _ in 0..count {
            checksums.push(cursor.read_string()?);
        }
        Ok(Self { name, checksums })
    }

    fn write(&self, writer: &mut ByteWriter) {
        writer.write_string(self.name.as_deref());
        writer.write_u32(self.checksums.len() as u32);
        for checksum in &self.checksums {
            writer.write_string(checksum.as_deref());
        }
    }
}

/// Decoded collection list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionsFile {
    pub version: u32,
    pub collections: Vec<CollectionRecord>,
}

impl Default for CollectionsFile {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTIONS_VERSION)
    }
}

impl CollectionsFile {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            collections: Vec::new(),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let version = cursor.read_u32()?;
        let count = cursor.read_u32()? as usize;

        let mut collections = Vec::with_capacity(count.min(cursor.remaining() / 5));
        for _ in 0..count {
            collections.push(CollectionRecord::read(&mut cursor)?);
        }

        if !cursor.is_empty() {
            debug!(
                trailing = cursor.remaining(),
                "Collection list has trailing bytes"
            );
        }

        info!(version, collections = collections.len(), "Decoded collection list");
        Ok(Self {
            version,
            collections,
        })
    }

    /// Encode into a fresh buffer
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u32(self.version);
        writer.write_u32(self.collections.len() as u32);
        for collection in &self.collections {
            collection.write(&mut writer);
        }
        writer.into_inner()
    }

    pub fn encode<W: Write>(&self, output: &mut W) -> Result<usize> {
        let bytes = self.encode_to_vec();
        output.write_all(&bytes)?;
        Ok(bytes.len())
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(CollectionRecord::name)
    }

    pub fn get(&self, name: &str) -> Option<&CollectionRecord> {
        self.collections.iter().find(|c| c.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CollectionRecord> {
        self.collections.iter_mut().find(|c| c.name() == name)
    }

    /// Insert or replace the collection with the same name
    pub fn insert(&mut self, collection: CollectionRecord) -> Option<CollectionRecord> {
        match self.get_mut(collection.name()) {
            Some(existing) => Some(std::mem::replace(existing, collection)),
            None => {
                self.collections.push(collection);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<CollectionRecord> {
        let position = self.collections.iter().position(|c| c.name() == name)?;
        Some(self.collections.remove(position))
    }

    /// Rename a collection; fails when `to` is already taken
    pub fn rename(&mut self, from: &str, to: &str) -> Result<bool> {
        if from != to && self.get(to).is_some() {
            return Err(CodecError::DuplicateCollection(to.to_string()));
        }
        match self.get_mut(from) {
            Some(collection) => {
                collection.name = Some(to.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Merge `sources` into a collection named `target`
    ///
    /// Checksums keep first-seen order and are not repeated. The source
    /// collections stay in place.
    pub fn merge(&mut self, target: &str, sources: &[&str]) -> usize {
        let mut merged = self
            .get(target)
            .cloned()
            .unwrap_or_else(|| CollectionRecord::new(target, Vec::<String>::new()));

        let before = merged.len();
        for source in sources {
            let Some(collection) = self.get(source) else {
                continue;
            };
            for checksum in collection.iter_checksums() {
                merged.push(checksum);
            }
        }

        let added = merged.len() - before;
        self.insert(merged);
        added
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> CollectionsFile {
        let mut file = CollectionsFile::new(20240820);
        file.insert(CollectionRecord::new("farm", ["a", "b"]));
        file.insert(CollectionRecord::new("tech", ["b", "c"]));
        file
    }

    #[test]
    fn test_wire_layout() {
        let mut file = CollectionsFile::new(1);
        file.insert(CollectionRecord::new("x", ["ab"]));
        assert_eq!(
            file.encode_to_vec(),
            vec![
                1, 0, 0, 0, // version
                1, 0, 0, 0, // collection count
                0x0B, 1, b'x', // name
                1, 0, 0, 0, // checksum count
                0x0B, 2, b'a', b'b',
            ]
        );
    }

    #[test]
    fn test_absent_strings_survive() {
        let data = [
            1, 0, 0, 0, 1, 0, 0, 0, // header
            0x00, // absent name
            2, 0, 0, 0, 0x00, 0x0B, 0x00,
        ];
        let file = CollectionsFile::decode(&data).unwrap();
        assert_eq!(file.collections[0].name, None);
        assert_eq!(file.collections[0].checksums, vec![None, Some(String::new())]);
        assert_eq!(file.encode_to_vec(), data.to_vec());
    }

    #[test]
    fn test_truncated_collection() {
        let data = [1, 0, 0, 0, 2, 0, 0, 0, 0x0B, 1, b'x', 0, 0, 0, 0];
        assert!(matches!(
            CollectionsFile::decode(&data),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_insert_replaces_by_name() {
        let mut file = sample();
        let old = file.insert(CollectionRecord::new("farm", ["z"]));
        assert_eq!(old.unwrap().len(), 2);
        assert_eq!(file.len(), 2);
        assert!(file.get("farm").unwrap().contains("z"));
    }

    #[test]
    fn test_rename_and_remove() {
        let mut file = sample();
        assert!(file.rename("farm", "aim").unwrap());
        assert!(!file.rename("missing", "other").unwrap());
        assert!(matches!(
            file.rename("aim", "tech"),
            Err(CodecError::DuplicateCollection(name)) if name == "tech"
        ));

        assert_eq!(file.names().collect::<Vec<_>>(), vec!["aim", "tech"]);
        assert!(file.remove("aim").is_some());
        assert!(file.remove("aim").is_none());
    }

    #[test]
    fn test_merge_unions_checksums() {
        let mut file = sample();
        let added = file.merge("all", &["farm", "tech", "nope"]);
        assert_eq!(added, 3);

        let all = file.get("all").unwrap();
        assert_eq!(all.iter_checksums().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(file.get("farm").unwrap().len(), 2);

        assert_eq!(file.merge("farm", &["tech"]), 1);
        assert_eq!(file.get("farm").unwrap().len(), 3);
    }
}
