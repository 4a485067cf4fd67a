//! Beatmaps referenced by collections but absent from the catalog

use std::collections::HashSet;

use crate::catalog::CatalogFile;
use crate::collections::{CollectionRecord, CollectionsFile};

/// Whether `value` looks like an MD5 hex digest
pub fn is_checksum(value: &str) -> bool {
    value.len() == 32 && hex::decode(value).is_ok()
}

/// Missing checksums of one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCollection {
    pub name: String,
    pub checksums: Vec<String>,
}

/// Checksums of `collection` the catalog does not know, in first-seen order
pub fn missing_checksums(catalog: &CatalogFile, collection: &CollectionRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    collection
        .iter_checksums()
        .filter(|checksum| !checksum.is_empty() && !catalog.contains(checksum))
        .filter(|checksum| seen.insert(*checksum))
        .map(str::to_string)
        .collect()
}

/// Missing checksums for every collection that has any
pub fn missing_by_collection(
    catalog: &CatalogFile,
    collections: &CollectionsFile,
) -> Vec<MissingCollection> {
    collections
        .collections
        .iter()
        .filter_map(|collection| {
            let checksums = missing_checksums(catalog, collection);
            (!checksums.is_empty()).then(|| MissingCollection {
                name: collection.name().to_string(),
                checksums,
            })
        })
        .collect()
}
