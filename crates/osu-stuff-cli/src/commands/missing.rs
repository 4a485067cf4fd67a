use std::path::PathBuf;

use anyhow::anyhow;
use osu_stuff_formats::{
    CatalogFile, CollectionsFile, MissingCollection, missing_by_collection, missing_checksums,
};

use crate::output::{OutputStyle, format_count_badge, format_success, print_json, print_section_header};
use crate::{CommandContext, read_file};

/// Decode the catalog and collection list and diff them
pub fn find_missing(
    catalog: &CatalogFile,
    collections: &CollectionsFile,
    name: Option<&str>,
) -> anyhow::Result<Vec<MissingCollection>> {
    match name {
        Some(name) => {
            let collection = collections
                .get(name)
                .ok_or_else(|| anyhow!("no collection named {name:?}"))?;
            let checksums = missing_checksums(catalog, collection);
            Ok(if checksums.is_empty() {
                Vec::new()
            } else {
                vec![MissingCollection {
                    name: name.to_string(),
                    checksums,
                }]
            })
        }
        None => Ok(missing_by_collection(catalog, collections)),
    }
}

/// Load both library files named by the arguments or the osu! directory
pub fn load_library(
    context: &CommandContext,
    db: Option<PathBuf>,
    collections: Option<PathBuf>,
) -> anyhow::Result<(PathBuf, Vec<u8>, CollectionsFile)> {
    let db = context.library_file(db, "osu!.db")?;
    let collections = context.library_file(collections, "collection.db")?;
    let catalog_bytes = read_file(&db)?;
    let collections = CollectionsFile::decode(&read_file(&collections)?)?;
    Ok((db, catalog_bytes, collections))
}

pub fn handle(
    context: &CommandContext,
    db: Option<PathBuf>,
    collections: Option<PathBuf>,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let (_, catalog_bytes, collections) = load_library(context, db, collections)?;
    let catalog = CatalogFile::decode(&catalog_bytes)?;
    let missing = find_missing(&catalog, &collections, name)?;

    if context.format.is_json() {
        let value: Vec<_> = missing
            .iter()
            .map(|m| serde_json::json!({ "name": m.name, "checksums": m.checksums }))
            .collect();
        return print_json(&value, context.format);
    }

    let style = OutputStyle::new();
    if missing.is_empty() {
        println!("{}", format_success("Nothing is missing", &style));
        return Ok(());
    }
    for collection in &missing {
        print_section_header(
            &format!(
                "{} {}",
                collection.name,
                format_count_badge(collection.checksums.len(), "beatmap", &style)
            ),
            &style,
        );
        for checksum in &collection.checksums {
            println!("{checksum}");
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use osu_stuff_formats::{BeatmapRecord, CollectionRecord};

    const KNOWN: &str = "0123456789abcdef0123456789abcdef";
    const UNKNOWN: &str = "fedcba9876543210fedcba9876543210";

    fn library() -> (CatalogFile, CollectionsFile) {
        let mut catalog = CatalogFile::new(20250107);
        catalog.insert(BeatmapRecord {
            checksum: Some(KNOWN.to_string()),
            ..BeatmapRecord::default()
        });
        let mut collections = CollectionsFile::default();
        collections.insert(CollectionRecord::new("complete", [KNOWN]));
        collections.insert(CollectionRecord::new("partial", [KNOWN, UNKNOWN]));
        (catalog, collections)
    }

    #[test]
    fn test_find_missing_all() {
        let (catalog, collections) = library();
        let missing = find_missing(&catalog, &collections, None).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "partial");
        assert_eq!(missing[0].checksums, vec![UNKNOWN.to_string()]);
    }

    #[test]
    fn test_find_missing_by_name() {
        let (catalog, collections) = library();
        assert!(find_missing(&catalog, &collections, Some("complete")).unwrap().is_empty());
        assert_eq!(
            find_missing(&catalog, &collections, Some("partial")).unwrap()[0].checksums.len(),
            1
        );
        assert!(find_missing(&catalog, &collections, Some("nope")).is_err());
    }
}
