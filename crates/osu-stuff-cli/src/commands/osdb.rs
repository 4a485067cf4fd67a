use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use osu_stuff_formats::{
    CatalogFile, CollectionsFile, OsdbCollection, OsdbFile, OsdbVersion,
};
use tracing::info;

use crate::output::{OutputStyle, format_success, print_json};
use crate::{CommandContext, read_file};

/// Convert the selected collections, filling in metadata when a catalog is given
pub fn build_osdb(
    collections: &CollectionsFile,
    catalog: Option<&CatalogFile>,
    names: &[String],
    version: OsdbVersion,
) -> anyhow::Result<OsdbFile> {
    for name in names {
        if collections.get(name).is_none() {
            bail!("no collection named {name:?}");
        }
    }

    let selected = collections
        .collections
        .iter()
        .filter(|c| names.is_empty() || names.iter().any(|n| n == c.name()));
    let osdb_collections = selected
        .map(|collection| match catalog {
            Some(catalog) => OsdbCollection::from_collection_in(collection, catalog),
            None => OsdbCollection::from_collection(collection),
        })
        .collect();

    Ok(OsdbFile {
        version,
        save_date: unix_millis(),
        last_editor: "osu-stuff".to_string(),
        collections: osdb_collections,
    })
}

/// Merge `.osdb` collections into a collection list by name
///
/// Returns how many checksums were added.
pub fn merge_osdb(target: &mut CollectionsFile, osdb: &OsdbFile) -> usize {
    let mut added = 0;
    for incoming in osdb.to_collections() {
        match target.get_mut(incoming.name()) {
            Some(existing) => {
                for checksum in incoming.iter_checksums() {
                    if existing.push(checksum) {
                        added += 1;
                    }
                }
            }
            None => {
                added += incoming.len();
                target.insert(incoming);
            }
        }
    }
    added
}

fn unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

pub fn handle_export(
    context: &CommandContext,
    collections_path: &Path,
    output: &Path,
    version: OsdbVersion,
    db: Option<PathBuf>,
    names: &[String],
) -> anyhow::Result<()> {
    let collections = CollectionsFile::decode(&read_file(collections_path)?)?;
    let catalog = match db {
        Some(path) => Some(CatalogFile::decode(&read_file(&path)?)?),
        None => None,
    };

    let osdb = build_osdb(&collections, catalog.as_ref(), names, version)?;
    let mut bytes = Vec::new();
    osdb.encode(&mut bytes)?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!("Wrote {} collections to {}", osdb.collections.len(), output.display());

    if context.format.is_json() {
        return print_json(
            &serde_json::json!({
                "output": output.display().to_string(),
                "format": version.as_str(),
                "collections": osdb.collections.len(),
                "bytes": bytes.len(),
            }),
            context.format,
        );
    }
    println!(
        "{}",
        format_success(
            &format!(
                "Exported {} collections to {} ({})",
                osdb.collections.len(),
                output.display(),
                version
            ),
            &OutputStyle::new()
        )
    );
    Ok(())
}

pub fn handle_import(
    context: &CommandContext,
    input: &Path,
    collections_path: &Path,
) -> anyhow::Result<()> {
    let osdb = OsdbFile::decode(&read_file(input)?)?;
    let mut collections = if collections_path.exists() {
        CollectionsFile::decode(&read_file(collections_path)?)?
    } else {
        CollectionsFile::default()
    };

    let added = merge_osdb(&mut collections, &osdb);
    let mut bytes = Vec::new();
    collections.encode(&mut bytes)?;
    std::fs::write(collections_path, &bytes)
        .with_context(|| format!("failed to write {}", collections_path.display()))?;
    info!("Added {} checksums to {}", added, collections_path.display());

    if context.format.is_json() {
        return print_json(
            &serde_json::json!({
                "collections": collections.len(),
                "added": added,
            }),
            context.format,
        );
    }
    println!(
        "{}",
        format_success(
            &format!(
                "Imported {} collections, {} new checksums",
                osdb.collections.len(),
                added
            ),
            &OutputStyle::new()
        )
    );
    Ok(())
}
