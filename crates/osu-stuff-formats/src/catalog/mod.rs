//! Beatmap catalog (`osu!.db`)
//!
//! The catalog is a header, a run of [`BeatmapRecord`]s and a permission
//! trailer. Decoding keeps track of the byte span of every record and of
//! the whole record region, so [`CatalogFile::encode`] can rebuild a file
//! by copying untouched records from the original buffer, cutting out
//! removed ones and appending records that were added in memory.
//!
//! ```no_run
//! use osu_stuff_formats::catalog::CatalogFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let original = std::fs::read("osu!.db")?;
//! let mut catalog = CatalogFile::decode(&original)?;
//! catalog.remove("d41d8cd98f00b204e9800998ecf8427e");
//!
//! let mut output = Vec::new();
//! catalog.encode(&original, &mut output)?;
//! # Ok(())
//! # }
//! ```

mod beatmap;
mod database;
mod status;

pub use beatmap::{BeatmapRecord, RecordSpan, StarRating, TimingPoint};
pub use database::{CatalogDatabase, SharedCatalog};
pub use status::{BeatmapStatus, Permission, Ruleset};

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::ops::{Range, RangeInclusive};

use tracing::{debug, info, warn};

use crate::binary::{ByteCursor, ByteWriter};
use crate::error::{CodecError, Result};

/// First version storing difficulty values as f32 instead of bytes
pub const VERSION_FLOAT_DIFFICULTY: u32 = 20140609;

/// First version without the per-record size prefix
pub const VERSION_NO_ENTRY_SIZE: u32 = 20191106;

/// First version storing star ratings as typed value pairs
pub const VERSION_TYPED_STAR_RATINGS: u32 = 20250107;

/// Versions that look like a `yyyymmdd` date
pub const SUPPORTED_VERSIONS: RangeInclusive<u32> = 20_000_000..=99_999_999;

/// Controls how strictly the catalog header is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject versions outside [`SUPPORTED_VERSIONS`] instead of warning
    pub strict: bool,
}

impl DecodeOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn lenient() -> Self {
        Self { strict: false }
    }
}

/// A record that was removed or rewritten since decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    pub checksum: Option<String>,
    pub record_start: Option<usize>,
    pub record_end: Option<usize>,
}

impl RecordDescriptor {
    pub fn new(checksum: Option<String>, record_start: Option<usize>, record_end: Option<usize>) -> Self {
        Self {
            checksum,
            record_start,
            record_end,
        }
    }

    fn span(&self) -> Result<RecordSpan> {
        match (self.record_start, self.record_end) {
            (Some(start), Some(end)) if start <= end => Ok(RecordSpan { start, end }),
            (start, end) => Err(CodecError::invalid_range(self.checksum.as_deref(), start, end)),
        }
    }
}

impl RecordDescriptor {
    fn describe(record: &BeatmapRecord, span: Option<RecordSpan>) -> Self {
        Self {
            checksum: record.checksum.clone(),
            record_start: span.map(|span| span.start),
            record_end: span.map(|span| span.end),
        }
    }
}

/// Difficulties sharing a beatmapset id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beatmapset {
    pub id: i32,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub creator: Option<String>,
    pub checksums: Vec<String>,
}

/// Decoded beatmap catalog
#[derive(Debug, Clone, Default)]
pub struct CatalogFile {
    pub version: u32,
    pub folder_count: u32,
    pub account_unlocked: bool,
    /// .NET ticks
    pub last_unlocked: u64,
    pub player_name: Option<String>,
    pub permission: Permission,
    records: Vec<BeatmapRecord>,
    /// Source span per record, `None` for records built in memory
    spans: Vec<Option<RecordSpan>>,
    index: HashMap<String, usize>,
    region: Option<Range<usize>>,
    changes: Vec<RecordDescriptor>,
}

impl CatalogFile {
    /// Create an empty catalog for the given version
    pub fn new(version: u32) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Decode a whole catalog, warning on unexpected versions
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_with(data, DecodeOptions::default())
    }

    /// Decode a whole catalog with explicit options
    pub fn decode_with(data: &[u8], options: DecodeOptions) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);

        let version = cursor.read_u32()?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            if options.strict {
                return Err(CodecError::VersionUnsupported(version));
            }
            warn!(version, "Unexpected catalog version, decoding with nearest layout");
        }

        let folder_count = cursor.read_u32()?;
        let account_unlocked = cursor.read_bool()?;
        let last_unlocked = cursor.read_u64()?;
        let player_name = cursor.read_string()?;
        let count = cursor.read_u32()? as usize;

        let region_start = cursor.offset();
        // Records are never shorter than 32 bytes
        let capacity = count.min(cursor.remaining() / 32);
        let mut records = Vec::with_capacity(capacity);
        let mut spans = Vec::with_capacity(capacity);
        for _ in 0..count {
            let start = cursor.offset();
            records.push(BeatmapRecord::decode(&mut cursor, version)?);
            spans.push(Some(RecordSpan {
                start,
                end: cursor.offset(),
            }));
        }
        let region_end = cursor.offset();

        let permission = Permission::from_id(cursor.read_u32()?);
        if !cursor.is_empty() {
            debug!(
                trailing = cursor.remaining(),
                "Catalog has bytes after the permission field"
            );
        }

        let mut catalog = Self {
            version,
            folder_count,
            account_unlocked,
            last_unlocked,
            player_name,
            permission,
            records,
            spans,
            index: HashMap::new(),
            region: Some(region_start..region_end),
            changes: Vec::new(),
        };
        catalog.rebuild_index();

        info!(
            version,
            beatmaps = catalog.records.len(),
            player = catalog.player_name.as_deref().unwrap_or_default(),
            "Decoded beatmap catalog"
        );

        Ok(catalog)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, record) in self.records.iter().enumerate() {
            if let Some(checksum) = &record.checksum {
                self.index.insert(checksum.clone(), i);
            }
        }
    }

    /// Number of records, the value written as the header's beatmap count
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in catalog order
    pub fn records(&self) -> &[BeatmapRecord] {
        &self.records
    }

    pub fn get(&self, checksum: &str) -> Option<&BeatmapRecord> {
        self.index.get(checksum).map(|&i| &self.records[i])
    }

    pub fn contains(&self, checksum: &str) -> bool {
        self.index.contains_key(checksum)
    }

    /// Source spans in catalog order, `None` for records built in memory
    pub fn spans(&self) -> &[Option<RecordSpan>] {
        &self.spans
    }

    /// Span of the record with `checksum` in the decoded buffer
    pub fn span(&self, checksum: &str) -> Option<RecordSpan> {
        self.index.get(checksum).and_then(|&i| self.spans[i])
    }

    /// Byte range of the record region in the decoded buffer
    pub fn beatmap_region(&self) -> Option<Range<usize>> {
        self.region.clone()
    }

    /// Removals and rewrites recorded since decoding
    pub fn pending_changes(&self) -> &[RecordDescriptor] {
        &self.changes
    }

    /// Add a record built in memory; it is appended on the next encode
    ///
    /// A record with the same checksum is replaced.
    pub fn insert(&mut self, record: BeatmapRecord) {
        if let Some(checksum) = record.checksum.clone() {
            if self.remove(&checksum).is_some() {
                debug!(checksum = %checksum, "Replaced existing catalog record");
            }
        }
        if let Some(checksum) = &record.checksum {
            self.index.insert(checksum.clone(), self.records.len());
        }
        self.records.push(record);
        self.spans.push(None);
    }

    /// Remove a record, returning the descriptor used to cut it out on encode
    pub fn remove(&mut self, checksum: &str) -> Option<RecordDescriptor> {
        let position = self.index.remove(checksum)?;
        let record = self.records.remove(position);
        let span = self.spans.remove(position);
        for i in self.index.values_mut() {
            if *i > position {
                *i -= 1;
            }
        }

        let descriptor = RecordDescriptor::describe(&record, span);
        if span.is_some() {
            self.changes.push(descriptor.clone());
        }
        Some(descriptor)
    }

    /// Remove every record whose checksum is in `checksums` in one pass
    ///
    /// Returns the descriptors of the removed records in catalog order.
    pub fn remove_all<'a, I>(&mut self, checksums: I) -> Vec<RecordDescriptor>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let doomed: HashSet<&str> = checksums.into_iter().collect();
        if doomed.is_empty() {
            return Vec::new();
        }

        let mut removed = Vec::new();
        let mut kept_records = Vec::with_capacity(self.records.len());
        let mut kept_spans = Vec::with_capacity(self.spans.len());
        for (record, span) in self.records.drain(..).zip(self.spans.drain(..)) {
            if record.checksum.as_deref().is_some_and(|c| doomed.contains(c)) {
                let descriptor = RecordDescriptor::describe(&record, span);
                if span.is_some() {
                    self.changes.push(descriptor.clone());
                }
                removed.push(descriptor);
            } else {
                kept_records.push(record);
                kept_spans.push(span);
            }
        }
        self.records = kept_records;
        self.spans = kept_spans;
        self.rebuild_index();

        debug!(removed = removed.len(), "Removed catalog records");
        removed
    }

    /// Edit a record in place
    ///
    /// A record that came from the original buffer is cut out of its old
    /// position and written fresh at the end of the record region.
    pub fn update<F>(&mut self, checksum: &str, edit: F) -> bool
    where
        F: FnOnce(&mut BeatmapRecord),
    {
        let Some(&position) = self.index.get(checksum) else {
            return false;
        };
        let record = &mut self.records[position];
        if let Some(span) = self.spans[position].take() {
            self.changes.push(RecordDescriptor::describe(record, Some(span)));
        }
        edit(record);
        if record.checksum.as_deref() != Some(checksum) {
            self.rebuild_index();
        }
        true
    }

    /// Group records by beatmapset id in first-seen order
    pub fn beatmapsets(&self) -> Vec<Beatmapset> {
        let mut positions: HashMap<i32, usize> = HashMap::new();
        let mut sets: Vec<Beatmapset> = Vec::new();

        for record in &self.records {
            let position = *positions.entry(record.beatmapset_id).or_insert_with(|| {
                sets.push(Beatmapset {
                    id: record.beatmapset_id,
                    artist: record.artist.clone(),
                    title: record.title.clone(),
                    creator: record.creator.clone(),
                    checksums: Vec::new(),
                });
                sets.len() - 1
            });
            if let Some(checksum) = &record.checksum {
                sets[position].checksums.push(checksum.clone());
            }
        }

        sets
    }

    fn write_header(&self, writer: &mut ByteWriter) {
        writer.write_u32(self.version);
        writer.write_u32(self.folder_count);
        writer.write_bool(self.account_unlocked);
        writer.write_u64(self.last_unlocked);
        writer.write_string(self.player_name.as_deref());
        writer.write_u32(self.records.len() as u32);
    }

    /// Encode against the original buffer using the recorded changes
    pub fn encode<W: Write>(&self, original: &[u8], output: &mut W) -> Result<usize> {
        self.encode_with(original, &self.changes, output)
    }

    /// Encode against the original buffer with an explicit change list
    ///
    /// Bytes of untouched records are copied verbatim, the spans named by
    /// `modified` are cut out and records without a span are encoded and
    /// appended after the copied region. The permission trailer is copied
    /// from `original`. Without changes the output equals `original`.
    pub fn encode_with<W: Write>(
        &self,
        original: &[u8],
        modified: &[RecordDescriptor],
        output: &mut W,
    ) -> Result<usize> {
        let Some(region) = self.region.clone() else {
            return self.encode_fresh(output);
        };
        if original.len() < region.end {
            return Err(CodecError::truncated(
                region.end,
                region.end,
                original.len(),
            ));
        }

        let mut spans = modified
            .iter()
            .map(|descriptor| descriptor.span().map(|span| (span, descriptor)))
            .collect::<Result<Vec<_>>>()?;
        spans.sort_by_key(|(span, _)| span.start);

        let mut writer = ByteWriter::with_capacity(original.len());
        self.write_header(&mut writer);

        let mut cut = region.start;
        for (span, descriptor) in spans {
            if span.start < cut || span.end > region.end {
                return Err(CodecError::invalid_range(
                    descriptor.checksum.as_deref(),
                    descriptor.record_start,
                    descriptor.record_end,
                ));
            }
            writer.write_bytes(&original[cut..span.start]);
            cut = span.end;
        }
        writer.write_bytes(&original[cut..region.end]);

        let mut appended = 0usize;
        let fresh = self
            .records
            .iter()
            .zip(&self.spans)
            .filter_map(|(record, span)| span.is_none().then_some(record));
        for record in fresh {
            record.encode(&mut writer, self.version)?;
            appended += 1;
        }

        writer.write_bytes(&original[region.end..]);

        debug!(
            removed = modified.len(),
            appended,
            bytes = writer.len(),
            "Encoded beatmap catalog"
        );

        output.write_all(writer.as_slice())?;
        Ok(writer.len())
    }

    /// Encode every record from memory without an original buffer
    pub fn encode_fresh<W: Write>(&self, output: &mut W) -> Result<usize> {
        let mut writer = ByteWriter::new();
        self.write_header(&mut writer);
        for record in &self.records {
            record.encode(&mut writer, self.version)?;
        }
        writer.write_u32(self.permission.id());

        output.write_all(writer.as_slice())?;
        Ok(writer.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(checksum: &str, set: i32) -> BeatmapRecord {
        BeatmapRecord {
            checksum: Some(checksum.to_string()),
            beatmapset_id: set,
            title: Some(format!("set {set}")),
            ..BeatmapRecord::default()
        }
    }

    fn fixture(version: u32) -> Vec<u8> {
        let mut catalog = CatalogFile::new(version);
        catalog.player_name = Some("peppy".to_string());
        catalog.permission = Permission::Supporter;
        catalog.insert(record("a", 1));
        catalog.insert(record("b", 1));
        catalog.insert(record("c", 2));
        let mut out = Vec::new();
        catalog.encode_fresh(&mut out).unwrap();
        out
    }

    #[test]
    fn test_decode_header_and_records() {
        let data = fixture(20250107);
        let catalog = CatalogFile::decode(&data).unwrap();
        assert_eq!(catalog.version, 20250107);
        assert_eq!(catalog.player_name.as_deref(), Some("peppy"));
        assert_eq!(catalog.permission, Permission::Supporter);
        assert_eq!(catalog.len(), 3);
        assert!(catalog.contains("b"));

        let region = catalog.beatmap_region().unwrap();
        assert_eq!(region.end, data.len() - 4);
        assert_eq!(catalog.spans()[0].map(|s| s.start), Some(region.start));
    }

    #[test]
    fn test_records_are_contiguous() {
        let data = fixture(20250107);
        let catalog = CatalogFile::decode(&data).unwrap();
        for pair in catalog.spans().windows(2) {
            assert_eq!(pair[0].unwrap().end, pair[1].unwrap().start);
        }
    }

    #[test]
    fn test_strict_version_check() {
        let data = fixture(1234);
        assert!(matches!(
            CatalogFile::decode_with(&data, DecodeOptions::strict()),
            Err(CodecError::VersionUnsupported(1234))
        ));
        assert_eq!(CatalogFile::decode(&data).unwrap().len(), 3);
    }

    #[test]
    fn test_beatmapsets_grouping() {
        let data = fixture(20250107);
        let catalog = CatalogFile::decode(&data).unwrap();
        let sets = catalog.beatmapsets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].id, 1);
        assert_eq!(sets[0].checksums, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sets[1].checksums, vec!["c".to_string()]);
    }

    #[test]
    fn test_update_moves_record_to_end() {
        let data = fixture(20250107);
        let mut catalog = CatalogFile::decode(&data).unwrap();
        assert!(catalog.update("a", |r| r.unplayed = true));
        assert!(!catalog.update("zzz", |_| {}));

        let mut out = Vec::new();
        catalog.encode(&data, &mut out).unwrap();
        assert_eq!(out.len(), data.len());

        let decoded = CatalogFile::decode(&out).unwrap();
        let checksums: Vec<_> = decoded.records().iter().map(BeatmapRecord::checksum_str).collect();
        assert_eq!(checksums, vec!["b", "c", "a"]);
        assert!(decoded.get("a").unwrap().unplayed);
    }

    #[test]
    fn test_insert_replaces_same_checksum() {
        let data = fixture(20250107);
        let mut catalog = CatalogFile::decode(&data).unwrap();
        let mut replacement = record("b", 9);
        replacement.unplayed = true;
        catalog.insert(replacement);

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.pending_changes().len(), 1);
        assert_eq!(catalog.get("b").unwrap().beatmapset_id, 9);
    }
}
