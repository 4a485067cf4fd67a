//! Collection Manager database (`.osdb`)
//!
//! Files start with a version string such as `o!dm8`. From version 7 the
//! rest of the file is gzip-compressed and repeats the version string at
//! the start of the compressed stream. Strings in this format carry no
//! marker byte.

use std::fmt;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use crate::binary::{ByteCursor, ByteWriter};
use crate::catalog::{BeatmapRecord, CatalogFile};
use crate::collections::CollectionRecord;
use crate::error::{CodecError, Result};

/// Trailer string closing every `.osdb` file
pub const OSDB_FOOTER: &str = "By Piotrekol";

/// Known `.osdb` format revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OsdbVersion {
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    #[default]
    V8,
    V7Minimal,
    V8Minimal,
}

impl OsdbVersion {
    pub const ALL: [Self; 10] = [
        Self::V1,
        Self::V2,
        Self::V3,
        Self::V4,
        Self::V5,
        Self::V6,
        Self::V7,
        Self::V8,
        Self::V7Minimal,
        Self::V8Minimal,
    ];

    /// Version string written at the start of the file
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "o!dm",
            Self::V2 => "o!dm2",
            Self::V3 => "o!dm3",
            Self::V4 => "o!dm4",
            Self::V5 => "o!dm5",
            Self::V6 => "o!dm6",
            Self::V7 => "o!dm7",
            Self::V8 => "o!dm8",
            Self::V7Minimal => "o!dm7min",
            Self::V8Minimal => "o!dm8min",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|version| version.as_str() == value)
            .ok_or_else(|| CodecError::InvalidOsdbVersion(value.to_string()))
    }

    /// Numeric revision (1..=8, or 1007/1008 for minimal files)
    pub fn number(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
            Self::V4 => 4,
            Self::V5 => 5,
            Self::V6 => 6,
            Self::V7 => 7,
            Self::V8 => 8,
            Self::V7Minimal => 1007,
            Self::V8Minimal => 1008,
        }
    }

    /// Minimal files omit artist, title and difficulty names
    pub fn is_minimal(self) -> bool {
        matches!(self, Self::V7Minimal | Self::V8Minimal)
    }

    pub fn is_compressed(self) -> bool {
        self.number() >= 7
    }

    fn has_set_id(self) -> bool {
        self.number() >= 2
    }

    fn has_hash_only(self) -> bool {
        self.number() >= 3
    }

    fn has_comment(self) -> bool {
        self.number() >= 4
    }

    fn has_online_id(self) -> bool {
        self.number() >= 7
    }

    fn has_play_mode(self) -> bool {
        self.number() >= 8 || (self.number() >= 5 && !self.is_minimal())
    }

    fn has_stars(self) -> bool {
        self.number() >= 8 || (self.number() >= 6 && !self.is_minimal())
    }
}

impl fmt::Display for OsdbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OsdbVersion {
    type Err = CodecError;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

/// Beatmap entry with the metadata Collection Manager keeps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OsdbBeatmap {
    pub map_id: i32,
    pub map_set_id: i32,
    pub artist: String,
    pub title: String,
    pub diff_name: String,
    pub md5: String,
    pub user_comment: String,
    pub play_mode: u8,
    pub stars_nomod: f64,
}

impl OsdbBeatmap {
    /// Entry carrying the metadata of a catalog record
    pub fn from_record(record: &BeatmapRecord) -> Self {
        Self {
            map_id: record.difficulty_id,
            map_set_id: record.beatmapset_id,
            artist: record.artist.clone().unwrap_or_default(),
            title: record.title.clone().unwrap_or_default(),
            diff_name: record.difficulty.clone().unwrap_or_default(),
            md5: record.checksum_str().to_string(),
            user_comment: String::new(),
            play_mode: record.mode,
            stars_nomod: record.nomod_star_rating().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OsdbCollection {
    pub name: String,
    pub online_id: i32,
    pub beatmaps: Vec<OsdbBeatmap>,
    /// Checksums known only by hash
    pub hash_only: Vec<String>,
}

impl OsdbCollection {
    /// Every checksum in the collection, beatmaps first
    pub fn checksums(&self) -> impl Iterator<Item = &str> {
        self.beatmaps
            .iter()
            .map(|beatmap| beatmap.md5.as_str())
            .chain(self.hash_only.iter().map(String::as_str))
    }

    /// Convert to a collection list entry
    pub fn to_collection(&self) -> CollectionRecord {
        let mut record = CollectionRecord::new(self.name.clone(), Vec::<String>::new());
        for checksum in self.checksums() {
            record.push(checksum);
        }
        record
    }

    /// Build from a collection list entry; every checksum goes to `hash_only`
    pub fn from_collection(collection: &CollectionRecord) -> Self {
        Self {
            name: collection.name().to_string(),
            hash_only: collection.iter_checksums().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    /// Build from a collection list entry, with full entries for the
    /// beatmaps `catalog` knows and bare hashes for the rest
    pub fn from_collection_in(collection: &CollectionRecord, catalog: &CatalogFile) -> Self {
        let mut osdb = Self {
            name: collection.name().to_string(),
            ..Self::default()
        };
        for checksum in collection.iter_checksums() {
            match catalog.get(checksum) {
                Some(record) => osdb.beatmaps.push(OsdbBeatmap::from_record(record)),
                None => osdb.hash_only.push(checksum.to_string()),
            }
        }
        osdb
    }
}

/// Decoded `.osdb` file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OsdbFile {
    pub version: OsdbVersion,
    /// Milliseconds since the Unix epoch, as written by Collection Manager
    pub save_date: i64,
    pub last_editor: String,
    pub collections: Vec<OsdbCollection>,
}

impl OsdbFile {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let version = OsdbVersion::parse(&cursor.read_bare_string()?)?;

        if !version.is_compressed() {
            return Self::decode_body(&mut cursor, version);
        }

        let mut inflated = Vec::new();
        GzDecoder::new(&data[cursor.offset()..]).read_to_end(&mut inflated)?;
        debug!(
            compressed = data.len() - cursor.offset(),
            inflated = inflated.len(),
            "Inflated .osdb body"
        );

        let mut body = ByteCursor::new(&inflated);
        let repeated = body.read_bare_string()?;
        if repeated != version.as_str() {
            return Err(CodecError::InvalidOsdbVersion(repeated));
        }
        Self::decode_body(&mut body, version)
    }

    fn decode_body(cursor: &mut ByteCursor<'_>, version: OsdbVersion) -> Result<Self> {
        let save_date = cursor.read_i64()?;
        let last_editor = cursor.read_bare_string()?;
        let count = read_count(cursor)?;

        let mut collections = Vec::with_capacity(count.min(cursor.remaining()));
        for _ in 0..count {
            let mut collection = OsdbCollection {
                name: cursor.read_bare_string()?,
                ..OsdbCollection::default()
            };
            if version.has_online_id() {
                collection.online_id = cursor.read_i32()?;
            }

            let beatmaps = read_count(cursor)?;
            collection.beatmaps.reserve(beatmaps.min(cursor.remaining()));
            for _ in 0..beatmaps {
                collection.beatmaps.push(read_beatmap(cursor, version)?);
            }

            if version.has_hash_only() {
                let hashes = read_count(cursor)?;
                collection.hash_only.reserve(hashes.min(cursor.remaining()));
                for _ in 0..hashes {
                    collection.hash_only.push(cursor.read_bare_string()?);
                }
            }

            collections.push(collection);
        }

        let footer = cursor.read_bare_string()?;
        if footer != OSDB_FOOTER {
            return Err(CodecError::InvalidFooter(footer));
        }

        info!(
            version = version.as_str(),
            collections = collections.len(),
            "Decoded .osdb file"
        );

        Ok(Self {
            version,
            save_date,
            last_editor,
            collections,
        })
    }

    /// Encode in the file's own version
    pub fn encode<W: Write>(&self, output: &mut W) -> Result<usize> {
        let version = self.version;
        let mut body = ByteWriter::new();
        if version.is_compressed() {
            body.write_bare_string(version.as_str());
        }
        body.write_i64(self.save_date);
        body.write_bare_string(&self.last_editor);
        write_count(&mut body, self.collections.len());

        for collection in &self.collections {
            body.write_bare_string(&collection.name);
            if version.has_online_id() {
                body.write_i32(collection.online_id);
            }
            write_count(&mut body, collection.beatmaps.len());
            for beatmap in &collection.beatmaps {
                write_beatmap(&mut body, beatmap, version);
            }
            if version.has_hash_only() {
                write_count(&mut body, collection.hash_only.len());
                for hash in &collection.hash_only {
                    body.write_bare_string(hash);
                }
            }
        }
        body.write_bare_string(OSDB_FOOTER);

        let mut out = ByteWriter::new();
        out.write_bare_string(version.as_str());
        if version.is_compressed() {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body.as_slice())?;
            out.write_bytes(&encoder.finish()?);
        } else {
            out.write_bytes(body.as_slice());
        }

        output.write_all(out.as_slice())?;
        Ok(out.len())
    }

    /// Convert every collection to collection list entries
    pub fn to_collections(&self) -> Vec<CollectionRecord> {
        self.collections.iter().map(OsdbCollection::to_collection).collect()
    }
}

fn read_beatmap(cursor: &mut ByteCursor<'_>, version: OsdbVersion) -> Result<OsdbBeatmap> {
    let mut beatmap = OsdbBeatmap {
        map_id: cursor.read_i32()?,
        map_set_id: -1,
        ..OsdbBeatmap::default()
    };
    if version.has_set_id() {
        beatmap.map_set_id = cursor.read_i32()?;
    }
    if !version.is_minimal() {
        beatmap.artist = cursor.read_bare_string()?;
        beatmap.title = cursor.read_bare_string()?;
        beatmap.diff_name = cursor.read_bare_string()?;
    }
    beatmap.md5 = cursor.read_bare_string()?;
    if version.has_comment() {
        beatmap.user_comment = cursor.read_bare_string()?;
    }
    if version.has_play_mode() {
        beatmap.play_mode = cursor.read_u8()?;
    }
    if version.has_stars() {
        beatmap.stars_nomod = cursor.read_f64()?;
    }
    Ok(beatmap)
}

fn write_beatmap(writer: &mut ByteWriter, beatmap: &OsdbBeatmap, version: OsdbVersion) {
    writer.write_i32(beatmap.map_id);
    if version.has_set_id() {
        writer.write_i32(beatmap.map_set_id);
    }
    if !version.is_minimal() {
        writer.write_bare_string(&beatmap.artist);
        writer.write_bare_string(&beatmap.title);
        writer.write_bare_string(&beatmap.diff_name);
    }
    writer.write_bare_string(&beatmap.md5);
    if version.has_comment() {
        writer.write_bare_string(&beatmap.user_comment);
    }
    if version.has_play_mode() {
        writer.write_u8(beatmap.play_mode);
    }
    if version.has_stars() {
        writer.write_f64(beatmap.stars_nomod);
    }
}

fn read_count(cursor: &mut ByteCursor<'_>) -> Result<usize> {
    let at = cursor.offset();
    usize::try_from(cursor.read_i32()?).map_err(|_| CodecError::InvalidEncoding { offset: at })
}

#[allow(clippy::cast_possible_wrap)]
fn write_count(writer: &mut ByteWriter, count: usize) {
    writer.write_i32(count as i32);
}
