//! Readers and writers for osu! stable library files
//!
#![allow(clippy::cast_possible_truncation)] // Fixed-width on-disk fields
#![allow(clippy::cast_possible_wrap)] // Signed/unsigned counts on disk
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::doc_markdown)] // osu! names don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::float_cmp)] // Exact round-trip comparisons
#![allow(clippy::cast_precision_loss)] // Typed values surfaced as f64
#![allow(clippy::derive_partial_eq_without_eq)] // Records carry floats
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! This crate handles the binary files osu! stable keeps next to the game:
//!
//! - **Catalog** (`osu!.db`): every beatmap difficulty the client knows, with
//!   version-dependent record layouts
//! - **Collection list** (`collection.db`): named lists of beatmap checksums
//! - **Collection Manager** (`.osdb`): the exchange format used by the
//!   community Collection Manager tool, plain or gzip-compressed
//!
//! # Design Principles
//!
//! - **Byte-exact rewrites**: decoding then encoding without changes
//!   reproduces the input
//! - **Splice encoding**: catalog records that were not touched are copied
//!   from the original buffer instead of being re-serialized
//! - **Bounded reads**: every read checks the remaining length and reports
//!   the offset where the data ran out
//!
//! ```no_run
//! use osu_stuff_formats::{CatalogFile, CollectionsFile, missing_by_collection};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = CatalogFile::decode(&std::fs::read("osu!.db")?)?;
//! let collections = CollectionsFile::decode(&std::fs::read("collection.db")?)?;
//!
//! for missing in missing_by_collection(&catalog, &collections) {
//!     println!("{}: {} missing", missing.name, missing.checksums.len());
//! }
//! # Ok(())
//! # }
//! ```

/// Little-endian cursor and writer
pub mod binary;
/// Beatmap catalog (`osu!.db`)
pub mod catalog;
/// Collection list (`collection.db`)
pub mod collections;
pub mod error;
pub mod missing;
/// Collection Manager `.osdb` files
pub mod osdb;
/// Tagged values
pub mod typed;

pub use binary::{ByteCursor, ByteWriter};
pub use catalog::{
    BeatmapRecord, BeatmapStatus, Beatmapset, CatalogDatabase, CatalogFile, DecodeOptions,
    Permission, RecordDescriptor, Ruleset, SharedCatalog, StarRating, TimingPoint,
};
pub use collections::{CollectionRecord, CollectionsFile};
pub use error::{CodecError, Result};
pub use missing::{MissingCollection, is_checksum, missing_by_collection, missing_checksums};
pub use osdb::{OsdbBeatmap, OsdbCollection, OsdbFile, OsdbVersion};
pub use typed::TypedValue;
