//! Per-difficulty record of the beatmap catalog

use tracing::trace;

use super::status::{BeatmapStatus, Ruleset};
use super::{VERSION_FLOAT_DIFFICULTY, VERSION_NO_ENTRY_SIZE, VERSION_TYPED_STAR_RATINGS};
use crate::binary::{ByteCursor, ByteWriter};
use crate::error::{CodecError, Result};
use crate::typed::TypedValue;

/// Tags written in front of pre-2025 star rating pairs
const LEGACY_RATING_TAGS: (u8, u8) = (0x08, 0x0D);

/// Tags used for fresh typed star rating pairs (i32 mods, f32 value)
const TYPED_RATING_TAGS: (u8, u8) = (0x08, 0x0C);

/// Byte range a record occupied in the buffer it was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordSpan {
    pub start: usize,
    pub end: usize,
}

impl RecordSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Type tags seen on disk, reused when a pair is written back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RatingTags {
    Fresh,
    Legacy(u8, u8),
    Typed(u8, u8),
}

/// Star rating for one mod combination
#[derive(Debug, Clone, PartialEq)]
pub struct StarRating {
    pub mods: u32,
    pub value: f64,
    tags: RatingTags,
}

impl StarRating {
    pub fn new(mods: u32, value: f64) -> Self {
        Self {
            mods,
            value,
            tags: RatingTags::Fresh,
        }
    }

    fn read(cursor: &mut ByteCursor<'_>, version: u32) -> Result<Self> {
        if version < VERSION_TYPED_STAR_RATINGS {
            let mods_tag = cursor.read_u8()?;
            let mods = cursor.read_i32()? as u32;
            let value_tag = cursor.read_u8()?;
            let value = cursor.read_f64()?;
            return Ok(Self {
                mods,
                value,
                tags: RatingTags::Legacy(mods_tag, value_tag),
            });
        }

        let at = cursor.offset();
        let mods = TypedValue::read(cursor)?;
        let value = TypedValue::read(cursor)?;
        match (mods.as_f64(), value.as_f64()) {
            (Some(mods_value), Some(rating)) => Ok(Self {
                mods: mods_value as u32,
                value: rating,
                tags: RatingTags::Typed(mods.tag(), value.tag()),
            }),
            _ => Err(CodecError::InvalidEncoding { offset: at }),
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn write(&self, writer: &mut ByteWriter, version: u32) -> Result<()> {
        if version < VERSION_TYPED_STAR_RATINGS {
            let (mods_tag, value_tag) = match self.tags {
                RatingTags::Legacy(mods_tag, value_tag) => (mods_tag, value_tag),
                _ => LEGACY_RATING_TAGS,
            };
            writer.write_u8(mods_tag);
            writer.write_i32(self.mods as i32);
            writer.write_u8(value_tag);
            writer.write_f64(self.value);
            return Ok(());
        }

        let (mods_tag, value_tag) = match self.tags {
            RatingTags::Typed(mods_tag, value_tag) => (mods_tag, value_tag),
            _ => TYPED_RATING_TAGS,
        };
        TypedValue::numeric(mods_tag, f64::from(self.mods))?.write(writer);
        TypedValue::numeric(value_tag, self.value)?.write(writer);
        Ok(())
    }
}

/// Timing point as cached in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingPoint {
    pub beat_length: f64,
    pub offset: f64,
    /// `true` for uninherited (red) lines
    pub inherited: bool,
}

/// One beatmap difficulty in the catalog
///
/// Fields appear in on-disk order. The byte span a decoded record came
/// from is tracked by its [`CatalogFile`](super::CatalogFile), not here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeatmapRecord {
    pub artist: Option<String>,
    pub artist_unicode: Option<String>,
    pub title: Option<String>,
    pub title_unicode: Option<String>,
    pub creator: Option<String>,
    pub difficulty: Option<String>,
    pub audio_file_name: Option<String>,
    pub checksum: Option<String>,
    pub file_name: Option<String>,
    pub status: BeatmapStatus,
    pub hitcircles: u16,
    pub sliders: u16,
    pub spinners: u16,
    /// .NET ticks
    pub last_modification: u64,
    pub approach_rate: f32,
    pub circle_size: f32,
    pub hp_drain: f32,
    pub overall_difficulty: f32,
    pub slider_velocity: f64,
    /// Indexed by [`Ruleset::index`]
    pub star_ratings: [Vec<StarRating>; 4],
    /// Seconds
    pub drain_time: i32,
    /// Milliseconds
    pub total_time: i32,
    pub audio_preview: i32,
    pub timing_points: Vec<TimingPoint>,
    pub difficulty_id: i32,
    pub beatmapset_id: i32,
    pub thread_id: i32,
    /// Indexed by [`Ruleset::index`]
    pub grades: [u8; 4],
    pub local_offset: u16,
    pub stack_leniency: f32,
    pub mode: u8,
    pub source: Option<String>,
    pub tags: Option<String>,
    pub online_offset: u16,
    pub font: Option<String>,
    pub unplayed: bool,
    pub last_played: u64,
    pub is_osz2: bool,
    pub folder_name: Option<String>,
    pub last_checked: u64,
    pub ignore_sounds: bool,
    pub ignore_skin: bool,
    pub disable_storyboard: bool,
    pub disable_video: bool,
    pub visual_override: bool,
    /// Only present before the float-difficulty version
    pub legacy_unknown: u16,
    pub last_modified: u32,
    pub mania_scroll_speed: u8,
}

impl BeatmapRecord {
    /// Decode one record at the cursor position
    pub fn decode(cursor: &mut ByteCursor<'_>, version: u32) -> Result<Self> {
        let start = cursor.offset();
        let byte_difficulty = version < VERSION_FLOAT_DIFFICULTY;

        if version < VERSION_NO_ENTRY_SIZE {
            cursor.read_i32()?;
        }

        let mut record = Self {
            artist: cursor.read_string()?,
            artist_unicode: cursor.read_string()?,
            title: cursor.read_string()?,
            title_unicode: cursor.read_string()?,
            creator: cursor.read_string()?,
            difficulty: cursor.read_string()?,
            audio_file_name: cursor.read_string()?,
            checksum: cursor.read_string()?,
            file_name: cursor.read_string()?,
            status: BeatmapStatus::from_code(cursor.read_u8()?),
            hitcircles: cursor.read_u16()?,
            sliders: cursor.read_u16()?,
            spinners: cursor.read_u16()?,
            last_modification: cursor.read_u64()?,
            ..Self::default()
        };

        let mut difficulty = || -> Result<f32> {
            if byte_difficulty {
                Ok(f32::from(cursor.read_u8()?))
            } else {
                cursor.read_f32()
            }
        };
        record.approach_rate = difficulty()?;
        record.circle_size = difficulty()?;
        record.hp_drain = difficulty()?;
        record.overall_difficulty = difficulty()?;

        record.slider_velocity = cursor.read_f64()?;

        for ratings in &mut record.star_ratings {
            let count = read_count(cursor)?;
            ratings.reserve(count.min(64));
            for _ in 0..count {
                ratings.push(StarRating::read(cursor, version)?);
            }
        }

        record.drain_time = cursor.read_i32()?;
        record.total_time = cursor.read_i32()?;
        record.audio_preview = cursor.read_i32()?;

        let count = read_count(cursor)?;
        record.timing_points.reserve(count.min(1024));
        for _ in 0..count {
            record.timing_points.push(TimingPoint {
                beat_length: cursor.read_f64()?,
                offset: cursor.read_f64()?,
                inherited: cursor.read_bool()?,
            });
        }

        record.difficulty_id = cursor.read_i32()?;
        record.beatmapset_id = cursor.read_i32()?;
        record.thread_id = cursor.read_i32()?;
        for grade in &mut record.grades {
            *grade = cursor.read_u8()?;
        }
        record.local_offset = cursor.read_u16()?;
        record.stack_leniency = cursor.read_f32()?;
        record.mode = cursor.read_u8()?;
        record.source = cursor.read_string()?;
        record.tags = cursor.read_string()?;
        record.online_offset = cursor.read_u16()?;
        record.font = cursor.read_string()?;
        record.unplayed = cursor.read_bool()?;
        record.last_played = cursor.read_u64()?;
        record.is_osz2 = cursor.read_bool()?;
        record.folder_name = cursor.read_string()?;
        record.last_checked = cursor.read_u64()?;
        record.ignore_sounds = cursor.read_bool()?;
        record.ignore_skin = cursor.read_bool()?;
        record.disable_storyboard = cursor.read_bool()?;
        record.disable_video = cursor.read_bool()?;
        record.visual_override = cursor.read_bool()?;
        if byte_difficulty {
            record.legacy_unknown = cursor.read_u16()?;
        }
        record.last_modified = cursor.read_u32()?;
        record.mania_scroll_speed = cursor.read_u8()?;

        trace!(
            checksum = record.checksum.as_deref().unwrap_or_default(),
            start,
            end = cursor.offset(),
            "Decoded beatmap record"
        );

        Ok(record)
    }

    /// Encode every field for the given catalog version
    ///
    /// Before version 20191106 the record starts with its own size, which is
    /// recomputed here rather than taken from the decoded value.
    pub fn encode(&self, writer: &mut ByteWriter, version: u32) -> Result<()> {
        if version < VERSION_NO_ENTRY_SIZE {
            let mut body = ByteWriter::new();
            self.encode_body(&mut body, version)?;
            writer.write_u32(body.len() as u32);
            writer.write_bytes(body.as_slice());
            return Ok(());
        }
        self.encode_body(writer, version)
    }

    fn encode_body(&self, w: &mut ByteWriter, version: u32) -> Result<()> {
        let byte_difficulty = version < VERSION_FLOAT_DIFFICULTY;

        w.write_string(self.artist.as_deref());
        w.write_string(self.artist_unicode.as_deref());
        w.write_string(self.title.as_deref());
        w.write_string(self.title_unicode.as_deref());
        w.write_string(self.creator.as_deref());
        w.write_string(self.difficulty.as_deref());
        w.write_string(self.audio_file_name.as_deref());
        w.write_string(self.checksum.as_deref());
        w.write_string(self.file_name.as_deref());
        w.write_u8(self.status.code());
        w.write_u16(self.hitcircles);
        w.write_u16(self.sliders);
        w.write_u16(self.spinners);
        w.write_u64(self.last_modification);

        for value in [
            self.approach_rate,
            self.circle_size,
            self.hp_drain,
            self.overall_difficulty,
        ] {
            if byte_difficulty {
                w.write_u8(value as u8);
            } else {
                w.write_f32(value);
            }
        }

        w.write_f64(self.slider_velocity);

        for ratings in &self.star_ratings {
            write_count(w, ratings.len());
            for rating in ratings {
                rating.write(w, version)?;
            }
        }

        w.write_i32(self.drain_time);
        w.write_i32(self.total_time);
        w.write_i32(self.audio_preview);

        write_count(w, self.timing_points.len());
        for point in &self.timing_points {
            w.write_f64(point.beat_length);
            w.write_f64(point.offset);
            w.write_bool(point.inherited);
        }

        w.write_i32(self.difficulty_id);
        w.write_i32(self.beatmapset_id);
        w.write_i32(self.thread_id);
        for grade in self.grades {
            w.write_u8(grade);
        }
        w.write_u16(self.local_offset);
        w.write_f32(self.stack_leniency);
        w.write_u8(self.mode);
        w.write_string(self.source.as_deref());
        w.write_string(self.tags.as_deref());
        w.write_u16(self.online_offset);
        w.write_string(self.font.as_deref());
        w.write_bool(self.unplayed);
        w.write_u64(self.last_played);
        w.write_bool(self.is_osz2);
        w.write_string(self.folder_name.as_deref());
        w.write_u64(self.last_checked);
        w.write_bool(self.ignore_sounds);
        w.write_bool(self.ignore_skin);
        w.write_bool(self.disable_storyboard);
        w.write_bool(self.disable_video);
        w.write_bool(self.visual_override);
        if byte_difficulty {
            w.write_u16(self.legacy_unknown);
        }
        w.write_u32(self.last_modified);
        w.write_u8(self.mania_scroll_speed);
        Ok(())
    }

    /// Checksum as a string slice, empty when absent
    pub fn checksum_str(&self) -> &str {
        self.checksum.as_deref().unwrap_or_default()
    }

    pub fn ruleset(&self) -> Option<Ruleset> {
        Ruleset::from_mode(self.mode)
    }

    /// Star rating for a ruleset and mod combination
    pub fn star_rating(&self, ruleset: Ruleset, mods: u32) -> Option<f64> {
        self.star_ratings[ruleset.index()]
            .iter()
            .find(|rating| rating.mods == mods)
            .map(|rating| rating.value)
    }

    /// No-mod star rating in the record's own ruleset
    pub fn nomod_star_rating(&self) -> Option<f64> {
        self.star_rating(self.ruleset()?, 0)
    }

    /// Most common BPM weighted by how long each uninherited point lasts
    ///
    /// Returns 0.0 when the record has no timing points.
    pub fn common_bpm(&self) -> f64 {
        let points = &self.timing_points;
        let Some(last) = points.last() else {
            return 0.0;
        };
        let last_time = if self.total_time > 0 {
            f64::from(self.total_time)
        } else {
            last.offset
        };

        let mut durations: Vec<(f64, f64)> = Vec::new();
        for (i, point) in points.iter().enumerate() {
            if point.offset > last_time || point.beat_length <= 0.0 {
                continue;
            }
            let bpm = (60_000.0 / point.beat_length * 1000.0).round() / 1000.0;
            let current = if i == 0 { 0.0 } else { point.offset };
            let next = points.get(i + 1).map_or(last_time, |next| next.offset);
            let duration = next - current;

            match durations.iter_mut().find(|(seen, _)| (*seen - bpm).abs() < f64::EPSILON) {
                Some((_, total)) => *total += duration,
                None => durations.push((bpm, duration)),
            }
        }

        durations
            .into_iter()
            .fold((0.0, 0.0), |best, (bpm, duration)| {
                if duration > best.1 { (bpm, duration) } else { best }
            })
            .0
    }
}

fn read_count(cursor: &mut ByteCursor<'_>) -> Result<usize> {
    let at = cursor.offset();
    let count = cursor.read_i32()?;
    usize::try_from(count).map_err(|_| CodecError::InvalidEncoding { offset: at })
}

#[allow(clippy::cast_possible_wrap)]
fn write_count(writer: &mut ByteWriter, count: usize) {
    writer.write_i32(count as i32);
}
