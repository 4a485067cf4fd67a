//! Small enumerations carried by catalog records and headers

use std::fmt;

/// Ranked status byte of a beatmap difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BeatmapStatus {
    #[default]
    Unknown,
    Unsubmitted,
    /// Also used for graveyard and work-in-progress maps
    Pending,
    Unused,
    Ranked,
    Approved,
    Qualified,
    Loved,
    /// Any byte the client may add later
    Other(u8),
}

impl BeatmapStatus {
    /// Map the stored byte to a status
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Unsubmitted,
            2 => Self::Pending,
            3 => Self::Unused,
            4 => Self::Ranked,
            5 => Self::Approved,
            6 => Self::Qualified,
            7 => Self::Loved,
            other => Self::Other(other),
        }
    }

    /// The byte written to disk
    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Unsubmitted => 1,
            Self::Pending => 2,
            Self::Unused => 3,
            Self::Ranked => 4,
            Self::Approved => 5,
            Self::Qualified => 6,
            Self::Loved => 7,
            Self::Other(code) => code,
        }
    }

    /// Map a web API status name (`"ranked"`, `"graveyard"`, ...) to a status
    pub fn from_api_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "ranked" => Self::Ranked,
            "approved" => Self::Approved,
            "qualified" => Self::Qualified,
            "loved" => Self::Loved,
            "pending" | "graveyard" | "wip" => Self::Pending,
            "unsubmitted" => Self::Unsubmitted,
            _ => Self::Unknown,
        }
    }

    /// Lowercase display name
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown | Self::Other(_) => "unknown",
            Self::Unsubmitted => "unsubmitted",
            Self::Pending => "pending",
            Self::Unused => "unused",
            Self::Ranked => "ranked",
            Self::Approved => "approved",
            Self::Qualified => "qualified",
            Self::Loved => "loved",
        }
    }
}

impl fmt::Display for BeatmapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Game mode, also the order of the per-ruleset star rating lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ruleset {
    #[default]
    Osu,
    Taiko,
    Catch,
    Mania,
}

impl Ruleset {
    /// All rulesets in on-disk order
    pub const ALL: [Self; 4] = [Self::Osu, Self::Taiko, Self::Catch, Self::Mania];

    /// Ruleset for a mode byte
    pub fn from_mode(mode: u8) -> Option<Self> {
        Self::ALL.get(usize::from(mode)).copied()
    }

    /// Mode byte for this ruleset
    pub fn mode(self) -> u8 {
        self as u8
    }

    /// Index into per-ruleset arrays
    pub fn index(self) -> usize {
        self as usize
    }

    /// Ruleset for a web API mode name (`"osu"`, `"taiko"`, `"fruits"`, `"mania"`)
    pub fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "osu" => Some(Self::Osu),
            "taiko" => Some(Self::Taiko),
            "fruits" | "catch" => Some(Self::Catch),
            "mania" => Some(Self::Mania),
            _ => None,
        }
    }
}

impl fmt::Display for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Osu => "osu",
            Self::Taiko => "taiko",
            Self::Catch => "catch",
            Self::Mania => "mania",
        })
    }
}

/// Account permission stored in the catalog trailer
///
/// Unknown ids are kept as-is so they round-trip, and display as an empty
/// label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Permission {
    #[default]
    None,
    Normal,
    Moderator,
    Supporter,
    Friend,
    Peppy,
    WorldCupStaff,
    Unknown(u32),
}

impl Permission {
    pub fn from_id(id: u32) -> Self {
        match id {
            0 => Self::None,
            1 => Self::Normal,
            2 => Self::Moderator,
            4 => Self::Supporter,
            8 => Self::Friend,
            16 => Self::Peppy,
            32 => Self::WorldCupStaff,
            other => Self::Unknown(other),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Normal => 1,
            Self::Moderator => 2,
            Self::Supporter => 4,
            Self::Friend => 8,
            Self::Peppy => 16,
            Self::WorldCupStaff => 32,
            Self::Unknown(id) => id,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Normal => "Normal",
            Self::Moderator => "Moderator",
            Self::Supporter => "Supporter",
            Self::Friend => "Friend",
            Self::Peppy => "Peppy",
            Self::WorldCupStaff => "World Cup Staff",
            Self::Unknown(_) => "",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
