//! Library side of the `osu-stuff` command-line tool
//!
//! Command definitions live here so they can be tested without spawning
//! the binary.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Subcommand;
use osu_stuff_download::MirrorEndpoint;
use osu_stuff_formats::OsdbVersion;

pub use crate::commands::{
    collections::handle as handle_collections, download::handle as handle_download,
    info::handle as handle_info, missing::handle as handle_missing,
    osdb::handle_export as handle_export_osdb, osdb::handle_import as handle_import_osdb,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize a beatmap catalog (osu!.db)
    Info {
        /// Catalog file, defaults to osu!.db in the osu! directory
        db: Option<PathBuf>,

        /// Refuse catalog versions outside the known range
        #[arg(long)]
        strict: bool,
    },

    /// List the collections in collection.db
    Collections {
        /// Collection list, defaults to collection.db in the osu! directory
        path: Option<PathBuf>,
    },

    /// Print checksums that collections reference but the catalog lacks
    Missing {
        #[arg(long, env = "OSU_STUFF_DB")]
        db: Option<PathBuf>,

        #[arg(long, env = "OSU_STUFF_COLLECTIONS")]
        collections: Option<PathBuf>,

        /// Only this collection
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Download missing beatmaps from mirrors
    Download {
        #[arg(long, env = "OSU_STUFF_DB")]
        db: Option<PathBuf>,

        #[arg(long, env = "OSU_STUFF_COLLECTIONS")]
        collections: Option<PathBuf>,

        /// Only this collection
        #[arg(short, long)]
        name: Option<String>,

        /// Where archives are written
        #[arg(long, env = "OSU_STUFF_DOWNLOAD_DIR")]
        dir: Option<PathBuf>,

        /// osu! API bearer token used for checksum lookups
        #[arg(long, env = "OSU_STUFF_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Mirror as `name=url` or a bare url; the id is appended to the url
        #[arg(
            long = "mirror",
            env = "OSU_STUFF_MIRRORS",
            value_delimiter = ',',
            value_parser = parse_mirror,
            required = true
        )]
        mirrors: Vec<MirrorEndpoint>,

        /// Workers per collection
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write downloaded beatmaps back into the catalog file
        #[arg(long)]
        write_db: bool,
    },

    /// Export collections to a Collection Manager .osdb file
    ExportOsdb {
        /// Collection list to read
        collections: PathBuf,

        /// File to write
        output: PathBuf,

        /// .osdb format version to write
        #[arg(long, default_value = "o!dm8", value_parser = parse_osdb_version)]
        osdb_version: OsdbVersion,

        /// Catalog used to fill in beatmap metadata
        #[arg(long, env = "OSU_STUFF_DB")]
        db: Option<PathBuf>,

        /// Only these collections
        #[arg(short, long)]
        name: Vec<String>,
    },

    /// Merge a Collection Manager .osdb file into collection.db
    ImportOsdb {
        /// File to read
        input: PathBuf,

        /// Collection list to update, created when missing
        collections: PathBuf,
    },
}

/// Output format options for the CLI
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tables and plain text
    Text,
    /// JSON output
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }
}

/// Options shared by every command
#[derive(Clone, Debug)]
pub struct CommandContext {
    pub format: OutputFormat,
    /// osu! installation holding osu!.db and collection.db
    pub osu_dir: Option<PathBuf>,
}

impl CommandContext {
    /// Use `explicit` or fall back to `file_name` inside the osu! directory
    pub fn library_file(&self, explicit: Option<PathBuf>, file_name: &str) -> anyhow::Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        match &self.osu_dir {
            Some(dir) => Ok(dir.join(file_name)),
            None => bail!("no path for {file_name}: pass it explicitly or set --osu-dir"),
        }
    }
}

/// Parse `name=url` or a bare url into a mirror
pub fn parse_mirror(value: &str) -> Result<MirrorEndpoint, String> {
    // An `=` after the scheme belongs to the url's query string
    let (name, url) = match (value.find('='), value.find("://")) {
        (Some(eq), Some(scheme)) if eq < scheme => (&value[..eq], &value[eq + 1..]),
        (Some(eq), None) => (&value[..eq], &value[eq + 1..]),
        _ => ("", value),
    };
    let name = if name.is_empty() {
        host_of(url)
    } else {
        name.to_string()
    };

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(format!("mirror url must be http(s): {url}"));
    }
    Ok(MirrorEndpoint::new(name, url))
}

fn host_of(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(url)
        .to_string()
}

pub fn parse_osdb_version(value: &str) -> Result<OsdbVersion, String> {
    OsdbVersion::parse(value).map_err(|e| e.to_string())
}

/// Read a file, naming it in the error
pub fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_mirror() {
        let mirror = parse_mirror("nerinyan=https://api.nerinyan.moe/d/").unwrap();
        assert_eq!(mirror.name, "nerinyan");
        assert_eq!(mirror.base_url, "https://api.nerinyan.moe/d/");
    }

    #[test]
    fn test_parse_bare_mirror() {
        let mirror = parse_mirror("https://catboy.best/d/").unwrap();
        assert_eq!(mirror.name, "catboy.best");
        assert_eq!(mirror.base_url, "https://catboy.best/d/");

        let mirror = parse_mirror("https://mirror.example/get?id=").unwrap();
        assert_eq!(mirror.name, "mirror.example");
        assert_eq!(mirror.base_url, "https://mirror.example/get?id=");
    }

    #[test]
    fn test_parse_mirror_rejects_non_http() {
        assert!(parse_mirror("ftp://mirror.example/").is_err());
        assert!(parse_mirror("name=mirror.example").is_err());
    }

    #[test]
    fn test_library_file_fallback() {
        let context = CommandContext {
            format: OutputFormat::Text,
            osu_dir: Some(PathBuf::from("/games/osu")),
        };
        assert_eq!(
            context.library_file(None, "osu!.db").unwrap(),
            PathBuf::from("/games/osu/osu!.db")
        );
        assert_eq!(
            context.library_file(Some(PathBuf::from("x.db")), "osu!.db").unwrap(),
            PathBuf::from("x.db")
        );

        let context = CommandContext {
            format: OutputFormat::Json,
            osu_dir: None,
        };
        assert!(context.library_file(None, "osu!.db").is_err());
        assert!(context.format.is_json());
    }
}
