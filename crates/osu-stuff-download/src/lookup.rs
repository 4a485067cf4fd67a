//! Checksum to metadata resolution against the osu! API

use async_trait::async_trait;
use osu_stuff_formats::{BeatmapRecord, BeatmapStatus, Ruleset, StarRating, is_checksum};
use parking_lot::RwLock;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{DownloadError, Result};

/// Beatmap metadata returned by the lookup endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatmapMetadata {
    /// Difficulty id
    pub id: i32,
    /// Content id mirrors serve archives by
    pub beatmapset_id: i32,
    pub checksum: Option<String>,
    /// Difficulty name
    pub version: String,
    pub mode: String,
    pub status: String,
    pub difficulty_rating: f64,
    pub ar: f32,
    pub cs: f32,
    pub drain: f32,
    pub accuracy: f32,
    pub bpm: Option<f64>,
    /// Seconds
    pub total_length: i32,
    /// Seconds
    pub hit_length: i32,
    pub count_circles: u32,
    pub count_sliders: u32,
    pub count_spinners: u32,
    pub beatmapset: Option<BeatmapsetMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatmapsetMetadata {
    pub artist: String,
    pub artist_unicode: Option<String>,
    pub title: String,
    pub title_unicode: Option<String>,
    pub creator: String,
    pub source: String,
    pub tags: String,
}

impl BeatmapMetadata {
    /// Build the catalog record osu! would show for this difficulty
    ///
    /// Fields the API does not provide keep their defaults. The folder name
    /// is the content id, matching where the archive gets extracted.
    pub fn to_record(&self) -> BeatmapRecord {
        let set = self.beatmapset.clone().unwrap_or_default();
        let ruleset = Ruleset::from_api_name(&self.mode).unwrap_or(Ruleset::Osu);

        let mut record = BeatmapRecord {
            artist: Some(set.artist.clone()),
            artist_unicode: Some(set.artist_unicode.unwrap_or(set.artist)),
            title: Some(set.title.clone()),
            title_unicode: Some(set.title_unicode.unwrap_or(set.title)),
            creator: Some(set.creator),
            difficulty: Some(self.version.clone()),
            checksum: self.checksum.clone(),
            status: BeatmapStatus::from_api_name(&self.status),
            hitcircles: clamp_u16(self.count_circles),
            sliders: clamp_u16(self.count_sliders),
            spinners: clamp_u16(self.count_spinners),
            approach_rate: self.ar,
            circle_size: self.cs,
            hp_drain: self.drain,
            overall_difficulty: self.accuracy,
            drain_time: self.hit_length,
            total_time: self.total_length.saturating_mul(1000),
            difficulty_id: self.id,
            beatmapset_id: self.beatmapset_id,
            mode: ruleset.mode(),
            source: Some(set.source),
            tags: Some(set.tags),
            unplayed: true,
            folder_name: Some(self.beatmapset_id.to_string()),
            ..BeatmapRecord::default()
        };
        record.star_ratings[ruleset.index()] = vec![StarRating::new(0, self.difficulty_rating)];
        record
    }
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Resolves a beatmap checksum to its metadata
#[async_trait]
pub trait BeatmapLookup: Send + Sync {
    /// Look up one checksum; a single attempt with no retry
    async fn lookup(&self, checksum: &str) -> Result<BeatmapMetadata>;

    /// Replace the bearer credential used for lookups
    fn set_credential(&self, token: Option<String>);
}

/// Lookup client for `GET <endpoint>?checksum=<md5>`
pub struct LookupClient {
    client: Client,
    endpoint: Url,
    credential: RwLock<Option<String>>,
}

impl LookupClient {
    pub fn new(client: Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| DownloadError::InvalidUrl(format!("{endpoint}: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            credential: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn has_credential(&self) -> bool {
        self.credential.read().is_some()
    }
}

#[async_trait]
impl BeatmapLookup for LookupClient {
    async fn lookup(&self, checksum: &str) -> Result<BeatmapMetadata> {
        if !is_checksum(checksum) {
            return Err(DownloadError::lookup_failed(checksum, "not an MD5 checksum"));
        }
        let token = self
            .credential
            .read()
            .clone()
            .ok_or(DownloadError::MissingCredential)?;

        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("checksum", checksum);
        debug!("Looking up {}", checksum);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DownloadError::HttpStatus(status));
        }

        let body = response.bytes().await?;
        let metadata: BeatmapMetadata = serde_json::from_slice(&body)?;
        if metadata.beatmapset_id <= 0 {
            return Err(DownloadError::lookup_failed(checksum, "response has no beatmapset id"));
        }
        Ok(metadata)
    }

    fn set_credential(&self, token: Option<String>) {
        *self.credential.write() = token.filter(|t| !t.is_empty());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "id": 75,
        "beatmapset_id": 1,
        "checksum": "a5b99395a42bd55bc5eb1d2411cbdf8b",
        "version": "Normal",
        "mode": "osu",
        "status": "ranked",
        "difficulty_rating": 2.55,
        "ar": 6,
        "cs": 4,
        "drain": 6,
        "accuracy": 6,
        "bpm": 119.999,
        "total_length": 142,
        "hit_length": 109,
        "count_circles": 160,
        "count_sliders": 30,
        "count_spinners": 4,
        "beatmapset": {
            "artist": "Kenji Ninuma",
            "artist_unicode": null,
            "title": "DISCO PRINCE",
            "title_unicode": null,
            "creator": "peppy",
            "source": "",
            "tags": "katamari"
        }
    }"#;

    #[test]
    fn test_parse_metadata() {
        let metadata: BeatmapMetadata = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(metadata.beatmapset_id, 1);
        assert_eq!(metadata.beatmapset.as_ref().unwrap().creator, "peppy");
        assert_eq!(metadata.bpm, Some(119.999));
    }

    #[test]
    fn test_parse_tolerates_missing_fields() {
        let metadata: BeatmapMetadata =
            serde_json::from_str(r#"{"id": 5, "beatmapset_id": 9}"#).unwrap();
        assert_eq!(metadata.beatmapset_id, 9);
        assert_eq!(metadata.beatmapset, None);
        assert_eq!(metadata.to_record().beatmapset_id, 9);
    }

    #[test]
    fn test_to_record() {
        let metadata: BeatmapMetadata = serde_json::from_str(SAMPLE).unwrap();
        let record = metadata.to_record();

        assert_eq!(record.checksum_str(), "a5b99395a42bd55bc5eb1d2411cbdf8b");
        assert_eq!(record.artist.as_deref(), Some("Kenji Ninuma"));
        assert_eq!(record.artist_unicode.as_deref(), Some("Kenji Ninuma"));
        assert_eq!(record.difficulty.as_deref(), Some("Normal"));
        assert_eq!(record.status, BeatmapStatus::Ranked);
        assert_eq!(record.hitcircles, 160);
        assert_eq!(record.total_time, 142_000);
        assert_eq!(record.drain_time, 109);
        assert_eq!(record.difficulty_id, 75);
        assert_eq!(record.ruleset(), Some(Ruleset::Osu));
        assert_eq!(record.nomod_star_rating(), Some(2.55));
        assert_eq!(record.folder_name.as_deref(), Some("1"));

        let mut catalog = osu_stuff_formats::CatalogFile::new(20250107);
        catalog.insert(record);
        assert!(catalog.spans().iter().all(Option::is_none));
    }

    #[test]
    fn test_to_record_mode() {
        let metadata = BeatmapMetadata {
            mode: "mania".to_string(),
            difficulty_rating: 4.0,
            ..BeatmapMetadata::default()
        };
        let record = metadata.to_record();
        assert_eq!(record.ruleset(), Some(Ruleset::Mania));
        assert_eq!(record.star_rating(Ruleset::Mania, 0), Some(4.0));
    }

    #[tokio::test]
    async fn test_lookup_requires_credential() {
        let client = LookupClient::new(Client::new(), "http://localhost/lookup").unwrap();
        let err = client
            .lookup("a5b99395a42bd55bc5eb1d2411cbdf8b")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::MissingCredential));

        client.set_credential(Some(String::new()));
        assert!(!client.has_credential());
    }

    #[tokio::test]
    async fn test_lookup_rejects_non_checksum() {
        let client = LookupClient::new(Client::new(), "http://localhost/lookup").unwrap();
        client.set_credential(Some("token".to_string()));
        let err = client.lookup("nope").await.unwrap_err();
        assert!(matches!(err, DownloadError::LookupFailed { .. }));
    }
}
