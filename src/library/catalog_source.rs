//! Pull sources feeding the catalog store.

use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use log::debug;

use crate::error::CatalogError;
use crate::library::track::{Artwork, Track};

/// Iterator of raw track records. A single `Err` aborts the load.
pub type TrackRecords = Box<dyn Iterator<Item = Result<Track, CatalogError>> + Send>;

/// Upstream catalog source.
pub trait CatalogSource: Send + Sync {
    fn tracks(&self) -> Result<TrackRecords, CatalogError>;
}

/// Fixed in-memory record list.
pub struct StaticCatalogSource {
    tracks: Vec<Track>,
}

impl StaticCatalogSource {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }
}

impl CatalogSource for StaticCatalogSource {
    fn tracks(&self) -> Result<TrackRecords, CatalogError> {
        Ok(Box::new(self.tracks.clone().into_iter().map(Ok::<Track, CatalogError>)))
    }
}

#[derive(Debug, serde::Deserialize)]
struct JsonCatalog {
    #[serde(default)]
    music: Vec<JsonTrack>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonTrack {
    title: String,
    #[serde(default)]
    album: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    genre: String,
    source: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    track_number: u32,
    #[serde(default)]
    total_track_count: u32,
    /// Seconds.
    #[serde(default)]
    duration: u64,
}

/// Reads a `{"music": [...]}` catalog document from disk.
pub struct JsonCatalogSource {
    path: PathBuf,
    base_url: Option<String>,
}

impl JsonCatalogSource {
    pub fn new(path: PathBuf, base_url: Option<String>) -> Self {
        Self { path, base_url }
    }

    fn resolve_uri(&self, value: &str) -> String {
        if value.contains("://") {
            return value.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                value.trim_start_matches('/')
            ),
            None => value.to_string(),
        }
    }

    fn stable_track_id(source: &str) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        source.hash(&mut hasher);
        format!("trk-{:x}", hasher.finish())
    }

    fn track_from_record(&self, record: JsonTrack) -> Result<Track, CatalogError> {
        if record.source.trim().is_empty() {
            return Err(CatalogError::MalformedRecord(format!(
                "track {:?} has no source",
                record.title
            )));
        }
        let source_uri = self.resolve_uri(&record.source);
        Ok(Track {
            id: Self::stable_track_id(&source_uri),
            title: record.title,
            artist: record.artist,
            album: record.album,
            genre: record.genre,
            duration_ms: record.duration.saturating_mul(1000),
            source_uri,
            track_number: record.track_number,
            total_track_count: record.total_track_count,
            artwork: Artwork {
                remote_uri: record.image.map(|image| self.resolve_uri(&image)),
                album_art: None,
                icon: None,
            },
        })
    }

    pub(crate) fn parse(&self, content: &str) -> Result<Vec<Track>, CatalogError> {
        let catalog: JsonCatalog = serde_json::from_str(content)?;
        catalog
            .music
            .into_iter()
            .map(|record| self.track_from_record(record))
            .collect()
    }
}

impl CatalogSource for JsonCatalogSource {
    fn tracks(&self) -> Result<TrackRecords, CatalogError> {
        debug!("JsonCatalogSource: reading {}", self.path.display());
        let content = std::fs::read_to_string(&self.path)?;
        let tracks = self.parse(&content)?;
        Ok(Box::new(tracks.into_iter().map(Ok::<Track, CatalogError>)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "music": [
            {
                "title": "Jazz in Paris",
                "album": "Jazz & Blues",
                "artist": "Media Right Productions",
                "genre": "Jazz & Blues",
                "source": "Jazz_In_Paris.mp3",
                "image": "album_art.jpg",
                "trackNumber": 1,
                "totalTrackCount": 6,
                "duration": 103
            },
            {
                "title": "Drop and Roll",
                "genre": "Rock",
                "source": "https://cdn.example.com/drop.mp3"
            }
        ]
    }"#;

    #[test]
    fn test_parse_resolves_relative_uris_against_base() {
        let source = JsonCatalogSource::new(
            PathBuf::from("unused.json"),
            Some("https://music.example.com/catalog/".to_string()),
        );
        let tracks = source.parse(CATALOG).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(
            tracks[0].source_uri,
            "https://music.example.com/catalog/Jazz_In_Paris.mp3"
        );
        assert_eq!(
            tracks[0].artwork.remote_uri.as_deref(),
            Some("https://music.example.com/catalog/album_art.jpg")
        );
        assert_eq!(tracks[0].duration_ms, 103_000);
        assert_eq!(tracks[0].total_track_count, 6);
        assert_eq!(tracks[1].source_uri, "https://cdn.example.com/drop.mp3");
        assert_eq!(tracks[1].artist, "");
    }

    #[test]
    fn test_track_ids_are_stable_and_distinct() {
        let source = JsonCatalogSource::new(PathBuf::from("unused.json"), None);
        let first = source.parse(CATALOG).unwrap();
        let second = source.parse(CATALOG).unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_ne!(first[0].id, first[1].id);
    }

    #[test]
    fn test_parse_rejects_record_without_source() {
        let source = JsonCatalogSource::new(PathBuf::from("unused.json"), None);
        let result = source.parse(r#"{"music":[{"title":"x","source":" "}]}"#);
        assert!(matches!(result, Err(CatalogError::MalformedRecord(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = JsonCatalogSource::new(PathBuf::from("/nonexistent/playdeck.json"), None);
        assert!(matches!(source.tracks(), Err(CatalogError::Io(_))));
    }
}
