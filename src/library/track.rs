use std::sync::Arc;

/// Artwork references attached to a track.
///
/// `remote_uri` comes from the catalog; `album_art`/`icon` are host cache
/// keys filled in after the host fetched the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artwork {
    pub remote_uri: Option<String>,
    pub album_art: Option<String>,
    pub icon: Option<String>,
}

/// Immutable track metadata. Updates replace the whole value.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub duration_ms: u64,
    pub source_uri: String,
    pub track_number: u32,
    pub total_track_count: u32,
    pub artwork: Artwork,
}

impl Track {
    /// Returns a copy of this track carrying `artwork`.
    pub fn with_artwork(&self, artwork: Artwork) -> Track {
        Track {
            artwork,
            ..self.clone()
        }
    }
}

pub type TrackRef = Arc<Track>;

/// Metadata field used by catalog searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Artist,
    Album,
    Genre,
}

impl SearchField {
    pub fn value<'a>(&self, track: &'a Track) -> &'a str {
        match self {
            SearchField::Title => &track.title,
            SearchField::Artist => &track.artist,
            SearchField::Album => &track.album,
            SearchField::Genre => &track.genre,
        }
    }
}

/// Whether a browse node can be expanded or played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseItemKind {
    Browsable,
    Playable,
}

/// One child of a browse node.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseItem {
    pub media_id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub kind: BrowseItemKind,
}
