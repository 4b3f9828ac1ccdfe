//! Play queue model and management.

pub mod queue_builder;
pub mod queue_manager;

use crate::library::track::TrackRef;
use crate::media_id;

/// One entry of the play queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Position-independent id, unique within one queue generation.
    pub queue_id: u64,
    /// Hierarchy-aware media id (`__BY_GENRE__/Rock|track-id`).
    pub media_id: String,
    pub track: TrackRef,
}

impl QueueItem {
    /// Unique track id carried by the media id.
    pub fn music_id(&self) -> &str {
        media_id::extract_music_id(&self.media_id).unwrap_or(&self.track.id)
    }
}
