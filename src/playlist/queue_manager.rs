use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::broadcast::Sender;

use crate::error::QueueError;
use crate::library::catalog_store::CatalogStore;
use crate::library::track::TrackRef;
use crate::media_id;
use crate::playlist::{queue_builder, QueueItem};
use crate::protocol::{self, QueueMessage, SearchFocus};

const RANDOM_QUEUE_TITLE: &str = "Random music";
const SEARCH_QUEUE_TITLE: &str = "Search results";

/// Owns the play queue and the current position within it.
///
/// Only the playback orchestrator mutates the queue; every change is
/// published on the bus so other components read copies.
pub struct QueueManager {
    catalog: Arc<CatalogStore>,
    bus_producer: Sender<protocol::Message>,
    queue: Vec<QueueItem>,
    current_index: usize,
    /// Bumped every time a new queue replaces the old one.
    generation: u64,
    random_queue_limit: usize,
}

impl QueueManager {
    pub fn new(
        catalog: Arc<CatalogStore>,
        bus_producer: Sender<protocol::Message>,
        random_queue_limit: usize,
    ) -> Self {
        Self {
            catalog,
            bus_producer,
            queue: Vec::new(),
            current_index: 0,
            generation: 0,
            random_queue_limit,
        }
    }

    fn emit(&self, message: QueueMessage) {
        let _ = self.bus_producer.send(protocol::Message::Queue(message));
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn queue(&self) -> &[QueueItem] {
        &self.queue
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn current_music(&self) -> Option<&QueueItem> {
        self.queue.get(self.current_index)
    }

    /// Replaces the queue with the shuffled catalog.
    pub fn set_random_queue(&mut self) {
        let queue = queue_builder::random_queue(&self.catalog, self.random_queue_limit);
        self.set_current_queue(RANDOM_QUEUE_TITLE, queue, None);
        self.refresh_metadata();
    }

    /// Makes `media_id` current, reusing the queue when it belongs to the
    /// same browse category as the current item.
    pub fn set_queue_from_music(&mut self, media_id: &str) -> Result<(), QueueError> {
        debug!("QueueManager: set_queue_from_music {}", media_id);
        let reused = self.is_same_browsing_category(media_id)
            && self.set_current_queue_item_by_media_id(media_id);
        if !reused {
            let queue = queue_builder::playing_queue(media_id, &self.catalog)?;
            if queue_builder::index_of_media_id(&queue, media_id).is_none() {
                return Err(QueueError::InvalidTarget(media_id.to_string()));
            }
            let title = match media_id::extract_browse_category_value(media_id) {
                Some(value) => format!("{} songs", value),
                None => String::new(),
            };
            self.set_current_queue(&title, queue, Some(media_id));
        }
        self.refresh_metadata();
        Ok(())
    }

    /// Replaces the queue with search results. Returns whether anything matched.
    pub fn set_queue_from_search(&mut self, query: &str, focus: SearchFocus) -> bool {
        let queue = queue_builder::playing_queue_from_search(query, focus, &self.catalog);
        let found = !queue.is_empty();
        self.set_current_queue(SEARCH_QUEUE_TITLE, queue, None);
        self.refresh_metadata();
        found
    }

    /// Installs a new queue generation, starting at `initial_media_id` if it
    /// is present and at the front otherwise.
    pub fn set_current_queue(
        &mut self,
        title: &str,
        queue: Vec<QueueItem>,
        initial_media_id: Option<&str>,
    ) {
        let index = initial_media_id
            .and_then(|media_id| queue_builder::index_of_media_id(&queue, media_id))
            .unwrap_or(0);
        self.queue = queue;
        self.current_index = index;
        self.generation += 1;
        info!(
            "QueueManager: new queue {:?} with {} item(s), generation {}",
            title,
            self.queue.len(),
            self.generation
        );
        self.emit(QueueMessage::QueueUpdated {
            title: title.to_string(),
            items: self.queue.clone(),
        });
    }

    /// Publishes metadata for the current item, or `MetadataRetrieveError`
    /// when there is none.
    pub fn update_metadata(&self) -> Result<TrackRef, QueueError> {
        let Some(current) = self.current_music() else {
            self.emit(QueueMessage::MetadataRetrieveError);
            return Err(QueueError::EmptyQueue);
        };
        let music_id = current.music_id();
        let Some(track) = self.catalog.get_track(music_id) else {
            error!("QueueManager: queue references unknown track {}", music_id);
            debug_assert!(false, "queue references unknown track {}", music_id);
            self.emit(QueueMessage::MetadataRetrieveError);
            return Err(QueueError::MissingMetadata(music_id.to_string()));
        };
        self.emit(QueueMessage::MetadataChanged(TrackRef::clone(&track)));
        Ok(track)
    }

    /// `update_metadata` for callers that only need the notification.
    pub fn refresh_metadata(&self) {
        if let Err(err) = self.update_metadata() {
            debug!("QueueManager: metadata not published: {}", err);
        }
    }

    /// Whether `media_id` shares the browse hierarchy of the current item.
    pub fn is_same_browsing_category(&self, media_id: &str) -> bool {
        let Some(current) = self.current_music() else {
            return false;
        };
        media_id::hierarchy(media_id) == media_id::hierarchy(&current.media_id)
    }

    pub fn set_current_queue_item(&mut self, queue_id: u64) -> bool {
        match queue_builder::index_of_queue_id(&self.queue, queue_id) {
            Some(index) => {
                self.set_current_queue_index(index);
                true
            }
            None => false,
        }
    }

    pub fn set_current_queue_item_by_media_id(&mut self, media_id: &str) -> bool {
        match queue_builder::index_of_media_id(&self.queue, media_id) {
            Some(index) => {
                self.set_current_queue_index(index);
                true
            }
            None => false,
        }
    }

    fn set_current_queue_index(&mut self, index: usize) {
        if queue_builder::is_index_playable(&self.queue, index) {
            self.current_index = index;
            self.emit(QueueMessage::CurrentQueueIndexUpdated(index));
        }
    }

    /// Moves the current position by `delta`.
    ///
    /// Moving forward past the end wraps around; moving backward past the
    /// front stops at the first item.
    pub fn skip_queue_position(&mut self, delta: i64) -> bool {
        let len = self.queue.len() as i64;
        let mut index = self.current_index as i64 + delta;
        if index < 0 {
            index = 0;
        } else if len > 0 {
            index %= len;
        }
        let index = index as usize;
        if !queue_builder::is_index_playable(&self.queue, index) {
            error!(
                "QueueManager: cannot move queue index by {}, current={} length={}",
                delta, self.current_index, len
            );
            return false;
        }
        self.current_index = index;
        true
    }
}
