//! Builds play queues from browse context, search, and shuffle.

use log::{debug, error, warn};

use crate::error::QueueError;
use crate::library::catalog_store::CatalogStore;
use crate::library::track::{SearchField, TrackRef};
use crate::media_id::{self, MEDIA_ID_MUSICS_BY_GENRE, MEDIA_ID_MUSICS_BY_SEARCH};
use crate::playlist::QueueItem;
use crate::protocol::SearchFocus;

const RANDOM_QUEUE_CATEGORY: &str = "random";

/// Resolves the queue a hierarchy-aware media id was picked from.
///
/// Only two-level hierarchies (`category/value`) name a queue; genre and
/// search categories are understood.
pub fn playing_queue(media_id: &str, catalog: &CatalogStore) -> Result<Vec<QueueItem>, QueueError> {
    let hierarchy = media_id::hierarchy(media_id);
    if hierarchy.len() != 2 {
        error!("QueueBuilder: could not build a queue for media id {}", media_id);
        return Err(QueueError::InvalidTarget(media_id.to_string()));
    }
    let (category_type, category_value) = (hierarchy[0], hierarchy[1]);
    debug!(
        "QueueBuilder: creating queue for category {} value {}",
        category_type, category_value
    );

    let tracks = match category_type {
        MEDIA_ID_MUSICS_BY_GENRE => catalog.tracks_by_genre(category_value),
        MEDIA_ID_MUSICS_BY_SEARCH => catalog.search(SearchField::Title, category_value),
        _ => {
            error!("QueueBuilder: unrecognized category type {}", category_type);
            return Err(QueueError::InvalidTarget(media_id.to_string()));
        }
    };
    convert_to_queue(&tracks, &[category_type, category_value])
}

/// Builds a search queue. An empty `Any` query falls back to the shuffled
/// catalog; unstructured queries match titles, then genres.
pub fn playing_queue_from_search(
    query: &str,
    focus: SearchFocus,
    catalog: &CatalogStore,
) -> Vec<QueueItem> {
    debug!("QueueBuilder: search query={:?} focus={:?}", query, focus);
    let query = query.trim();
    if query.is_empty() && focus == SearchFocus::Any {
        return random_queue(catalog, 0);
    }

    let structured = match focus {
        SearchFocus::Artist => catalog.search(SearchField::Artist, query),
        SearchFocus::Album => catalog.search(SearchField::Album, query),
        SearchFocus::Genre => catalog.search(SearchField::Genre, query),
        SearchFocus::Title => catalog.search(SearchField::Title, query),
        SearchFocus::Any => Vec::new(),
    };
    let mut tracks = structured;
    if tracks.is_empty() {
        tracks = catalog.search(SearchField::Title, query);
        if tracks.is_empty() {
            tracks = catalog.search(SearchField::Genre, query);
        }
    }

    let category_value = sanitize_category(query);
    match convert_to_queue(&tracks, &[MEDIA_ID_MUSICS_BY_SEARCH, &category_value]) {
        Ok(queue) => queue,
        Err(err) => {
            warn!("QueueBuilder: dropping search queue: {}", err);
            Vec::new()
        }
    }
}

/// Full catalog in a fresh random order, optionally truncated.
pub fn random_queue(catalog: &CatalogStore, limit: usize) -> Vec<QueueItem> {
    let mut tracks = catalog.shuffled_view();
    if limit > 0 {
        tracks.truncate(limit);
    }
    debug!("QueueBuilder: random queue of {} track(s)", tracks.len());
    convert_to_queue(&tracks, &[MEDIA_ID_MUSICS_BY_SEARCH, RANDOM_QUEUE_CATEGORY])
        .unwrap_or_default()
}

/// Wraps tracks into queue items carrying the given browse categories.
/// Queue ids start at zero for every new queue.
pub fn convert_to_queue(tracks: &[TrackRef], categories: &[&str]) -> Result<Vec<QueueItem>, QueueError> {
    tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            Ok(QueueItem {
                queue_id: index as u64,
                media_id: media_id::create_media_id(Some(&track.id), categories)?,
                track: TrackRef::clone(track),
            })
        })
        .collect()
}

fn sanitize_category(value: &str) -> String {
    value.replace(['/', '|'], " ")
}

pub fn index_of_media_id(queue: &[QueueItem], media_id: &str) -> Option<usize> {
    queue.iter().position(|item| item.media_id == media_id)
}

pub fn index_of_queue_id(queue: &[QueueItem], queue_id: u64) -> Option<usize> {
    queue.iter().position(|item| item.queue_id == queue_id)
}

pub fn is_index_playable(queue: &[QueueItem], index: usize) -> bool {
    index < queue.len()
}
