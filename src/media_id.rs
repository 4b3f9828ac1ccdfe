//! Hierarchy-aware media id helpers.
//!
//! A media id carries the browse path a track was selected from plus the
//! unique track id: `__BY_GENRE__/Rock|track-id`. The path lets the queue
//! manager rebuild the right queue for a selection and decide whether a new
//! selection shares the current queue's browse category.

use crate::error::QueueError;

pub const MEDIA_ID_ROOT: &str = "__ROOT__";
pub const MEDIA_ID_EMPTY_ROOT: &str = "__EMPTY_ROOT__";
pub const MEDIA_ID_MUSICS_BY_GENRE: &str = "__BY_GENRE__";
pub const MEDIA_ID_MUSICS_BY_SEARCH: &str = "__BY_SEARCH__";

const CATEGORY_SEPARATOR: char = '/';
const LEAF_SEPARATOR: char = '|';

/// Builds a media id from an optional track id and its browse categories.
pub fn create_media_id(music_id: Option<&str>, categories: &[&str]) -> Result<String, QueueError> {
    let mut media_id = String::new();
    for (index, category) in categories.iter().enumerate() {
        if !is_valid_category(category) {
            return Err(QueueError::InvalidCategory((*category).to_string()));
        }
        if index > 0 {
            media_id.push(CATEGORY_SEPARATOR);
        }
        media_id.push_str(category);
    }
    if let Some(music_id) = music_id {
        media_id.push(LEAF_SEPARATOR);
        media_id.push_str(music_id);
    }
    Ok(media_id)
}

fn is_valid_category(category: &str) -> bool {
    !category.contains(CATEGORY_SEPARATOR) && !category.contains(LEAF_SEPARATOR)
}

/// Extracts the unique track id, or `None` for a pure browse id.
pub fn extract_music_id(media_id: &str) -> Option<&str> {
    media_id
        .find(LEAF_SEPARATOR)
        .map(|pos| &media_id[pos + LEAF_SEPARATOR.len_utf8()..])
}

/// Returns the browse categories of a media id, without the track leaf.
pub fn hierarchy(media_id: &str) -> Vec<&str> {
    let path = match media_id.find(LEAF_SEPARATOR) {
        Some(pos) => &media_id[..pos],
        None => media_id,
    };
    path.split(CATEGORY_SEPARATOR).collect()
}

/// Returns the value of the innermost category (e.g. the genre name).
pub fn extract_browse_category_value(media_id: &str) -> Option<&str> {
    let categories = hierarchy(media_id);
    if categories.len() <= 1 {
        return None;
    }
    categories.last().copied()
}

pub fn is_browseable(media_id: &str) -> bool {
    !media_id.contains(LEAF_SEPARATOR)
}

/// Returns the id of the browse node containing `media_id`.
pub fn parent_media_id(media_id: &str) -> Result<String, QueueError> {
    let mut categories = hierarchy(media_id);
    if is_browseable(media_id) {
        categories.pop();
    }
    if categories.is_empty() || categories == [""] {
        return Ok(MEDIA_ID_ROOT.to_string());
    }
    create_media_id(None, &categories)
}
