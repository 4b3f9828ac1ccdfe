//! Published playback state.

use std::time::Instant;

/// Transport state of the active device, as published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    None,
    Stopped,
    Paused,
    Playing,
    Buffering,
    Connecting,
    Error,
}

/// Bitmask of transport actions a client may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaybackActions(u32);

impl PlaybackActions {
    pub const STOP: Self = Self(1 << 0);
    pub const PAUSE: Self = Self(1 << 1);
    pub const PLAY: Self = Self(1 << 2);
    pub const SKIP_TO_PREVIOUS: Self = Self(1 << 3);
    pub const SKIP_TO_NEXT: Self = Self(1 << 4);
    pub const SEEK_TO: Self = Self(1 << 5);
    pub const PLAY_PAUSE: Self = Self(1 << 6);
    pub const PLAY_FROM_MEDIA_ID: Self = Self(1 << 7);
    pub const PLAY_FROM_SEARCH: Self = Self(1 << 8);
    pub const SKIP_TO_QUEUE_ITEM: Self = Self(1 << 9);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for PlaybackActions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Custom action toggling the current track's favorite flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteAction {
    pub music_id: String,
    /// Membership at publication time; drives the on/off icon.
    pub is_favorite: bool,
}

pub const CUSTOM_ACTION_THUMBS_UP: &str = "playdeck.THUMBS_UP";

/// Immutable playback state published after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    /// `None` when the device cannot report a position.
    pub position_ms: Option<u64>,
    pub updated_at: Instant,
    pub speed: f32,
    pub actions: PlaybackActions,
    pub active_queue_item_id: Option<u64>,
    pub error_message: Option<String>,
    pub favorite_action: Option<FavoriteAction>,
}

impl PlaybackSnapshot {
    /// Whether a session notification should accompany this snapshot.
    pub fn requires_notification(&self) -> bool {
        matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
    }
}
