//! Playback orchestration and published state.

pub mod playback_manager;
pub mod snapshot;
