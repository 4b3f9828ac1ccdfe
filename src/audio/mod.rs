//! Playback devices (local renderer, remote receiver) and audio focus.

pub mod audio_focus;
pub mod clock_renderer;
pub mod local_device;
pub mod playback_device;
pub mod remote_device;
