//! Headless playback control plane: catalog, play queue, playback devices and
//! the orchestrator that serializes everything between them.

pub mod app_bootstrap;
pub mod audio;
pub mod config;
pub mod config_persistence;
pub mod error;
pub mod host_commands;
pub mod library;
pub mod media_id;
pub mod playback;
pub mod playlist;
pub mod protocol;

#[cfg(test)]
mod test_support;
