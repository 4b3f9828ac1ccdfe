//! Messages exchanged between the orchestrator, its devices, and the host.
//!
//! Two channels carry traffic:
//! - the publication bus, a `broadcast` of [`Message`] that any number of
//!   host subscribers read (queue and session notifications);
//! - the control channel, an unbounded `mpsc` of [`ControlMessage`] consumed
//!   only by the orchestrator thread. Commands, device signals, catalog
//!   completions and device swaps all enter through it, so they are applied
//!   one at a time and in arrival order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::audio::playback_device::{DeviceSignal, DeviceSignalSink, PlaybackDevice};
use crate::library::track::{Artwork, TrackRef};
use crate::playback::snapshot::PlaybackSnapshot;
use crate::playlist::QueueItem;

/// Top-level envelope for publication bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Queue(QueueMessage),
    Session(SessionMessage),
}

/// Queue notifications.
#[derive(Debug, Clone)]
pub enum QueueMessage {
    QueueUpdated { title: String, items: Vec<QueueItem> },
    MetadataChanged(TrackRef),
    CurrentQueueIndexUpdated(usize),
    MetadataRetrieveError,
}

/// Session notifications for the host's transport binding.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// Playback is starting; the host should keep the process running.
    PlaybackStart,
    /// Playback halted; the host may cancel keep-alive work.
    PlaybackStop,
    NotificationRequired,
    PlaybackStateUpdated(PlaybackSnapshot),
}

/// Field a voice/text search is focused on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchFocus {
    #[default]
    Any,
    Artist,
    Album,
    Genre,
    Title,
}

/// Client transport commands.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Stop,
    SeekTo(u64),
    PlayFromMediaId(String),
    PlayFromSearch { query: String, focus: SearchFocus },
    SkipToQueueItem(u64),
    SkipToNext,
    SkipToPrevious,
    SetFavorite { music_id: String, favorite: bool },
    CustomAction(String),
}

/// Command parked until the catalog finished loading.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingRequest {
    Play,
    PlayFromMediaId(String),
    PlayFromSearch { query: String, focus: SearchFocus },
}

/// Everything the orchestrator consumes.
pub enum ControlMessage {
    Command(PlaybackCommand),
    Device {
        device_id: u64,
        signal: DeviceSignal,
    },
    CatalogReady {
        /// Matches the wait that parked `pending`; stale ids are dropped.
        request_id: u64,
        success: bool,
        pending: PendingRequest,
    },
    ArtworkFetched {
        music_id: String,
        artwork: Artwork,
    },
    SwitchDevice {
        device: Box<dyn PlaybackDevice>,
        resume_if_was_playing: bool,
    },
    Shutdown,
}

impl fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::Command(command) => f.debug_tuple("Command").field(command).finish(),
            ControlMessage::Device { device_id, signal } => f
                .debug_struct("Device")
                .field("device_id", device_id)
                .field("signal", signal)
                .finish(),
            ControlMessage::CatalogReady {
                request_id,
                success,
                pending,
            } => f
                .debug_struct("CatalogReady")
                .field("request_id", request_id)
                .field("success", success)
                .field("pending", pending)
                .finish(),
            ControlMessage::ArtworkFetched { music_id, .. } => f
                .debug_struct("ArtworkFetched")
                .field("music_id", music_id)
                .finish(),
            ControlMessage::SwitchDevice {
                device,
                resume_if_was_playing,
            } => f
                .debug_struct("SwitchDevice")
                .field("device", &device.name())
                .field("resume_if_was_playing", resume_if_was_playing)
                .finish(),
            ControlMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Cloneable entry point to the orchestrator.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: UnboundedSender<ControlMessage>,
    next_device_id: Arc<AtomicU64>,
}

impl ControlHandle {
    pub fn channel() -> (Self, UnboundedReceiver<ControlMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                next_device_id: Arc::new(AtomicU64::new(1)),
            },
            receiver,
        )
    }

    /// Posts a message. Returns `false` once the orchestrator has exited.
    pub fn send(&self, message: ControlMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn command(&self, command: PlaybackCommand) -> bool {
        self.send(ControlMessage::Command(command))
    }

    /// Allocates a fresh device id and a sink bound to it.
    pub fn signal_sink(&self) -> DeviceSignalSink {
        let device_id = self.next_device_id.fetch_add(1, Ordering::Relaxed);
        DeviceSignalSink::new(device_id, self.sender.clone())
    }

    pub fn switch_device(&self, device: Box<dyn PlaybackDevice>, resume_if_was_playing: bool) -> bool {
        self.send(ControlMessage::SwitchDevice {
            device,
            resume_if_was_playing,
        })
    }

    pub fn artwork_fetched(&self, music_id: &str, artwork: Artwork) -> bool {
        self.send(ControlMessage::ArtworkFetched {
            music_id: music_id.to_string(),
            artwork,
        })
    }

    pub fn shutdown(&self) -> bool {
        self.send(ControlMessage::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_sinks_get_distinct_ids() {
        let (handle, mut receiver) = ControlHandle::channel();
        let first = handle.signal_sink();
        let second = handle.clone().signal_sink();
        assert_ne!(first.device_id(), second.device_id());

        assert!(second.send(DeviceSignal::OutputRemoved));
        match receiver.try_recv() {
            Ok(ControlMessage::Device { device_id, signal }) => {
                assert_eq!(device_id, second.device_id());
                assert_eq!(signal, DeviceSignal::OutputRemoved);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_send_fails_after_receiver_dropped() {
        let (handle, receiver) = ControlHandle::channel();
        assert!(handle.command(PlaybackCommand::Play));
        drop(receiver);
        assert!(!handle.command(PlaybackCommand::Pause));
        assert!(!handle.signal_sink().send(DeviceSignal::OutputRemoved));
    }
}
