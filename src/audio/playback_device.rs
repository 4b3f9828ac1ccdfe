//! Device abstraction shared by local and remote rendering.
//!
//! Devices never call back into the orchestrator. Anything that happens on a
//! device's own background activity (renderer progress, focus changes, the
//! receiver's status stream) is posted as a [`DeviceSignal`] through the
//! device's [`DeviceSignalSink`]. The orchestrator routes the signal back to
//! the device that emitted it, on its own thread, and the device translates
//! it into a [`DeviceEvent`] the orchestrator acts upon.

use tokio::sync::mpsc::UnboundedSender;

use crate::error::DeviceError;
use crate::playback::snapshot::PlaybackState;
use crate::playlist::QueueItem;
use crate::protocol::ControlMessage;

/// Progress reported by a local render engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererSignal {
    /// The engine moved between idle, buffering and ready.
    StateChanged,
    /// The current source played to its end.
    Ended,
    Error(String),
}

/// Audio focus change delivered by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

/// Status pushed by a remote receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverStatus {
    Playing,
    Paused,
    Buffering,
    /// Receiver went idle; `finished` is set when the media played to its end.
    Idle { finished: bool },
    /// The receiver loaded different media (another controller picked it).
    MediaChanged(String),
    Error(String),
}

/// Raw signal emitted by a device's background activity.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceSignal {
    Renderer(RendererSignal),
    Focus(FocusChange),
    /// The audio output disappeared (e.g. headphones unplugged).
    OutputRemoved,
    Receiver(ReceiverStatus),
    /// Event the device queued for itself to be delivered asynchronously.
    Notify(DeviceEvent),
}

/// What the orchestrator has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    StateChanged(PlaybackState),
    Completion,
    Error(String),
    /// The device wants playback paused; the orchestrator decides.
    PauseRequested,
    /// The device is now playing a media id chosen elsewhere.
    MediaChanged(String),
}

/// Handle a device uses to post signals onto the orchestrator's channel.
///
/// Every sink is bound to one device id; signals from a device that is no
/// longer active are discarded by the orchestrator.
#[derive(Debug, Clone)]
pub struct DeviceSignalSink {
    device_id: u64,
    sender: UnboundedSender<ControlMessage>,
}

impl DeviceSignalSink {
    pub(crate) fn new(device_id: u64, sender: UnboundedSender<ControlMessage>) -> Self {
        Self { device_id, sender }
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    /// Posts a signal. Returns `false` once the orchestrator is gone.
    pub fn send(&self, signal: DeviceSignal) -> bool {
        self.sender
            .send(ControlMessage::Device {
                device_id: self.device_id,
                signal,
            })
            .is_ok()
    }
}

/// A render target the orchestrator can drive.
///
/// Calls return promptly; rendering progress arrives later through the
/// device's signal sink.
pub trait PlaybackDevice: Send {
    fn device_id(&self) -> u64;

    /// Short name for logs.
    fn name(&self) -> &str;

    /// Prepares the device to accept commands after a swap.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stops rendering and releases resources.
    fn stop(&mut self, notify_listeners: bool);

    fn set_state(&mut self, state: PlaybackState);

    fn state(&self) -> PlaybackState;

    fn is_connected(&self) -> bool;

    fn is_playing(&self) -> bool;

    fn current_position_ms(&self) -> u64;

    fn play(&mut self, item: &QueueItem) -> Result<(), DeviceError>;

    fn pause(&mut self);

    fn seek(&mut self, position_ms: u64);

    fn set_current_media_id(&mut self, media_id: Option<String>);

    fn current_media_id(&self) -> Option<&str>;

    /// Translates a signal this device emitted into an orchestrator event.
    fn on_signal(&mut self, signal: DeviceSignal) -> Option<DeviceEvent>;
}
