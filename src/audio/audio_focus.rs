//! Audio focus arbitration for local rendering.

use log::debug;

use crate::audio::playback_device::{DeviceSignalSink, FocusChange};

/// Outcome of a focus request or abandonment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequestResult {
    Granted,
    Denied,
}

/// External arbiter deciding which process may use the audio output.
///
/// After a request, later focus changes are delivered as
/// `DeviceSignal::Focus` through the sink passed to `request_focus`.
pub trait AudioFocusArbiter: Send {
    fn request_focus(&mut self, sink: &DeviceSignalSink) -> FocusRequestResult;
    fn abandon_focus(&mut self) -> FocusRequestResult;
}

/// Focus held by the local device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFocusState {
    /// No focus and ducking not allowed: rendering must pause.
    NoFocusNoDuck,
    /// Transient loss, rendering may continue at duck volume.
    NoFocusCanDuck,
    Focused,
}

impl AudioFocusState {
    pub fn after(self, change: FocusChange) -> AudioFocusState {
        match change {
            FocusChange::Gain => AudioFocusState::Focused,
            FocusChange::LossTransientCanDuck => AudioFocusState::NoFocusCanDuck,
            FocusChange::LossTransient | FocusChange::Loss => AudioFocusState::NoFocusNoDuck,
        }
    }
}

impl From<FocusRequestResult> for AudioFocusState {
    fn from(result: FocusRequestResult) -> Self {
        match result {
            FocusRequestResult::Granted => AudioFocusState::Focused,
            FocusRequestResult::Denied => AudioFocusState::NoFocusNoDuck,
        }
    }
}

/// Arbiter for hosts without competing audio: every request is granted.
#[derive(Debug, Default)]
pub struct ExclusiveOutputArbiter {
    held: bool,
}

impl AudioFocusArbiter for ExclusiveOutputArbiter {
    fn request_focus(&mut self, sink: &DeviceSignalSink) -> FocusRequestResult {
        if !self.held {
            debug!("ExclusiveOutputArbiter: focus granted to device {}", sink.device_id());
        }
        self.held = true;
        FocusRequestResult::Granted
    }

    fn abandon_focus(&mut self) -> FocusRequestResult {
        self.held = false;
        FocusRequestResult::Granted
    }
}
