//! Remote receiver device.
//!
//! Proxies transport commands to a receiver reached over some transport the
//! host provides. The receiver owns volume and ducking; this device only keeps
//! the state it last heard, the media id, and the last known position.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::audio::playback_device::{
    DeviceEvent, DeviceSignal, DeviceSignalSink, PlaybackDevice, ReceiverStatus,
};
use crate::error::DeviceError;
use crate::library::catalog_store::CatalogStore;
use crate::media_id;
use crate::playback::snapshot::PlaybackState;
use crate::playlist::QueueItem;

/// Media load sent to a receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteLoadRequest {
    /// Hierarchy-aware id echoed back in the receiver's status.
    pub media_id: String,
    pub source_uri: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_uri: Option<String>,
    pub duration_ms: u64,
    pub position_ms: u64,
    pub autoplay: bool,
}

/// Transport to a remote receiver.
///
/// Status updates are delivered as `DeviceSignal::Receiver` through the sink
/// given to `attach`.
pub trait RemoteReceiver: Send {
    fn attach(&mut self, sink: DeviceSignalSink);
    fn detach(&mut self);
    fn is_connected(&self) -> bool;
    /// Whether the receiver currently has media loaded.
    fn has_media_session(&self) -> bool;
    fn is_playing(&self) -> bool;
    fn load(&mut self, request: RemoteLoadRequest) -> Result<(), DeviceError>;
    fn play(&mut self) -> Result<(), DeviceError>;
    fn pause(&mut self) -> Result<(), DeviceError>;
    fn seek(&mut self, position_ms: u64) -> Result<(), DeviceError>;
    fn approximate_position_ms(&self) -> u64;
}

/// Plays through a remote receiver.
pub struct RemoteDevice {
    sink: DeviceSignalSink,
    receiver: Box<dyn RemoteReceiver>,
    catalog: Arc<CatalogStore>,
    state: PlaybackState,
    current_media_id: Option<String>,
    /// Last position heard from (or sent to) the receiver.
    current_position_ms: u64,
}

impl RemoteDevice {
    pub fn new(
        sink: DeviceSignalSink,
        receiver: Box<dyn RemoteReceiver>,
        catalog: Arc<CatalogStore>,
    ) -> Self {
        Self {
            sink,
            receiver,
            catalog,
            state: PlaybackState::None,
            current_media_id: None,
            current_position_ms: 0,
        }
    }

    fn update_last_known_position(&mut self) {
        self.current_position_ms = self.current_position_ms();
    }

    fn load_media(&mut self, media_id: &str, autoplay: bool) -> Result<(), DeviceError> {
        let music_id = media_id::extract_music_id(media_id).unwrap_or(media_id);
        let track = self
            .catalog
            .get_track(music_id)
            .ok_or_else(|| DeviceError::UnknownTrack(music_id.to_string()))?;
        if self.current_media_id.as_deref() != Some(media_id) {
            self.current_media_id = Some(media_id.to_string());
            self.current_position_ms = 0;
        }
        info!(
            "RemoteDevice: loading {} at {}ms (autoplay={})",
            media_id, self.current_position_ms, autoplay
        );
        self.receiver.load(RemoteLoadRequest {
            media_id: media_id.to_string(),
            source_uri: track.source_uri.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            artwork_uri: track.artwork.remote_uri.clone(),
            duration_ms: track.duration_ms,
            position_ms: self.current_position_ms,
            autoplay,
        })
    }

    /// Adopts a media id the receiver reports. Returns whether it changed.
    fn follow_remote_media(&mut self, remote_media_id: String) -> bool {
        if self.current_media_id.as_deref() == Some(remote_media_id.as_str()) {
            return false;
        }
        info!("RemoteDevice: receiver switched media to {}", remote_media_id);
        self.current_media_id = Some(remote_media_id);
        self.update_last_known_position();
        true
    }

    fn notify(&self, event: DeviceEvent) {
        self.sink.send(DeviceSignal::Notify(event));
    }
}

impl PlaybackDevice for RemoteDevice {
    fn device_id(&self) -> u64 {
        self.sink.device_id()
    }

    fn name(&self) -> &str {
        "remote"
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if !self.receiver.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        self.receiver.attach(self.sink.clone());
        Ok(())
    }

    fn stop(&mut self, notify_listeners: bool) {
        self.receiver.detach();
        self.state = PlaybackState::Stopped;
        if notify_listeners {
            self.notify(DeviceEvent::StateChanged(self.state));
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn is_connected(&self) -> bool {
        self.receiver.is_connected()
    }

    fn is_playing(&self) -> bool {
        self.receiver.is_connected() && self.receiver.is_playing()
    }

    fn current_position_ms(&self) -> u64 {
        if !self.receiver.is_connected() {
            return self.current_position_ms;
        }
        self.receiver.approximate_position_ms()
    }

    fn play(&mut self, item: &QueueItem) -> Result<(), DeviceError> {
        self.load_media(&item.media_id, true)?;
        self.state = PlaybackState::Buffering;
        self.notify(DeviceEvent::StateChanged(self.state));
        Ok(())
    }

    fn pause(&mut self) {
        let result = if self.receiver.has_media_session() {
            let result = self.receiver.pause();
            self.update_last_known_position();
            result
        } else {
            match self.current_media_id.clone() {
                Some(media_id) => self.load_media(&media_id, false),
                None => Ok(()),
            }
        };
        if let Err(err) = result {
            warn!("RemoteDevice: pause failed: {}", err);
            self.notify(DeviceEvent::Error(err.to_string()));
        }
    }

    fn seek(&mut self, position_ms: u64) {
        let Some(media_id) = self.current_media_id.clone() else {
            self.current_position_ms = position_ms;
            return;
        };
        self.current_position_ms = position_ms;
        let result = if self.receiver.has_media_session() {
            self.receiver.seek(position_ms)
        } else {
            self.load_media(&media_id, false)
        };
        if let Err(err) = result {
            warn!("RemoteDevice: seek failed: {}", err);
            self.notify(DeviceEvent::Error(err.to_string()));
        }
    }

    fn set_current_media_id(&mut self, media_id: Option<String>) {
        self.current_media_id = media_id;
    }

    fn current_media_id(&self) -> Option<&str> {
        self.current_media_id.as_deref()
    }

    fn on_signal(&mut self, signal: DeviceSignal) -> Option<DeviceEvent> {
        match signal {
            DeviceSignal::Receiver(ReceiverStatus::MediaChanged(media_id)) => self
                .follow_remote_media(media_id.clone())
                .then_some(DeviceEvent::MediaChanged(media_id)),
            DeviceSignal::Receiver(ReceiverStatus::Idle { finished }) => {
                finished.then_some(DeviceEvent::Completion)
            }
            DeviceSignal::Receiver(ReceiverStatus::Buffering) => {
                self.state = PlaybackState::Buffering;
                Some(DeviceEvent::StateChanged(self.state))
            }
            DeviceSignal::Receiver(ReceiverStatus::Playing) => {
                self.state = PlaybackState::Playing;
                self.update_last_known_position();
                Some(DeviceEvent::StateChanged(self.state))
            }
            DeviceSignal::Receiver(ReceiverStatus::Paused) => {
                self.state = PlaybackState::Paused;
                self.update_last_known_position();
                Some(DeviceEvent::StateChanged(self.state))
            }
            DeviceSignal::Receiver(ReceiverStatus::Error(message)) => {
                warn!("RemoteDevice: receiver error: {}", message);
                Some(DeviceEvent::Error(message))
            }
            DeviceSignal::Notify(event) => Some(event),
            other => {
                debug!("RemoteDevice: ignoring signal {:?}", other);
                None
            }
        }
    }
}
