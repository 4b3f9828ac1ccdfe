//! Local rendering device.
//!
//! Wraps an opaque render engine and arbitrates audio focus on its behalf.
//! Focus changes arrive asynchronously from the arbiter and are applied on
//! the orchestrator thread through `on_signal`, like every other device
//! callback.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::audio::audio_focus::{AudioFocusArbiter, AudioFocusState, FocusRequestResult};
use crate::audio::playback_device::{
    DeviceEvent, DeviceSignal, DeviceSignalSink, FocusChange, PlaybackDevice, RendererSignal,
};
use crate::config::PlaybackConfig;
use crate::error::DeviceError;
use crate::library::catalog_store::CatalogStore;
use crate::playback::snapshot::PlaybackState;
use crate::playlist::QueueItem;

/// Engine-level state of a prepared source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    #[default]
    Idle,
    Buffering,
    Ready,
    Ended,
}

/// Opaque decode/render engine.
///
/// `prepare` loads a source and returns immediately; progress, completion and
/// failures are reported as `DeviceSignal::Renderer` through the attached sink.
pub trait Renderer: Send {
    fn attach(&mut self, sink: DeviceSignalSink);
    fn prepare(&mut self, source_uri: &str) -> Result<(), DeviceError>;
    /// Drops the prepared source and any engine resources.
    fn release(&mut self);
    fn set_play_when_ready(&mut self, play_when_ready: bool);
    fn play_when_ready(&self) -> bool;
    fn render_state(&self) -> RenderState;
    fn set_volume(&mut self, volume: f32);
    fn seek(&mut self, position_ms: u64);
    fn position_ms(&self) -> u64;
}

/// Renders on this machine's audio output.
pub struct LocalDevice {
    sink: DeviceSignalSink,
    renderer: Box<dyn Renderer>,
    arbiter: Box<dyn AudioFocusArbiter>,
    catalog: Arc<CatalogStore>,
    duck_volume: f32,
    normal_volume: f32,
    focus_state: AudioFocusState,
    /// Resume rendering once focus comes back.
    play_on_focus_gain: bool,
    /// The renderer holds a prepared source.
    prepared: bool,
    /// Reports `Stopped` instead of `None` once the renderer was released.
    released_is_stopped: bool,
    current_media_id: Option<String>,
    /// Seek requested before any source was prepared.
    pending_seek_ms: Option<u64>,
    output_watch_registered: bool,
    /// Transient state (e.g. `Connecting`) shown while nothing is prepared.
    state_override: Option<PlaybackState>,
}

impl LocalDevice {
    pub fn new(
        sink: DeviceSignalSink,
        mut renderer: Box<dyn Renderer>,
        arbiter: Box<dyn AudioFocusArbiter>,
        catalog: Arc<CatalogStore>,
        config: &PlaybackConfig,
    ) -> Self {
        renderer.attach(sink.clone());
        Self {
            sink,
            renderer,
            arbiter,
            catalog,
            duck_volume: config.duck_volume,
            normal_volume: config.normal_volume,
            focus_state: AudioFocusState::NoFocusNoDuck,
            play_on_focus_gain: false,
            prepared: false,
            released_is_stopped: false,
            current_media_id: None,
            pending_seek_ms: None,
            output_watch_registered: false,
            state_override: None,
        }
    }

    pub fn focus_state(&self) -> AudioFocusState {
        self.focus_state
    }

    fn try_to_get_audio_focus(&mut self) {
        self.focus_state = self.arbiter.request_focus(&self.sink).into();
        debug!("LocalDevice: focus request -> {:?}", self.focus_state);
    }

    fn give_up_audio_focus(&mut self) {
        if self.arbiter.abandon_focus() == FocusRequestResult::Granted {
            self.focus_state = AudioFocusState::NoFocusNoDuck;
        }
    }

    fn register_output_watch(&mut self) {
        self.output_watch_registered = true;
    }

    fn unregister_output_watch(&mut self) {
        self.output_watch_registered = false;
    }

    fn release_renderer(&mut self) {
        if self.prepared {
            self.renderer.release();
            self.prepared = false;
            self.released_is_stopped = true;
        }
    }

    /// Applies the focus state to the renderer: pause without focus, duck on
    /// a duckable loss, full volume otherwise, and resume if it was asked to.
    fn configure_player_state(&mut self) {
        debug!("LocalDevice: configure player, focus={:?}", self.focus_state);
        if self.focus_state == AudioFocusState::NoFocusNoDuck {
            self.pause();
            return;
        }
        self.register_output_watch();
        let volume = if self.focus_state == AudioFocusState::NoFocusCanDuck {
            self.duck_volume
        } else {
            self.normal_volume
        };
        self.renderer.set_volume(volume);
        if self.play_on_focus_gain {
            self.renderer.set_play_when_ready(true);
            self.play_on_focus_gain = false;
        }
    }

    fn on_focus_change(&mut self, change: FocusChange) {
        debug!("LocalDevice: focus change {:?}", change);
        self.focus_state = self.focus_state.after(change);
        match change {
            FocusChange::LossTransient => {
                self.play_on_focus_gain = self.prepared && self.renderer.play_when_ready();
            }
            FocusChange::Loss => self.play_on_focus_gain = false,
            FocusChange::Gain | FocusChange::LossTransientCanDuck => {}
        }
        if self.prepared {
            self.configure_player_state();
        }
    }

    fn prepare_item(&mut self, item: &QueueItem) -> Result<(), DeviceError> {
        let music_id = item.music_id();
        let track = self
            .catalog
            .get_track(music_id)
            .ok_or_else(|| DeviceError::UnknownTrack(music_id.to_string()))?;
        let source = track.source_uri.replace(' ', "%20");
        info!("LocalDevice: preparing {} from {}", music_id, source);
        // The old source must not outlive a failed prepare of the new one.
        self.release_renderer();
        if let Err(err) = self.renderer.prepare(&source) {
            self.prepared = false;
            self.play_on_focus_gain = false;
            return Err(err);
        }
        self.prepared = true;
        self.state_override = None;
        if let Some(position_ms) = self.pending_seek_ms.take() {
            self.renderer.seek(position_ms);
        }
        Ok(())
    }
}

impl PlaybackDevice for LocalDevice {
    fn device_id(&self) -> u64 {
        self.sink.device_id()
    }

    fn name(&self) -> &str {
        "local"
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn stop(&mut self, _notify_listeners: bool) {
        self.give_up_audio_focus();
        self.unregister_output_watch();
        self.release_renderer();
        self.play_on_focus_gain = false;
        self.state_override = None;
        self.pending_seek_ms = None;
    }

    fn set_state(&mut self, state: PlaybackState) {
        // A prepared renderer owns the state; None and Stopped are derived.
        if !self.prepared {
            self.state_override = match state {
                PlaybackState::None | PlaybackState::Stopped => None,
                other => Some(other),
            };
        }
    }

    fn state(&self) -> PlaybackState {
        if !self.prepared {
            if let Some(state) = self.state_override {
                return state;
            }
            return if self.released_is_stopped {
                PlaybackState::Stopped
            } else {
                PlaybackState::None
            };
        }
        match self.renderer.render_state() {
            RenderState::Idle | RenderState::Ended => PlaybackState::Paused,
            RenderState::Buffering => PlaybackState::Buffering,
            RenderState::Ready if self.renderer.play_when_ready() => PlaybackState::Playing,
            RenderState::Ready => PlaybackState::Paused,
        }
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn is_playing(&self) -> bool {
        self.play_on_focus_gain || (self.prepared && self.renderer.play_when_ready())
    }

    fn current_position_ms(&self) -> u64 {
        if self.prepared {
            self.renderer.position_ms()
        } else {
            self.pending_seek_ms.unwrap_or(0)
        }
    }

    fn play(&mut self, item: &QueueItem) -> Result<(), DeviceError> {
        self.play_on_focus_gain = true;
        self.try_to_get_audio_focus();
        self.register_output_watch();
        let media_changed = self.current_media_id.as_deref() != Some(item.media_id.as_str());
        if media_changed {
            self.current_media_id = Some(item.media_id.clone());
            self.pending_seek_ms = None;
        }
        if media_changed || !self.prepared {
            self.prepare_item(item)?;
        }
        self.configure_player_state();
        Ok(())
    }

    fn pause(&mut self) {
        if self.prepared {
            self.renderer.set_play_when_ready(false);
        }
        self.unregister_output_watch();
    }

    fn seek(&mut self, position_ms: u64) {
        debug!("LocalDevice: seek to {}ms", position_ms);
        if self.prepared {
            self.register_output_watch();
            self.renderer.seek(position_ms);
        } else {
            self.pending_seek_ms = Some(position_ms);
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
            DeviceSignal::Renderer(RendererSignal::StateChanged) => {
                Some(DeviceEvent::StateChanged(self.state()))
            }
            DeviceSignal::Renderer(RendererSignal::Ended) if !self.prepared => {
                debug!("LocalDevice: ignoring end of a released source");
                None
            }
            DeviceSignal::Renderer(RendererSignal::Ended) => Some(DeviceEvent::Completion),
            DeviceSignal::Renderer(RendererSignal::Error(message)) => {
                warn!("LocalDevice: renderer error: {}", message);
                Some(DeviceEvent::Error(message))
            }
            DeviceSignal::Focus(change) => {
                self.on_focus_change(change);
                Some(DeviceEvent::StateChanged(self.state()))
            }
            DeviceSignal::OutputRemoved => {
                if self.output_watch_registered && self.is_playing() {
                    info!("LocalDevice: output removed while playing, requesting pause");
                    Some(DeviceEvent::PauseRequested)
                } else {
                    None
                }
            }
            DeviceSignal::Notify(event) => Some(event),
            DeviceSignal::Receiver(status) => {
                warn!("LocalDevice: ignoring receiver status {:?}", status);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::queue_builder;
    use crate::test_support::{loaded_catalog, local_device, LocalDeviceProbes};

    fn rock_item(index: usize) -> QueueItem {
        let catalog = loaded_catalog();
        let tracks = catalog.tracks_by_genre("Rock");
        let queue = queue_builder::convert_to_queue(&tracks, &["__BY_GENRE__", "Rock"]).unwrap();
        queue[index].clone()
    }

    fn playing_device() -> (LocalDevice, LocalDeviceProbes) {
        let (mut device, probes) = local_device();
        device.play(&rock_item(0)).unwrap();
        (device, probes)
    }

    #[test]
    fn test_fresh_device_reports_none() {
        let (device, _probes) = local_device();
        assert_eq!(device.state(), PlaybackState::None);
        assert!(!device.is_playing());
        assert_eq!(device.current_position_ms(), 0);
    }

    #[test]
    fn test_play_prepares_escaped_source_and_renders() {
        let (device, probes) = playing_device();
        let renderer = probes.renderer.lock().unwrap();
        assert_eq!(renderer.prepared, vec!["file:///music/Rock%20track1.mp3".to_string()]);
        assert!(renderer.play_when_ready);
        assert_eq!(renderer.volume, 1.0);
        drop(renderer);
        assert_eq!(device.state(), PlaybackState::Playing);
        assert_eq!(device.focus_state(), AudioFocusState::Focused);
        assert_eq!(device.current_media_id(), Some("__BY_GENRE__/Rock|track1"));
    }

    #[test]
    fn test_same_media_reuses_prepared_source() {
        let (mut device, probes) = playing_device();
        device.pause();
        device.play(&rock_item(0)).unwrap();
        assert_eq!(probes.renderer.lock().unwrap().prepared.len(), 1);
        device.play(&rock_item(1)).unwrap();
        assert_eq!(probes.renderer.lock().unwrap().prepared.len(), 2);
    }

    #[test]
    fn test_duckable_loss_lowers_volume_and_keeps_rendering() {
        let (mut device, probes) = playing_device();
        let event = device.on_signal(DeviceSignal::Focus(FocusChange::LossTransientCanDuck));
        assert_eq!(event, Some(DeviceEvent::StateChanged(PlaybackState::Playing)));
        assert_eq!(device.focus_state(), AudioFocusState::NoFocusCanDuck);
        let renderer = probes.renderer.lock().unwrap();
        assert_eq!(renderer.volume, 0.2);
        assert!(renderer.play_when_ready);
    }

    #[test]
    fn test_transient_loss_pauses_then_resumes_on_gain() {
        let (mut device, probes) = playing_device();
        device.on_signal(DeviceSignal::Focus(FocusChange::LossTransient));
        assert!(!probes.renderer.lock().unwrap().play_when_ready);
        assert_eq!(device.state(), PlaybackState::Paused);
        assert!(device.is_playing());

        device.on_signal(DeviceSignal::Focus(FocusChange::Gain));
        let renderer = probes.renderer.lock().unwrap();
        assert!(renderer.play_when_ready);
        assert_eq!(renderer.volume, 1.0);
        drop(renderer);
        assert_eq!(device.focus_state(), AudioFocusState::Focused);
        assert_eq!(device.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_permanent_loss_pauses_without_resume() {
        let (mut device, probes) = playing_device();
        device.on_signal(DeviceSignal::Focus(FocusChange::Loss));
        assert!(!probes.renderer.lock().unwrap().play_when_ready);
        assert!(!device.is_playing());

        device.on_signal(DeviceSignal::Focus(FocusChange::Gain));
        assert!(!probes.renderer.lock().unwrap().play_when_ready);
        assert_eq!(device.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_denied_focus_holds_playback_until_gain() {
        let (mut device, probes) = local_device();
        probes.arbiter.lock().unwrap().grant = false;
        device.play(&rock_item(0)).unwrap();
        assert!(!probes.renderer.lock().unwrap().play_when_ready);
        assert!(device.is_playing());

        device.on_signal(DeviceSignal::Focus(FocusChange::Gain));
        assert!(probes.renderer.lock().unwrap().play_when_ready);
    }

    #[test]
    fn test_output_removed_only_requests_pause() {
        let (mut device, probes) = playing_device();
        let event = device.on_signal(DeviceSignal::OutputRemoved);
        assert_eq!(event, Some(DeviceEvent::PauseRequested));
        assert!(probes.renderer.lock().unwrap().play_when_ready);

        device.pause();
        assert_eq!(device.on_signal(DeviceSignal::OutputRemoved), None);
    }

    #[test]
    fn test_stop_releases_and_reports_stopped() {
        let (mut device, probes) = playing_device();
        device.stop(true);
        assert_eq!(device.state(), PlaybackState::Stopped);
        assert!(!device.is_playing());
        assert_eq!(probes.renderer.lock().unwrap().releases, 1);
        assert_eq!(probes.arbiter.lock().unwrap().abandons, 1);
        assert_eq!(device.focus_state(), AudioFocusState::NoFocusNoDuck);
    }

    #[test]
    fn test_seek_before_prepare_applies_on_play() {
        let (mut device, probes) = local_device();
        device.set_current_media_id(Some("__BY_GENRE__/Rock|track1".to_string()));
        device.seek(42_000);
        assert_eq!(device.current_position_ms(), 42_000);
        device.play(&rock_item(0)).unwrap();
        assert_eq!(probes.renderer.lock().unwrap().position_ms, 42_000);
        assert_eq!(device.current_position_ms(), 42_000);
    }

    #[test]
    fn test_prepare_failure_is_reported() {
        let (mut device, probes) = local_device();
        probes.renderer.lock().unwrap().fail_prepare = Some("codec".to_string());
        let result = device.play(&rock_item(0));
        assert_eq!(result, Err(DeviceError::Render("codec".to_string())));
        assert_eq!(device.state(), PlaybackState::None);
    }

    #[test]
    fn test_failed_prepare_releases_previous_source() {
        let (mut device, probes) = playing_device();
        probes.renderer.lock().unwrap().fail_prepare = Some("codec".to_string());
        let result = device.play(&rock_item(1));
        assert_eq!(result, Err(DeviceError::Render("codec".to_string())));
        {
            let renderer = probes.renderer.lock().unwrap();
            assert_eq!(renderer.releases, 1);
            assert!(!renderer.play_when_ready);
        }
        assert!(!device.is_playing());
        assert_eq!(device.on_signal(DeviceSignal::Renderer(RendererSignal::Ended)), None);

        device.stop(true);
        assert_eq!(probes.renderer.lock().unwrap().releases, 1);
    }

    #[test]
    fn test_renderer_signals_map_to_events() {
        let (mut device, _probes) = playing_device();
        assert_eq!(
            device.on_signal(DeviceSignal::Renderer(RendererSignal::Ended)),
            Some(DeviceEvent::Completion)
        );
        assert_eq!(
            device.on_signal(DeviceSignal::Renderer(RendererSignal::Error("net-timeout".into()))),
            Some(DeviceEvent::Error("net-timeout".to_string()))
        );
    }

    #[test]
    fn test_connecting_override_clears_back_to_derived_state() {
        let (mut device, _probes) = playing_device();
        device.stop(true);
        device.set_state(PlaybackState::Connecting);
        assert_eq!(device.state(), PlaybackState::Connecting);
        device.set_state(PlaybackState::None);
        assert_eq!(device.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_connecting_override_until_prepared() {
        let (mut device, _probes) = local_device();
        device.set_state(PlaybackState::Connecting);
        assert_eq!(device.state(), PlaybackState::Connecting);
        device.play(&rock_item(0)).unwrap();
        assert_eq!(device.state(), PlaybackState::Playing);
    }
}
