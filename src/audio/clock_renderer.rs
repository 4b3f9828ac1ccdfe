//! Wall-clock renderer used by the headless host.
//!
//! Produces no audio. A prepared source "plays" for a fixed length while
//! `play_when_ready` is set, and a watcher thread reports the end of the
//! source through the device sink just like a real engine would.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::audio::local_device::{RenderState, Renderer};
use crate::audio::playback_device::{DeviceSignal, DeviceSignalSink, RendererSignal};
use crate::error::DeviceError;

const WATCH_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct ClockState {
    source: Option<String>,
    state: RenderState,
    play_when_ready: bool,
    /// Position accumulated before the current run started.
    base_position_ms: u64,
    running_since: Option<Instant>,
    volume: f32,
    /// Bumped on every prepare/release so stale watchers exit.
    generation: u64,
}

impl ClockState {
    fn position_ms(&self) -> u64 {
        let running_ms = self
            .running_since
            .map(|since| since.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.base_position_ms.saturating_add(running_ms)
    }

    fn freeze(&mut self) {
        self.base_position_ms = self.position_ms();
        self.running_since = None;
    }
}

pub struct ClockRenderer {
    track_length: Duration,
    shared: Arc<Mutex<ClockState>>,
    sink: Option<DeviceSignalSink>,
}

impl ClockRenderer {
    pub fn new(track_length: Duration) -> Self {
        Self {
            track_length,
            shared: Arc::new(Mutex::new(ClockState {
                volume: 1.0,
                ..ClockState::default()
            })),
            sink: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        match self.shared.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, signal: RendererSignal) {
        if let Some(sink) = &self.sink {
            sink.send(DeviceSignal::Renderer(signal));
        }
    }

    fn spawn_watcher(&self, generation: u64) -> Result<(), DeviceError> {
        let shared = Arc::clone(&self.shared);
        let sink = self.sink.clone();
        let length_ms = self.track_length.as_millis() as u64;
        thread::Builder::new()
            .name("clock-renderer".to_string())
            .spawn(move || loop {
                thread::sleep(WATCH_INTERVAL);
                let mut state = match shared.lock() {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if state.generation != generation {
                    return;
                }
                if state.state == RenderState::Ready && state.position_ms() >= length_ms {
                    state.base_position_ms = length_ms;
                    state.running_since = None;
                    state.state = RenderState::Ended;
                    drop(state);
                    debug!("ClockRenderer: source ended");
                    if let Some(sink) = &sink {
                        sink.send(DeviceSignal::Renderer(RendererSignal::Ended));
                    }
                    return;
                }
            })
            .map(|_| ())
            .map_err(|err| DeviceError::Render(err.to_string()))
    }
}

impl Renderer for ClockRenderer {
    fn attach(&mut self, sink: DeviceSignalSink) {
        self.sink = Some(sink);
    }

    fn prepare(&mut self, source_uri: &str) -> Result<(), DeviceError> {
        if source_uri.trim().is_empty() {
            return Err(DeviceError::Render("empty source uri".to_string()));
        }
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.source = Some(source_uri.to_string());
            state.state = RenderState::Ready;
            state.base_position_ms = 0;
            state.running_since = state.play_when_ready.then(Instant::now);
            state.generation
        };
        self.spawn_watcher(generation)?;
        self.emit(RendererSignal::StateChanged);
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.lock();
        state.generation += 1;
        state.source = None;
        state.state = RenderState::Idle;
        state.play_when_ready = false;
        state.base_position_ms = 0;
        state.running_since = None;
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        let changed = {
            let mut state = self.lock();
            if state.play_when_ready == play_when_ready {
                false
            } else {
                state.play_when_ready = play_when_ready;
                if play_when_ready && state.state == RenderState::Ready {
                    state.running_since = Some(Instant::now());
                } else {
                    state.freeze();
                }
                true
            }
        };
        if changed {
            self.emit(RendererSignal::StateChanged);
        }
    }

    fn play_when_ready(&self) -> bool {
        self.lock().play_when_ready
    }

    fn render_state(&self) -> RenderState {
        self.lock().state
    }

    fn set_volume(&mut self, volume: f32) {
        self.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn seek(&mut self, position_ms: u64) {
        let mut state = self.lock();
        if state.source.is_none() {
            warn!("ClockRenderer: seek without a source");
            return;
        }
        state.base_position_ms = position_ms;
        if state.running_since.is_some() {
            state.running_since = Some(Instant::now());
        }
        if state.state == RenderState::Ended {
            state.state = RenderState::Ready;
        }
    }

    fn position_ms(&self) -> u64 {
        self.lock().position_ms()
    }
}

impl Drop for ClockRenderer {
    fn drop(&mut self) {
        self.lock().generation += 1;
    }
}
