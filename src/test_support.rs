//! Shared fixtures for unit tests: catalogs, scripted sources, probe-backed
//! renderer/arbiter/receiver fakes, and bus helpers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

use crate::audio::audio_focus::{AudioFocusArbiter, FocusRequestResult};
use crate::audio::local_device::{LocalDevice, RenderState, Renderer};
use crate::audio::playback_device::{DeviceSignal, DeviceSignalSink, ReceiverStatus, RendererSignal};
use crate::audio::remote_device::{RemoteDevice, RemoteLoadRequest, RemoteReceiver};
use crate::config::PlaybackConfig;
use crate::error::{CatalogError, DeviceError};
use crate::library::catalog_source::{CatalogSource, StaticCatalogSource, TrackRecords};
use crate::library::catalog_store::CatalogStore;
use crate::library::track::{Artwork, Track};
use crate::protocol::{self, ControlHandle};

pub fn track(id: &str, genre: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("{} title", id),
        artist: "Test Artist".to_string(),
        album: format!("{} hits", genre),
        genre: genre.to_string(),
        duration_ms: 180_000,
        source_uri: format!("file:///music/{} {}.mp3", genre, id),
        track_number: 1,
        total_track_count: 1,
        artwork: Artwork::default(),
    }
}

fn titled(id: &str, title: &str, artist: &str, album: &str, genre: &str) -> Track {
    Track {
        title: title.to_string(),
        artist: artist.to_string(),
        album: album.to_string(),
        ..track(id, genre)
    }
}

/// track1/track2 in Rock, track3 in Jazz. Not loaded yet.
pub fn sample_catalog() -> Arc<CatalogStore> {
    Arc::new(CatalogStore::new(Box::new(StaticCatalogSource::new(vec![
        track("track1", "Rock"),
        track("track2", "Rock"),
        track("track3", "Jazz"),
    ]))))
}

pub fn loaded_catalog() -> Arc<CatalogStore> {
    let catalog = sample_catalog();
    assert!(catalog.load_and_wait(), "sample catalog failed to load");
    catalog
}

pub fn searchable_catalog() -> Arc<CatalogStore> {
    let catalog = Arc::new(CatalogStore::new(Box::new(StaticCatalogSource::new(vec![
        titled("blue", "Blue Train", "John Coltrane", "Blue Train", "Jazz"),
        titled("giant", "Giant Steps", "John Coltrane", "Giant Steps", "Jazz"),
        titled("thunder", "Thunderstruck", "AC/DC", "The Razors Edge", "Rock"),
        titled("paranoid", "Paranoid", "Black Sabbath", "Paranoid", "Metal"),
    ]))));
    assert!(catalog.load_and_wait(), "searchable catalog failed to load");
    catalog
}

/// Holds `tracks()` until the paired [`Gate`] is released.
pub struct GatedSource {
    tracks: Vec<Track>,
    gate: Gate,
}

#[derive(Clone)]
pub struct Gate {
    open: Arc<(Mutex<bool>, Condvar)>,
    pulls: Arc<AtomicUsize>,
}

impl Gate {
    pub fn release(&self) {
        let (open, condvar) = &*self.open;
        *open.lock().unwrap() = true;
        condvar.notify_all();
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

impl GatedSource {
    pub fn new(tracks: Vec<Track>) -> (Self, Gate) {
        let gate = Gate {
            open: Arc::new((Mutex::new(false), Condvar::new())),
            pulls: Arc::new(AtomicUsize::new(0)),
        };
        (
            Self {
                tracks,
                gate: gate.clone(),
            },
            gate,
        )
    }
}

impl CatalogSource for GatedSource {
    fn tracks(&self) -> Result<TrackRecords, CatalogError> {
        self.gate.pulls.fetch_add(1, Ordering::SeqCst);
        let (open, condvar) = &*self.gate.open;
        let mut released = open.lock().unwrap();
        while !*released {
            released = condvar.wait(released).unwrap();
        }
        Ok(Box::new(self.tracks.clone().into_iter().map(Ok::<Track, CatalogError>)))
    }
}

/// Fails the first `fail_times` pulls, then serves `tracks`.
pub struct FailingSource {
    fail_times: usize,
    tracks: Vec<Track>,
    attempts: Arc<AtomicUsize>,
}

impl FailingSource {
    pub fn new(fail_times: usize, tracks: Vec<Track>) -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                fail_times,
                tracks,
                attempts: Arc::clone(&attempts),
            },
            attempts,
        )
    }
}

impl CatalogSource for FailingSource {
    fn tracks(&self) -> Result<TrackRecords, CatalogError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_times {
            return Err(CatalogError::Source("upstream unavailable".to_string()));
        }
        Ok(Box::new(self.tracks.clone().into_iter().map(Ok::<Track, CatalogError>)))
    }
}

#[derive(Debug)]
pub struct RendererProbe {
    pub prepared: Vec<String>,
    pub play_when_ready: bool,
    pub volume: f32,
    pub position_ms: u64,
    pub releases: usize,
    pub fail_prepare: Option<String>,
    pub state: RenderState,
    sink: Option<DeviceSignalSink>,
}

impl Default for RendererProbe {
    fn default() -> Self {
        Self {
            prepared: Vec::new(),
            play_when_ready: false,
            volume: 1.0,
            position_ms: 0,
            releases: 0,
            fail_prepare: None,
            state: RenderState::Idle,
            sink: None,
        }
    }
}

impl RendererProbe {
    /// Reports `signal` as if the engine raised it.
    pub fn emit(&self, signal: RendererSignal) {
        if let Some(sink) = &self.sink {
            sink.send(DeviceSignal::Renderer(signal));
        }
    }
}

pub struct RecordingRenderer(Arc<Mutex<RendererProbe>>);

impl Renderer for RecordingRenderer {
    fn attach(&mut self, sink: DeviceSignalSink) {
        self.0.lock().unwrap().sink = Some(sink);
    }

    fn prepare(&mut self, source_uri: &str) -> Result<(), DeviceError> {
        let mut probe = self.0.lock().unwrap();
        if let Some(message) = probe.fail_prepare.clone() {
            return Err(DeviceError::Render(message));
        }
        probe.prepared.push(source_uri.to_string());
        probe.state = RenderState::Ready;
        probe.position_ms = 0;
        Ok(())
    }

    fn release(&mut self) {
        let mut probe = self.0.lock().unwrap();
        probe.releases += 1;
        probe.state = RenderState::Idle;
        probe.play_when_ready = false;
        probe.position_ms = 0;
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        self.0.lock().unwrap().play_when_ready = play_when_ready;
    }

    fn play_when_ready(&self) -> bool {
        self.0.lock().unwrap().play_when_ready
    }

    fn render_state(&self) -> RenderState {
        self.0.lock().unwrap().state
    }

    fn set_volume(&mut self, volume: f32) {
        self.0.lock().unwrap().volume = volume;
    }

    fn seek(&mut self, position_ms: u64) {
        self.0.lock().unwrap().position_ms = position_ms;
    }

    fn position_ms(&self) -> u64 {
        self.0.lock().unwrap().position_ms
    }
}

#[derive(Debug)]
pub struct ArbiterProbe {
    pub grant: bool,
    pub requests: usize,
    pub abandons: usize,
}

impl Default for ArbiterProbe {
    fn default() -> Self {
        Self {
            grant: true,
            requests: 0,
            abandons: 0,
        }
    }
}

pub struct ScriptedArbiter(Arc<Mutex<ArbiterProbe>>);

impl AudioFocusArbiter for ScriptedArbiter {
    fn request_focus(&mut self, _sink: &DeviceSignalSink) -> FocusRequestResult {
        let mut probe = self.0.lock().unwrap();
        probe.requests += 1;
        if probe.grant {
            FocusRequestResult::Granted
        } else {
            FocusRequestResult::Denied
        }
    }

    fn abandon_focus(&mut self) -> FocusRequestResult {
        self.0.lock().unwrap().abandons += 1;
        FocusRequestResult::Granted
    }
}

#[derive(Clone)]
pub struct LocalDeviceProbes {
    pub renderer: Arc<Mutex<RendererProbe>>,
    pub arbiter: Arc<Mutex<ArbiterProbe>>,
}

/// Local device over a loaded sample catalog whose signals go nowhere.
pub fn local_device() -> (LocalDevice, LocalDeviceProbes) {
    let (handle, _receiver) = ControlHandle::channel();
    local_device_for(&handle, loaded_catalog())
}

pub fn local_device_for(
    handle: &ControlHandle,
    catalog: Arc<CatalogStore>,
) -> (LocalDevice, LocalDeviceProbes) {
    let probes = LocalDeviceProbes {
        renderer: Arc::new(Mutex::new(RendererProbe::default())),
        arbiter: Arc::new(Mutex::new(ArbiterProbe::default())),
    };
    let device = LocalDevice::new(
        handle.signal_sink(),
        Box::new(RecordingRenderer(Arc::clone(&probes.renderer))),
        Box::new(ScriptedArbiter(Arc::clone(&probes.arbiter))),
        catalog,
        &PlaybackConfig::default(),
    );
    (device, probes)
}

#[derive(Debug)]
pub struct ReceiverProbe {
    pub connected: bool,
    pub has_session: bool,
    pub playing: bool,
    pub position_ms: u64,
    pub attached: bool,
    pub loads: Vec<RemoteLoadRequest>,
    pub plays: usize,
    pub pauses: usize,
    pub seeks: Vec<u64>,
    sink: Option<DeviceSignalSink>,
}

impl Default for ReceiverProbe {
    fn default() -> Self {
        Self {
            connected: true,
            has_session: false,
            playing: false,
            position_ms: 0,
            attached: false,
            loads: Vec::new(),
            plays: 0,
            pauses: 0,
            seeks: Vec::new(),
            sink: None,
        }
    }
}

impl ReceiverProbe {
    /// Reports `status` as if the receiver sent it.
    pub fn report(&self, status: ReceiverStatus) {
        if let Some(sink) = &self.sink {
            sink.send(DeviceSignal::Receiver(status));
        }
    }
}

pub struct RecordingReceiver(Arc<Mutex<ReceiverProbe>>);

impl RemoteReceiver for RecordingReceiver {
    fn attach(&mut self, sink: DeviceSignalSink) {
        let mut probe = self.0.lock().unwrap();
        probe.attached = true;
        probe.sink = Some(sink);
    }

    fn detach(&mut self) {
        let mut probe = self.0.lock().unwrap();
        probe.attached = false;
        probe.sink = None;
    }

    fn is_connected(&self) -> bool {
        self.0.lock().unwrap().connected
    }

    fn has_media_session(&self) -> bool {
        self.0.lock().unwrap().has_session
    }

    fn is_playing(&self) -> bool {
        self.0.lock().unwrap().playing
    }

    fn load(&mut self, request: RemoteLoadRequest) -> Result<(), DeviceError> {
        let mut probe = self.0.lock().unwrap();
        if !probe.connected {
            return Err(DeviceError::NotConnected);
        }
        probe.playing = request.autoplay;
        probe.position_ms = request.position_ms;
        probe.loads.push(request);
        Ok(())
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        let mut probe = self.0.lock().unwrap();
        probe.plays += 1;
        probe.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        let mut probe = self.0.lock().unwrap();
        probe.pauses += 1;
        probe.playing = false;
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), DeviceError> {
        let mut probe = self.0.lock().unwrap();
        probe.seeks.push(position_ms);
        probe.position_ms = position_ms;
        Ok(())
    }

    fn approximate_position_ms(&self) -> u64 {
        self.0.lock().unwrap().position_ms
    }
}

pub fn remote_device() -> (RemoteDevice, Arc<Mutex<ReceiverProbe>>) {
    let (handle, _receiver) = ControlHandle::channel();
    remote_device_for(&handle, loaded_catalog())
}

pub fn remote_device_for(
    handle: &ControlHandle,
    catalog: Arc<CatalogStore>,
) -> (RemoteDevice, Arc<Mutex<ReceiverProbe>>) {
    let probe = Arc::new(Mutex::new(ReceiverProbe::default()));
    let device = RemoteDevice::new(
        handle.signal_sink(),
        Box::new(RecordingReceiver(Arc::clone(&probe))),
        catalog,
    );
    (device, probe)
}

pub fn drain_messages(receiver: &mut Receiver<protocol::Message>) -> Vec<protocol::Message> {
    let mut messages = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(message) => messages.push(message),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => break,
        }
    }
    messages
}

pub fn wait_for_message<F>(
    receiver: &mut Receiver<protocol::Message>,
    timeout: Duration,
    mut predicate: F,
) -> protocol::Message
where
    F: FnMut(&protocol::Message) -> bool,
{
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            panic!("timed out waiting for expected message");
        }
        match receiver.try_recv() {
            Ok(message) => {
                if predicate(&message) {
                    return message;
                }
            }
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("bus closed while waiting for message"),
        }
    }
}

pub fn assert_no_message<F>(
    receiver: &mut Receiver<protocol::Message>,
    timeout: Duration,
    mut predicate: F,
) where
    F: FnMut(&protocol::Message) -> bool,
{
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            return;
        }
        match receiver.try_recv() {
            Ok(message) => {
                if predicate(&message) {
                    panic!("received unexpected message: {:?}", message);
                }
            }
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return,
        }
    }
}
