//! Playback orchestrator.
//!
//! Owns the active device, the queue manager and the control channel
//! receiver. Every command, device signal, catalog completion and device swap
//! is applied here, one at a time, so queue and device state never race.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::sync::broadcast::Sender;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::audio::playback_device::{DeviceEvent, DeviceSignal, PlaybackDevice};
use crate::library::catalog_store::CatalogStore;
use crate::library::track::Artwork;
use crate::playback::snapshot::{
    FavoriteAction, PlaybackActions, PlaybackSnapshot, PlaybackState, CUSTOM_ACTION_THUMBS_UP,
};
use crate::playlist::queue_manager::QueueManager;
use crate::protocol::{
    self, ControlHandle, ControlMessage, PendingRequest, PlaybackCommand, SearchFocus,
    SessionMessage,
};

const CATALOG_LOAD_FAILED: &str = "Could not load catalog";
const MUSIC_NOT_FOUND: &str = "Could not find music";
const CANNOT_SKIP: &str = "Cannot skip";

/// A request parked until the catalog finished loading.
struct CatalogWait {
    request_id: u64,
    /// Device state shown before `Connecting`, restored when the wait ends.
    previous_state: PlaybackState,
}

pub struct PlaybackManager {
    control_receiver: UnboundedReceiver<ControlMessage>,
    control: ControlHandle,
    bus_producer: Sender<protocol::Message>,
    catalog: Arc<CatalogStore>,
    queue_manager: QueueManager,
    device: Box<dyn PlaybackDevice>,
    /// Set once the current dispatch published a snapshot.
    published: bool,
    catalog_wait: Option<CatalogWait>,
    next_request_id: u64,
    /// Last published error, kept until a transport command or playback resumes.
    sticky_error: Option<String>,
}

impl PlaybackManager {
    pub fn new(
        control_receiver: UnboundedReceiver<ControlMessage>,
        control: ControlHandle,
        bus_producer: Sender<protocol::Message>,
        catalog: Arc<CatalogStore>,
        queue_manager: QueueManager,
        device: Box<dyn PlaybackDevice>,
    ) -> Self {
        Self {
            control_receiver,
            control,
            bus_producer,
            catalog,
            queue_manager,
            device,
            published: false,
            catalog_wait: None,
            next_request_id: 0,
            sticky_error: None,
        }
    }

    fn emit_session(&self, message: SessionMessage) {
        let _ = self.bus_producer.send(protocol::Message::Session(message));
    }

    /// Starts playback of the current queue item, if any.
    fn handle_play_request(&mut self) {
        debug!("PlaybackManager: play request, state={:?}", self.device.state());
        let Some(item) = self.queue_manager.current_music().cloned() else {
            return;
        };
        self.emit_session(SessionMessage::PlaybackStart);
        if let Err(err) = self.device.play(&item) {
            error!("PlaybackManager: {} failed to play {}: {}", self.device.name(), item.media_id, err);
            self.on_error(err.to_string());
        }
    }

    fn handle_pause_request(&mut self) {
        debug!("PlaybackManager: pause request, state={:?}", self.device.state());
        if self.device.is_playing() {
            self.device.pause();
            self.emit_session(SessionMessage::PlaybackStop);
        }
    }

    fn handle_stop_request(&mut self, error: Option<String>) {
        debug!(
            "PlaybackManager: stop request, state={:?} error={:?}",
            self.device.state(),
            error
        );
        self.device.stop(true);
        self.emit_session(SessionMessage::PlaybackStop);
        self.update_playback_state(error);
    }

    /// Publishes a snapshot of the active device. `error` forces the Error state.
    fn update_playback_state(&mut self, error: Option<String>) {
        let position_ms = self
            .device
            .is_connected()
            .then(|| self.device.current_position_ms());
        let error = match error {
            Some(message) => {
                self.sticky_error = Some(message.clone());
                Some(message)
            }
            None if self.device.is_playing() => {
                self.sticky_error = None;
                None
            }
            None => self.sticky_error.clone(),
        };
        let state = if error.is_some() {
            PlaybackState::Error
        } else {
            self.device.state()
        };
        let current = self.queue_manager.current_music();
        let favorite_action = current.map(|item| {
            let music_id = item.music_id().to_string();
            FavoriteAction {
                is_favorite: self.catalog.is_favorite(&music_id),
                music_id,
            }
        });
        let snapshot = PlaybackSnapshot {
            state,
            position_ms,
            updated_at: Instant::now(),
            speed: 1.0,
            actions: self.available_actions(),
            active_queue_item_id: current.map(|item| item.queue_id),
            error_message: error,
            favorite_action,
        };
        debug!(
            "PlaybackManager: publishing {:?} at {:?}ms",
            snapshot.state, snapshot.position_ms
        );
        let requires_notification = snapshot.requires_notification();
        self.emit_session(SessionMessage::PlaybackStateUpdated(snapshot));
        if requires_notification {
            self.emit_session(SessionMessage::NotificationRequired);
        }
        self.published = true;
    }

    fn available_actions(&self) -> PlaybackActions {
        let mut actions = PlaybackActions::PLAY_PAUSE
            | PlaybackActions::PLAY_FROM_MEDIA_ID
            | PlaybackActions::PLAY_FROM_SEARCH;
        if self.queue_manager.current_music().is_some() {
            actions.insert(
                PlaybackActions::SKIP_TO_PREVIOUS
                    | PlaybackActions::SKIP_TO_NEXT
                    | PlaybackActions::SKIP_TO_QUEUE_ITEM,
            );
            if self.device.is_connected() {
                actions.insert(PlaybackActions::SEEK_TO);
            }
        }
        if !matches!(self.device.state(), PlaybackState::None | PlaybackState::Stopped) {
            actions.insert(PlaybackActions::STOP);
        }
        if self.device.is_playing() {
            actions.insert(PlaybackActions::PAUSE);
        } else {
            actions.insert(PlaybackActions::PLAY);
        }
        actions
    }

    /// Parks `pending` until the catalog finished loading. A newer wait
    /// replaces an older one.
    fn defer_until_catalog_ready(&mut self, pending: PendingRequest) {
        info!("PlaybackManager: waiting for catalog before {:?}", pending);
        let previous_state = match self.catalog_wait.take() {
            Some(wait) => wait.previous_state,
            None => self.device.state(),
        };
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.catalog_wait = Some(CatalogWait {
            request_id,
            previous_state,
        });
        self.device.set_state(PlaybackState::Connecting);
        self.update_playback_state(None);
        let control = self.control.clone();
        self.catalog.load_async(move |success| {
            control.send(ControlMessage::CatalogReady {
                request_id,
                success,
                pending,
            });
        });
    }

    /// Abandons the outstanding catalog wait, if any, and takes the device
    /// out of `Connecting`.
    fn end_catalog_wait(&mut self) {
        let Some(wait) = self.catalog_wait.take() else {
            return;
        };
        if self.device.state() == PlaybackState::Connecting {
            self.device.set_state(wait.previous_state);
        }
    }

    /// Returns `false` when the completion belongs to a superseded request.
    fn on_catalog_ready(&mut self, request_id: u64, success: bool, pending: PendingRequest) -> bool {
        let current = self.catalog_wait.as_ref().map(|wait| wait.request_id);
        if current != Some(request_id) {
            debug!(
                "PlaybackManager: dropping superseded catalog completion for {:?}",
                pending
            );
            return false;
        }
        self.end_catalog_wait();
        if !success {
            warn!("PlaybackManager: catalog load failed, dropping {:?}", pending);
            self.update_playback_state(Some(CATALOG_LOAD_FAILED.to_string()));
            return true;
        }
        match pending {
            PendingRequest::Play => self.on_play(),
            PendingRequest::PlayFromMediaId(media_id) => self.on_play_from_media_id(&media_id),
            PendingRequest::PlayFromSearch { query, focus } => self.run_search(&query, focus),
        }
        true
    }

    fn on_play(&mut self) {
        if self.queue_manager.current_music().is_none() {
            if !self.catalog.is_initialized() {
                self.defer_until_catalog_ready(PendingRequest::Play);
                return;
            }
            self.queue_manager.set_random_queue();
            if self.queue_manager.current_music().is_none() {
                self.update_playback_state(Some(MUSIC_NOT_FOUND.to_string()));
                return;
            }
        }
        self.handle_play_request();
    }

    fn on_play_from_media_id(&mut self, media_id: &str) {
        debug!("PlaybackManager: play from media id {}", media_id);
        if !self.catalog.is_initialized() {
            self.defer_until_catalog_ready(PendingRequest::PlayFromMediaId(media_id.to_string()));
            return;
        }
        match self.queue_manager.set_queue_from_music(media_id) {
            Ok(()) => self.handle_play_request(),
            Err(err) => {
                warn!("PlaybackManager: cannot play {}: {}", media_id, err);
                self.update_playback_state(Some(MUSIC_NOT_FOUND.to_string()));
            }
        }
    }

    fn on_play_from_search(&mut self, query: String, focus: SearchFocus) {
        debug!("PlaybackManager: play from search {:?} focus={:?}", query, focus);
        self.defer_until_catalog_ready(PendingRequest::PlayFromSearch { query, focus });
    }

    fn run_search(&mut self, query: &str, focus: SearchFocus) {
        if self.queue_manager.set_queue_from_search(query, focus) {
            self.handle_play_request();
        } else {
            self.update_playback_state(Some(MUSIC_NOT_FOUND.to_string()));
        }
    }

    fn on_skip(&mut self, delta: i64) {
        if self.queue_manager.skip_queue_position(delta) {
            self.handle_play_request();
        } else {
            self.handle_stop_request(Some(CANNOT_SKIP.to_string()));
        }
        self.queue_manager.refresh_metadata();
    }

    fn on_skip_to_queue_item(&mut self, queue_id: u64) {
        debug!("PlaybackManager: skip to queue item {}", queue_id);
        if self.queue_manager.set_current_queue_item(queue_id) {
            self.handle_play_request();
            self.queue_manager.refresh_metadata();
        } else {
            warn!("PlaybackManager: no queue item {}", queue_id);
        }
    }

    fn on_set_favorite(&mut self, music_id: &str, favorite: bool) {
        if self.catalog.get_track(music_id).is_none() {
            warn!("PlaybackManager: ignoring favorite for unknown track {}", music_id);
            return;
        }
        self.catalog.set_favorite(music_id, favorite);
    }

    fn on_custom_action(&mut self, action: &str) {
        if action != CUSTOM_ACTION_THUMBS_UP {
            error!("PlaybackManager: unsupported action {}", action);
            return;
        }
        info!("PlaybackManager: toggling favorite for current track");
        if let Some(item) = self.queue_manager.current_music() {
            let music_id = item.music_id().to_string();
            let favorite = !self.catalog.is_favorite(&music_id);
            self.catalog.set_favorite(&music_id, favorite);
        }
    }

    fn on_completion(&mut self) {
        if self.queue_manager.skip_queue_position(1) {
            self.handle_play_request();
            self.queue_manager.refresh_metadata();
        } else {
            self.handle_stop_request(None);
        }
    }

    fn on_error(&mut self, message: String) {
        if self.device.is_playing() {
            self.device.pause();
        }
        self.emit_session(SessionMessage::PlaybackStop);
        self.update_playback_state(Some(message));
    }

    fn on_artwork_fetched(&mut self, music_id: &str, artwork: Artwork) {
        if self.catalog.get_track(music_id).is_none() {
            warn!("PlaybackManager: artwork for unknown track {}", music_id);
            return;
        }
        self.catalog.update_artwork(music_id, artwork);
        let is_current = self
            .queue_manager
            .current_music()
            .is_some_and(|item| item.music_id() == music_id);
        if is_current {
            self.queue_manager.refresh_metadata();
        }
    }

    /// Hands playback over to `next`, carrying media id, position and intent.
    pub fn switch_device(&mut self, mut next: Box<dyn PlaybackDevice>, resume_if_was_playing: bool) {
        let old_state = self.device.state();
        let position_ms = self.device.current_position_ms();
        let media_id = self.device.current_media_id().map(str::to_string);
        info!(
            "PlaybackManager: switching {} -> {} (state={:?} position={}ms)",
            self.device.name(),
            next.name(),
            old_state,
            position_ms
        );

        self.device.stop(false);
        next.set_current_media_id(media_id);
        next.seek(position_ms);
        let start_result = next.start();
        let previous = std::mem::replace(&mut self.device, next);
        drop(previous);

        if let Err(err) = start_result {
            error!("PlaybackManager: {} failed to start: {}", self.device.name(), err);
            self.update_playback_state(Some(err.to_string()));
            return;
        }

        match old_state {
            PlaybackState::Buffering | PlaybackState::Connecting | PlaybackState::Paused => {
                self.device.pause();
            }
            PlaybackState::Playing => {
                let current = self.queue_manager.current_music().cloned();
                match (resume_if_was_playing, current) {
                    (true, Some(item)) => {
                        if let Err(err) = self.device.play(&item) {
                            self.on_error(err.to_string());
                        }
                    }
                    (false, _) => self.device.pause(),
                    (true, None) => self.device.stop(true),
                }
            }
            PlaybackState::None => {}
            other => debug!("PlaybackManager: nothing to replay for old state {:?}", other),
        }
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::StateChanged(_) => self.update_playback_state(None),
            DeviceEvent::Completion => self.on_completion(),
            DeviceEvent::Error(message) => self.on_error(message),
            DeviceEvent::PauseRequested => self.handle_pause_request(),
            DeviceEvent::MediaChanged(media_id) => {
                if let Err(err) = self.queue_manager.set_queue_from_music(&media_id) {
                    warn!("PlaybackManager: cannot follow remote media {}: {}", media_id, err);
                }
            }
        }
    }

    /// Routes a signal to the active device. Returns whether it produced an event.
    fn handle_device_signal(&mut self, device_id: u64, signal: DeviceSignal) -> bool {
        if device_id != self.device.device_id() {
            debug!(
                "PlaybackManager: discarding {:?} from inactive device {}",
                signal, device_id
            );
            return false;
        }
        match self.device.on_signal(signal) {
            Some(event) => {
                self.handle_device_event(event);
                true
            }
            None => false,
        }
    }

    fn handle_command(&mut self, command: PlaybackCommand) {
        debug!("PlaybackManager: command {:?}", command);
        let supersedes_pending = !matches!(
            command,
            PlaybackCommand::SeekTo(_)
                | PlaybackCommand::SetFavorite { .. }
                | PlaybackCommand::CustomAction(_)
        );
        if supersedes_pending {
            self.end_catalog_wait();
            self.sticky_error = None;
        }
        match command {
            PlaybackCommand::Play => self.on_play(),
            PlaybackCommand::Pause => self.handle_pause_request(),
            PlaybackCommand::Stop => self.handle_stop_request(None),
            PlaybackCommand::SeekTo(position_ms) => self.device.seek(position_ms),
            PlaybackCommand::PlayFromMediaId(media_id) => self.on_play_from_media_id(&media_id),
            PlaybackCommand::PlayFromSearch { query, focus } => {
                self.on_play_from_search(query, focus)
            }
            PlaybackCommand::SkipToQueueItem(queue_id) => self.on_skip_to_queue_item(queue_id),
            PlaybackCommand::SkipToNext => self.on_skip(1),
            PlaybackCommand::SkipToPrevious => self.on_skip(-1),
            PlaybackCommand::SetFavorite { music_id, favorite } => {
                self.on_set_favorite(&music_id, favorite)
            }
            PlaybackCommand::CustomAction(action) => self.on_custom_action(&action),
        }
    }

    /// Applies one control message. Returns `false` when the loop should end.
    fn handle_control(&mut self, message: ControlMessage) -> bool {
        self.published = false;
        let republish = match message {
            ControlMessage::Command(command) => {
                self.handle_command(command);
                true
            }
            ControlMessage::Device { device_id, signal } => {
                self.handle_device_signal(device_id, signal)
            }
            ControlMessage::CatalogReady {
                request_id,
                success,
                pending,
            } => self.on_catalog_ready(request_id, success, pending),
            ControlMessage::ArtworkFetched { music_id, artwork } => {
                self.on_artwork_fetched(&music_id, artwork);
                true
            }
            ControlMessage::SwitchDevice {
                device,
                resume_if_was_playing,
            } => {
                self.switch_device(device, resume_if_was_playing);
                true
            }
            ControlMessage::Shutdown => {
                info!("PlaybackManager: shutting down");
                self.handle_stop_request(None);
                return false;
            }
        };
        if republish && !self.published {
            self.update_playback_state(None);
        }
        true
    }

    pub fn run(&mut self) {
        info!("PlaybackManager: started with {} device", self.device.name());
        while let Some(message) = self.control_receiver.blocking_recv() {
            if !self.handle_control(message) {
                break;
            }
        }
        info!("PlaybackManager: stopped");
    }
}
