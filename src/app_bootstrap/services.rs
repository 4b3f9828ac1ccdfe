use std::{any::Any, io, sync::Arc, thread};

use tokio::sync::{broadcast, mpsc::UnboundedReceiver};

use crate::{
    app_bootstrap::session_logger::SessionLogger,
    audio::playback_device::PlaybackDevice,
    library::catalog_store::CatalogStore,
    playback::playback_manager::PlaybackManager,
    playlist::queue_manager::QueueManager,
    protocol::{ControlHandle, ControlMessage, Message},
};

pub struct BackgroundServicesConfig {
    pub bus_sender: broadcast::Sender<Message>,
    pub control: ControlHandle,
    pub control_receiver: UnboundedReceiver<ControlMessage>,
    pub catalog: Arc<CatalogStore>,
    pub initial_device: Box<dyn PlaybackDevice>,
    pub random_queue_limit: usize,
    /// Mirror bus traffic to the log.
    pub log_session: bool,
}

/// Join handles for the spawned threads.
pub struct BackgroundServices {
    pub playback_manager: thread::JoinHandle<()>,
    pub session_logger: Option<thread::JoinHandle<()>>,
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

pub fn spawn_background_services(
    config: BackgroundServicesConfig,
) -> io::Result<BackgroundServices> {
    let BackgroundServicesConfig {
        bus_sender,
        control,
        control_receiver,
        catalog,
        initial_device,
        random_queue_limit,
        log_session,
    } = config;

    let session_logger = if log_session {
        let session_logger_bus_receiver = bus_sender.subscribe();
        Some(
            thread::Builder::new()
                .name("session-logger".to_string())
                .spawn(move || {
                    let mut session_logger = SessionLogger::new(session_logger_bus_receiver);
                    session_logger.run();
                })?,
        )
    } else {
        None
    };

    let playback_manager_bus_sender = bus_sender.clone();
    let playback_manager = thread::Builder::new()
        .name("playback-manager".to_string())
        .spawn(move || {
            let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let queue_manager = QueueManager::new(
                    Arc::clone(&catalog),
                    playback_manager_bus_sender.clone(),
                    random_queue_limit,
                );
                let mut playback_manager = PlaybackManager::new(
                    control_receiver,
                    control,
                    playback_manager_bus_sender,
                    catalog,
                    queue_manager,
                    initial_device,
                );
                playback_manager.run();
            }));
            if let Err(payload) = run_result {
                log::error!(
                    "PlaybackManager thread terminated due to panic: {}",
                    panic_payload_to_string(payload.as_ref())
                );
            }
        })?;

    Ok(BackgroundServices {
        playback_manager,
        session_logger,
    })
}
