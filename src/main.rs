use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::broadcast;

use playdeck::app_bootstrap::services::{spawn_background_services, BackgroundServicesConfig};
use playdeck::audio::audio_focus::ExclusiveOutputArbiter;
use playdeck::audio::clock_renderer::ClockRenderer;
use playdeck::audio::local_device::LocalDevice;
use playdeck::config::PlaybackConfig;
use playdeck::config_persistence::{default_config_root, load_or_create_config, resolve_catalog_path};
use playdeck::host_commands::{parse_command, HostCommand, ParseCommandError, HELP_TEXT};
use playdeck::library::catalog_source::JsonCatalogSource;
use playdeck::library::catalog_store::CatalogStore;
use playdeck::library::track::BrowseItemKind;
use playdeck::media_id::{self, MEDIA_ID_EMPTY_ROOT, MEDIA_ID_ROOT};
use playdeck::protocol::ControlHandle;

fn build_local_device(
    control: &ControlHandle,
    catalog: &Arc<CatalogStore>,
    config: &PlaybackConfig,
) -> LocalDevice {
    LocalDevice::new(
        control.signal_sink(),
        Box::new(ClockRenderer::new(Duration::from_secs(
            config.simulated_track_secs,
        ))),
        Box::new(ExclusiveOutputArbiter::default()),
        Arc::clone(catalog),
        config,
    )
}

fn print_browse_node(catalog: &CatalogStore, node: Option<String>) {
    let node = match node {
        Some(node) => node,
        None if catalog.is_initialized() => MEDIA_ID_ROOT.to_string(),
        None => MEDIA_ID_EMPTY_ROOT.to_string(),
    };
    let children = catalog.children(&node);
    if children.is_empty() {
        println!("(nothing under {})", node);
    }
    for item in children {
        let marker = match item.kind {
            BrowseItemKind::Browsable => "browse",
            BrowseItemKind::Playable => "id",
        };
        println!("  {} {}  # {}", marker, item.media_id, item.title);
    }
    if node != MEDIA_ID_ROOT && node != MEDIA_ID_EMPTY_ROOT {
        match media_id::parent_media_id(&node) {
            Ok(parent) => println!("  up: browse {}", parent),
            Err(err) => warn!("Cannot resolve parent of {}: {}", node, err),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_root = default_config_root()?;
    let (config, config_file) = load_or_create_config(&config_root)?;
    log::set_max_level(config.logging.level_filter());
    info!("Loaded config from {}", config_file.display());

    let catalog_path = resolve_catalog_path(&config, &config_root);
    info!("Catalog source: {}", catalog_path.display());
    let catalog = Arc::new(CatalogStore::new(Box::new(JsonCatalogSource::new(
        catalog_path,
        config.catalog.base_url.clone(),
    ))));
    // The first play command joins this load instead of starting another.
    catalog.load_async(|success| {
        if !success {
            warn!("Catalog failed to load; play commands will retry");
        }
    });

    let (bus_sender, _) = broadcast::channel(config.bus.capacity);
    let (control, control_receiver) = ControlHandle::channel();
    let initial_device = build_local_device(&control, &catalog, &config.playback);

    let services = spawn_background_services(BackgroundServicesConfig {
        bus_sender: bus_sender.clone(),
        control: control.clone(),
        control_receiver,
        catalog: Arc::clone(&catalog),
        initial_device: Box::new(initial_device),
        random_queue_limit: config.catalog.random_queue_limit,
        log_session: true,
    })?;

    println!("{}", HELP_TEXT);
    for line in io::stdin().lock().lines() {
        let line = line?;
        let delivered = match parse_command(&line) {
            Ok(HostCommand::Playback(command)) => control.command(command),
            Ok(HostCommand::Browse(node)) => {
                print_browse_node(&catalog, node);
                true
            }
            Ok(HostCommand::SwitchDevice) => {
                let device = build_local_device(&control, &catalog, &config.playback);
                control.switch_device(
                    Box::new(device),
                    config.playback.start_on_remote_connect,
                )
            }
            Ok(HostCommand::Help) => {
                println!("{}", HELP_TEXT);
                true
            }
            Ok(HostCommand::Quit) => break,
            Err(ParseCommandError::Empty) => true,
            Err(err) => {
                warn!("{}", err);
                println!("{}", HELP_TEXT);
                true
            }
        };
        if !delivered {
            error!("Playback manager is gone, exiting");
            break;
        }
    }

    control.shutdown();
    if services.playback_manager.join().is_err() {
        error!("Playback manager thread panicked");
    }
    drop(bus_sender);
    if let Some(session_logger) = services.session_logger {
        let _ = session_logger.join();
    }
    info!("Bye");
    Ok(())
}
