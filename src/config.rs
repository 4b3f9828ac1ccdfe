//! Persistent configuration model and defaults.

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Catalog source preferences.
    pub catalog: CatalogConfig,
    #[serde(default)]
    /// Local and remote playback behavior.
    pub playback: PlaybackConfig,
    #[serde(default)]
    /// Publication bus sizing.
    pub bus: BusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the catalog comes from and how default queues are sized.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CatalogConfig {
    /// JSON catalog file. Relative paths resolve against the config directory.
    #[serde(default = "default_catalog_source_path")]
    pub source_path: String,
    /// Base URL prepended to relative `source`/`image` entries.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Upper bound for the shuffled default queue. `0` keeps the whole catalog.
    #[serde(default)]
    pub random_queue_limit: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    /// Volume used while another application holds transient, duckable focus.
    #[serde(default = "default_duck_volume")]
    pub duck_volume: f32,
    #[serde(default = "default_normal_volume")]
    pub normal_volume: f32,
    /// Resume playback on the new device when the host switches devices mid-play.
    #[serde(default = "default_true")]
    pub start_on_remote_connect: bool,
    /// Length the headless clock renderer plays each source for.
    #[serde(default = "default_simulated_track_secs")]
    pub simulated_track_secs: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_catalog_source_path() -> String {
    "catalog.json".to_string()
}

fn default_duck_volume() -> f32 {
    0.2
}

fn default_normal_volume() -> f32 {
    1.0
}

fn default_simulated_track_secs() -> u64 {
    30
}

fn default_bus_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

pub const MIN_BUS_CAPACITY: usize = 16;

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            source_path: default_catalog_source_path(),
            base_url: None,
            random_queue_limit: 0,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            duck_volume: default_duck_volume(),
            normal_volume: default_normal_volume(),
            start_on_remote_connect: default_true(),
            simulated_track_secs: default_simulated_track_secs(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        }
    }
}

/// Clamps values into ranges the runtime can honour.
pub fn sanitize_config(config: Config) -> Config {
    let normal_volume = if config.playback.normal_volume.is_finite() {
        config.playback.normal_volume.clamp(0.0, 1.0)
    } else {
        default_normal_volume()
    };
    let duck_volume = if config.playback.duck_volume.is_finite() {
        config.playback.duck_volume.clamp(0.0, normal_volume)
    } else {
        default_duck_volume().min(normal_volume)
    };
    let level = match config.logging.level.trim().to_ascii_lowercase().as_str() {
        level @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => level.to_string(),
        _ => default_log_level(),
    };
    let source_path = if config.catalog.source_path.trim().is_empty() {
        default_catalog_source_path()
    } else {
        config.catalog.source_path.trim().to_string()
    };

    Config {
        catalog: CatalogConfig {
            source_path,
            base_url: config
                .catalog
                .base_url
                .filter(|base_url| !base_url.trim().is_empty()),
            random_queue_limit: config.catalog.random_queue_limit,
        },
        playback: PlaybackConfig {
            duck_volume,
            normal_volume,
            start_on_remote_connect: config.playback.start_on_remote_connect,
            simulated_track_secs: config.playback.simulated_track_secs.clamp(1, 3_600),
        },
        bus: BusConfig {
            capacity: config.bus.capacity.max(MIN_BUS_CAPACITY),
        },
        logging: LoggingConfig { level },
    }
}
