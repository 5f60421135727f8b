//! Application-level configuration loading: the weekly show slot and the reconciliation thresholds.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use chrono::Weekday;
use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WANSHOW_BINGO_CONFIG_PATH";
/// Environment variable that overrides the aggregate feed URL.
const SOURCE_URL_ENV: &str = "WHENPLANE_AGGREGATE_URL";
/// Environment variable naming the live aggregate websocket.
const SOCKET_URL_ENV: &str = "WHENPLANE_SOCKET_URL";
/// Environment variable that overrides the tile catalog used by the in-memory backend.
const TILE_CATALOG_ENV: &str = "TILE_CATALOG_PATH";
const DEFAULT_TILE_CATALOG_PATH: &str = "config/tiles.json";

const DEFAULT_SOURCE_URL: &str = "https://whenplane.com/api/aggregate?fast=true";

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub schedule: ShowSlot,
    pub reconcile: ReconcileConfig,
    pub timer: TimerConfig,
    pub ingestion: IngestionConfig,
    pub storage: StorageConfig,
}

/// Recurring weekly slot of the show, expressed in its local time zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowSlot {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
    /// IANA time zone name.
    pub time_zone: String,
}

impl Default for ShowSlot {
    fn default() -> Self {
        Self {
            weekday: Weekday::Fri,
            hour: 16,
            minute: 30,
            time_zone: "America/Vancouver".into(),
        }
    }
}

/// Thresholds used when deciding whether a title change starts a new show.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// Filler title the streaming software shows before the real title is set.
    pub placeholder_title: String,
    /// Edit distance separating "close to" from "far from" a reference title.
    pub title_distance_threshold: usize,
    /// Minimum age in hours of the current show before a new one may be created.
    pub new_show_gap_hours: f64,
    pub tile_pool_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            placeholder_title: "Hello, Floatplane!".into(),
            title_distance_threshold: 5,
            new_show_gap_hours: 110.0,
            tile_pool_size: 90,
        }
    }
}

/// Show timer and the automatic confirmation it triggers on expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerConfig {
    pub title: String,
    pub duration_secs: i64,
    pub sweep_interval: Duration,
    pub auto_confirm_tile_id: String,
    pub auto_confirm_context: String,
    pub system_player_id: String,
    pub confirmation_message: String,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            title: "WAN Show Timer".into(),
            duration_secs: 4 * 60 * 60,
            sweep_interval: Duration::from_secs(2),
            auto_confirm_tile_id: "BfaqFYztlR".into(),
            auto_confirm_context: "Automatic confirmation after 4-hour timer".into(),
            system_player_id: "SYSTEM".into(),
            confirmation_message: "**TILE CONFIRMED** 4 Hour WAN Show".into(),
        }
    }
}

/// Snapshot queue and feed polling.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionConfig {
    pub queue_capacity: usize,
    /// Pause taken by the consumer after each snapshot.
    pub consumer_pause: Duration,
    pub source_enabled: bool,
    pub source_url: String,
    /// Live aggregate websocket; the feed is polled when unset.
    pub socket_url: Option<String>,
    pub poll_interval: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            consumer_pause: Duration::from_secs(1),
            source_enabled: true,
            source_url: DEFAULT_SOURCE_URL.into(),
            socket_url: None,
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Settings of the in-memory backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// JSON array of tiles loaded into the in-memory catalog.
    pub tile_catalog_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tile_catalog_path: PathBuf::from(DEFAULT_TILE_CATALOG_PATH),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Ok(url) = env::var(SOURCE_URL_ENV) {
            config.ingestion.source_url = url;
        }
        if let Ok(url) = env::var(SOCKET_URL_ENV) {
            config.ingestion.socket_url = Some(url).filter(|url| !url.is_empty());
        }
        if let Ok(path) = env::var(TILE_CATALOG_ENV) {
            config.storage.tile_catalog_path = PathBuf::from(path);
        }
        config
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    schedule: RawSchedule,
    reconcile: RawReconcile,
    timer: RawTimer,
    ingestion: RawIngestion,
    storage: RawStorage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSchedule {
    weekday: Option<Weekday>,
    hour: Option<u32>,
    minute: Option<u32>,
    time_zone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReconcile {
    placeholder_title: Option<String>,
    title_distance_threshold: Option<usize>,
    new_show_gap_hours: Option<f64>,
    tile_pool_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTimer {
    title: Option<String>,
    duration_secs: Option<i64>,
    sweep_interval_ms: Option<u64>,
    auto_confirm_tile_id: Option<String>,
    auto_confirm_context: Option<String>,
    system_player_id: Option<String>,
    confirmation_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIngestion {
    queue_capacity: Option<usize>,
    consumer_pause_ms: Option<u64>,
    source_enabled: Option<bool>,
    source_url: Option<String>,
    socket_url: Option<String>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStorage {
    tile_catalog_path: Option<PathBuf>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let RawConfig {
            schedule,
            reconcile,
            timer,
            ingestion,
            storage,
        } = raw;

        Self {
            schedule: ShowSlot {
                weekday: schedule.weekday.unwrap_or(defaults.schedule.weekday),
                hour: schedule.hour.unwrap_or(defaults.schedule.hour),
                minute: schedule.minute.unwrap_or(defaults.schedule.minute),
                time_zone: schedule.time_zone.unwrap_or(defaults.schedule.time_zone),
            },
            reconcile: ReconcileConfig {
                placeholder_title: reconcile
                    .placeholder_title
                    .unwrap_or(defaults.reconcile.placeholder_title),
                title_distance_threshold: reconcile
                    .title_distance_threshold
                    .unwrap_or(defaults.reconcile.title_distance_threshold),
                new_show_gap_hours: reconcile
                    .new_show_gap_hours
                    .unwrap_or(defaults.reconcile.new_show_gap_hours),
                tile_pool_size: reconcile
                    .tile_pool_size
                    .unwrap_or(defaults.reconcile.tile_pool_size),
            },
            timer: TimerConfig {
                title: timer.title.unwrap_or(defaults.timer.title),
                duration_secs: timer.duration_secs.unwrap_or(defaults.timer.duration_secs),
                sweep_interval: timer
                    .sweep_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.timer.sweep_interval),
                auto_confirm_tile_id: timer
                    .auto_confirm_tile_id
                    .unwrap_or(defaults.timer.auto_confirm_tile_id),
                auto_confirm_context: timer
                    .auto_confirm_context
                    .unwrap_or(defaults.timer.auto_confirm_context),
                system_player_id: timer
                    .system_player_id
                    .unwrap_or(defaults.timer.system_player_id),
                confirmation_message: timer
                    .confirmation_message
                    .unwrap_or(defaults.timer.confirmation_message),
            },
            ingestion: IngestionConfig {
                queue_capacity: ingestion
                    .queue_capacity
                    .filter(|capacity| *capacity > 0)
                    .unwrap_or(defaults.ingestion.queue_capacity),
                consumer_pause: ingestion
                    .consumer_pause_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.ingestion.consumer_pause),
                source_enabled: ingestion
                    .source_enabled
                    .unwrap_or(defaults.ingestion.source_enabled),
                source_url: ingestion.source_url.unwrap_or(defaults.ingestion.source_url),
                socket_url: ingestion.socket_url.filter(|url| !url.is_empty()),
                poll_interval: ingestion
                    .poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.ingestion.poll_interval),
            },
            storage: StorageConfig {
                tile_catalog_path: storage
                    .tile_catalog_path
                    .unwrap_or(defaults.storage.tile_catalog_path),
            },
        }
    }
}
