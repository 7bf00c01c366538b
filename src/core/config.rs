//! Configuration for the tile streaming engine
//!
//! Hosts either pick a preset through [`TileStreamProfile`] or deserialize a
//! [`TileStreamConfig`] from JSON. Every field has a default, so partial
//! documents are accepted.

use crate::core::constants::{
    BYTES_PER_MB, DEFAULT_CROSSFADE_MS, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM,
    DEFAULT_STALE_AFTER_HOURS, DEFAULT_SWEEP_INTERVAL_MS, HASHABLE_MAX_ZOOM, TILE_SIZE,
};
use crate::core::geo::LatLngBounds;
use crate::{Result, TileError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum TileStreamProfile {
    Balanced,
    LowResource,
    HighPerformance,
    Custom(TileStreamConfig),
}

impl TileStreamProfile {
    pub fn resolve(&self) -> TileStreamConfig {
        match self {
            Self::Balanced => TileStreamConfig::default(),
            Self::LowResource => TileStreamConfig {
                max_concurrent_loads: 2,
                disk_cache_budget_mb: 128,
                keep_alive_secs: 5,
                tile_pixel_size_threshold: 384.0,
                crossfade_ms: 0,
                ..TileStreamConfig::default()
            },
            Self::HighPerformance => TileStreamConfig {
                max_concurrent_loads: 16,
                disk_cache_budget_mb: 2048,
                keep_alive_secs: 30,
                tile_pixel_size_threshold: 256.0,
                ..TileStreamConfig::default()
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

impl Default for TileStreamProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileStreamConfig {
    /// Zoom level of the root tiles
    pub min_zoom: u8,
    /// Deepest zoom the selector recurses to
    pub max_zoom: u8,
    pub max_concurrent_loads: usize,
    pub disk_cache_budget_mb: u64,
    /// Grace period before an unused loaded tile loses its bitmap
    pub keep_alive_secs: u64,
    /// On-screen size above which a tile is split into its children
    pub tile_pixel_size_threshold: f64,
    /// Never touch the network; missing assets become the default placeholder
    pub offline_only: bool,
    pub restrict_to_area: Option<LatLngBounds>,
    pub stale_after_hours: u64,

    pub server_id: String,
    /// Remote URL with `{zoom}`/`{z}`, `{x}`, `{y}` and `{s}` placeholders
    pub url_template: String,
    pub subdomains: Vec<String>,
    pub cache_dir: Option<PathBuf>,
    pub use_disk_cache: bool,
    /// Side length of the square map in world units
    pub world_size: f64,
    pub wrap_horizontally: bool,
    /// Queued tiles that stay invisible for this long are dropped
    pub queue_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    pub crossfade_ms: u64,
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for TileStreamConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            max_concurrent_loads: 6,
            disk_cache_budget_mb: 512,
            keep_alive_secs: 10,
            tile_pixel_size_threshold: TILE_SIZE as f64,
            offline_only: false,
            restrict_to_area: None,
            stale_after_hours: DEFAULT_STALE_AFTER_HOURS,
            server_id: "osm".to_string(),
            url_template: "https://{s}.tile.openstreetmap.org/{zoom}/{x}/{y}.png".to_string(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            cache_dir: Some(PathBuf::from("tile_cache")),
            use_disk_cache: true,
            world_size: 4096.0,
            wrap_horizontally: false,
            queue_timeout_ms: 5_000,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            crossfade_ms: DEFAULT_CROSSFADE_MS,
            request_timeout_ms: 10_000,
            user_agent: "tilestream/0.1".to_string(),
        }
    }
}

impl TileStreamConfig {
    /// Load a configuration from a JSON document on disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.min_zoom > self.max_zoom {
            return Err(TileError::Config(format!(
                "min_zoom {} exceeds max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.max_zoom > HASHABLE_MAX_ZOOM {
            return Err(TileError::Config(format!(
                "max_zoom {} exceeds supported {}",
                self.max_zoom, HASHABLE_MAX_ZOOM
            )));
        }
        if self.max_concurrent_loads == 0 {
            return Err(TileError::Config("max_concurrent_loads must be at least 1".into()));
        }
        if !(self.world_size > 0.0) {
            return Err(TileError::Config("world_size must be positive".into()));
        }
        if !(self.tile_pixel_size_threshold > 0.0) {
            return Err(TileError::Config("tile_pixel_size_threshold must be positive".into()));
        }
        if self.use_disk_cache && self.cache_dir.is_none() {
            return Err(TileError::Config("use_disk_cache requires cache_dir".into()));
        }
        Ok(())
    }

    pub fn disk_budget_bytes(&self) -> u64 {
        self.disk_cache_budget_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_hours.saturating_mul(3600))
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Fixed-width hex digest of the URL template, used in cache file names so
    /// switching providers never serves stale imagery from another server.
    pub fn url_hash(&self) -> String {
        format!("{:08x}", fxhash::hash32(self.url_template.as_bytes()))
    }
}
