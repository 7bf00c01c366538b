//! # tilestream
//!
//! A quadtree map-tile streaming engine.
//!
//! The engine keeps a sparse quadtree of image tiles covering a world surface,
//! selects the tiles a camera needs every tick, resolves their content from a
//! chain of sources (application provider, bundled assets, disk cache, network)
//! and reclaims memory and disk space under configurable budgets.
//!
//! Rendering and camera handling stay with the host: the engine consumes a
//! [`spatial::camera::CameraView`] and hands back [`tiles::transition::RenderTile`]s.

pub mod core;
pub mod prelude;
pub mod runtime;
pub mod spatial;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::Bounds,
    builder::TileEngineBuilder,
    config::{TileStreamConfig, TileStreamProfile},
    engine::{Diagnostics, EngineStats, TickReport, TileEngine},
    geo::{LatLng, LatLngBounds, Point, TileKey},
};

pub use spatial::{
    camera::{CameraView, PerspectiveCamera, TopDownCamera},
    culling::{Aabb, Frustum},
};

pub use tiles::{
    decode::{Bitmap, ImageDecoder, TileDecoder},
    disk_cache::{DiskCache, Eviction},
    record::{TileId, TileRecord, TileSourceKind, TileStatus},
    selector::Selection,
    source::{AssetBundle, DirectoryAssets, HttpFetcher, TileFetcher, TileProvider, UrlTemplate},
    store::TileStore,
    transition::RenderTile,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TileError>;

/// Error taxonomy for tile streaming.
///
/// None of these escape the engine's tick: they are absorbed at the source
/// chain / scheduler boundary and surface only through [`Diagnostics`].
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("fetch failed for {key}: {reason}")]
    Fetch { key: TileKey, reason: String },

    #[error("corrupt tile {key}: {reason}")]
    Decode { key: TileKey, reason: String },

    #[error("disk cache over budget: {used} of {budget} bytes")]
    QuotaExceeded { used: u64, budget: u64 },

    #[error("tile {0} timed out in the load queue")]
    Timeout(TileKey),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = TileError;

/// Initialise `env_logger` for binaries and demos.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
