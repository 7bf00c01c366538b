//! Engine-wide defaults. Every value here is overridable through
//! [`TileStreamConfig`](crate::core::config::TileStreamConfig).

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Shallowest zoom level the quadtree starts from.
pub const DEFAULT_MIN_ZOOM: u8 = 4;

/// Deepest zoom level the selector may recurse to.
pub const DEFAULT_MAX_ZOOM: u8 = 19;

/// Deepest zoom [`TileKey::quad_hash`](crate::core::geo::TileKey::quad_hash) can encode.
pub const HASHABLE_MAX_ZOOM: u8 = 29;

/// Disk cache files older than this are refetched.
pub const DEFAULT_STALE_AFTER_HOURS: u64 = 300;

/// Interval between inactive-pool sweeps.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 3_000;

/// Cross-fade length once a tile's own bitmap arrives.
pub const DEFAULT_CROSSFADE_MS: u64 = 1_000;

/// Decoded bitmaps this narrow or narrower are treated as corrupt.
pub const MIN_VALID_TILE_WIDTH: u32 = 16;

/// Bundled asset directory prefix.
pub const ASSET_ROOT: &str = "Tiles";

/// Name of the persisted disk cache access index.
pub const CACHE_INDEX_FILE: &str = "index.json";

/// Bytes per megabyte for budget conversion.
pub const BYTES_PER_MB: u64 = 1024 * 1024;
