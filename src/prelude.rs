//! Prelude module for common tilestream types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilestream::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    builder::TileEngineBuilder,
    config::{TileStreamConfig, TileStreamProfile},
    engine::{Diagnostics, EngineStats, TickReport, TileEngine},
    geo::{LatLng, LatLngBounds, Point, TileKey},
};

pub use crate::spatial::{
    camera::{CameraView, PerspectiveCamera, TopDownCamera},
    culling::{Aabb, Frustum},
};

pub use crate::tiles::{
    decode::{Bitmap, ImageDecoder, TileDecoder},
    disk_cache::DiskCache,
    pool::InactivePool,
    record::{TileId, TileRecord, TileSourceKind, TileStatus},
    scheduler::LoadScheduler,
    selector::Selector,
    source::{
        AssetBundle, DirectoryAssets, HttpFetcher, SourceChain, TileFetcher, TileProvider,
        UrlTemplate,
    },
    store::TileStore,
    transition::{Placeholder, RenderTile, UvRect},
};

pub use crate::runtime::{AsyncHandle, AsyncSpawner, TokioSpawner};

pub use crate::{Error as TileStreamError, Result};

pub use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime},
};

pub use futures::Future;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
