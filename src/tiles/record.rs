use crate::core::geo::TileKey;
use crate::prelude::{Arc, Instant};
use crate::spatial::culling::Aabb;
use crate::tiles::decode::Bitmap;
use crate::tiles::transition::Placeholder;
use nalgebra::Point3;

/// Handle into a [`TileStore`](crate::tiles::store::TileStore) arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileStatus {
    Inactive,
    InQueue,
    Loading,
    Loaded,
}

/// Where a tile's bitmap came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileSourceKind {
    #[default]
    Unknown,
    Online,
    Cache,
    Resources,
}

/// Mutable per-tile state. Records are created on first visit and never
/// removed; only their bitmap is released.
#[derive(Debug, Clone)]
pub struct TileRecord {
    pub key: TileKey,
    pub status: TileStatus,
    pub source: TileSourceKind,
    pub parent: Option<TileId>,
    /// Created lazily, NW, NE, SW, SE
    pub children: Option<[TileId; 4]>,
    /// World corners on the ground plane, NW, NE, SE, SW
    pub corners: [Point3<f64>; 4],
    pub bitmap: Option<Arc<Bitmap>>,
    pub placeholder: Option<Placeholder>,
    /// Drawn this tick
    pub visible: bool,
    /// Passed the visibility test this tick, drawn directly or through children
    pub inside_viewport: bool,
    pub distance_to_camera: f64,
    pub queued_at: Option<Instant>,
    pub inactive_since: Option<Instant>,
    pub in_pool: bool,
    pub fade_started: Option<Instant>,
    pub has_crossfaded: bool,
}

impl TileRecord {
    pub fn new(key: TileKey, parent: Option<TileId>, world_size: f64) -> Self {
        let side = world_size / TileKey::tiles_per_axis(key.zoom) as f64;
        let x0 = key.x as f64 * side;
        let z0 = key.y as f64 * side;
        let corners = [
            Point3::new(x0, 0.0, z0),
            Point3::new(x0 + side, 0.0, z0),
            Point3::new(x0 + side, 0.0, z0 + side),
            Point3::new(x0, 0.0, z0 + side),
        ];

        Self {
            key,
            status: TileStatus::Inactive,
            source: TileSourceKind::Unknown,
            parent,
            children: None,
            corners,
            bitmap: None,
            placeholder: None,
            visible: false,
            inside_viewport: false,
            distance_to_camera: f64::INFINITY,
            queued_at: None,
            inactive_since: None,
            in_pool: false,
            fade_started: None,
            has_crossfaded: false,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.corners)
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.corners[0], &self.corners[2])
    }

    /// A tile in use must keep its bitmap
    pub fn is_in_use(&self) -> bool {
        self.visible || self.inside_viewport
    }

    pub fn is_loaded(&self) -> bool {
        self.status == TileStatus::Loaded
    }

    pub fn has_default_bitmap(&self) -> bool {
        self.bitmap.as_ref().map_or(false, Bitmap::is_default_placeholder)
    }

    /// Install freshly resolved content. The first arrival starts a cross-fade.
    pub fn install(&mut self, bitmap: Arc<Bitmap>, source: TileSourceKind, now: Instant) {
        self.bitmap = Some(bitmap);
        self.source = source;
        self.status = TileStatus::Loaded;
        self.queued_at = None;
        if !self.has_crossfaded {
            self.has_crossfaded = true;
            self.fade_started = Some(now);
        }
    }

    /// Return to `Inactive` without touching the bitmap
    pub fn reset(&mut self) {
        self.status = TileStatus::Inactive;
        self.queued_at = None;
    }

    /// Drop the bitmap and go back to `Inactive`
    pub fn release(&mut self) -> Option<Arc<Bitmap>> {
        self.status = TileStatus::Inactive;
        self.source = TileSourceKind::Unknown;
        self.inactive_since = None;
        self.in_pool = false;
        self.fade_started = None;
        self.has_crossfaded = false;
        self.bitmap.take()
    }
}
