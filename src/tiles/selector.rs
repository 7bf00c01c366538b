//! Per-tick quadtree walk deciding which tiles to draw.
//!
//! Starting from every root tile, a tile that passes the visibility test is
//! either split (its projected footprint exceeds the pixel threshold) or
//! drawn. A tile that fails is hidden together with its whole subtree.

use crate::core::bounds::Bounds;
use crate::core::config::TileStreamConfig;
use crate::core::geo::Point;
use crate::prelude::Instant;
use crate::spatial::camera::CameraView;
use crate::tiles::pool::InactivePool;
use crate::tiles::record::{TileId, TileStatus};
use crate::tiles::scheduler::LoadScheduler;
use crate::tiles::store::TileStore;
use crate::tiles::transition::Placeholder;
use nalgebra::Vector3;

/// What one selection pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub visible: usize,
    pub enqueued: usize,
    pub parked: usize,
}

/// Mutable state threaded through one walk
struct Walk<'a> {
    store: &'a mut TileStore,
    camera: &'a dyn CameraView,
    config: &'a TileStreamConfig,
    scheduler: &'a mut LoadScheduler,
    pool: &'a mut InactivePool,
    screen: Bounds,
    now: Instant,
    visible: Vec<(TileId, f64)>,
    stats: Selection,
}

#[derive(Debug, Default)]
pub struct Selector {
    visible: Vec<(TileId, f64)>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiles drawn by the last pass, each with the world-x shift it is drawn
    /// at. A wrapped tile seen twice appears once per copy.
    pub fn visible(&self) -> &[(TileId, f64)] {
        &self.visible
    }

    pub fn update(
        &mut self,
        store: &mut TileStore,
        camera: &dyn CameraView,
        config: &TileStreamConfig,
        scheduler: &mut LoadScheduler,
        pool: &mut InactivePool,
        now: Instant,
    ) -> Selection {
        let roots = store.roots(config.min_zoom);
        let mut walk = Walk {
            store,
            camera,
            config,
            scheduler,
            pool,
            screen: camera.screen_bounds(),
            now,
            visible: std::mem::take(&mut self.visible),
            stats: Selection::default(),
        };
        walk.visible.clear();

        for root in roots {
            walk.visit(root);
        }

        walk.stats.visible = walk.visible.len();
        self.visible = walk.visible;
        walk.stats
    }
}

impl Walk<'_> {
    fn visit(&mut self, id: TileId) {
        let key = self.store[id].key;
        if let Some(area) = &self.config.restrict_to_area {
            if !area.intersects(&key.bounds()) {
                self.hide(id);
                return;
            }
        }

        let hits = self.test_visibility(id);
        if hits.is_empty() {
            self.hide(id);
            return;
        }
        let footprint = hits.iter().map(|&(_, f)| f).fold(0.0, f64::max);

        self.store[id].inside_viewport = true;
        if footprint > self.config.tile_pixel_size_threshold && key.zoom < self.config.max_zoom {
            self.store[id].visible = false;
            for child in self.store.ensure_children(id) {
                self.visit(child);
            }
        } else {
            let offsets: Vec<f64> = hits.iter().map(|&(dx, _)| dx).collect();
            self.draw(id, &offsets);
        }
    }

    /// Every world-x shift under which the tile is visible, paired with its
    /// on-screen footprint in pixels. Empty when it is not visible at all.
    fn test_visibility(&self, id: TileId) -> Vec<(f64, f64)> {
        let record = &self.store[id];
        let aabb = record.aabb();
        let world = self.config.world_size;
        let offsets = [0.0, world, -world];
        let tried = if self.config.wrap_horizontally { 3 } else { 1 };

        offsets[..tried]
            .iter()
            .filter_map(|&dx| {
                let shift = Vector3::new(dx, 0.0, 0.0);
                let projected: Option<Vec<Point>> = record
                    .corners
                    .iter()
                    .map(|c| self.camera.world_to_screen(&(c + shift)))
                    .collect();
                let rect = projected.as_deref().and_then(Bounds::from_points);

                let on_screen = rect.as_ref().map_or(false, |r| r.overlaps(&self.screen));
                let in_frustum = self.camera.intersects_frustum(&aabb.shifted_x(dx));
                if !(on_screen || in_frustum) {
                    return None;
                }
                // A corner behind the camera makes the footprint unbounded
                let footprint = rect.map_or(f64::INFINITY, |r| r.max_extent());
                Some((dx, footprint))
            })
            .collect()
    }

    fn draw(&mut self, id: TileId, offsets: &[f64]) {
        let center = self.store[id].center();
        let distance = offsets
            .iter()
            .map(|&dx| self.camera.distance_to(&(center + Vector3::new(dx, 0.0, 0.0))))
            .fold(f64::INFINITY, f64::min);

        let record = &mut self.store[id];
        record.visible = true;
        record.distance_to_camera = distance;
        let status = record.status;
        let parent = record.parent;
        let children = record.children;

        if let Some(children) = children {
            for child in children {
                self.hide(child);
            }
        }

        if status != TileStatus::Loaded {
            if let Some(parent) = parent {
                let key = self.store[id].key;
                let inherited = Placeholder::inherit(&self.store[parent], key);
                if inherited.is_some() {
                    self.store[id].placeholder = inherited;
                }
            }
            if status == TileStatus::Inactive
                && self.scheduler.enqueue(self.store, id, self.now)
            {
                self.stats.enqueued += 1;
            }
        }

        self.visible.extend(offsets.iter().map(|&dx| (id, dx)));
    }

    fn hide(&mut self, id: TileId) {
        let record = &mut self.store[id];
        if !record.visible && !record.inside_viewport {
            // Subtree already hidden
            return;
        }
        record.visible = false;
        record.inside_viewport = false;
        let loaded = record.status == TileStatus::Loaded;
        let children = record.children;

        if loaded {
            self.pool.park(self.store, id, self.now);
            self.stats.parked += 1;
        }
        if let Some(children) = children {
            for child in children {
                self.hide(child);
            }
        }
    }
}
