//! Placeholder inheritance and cross-fade state.
//!
//! A tile that is visible but still waiting for content borrows the matching
//! quadrant of its parent's image. Because a parent may itself be showing a
//! placeholder, rectangles compose: a grandchild samples a sixteenth of the
//! grandparent's bitmap. Nothing here draws; hosts receive [`RenderTile`]s.

use crate::core::geo::TileKey;
use crate::prelude::{Arc, Duration, Instant};
use crate::tiles::decode::Bitmap;
use crate::tiles::record::{TileRecord, TileStatus};
use nalgebra::{Point3, Vector3};

/// Normalized sub-rectangle of a bitmap, origin top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub u: f64,
    pub v: f64,
    pub width: f64,
    pub height: f64,
}

impl UvRect {
    pub const FULL: UvRect = UvRect {
        u: 0.0,
        v: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// One quarter of this rect; `column` and `row` are 0 or 1
    pub fn quadrant(&self, column: u32, row: u32) -> Self {
        let width = self.width / 2.0;
        let height = self.height / 2.0;
        Self {
            u: self.u + width * column as f64,
            v: self.v + height * row as f64,
            width,
            height,
        }
    }

    /// Pixel rectangle `(x, y, w, h)` on a bitmap of the given size
    pub fn to_pixels(&self, bitmap_width: u32, bitmap_height: u32) -> (u32, u32, u32, u32) {
        let w = bitmap_width as f64;
        let h = bitmap_height as f64;
        (
            (self.u * w).round() as u32,
            (self.v * h).round() as u32,
            (self.width * w).round().max(1.0) as u32,
            (self.height * h).round().max(1.0) as u32,
        )
    }
}

/// Borrowed image shown while a tile's own bitmap is missing
#[derive(Debug, Clone)]
pub struct Placeholder {
    pub bitmap: Arc<Bitmap>,
    pub rect: UvRect,
}

impl Placeholder {
    /// Crop `parent`'s image for the quadrant `child` occupies. Uses the
    /// parent's own bitmap when loaded, otherwise composes onto whatever the
    /// parent is borrowing.
    pub fn inherit(parent: &TileRecord, child: TileKey) -> Option<Self> {
        let (column, row) = child.quadrant();
        if parent.status == TileStatus::Loaded {
            if let Some(bitmap) = &parent.bitmap {
                return Some(Self {
                    bitmap: Arc::clone(bitmap),
                    rect: UvRect::FULL.quadrant(column, row),
                });
            }
        }
        parent.placeholder.as_ref().map(|p| Self {
            bitmap: Arc::clone(&p.bitmap),
            rect: p.rect.quadrant(column, row),
        })
    }

    pub fn borrows(&self, bitmap: &Arc<Bitmap>) -> bool {
        Arc::ptr_eq(&self.bitmap, bitmap)
    }
}

/// Opacity of a tile's own bitmap at `now`
pub fn crossfade_alpha(started: Option<Instant>, duration: Duration, now: Instant) -> f32 {
    match started {
        Some(start) if !duration.is_zero() => {
            let elapsed = now.saturating_duration_since(start).as_secs_f64();
            (elapsed / duration.as_secs_f64()).min(1.0) as f32
        }
        _ => 1.0,
    }
}

/// Everything a host needs to draw one visible tile
#[derive(Debug, Clone)]
pub struct RenderTile {
    pub key: TileKey,
    /// World corners in NW, NE, SE, SW order
    pub corners: [Point3<f64>; 4],
    pub bitmap: Option<Arc<Bitmap>>,
    /// Drawn underneath while `alpha < 1`, or alone when `bitmap` is `None`
    pub placeholder: Option<Placeholder>,
    /// Opacity of `bitmap`
    pub alpha: f32,
}

impl RenderTile {
    /// Draw state of `record`, its corners moved by `offset_x` world units
    /// for copies repeated across the horizontal seam.
    pub fn from_record(
        record: &TileRecord,
        offset_x: f64,
        crossfade: Duration,
        now: Instant,
    ) -> Self {
        let loaded = record.status == TileStatus::Loaded && record.bitmap.is_some();
        let alpha = if loaded {
            crossfade_alpha(record.fade_started, crossfade, now)
        } else {
            0.0
        };
        let placeholder = if alpha < 1.0 {
            record.placeholder.clone()
        } else {
            None
        };

        Self {
            key: record.key,
            corners: record.corners.map(|c| c + Vector3::new(offset_x, 0.0, 0.0)),
            bitmap: if loaded { record.bitmap.clone() } else { None },
            placeholder,
            alpha,
        }
    }

    /// Fully opaque own bitmap, nothing left to blend
    pub fn is_settled(&self) -> bool {
        self.bitmap.is_some() && self.alpha >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::record::TileRecord;

    fn loaded_record(key: TileKey) -> TileRecord {
        let mut record = TileRecord::new(key, None, 4096.0);
        record.status = TileStatus::Loaded;
        record.bitmap = Some(Arc::new(Bitmap::solid(32, 32, [255; 4])));
        record
    }

    #[test]
    fn test_quadrant_composition() {
        let rect = UvRect::FULL.quadrant(1, 0).quadrant(0, 1);
        assert_eq!(
            rect,
            UvRect {
                u: 0.5,
                v: 0.25,
                width: 0.25,
                height: 0.25
            }
        );
        assert_eq!(rect.to_pixels(256, 256), (128, 64, 64, 64));
    }

    #[test]
    fn test_inherit_from_loaded_parent() {
        let parent = loaded_record(TileKey::new(3, 5, 4));
        let child = TileKey::new(7, 10, 5);
        let placeholder = Placeholder::inherit(&parent, child).unwrap();
        assert_eq!(placeholder.rect, UvRect::FULL.quadrant(1, 0));
        assert!(placeholder.borrows(parent.bitmap.as_ref().unwrap()));
    }

    #[test]
    fn test_inherit_through_placeholder_parent() {
        let grandparent = loaded_record(TileKey::new(0, 0, 4));
        let parent_key = TileKey::new(1, 1, 5);
        let mut parent = TileRecord::new(parent_key, None, 4096.0);
        parent.placeholder = Placeholder::inherit(&grandparent, parent_key);

        let child = Placeholder::inherit(&parent, TileKey::new(2, 2, 6)).unwrap();
        assert_eq!(child.rect, UvRect::FULL.quadrant(1, 1).quadrant(0, 0));
        assert!(child.borrows(grandparent.bitmap.as_ref().unwrap()));
    }

    #[test]
    fn test_nothing_to_inherit() {
        let parent = TileRecord::new(TileKey::new(0, 0, 4), None, 4096.0);
        assert!(Placeholder::inherit(&parent, TileKey::new(0, 0, 5)).is_none());
    }

    #[test]
    fn test_crossfade_alpha() {
        let start = Instant::now();
        let second = Duration::from_secs(1);
        assert_eq!(crossfade_alpha(Some(start), second, start), 0.0);
        let half = crossfade_alpha(Some(start), second, start + Duration::from_millis(500));
        assert!((half - 0.5).abs() < 1e-6);
        assert_eq!(crossfade_alpha(Some(start), second, start + second * 3), 1.0);
        assert_eq!(crossfade_alpha(None, second, start), 1.0);
        assert_eq!(crossfade_alpha(Some(start), Duration::ZERO, start), 1.0);
    }

    #[test]
    fn test_render_tile_blends_over_placeholder() {
        let parent = loaded_record(TileKey::new(0, 0, 4));
        let key = TileKey::new(1, 0, 5);
        let mut record = loaded_record(key);
        record.placeholder = Placeholder::inherit(&parent, key);
        let start = Instant::now();
        record.fade_started = Some(start);

        let mid = RenderTile::from_record(&record, 0.0, Duration::from_secs(1), start);
        assert!(mid.placeholder.is_some());
        assert!(!mid.is_settled());

        let done = RenderTile::from_record(
            &record,
            0.0,
            Duration::from_secs(1),
            start + Duration::from_secs(2),
        );
        assert!(done.placeholder.is_none());
        assert!(done.is_settled());
    }

    #[test]
    fn test_render_tile_applies_wrap_offset() {
        let record = loaded_record(TileKey::new(0, 0, 5));
        let tile = RenderTile::from_record(&record, 4096.0, Duration::ZERO, Instant::now());
        for (shifted, original) in tile.corners.iter().zip(record.corners.iter()) {
            assert_eq!(shifted.x, original.x + 4096.0);
            assert_eq!(shifted.z, original.z);
        }
    }
}
