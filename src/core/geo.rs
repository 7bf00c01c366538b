use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Web Mercator latitude limit
const MAX_LATITUDE: f64 = 85.0511287798;

/// Number of bits reserved per axis in [`TileKey::quad_hash`]
const AXIS_BITS: u32 = 29;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Clamps latitude to the Web Mercator range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Checks if the bounds intersect with another bounds
    pub fn intersects(&self, other: &LatLngBounds) -> bool {
        !(other.north_east.lat < self.south_west.lat
            || other.south_west.lat > self.north_east.lat
            || other.north_east.lng < self.south_west.lng
            || other.south_west.lng > self.north_east.lng)
    }
}

/// Address of one tile in the quadtree.
///
/// `x` grows east and `y` grows south, both in `[0, 2^zoom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileKey {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Number of tiles along one axis at `zoom`
    pub fn tiles_per_axis(zoom: u8) -> u32 {
        1u32 << zoom
    }

    /// Creates a tile key from a local world coordinate on a square map of
    /// side `world_size` whose origin is the north-west corner.
    pub fn from_world(world_x: f64, world_z: f64, zoom: u8, world_size: f64) -> Option<Self> {
        if world_x < 0.0 || world_z < 0.0 || world_x >= world_size || world_z >= world_size {
            return None;
        }
        let n = Self::tiles_per_axis(zoom) as f64;
        let x = (world_x / world_size * n).floor() as u32;
        let y = (world_z / world_size * n).floor() as u32;
        Some(Self::new(x, y, zoom))
    }

    /// Stable integer identity for store lookups.
    ///
    /// Zoom occupies the top bits, then `y`, then `x`, each axis in 29 bits,
    /// so the encoding is injective for every zoom up to 29.
    pub fn quad_hash(&self) -> u64 {
        ((self.zoom as u64) << (2 * AXIS_BITS)) | ((self.y as u64) << AXIS_BITS) | self.x as u64
    }

    /// Inverse of [`TileKey::quad_hash`]
    pub fn from_quad_hash(hash: u64) -> Self {
        let mask = (1u64 << AXIS_BITS) - 1;
        Self::new(
            (hash & mask) as u32,
            ((hash >> AXIS_BITS) & mask) as u32,
            (hash >> (2 * AXIS_BITS)) as u8,
        )
    }

    fn corner_lat_lng(x: u32, y: u32, zoom: u8) -> LatLng {
        let n = 2_f64.powi(zoom as i32);
        let lng = x as f64 / n * 360.0 - 180.0;
        let lat_rad = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan();
        LatLng::new(lat_rad.to_degrees(), lng)
    }

    /// Web Mercator extent of the tile
    pub fn bounds(&self) -> LatLngBounds {
        let nw = Self::corner_lat_lng(self.x, self.y, self.zoom);
        let se = Self::corner_lat_lng(self.x + 1, self.y + 1, self.zoom);
        LatLngBounds::new(LatLng::new(se.lat, nw.lng), LatLng::new(nw.lat, se.lng))
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<TileKey> {
        if self.zoom == 0 {
            None
        } else {
            Some(TileKey::new(self.x / 2, self.y / 2, self.zoom - 1))
        }
    }

    /// Child keys in NW, NE, SW, SE order
    pub fn children(&self) -> [TileKey; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.zoom + 1);
        [
            TileKey::new(x, y, z),
            TileKey::new(x + 1, y, z),
            TileKey::new(x, y + 1, z),
            TileKey::new(x + 1, y + 1, z),
        ]
    }

    /// Which quadrant of its parent this tile occupies, as `(column, row)`
    pub fn quadrant(&self) -> (u32, u32) {
        (self.x & 1, self.y & 1)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}/{}/{}", self.zoom, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::HashSet;

    #[test]
    fn test_tile_bounds() {
        let north_west = TileKey::new(0, 0, 1).bounds();
        assert!(north_west.south_west.lat.abs() < 1e-9);
        assert!((north_west.north_east.lat - MAX_LATITUDE).abs() < 1e-6);
        assert_eq!(north_west.south_west.lng, -180.0);
        assert_eq!(north_west.north_east.lng, 0.0);
    }

    #[test]
    fn test_from_world() {
        let key = TileKey::from_world(300.0, 10.0, 4, 4096.0).unwrap();
        assert_eq!(key, TileKey::new(1, 0, 4));
        assert!(TileKey::from_world(4096.0, 0.0, 4, 4096.0).is_none());
    }

    #[test]
    fn test_hash_is_injective_and_reversible() {
        let mut seen = HashSet::default();
        for zoom in 0..=5u8 {
            let n = TileKey::tiles_per_axis(zoom);
            for x in 0..n {
                for y in 0..n {
                    let key = TileKey::new(x, y, zoom);
                    assert!(seen.insert(key.quad_hash()), "collision at {}", key);
                    assert_eq!(TileKey::from_quad_hash(key.quad_hash()), key);
                }
            }
        }

        // Extremes at the deepest supported zoom
        let max = TileKey::tiles_per_axis(19) - 1;
        let corners = [
            TileKey::new(0, 0, 19),
            TileKey::new(max, 0, 19),
            TileKey::new(0, max, 19),
            TileKey::new(max, max, 19),
            TileKey::new(0, 0, 18),
        ];
        let hashes: HashSet<u64> = corners.iter().map(TileKey::quad_hash).collect();
        assert_eq!(hashes.len(), corners.len());
    }

    #[test]
    fn test_parent_children_quadrants() {
        let key = TileKey::new(5, 9, 4);
        let children = key.children();
        assert_eq!(children[0].quadrant(), (0, 0));
        assert_eq!(children[1].quadrant(), (1, 0));
        assert_eq!(children[2].quadrant(), (0, 1));
        assert_eq!(children[3].quadrant(), (1, 1));
        for child in children {
            assert_eq!(child.parent(), Some(key));
        }
    }

    #[test]
    fn test_bounds_intersects() {
        let bounds = LatLngBounds::from_coords(40.0, -75.0, 41.0, -73.0);
        let other = LatLngBounds::from_coords(40.5, -74.0, 42.0, -72.0);
        let far = LatLngBounds::from_coords(-10.0, 10.0, -5.0, 20.0);

        assert!(bounds.intersects(&other));
        assert!(!bounds.intersects(&far));
    }
}
