use crate::core::geo::TileKey;
use crate::prelude::HashMap;
use crate::tiles::record::{TileId, TileRecord};
use std::ops::{Index, IndexMut};

/// Sparse quadtree arena keyed by [`TileKey::quad_hash`]
#[derive(Debug, Default)]
pub struct TileStore {
    records: Vec<TileRecord>,
    by_hash: HashMap<u64, TileId>,
    roots: Vec<TileId>,
    root_zoom: Option<u8>,
    world_size: f64,
}

impl TileStore {
    pub fn new(world_size: f64) -> Self {
        Self {
            world_size,
            ..Default::default()
        }
    }

    pub fn get_or_create(&mut self, key: TileKey, parent: Option<TileId>) -> TileId {
        let hash = key.quad_hash();
        if let Some(id) = self.by_hash.get(&hash) {
            return *id;
        }
        let id = TileId(self.records.len());
        self.records.push(TileRecord::new(key, parent, self.world_size));
        self.by_hash.insert(hash, id);
        id
    }

    pub fn lookup(&self, key: TileKey) -> Option<TileId> {
        self.by_hash.get(&key.quad_hash()).copied()
    }

    pub fn get(&self, id: TileId) -> Option<&TileRecord> {
        self.records.get(id.0)
    }

    pub fn get_mut(&mut self, id: TileId) -> Option<&mut TileRecord> {
        self.records.get_mut(id.0)
    }

    pub fn by_key(&self, key: TileKey) -> Option<&TileRecord> {
        self.lookup(key).map(|id| &self.records[id.0])
    }

    /// Every tile of `zoom`, created on first call
    pub fn roots(&mut self, zoom: u8) -> Vec<TileId> {
        if self.root_zoom != Some(zoom) {
            let n = TileKey::tiles_per_axis(zoom);
            let roots: Vec<TileId> = (0..n)
                .flat_map(|y| (0..n).map(move |x| TileKey::new(x, y, zoom)))
                .map(|key| self.get_or_create(key, None))
                .collect();
            self.roots = roots;
            self.root_zoom = Some(zoom);
        }
        self.roots.clone()
    }

    /// The four children of `id`, creating them on first use
    pub fn ensure_children(&mut self, id: TileId) -> [TileId; 4] {
        if let Some(children) = self.records[id.0].children {
            return children;
        }
        let keys = self.records[id.0].key.children();
        let children = keys.map(|key| self.get_or_create(key, Some(id)));
        self.records[id.0].children = Some(children);
        children
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, &TileRecord)> {
        self.records.iter().enumerate().map(|(i, r)| (TileId(i), r))
    }

    pub fn world_size(&self) -> f64 {
        self.world_size
    }
}

impl Index<TileId> for TileStore {
    type Output = TileRecord;

    fn index(&self, id: TileId) -> &TileRecord {
        &self.records[id.0]
    }
}

impl IndexMut<TileId> for TileStore {
    fn index_mut(&mut self, id: TileId) -> &mut TileRecord {
        &mut self.records[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut store = TileStore::new(4096.0);
        let key = TileKey::new(3, 4, 5);
        let a = store.get_or_create(key, None);
        let b = store.get_or_create(key, None);
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(key), Some(a));
        assert_eq!(store[a].key, key);
    }

    #[test]
    fn test_roots_cover_min_zoom() {
        let mut store = TileStore::new(4096.0);
        let roots = store.roots(4);
        assert_eq!(roots.len(), 256);
        assert_eq!(store.roots(4), roots);
        assert_eq!(store.len(), 256);
        assert!(roots.iter().all(|id| store[*id].parent.is_none()));
    }

    #[test]
    fn test_children_link_back_to_parent() {
        let mut store = TileStore::new(4096.0);
        let parent = store.get_or_create(TileKey::new(1, 1, 4), None);
        let children = store.ensure_children(parent);
        assert_eq!(store.ensure_children(parent), children);
        assert_eq!(store.len(), 5);

        let expected = TileKey::new(1, 1, 4).children();
        for (id, key) in children.iter().zip(expected) {
            assert_eq!(store[*id].key, key);
            assert_eq!(store[*id].parent, Some(parent));
        }
    }
}
