use crate::prelude::{Arc, Duration, Instant};
use crate::tiles::decode::Bitmap;
use crate::tiles::record::{TileId, TileStatus};
use crate::tiles::store::TileStore;

/// Keep-alive list of loaded tiles that dropped out of use.
///
/// Bitmaps survive for the keep-alive period so that panning back is free;
/// the periodic sweep then releases them.
#[derive(Debug)]
pub struct InactivePool {
    entries: Vec<TileId>,
    interval: Duration,
    last_sweep: Option<Instant>,
    reclaimed_total: u64,
}

impl InactivePool {
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: Vec::new(),
            interval,
            last_sweep: None,
            reclaimed_total: 0,
        }
    }

    /// Start the keep-alive clock for a loaded tile that left use. A tile
    /// still pooled from an earlier departure restarts its clock.
    pub fn park(&mut self, store: &mut TileStore, id: TileId, now: Instant) {
        let record = &mut store[id];
        if record.status != TileStatus::Loaded || record.is_in_use() {
            return;
        }
        record.inactive_since = Some(now);
        if !record.in_pool {
            record.in_pool = true;
            self.entries.push(id);
        }
    }

    /// Sweep if the interval elapsed since the previous one
    pub fn sweep(&mut self, store: &mut TileStore, keep_alive: Duration, now: Instant) -> usize {
        if let Some(last) = self.last_sweep {
            if now.saturating_duration_since(last) < self.interval {
                return 0;
            }
        }
        self.sweep_now(store, keep_alive, now)
    }

    /// Release every pooled bitmap unused for longer than `keep_alive`.
    /// Returns how many were released.
    pub fn sweep_now(&mut self, store: &mut TileStore, keep_alive: Duration, now: Instant) -> usize {
        self.last_sweep = Some(now);
        let mut released = 0;

        let entries = std::mem::take(&mut self.entries);
        for id in entries {
            let record = &mut store[id];
            let keep = record.status == TileStatus::Loaded
                && !record.is_in_use()
                && record.bitmap.is_some()
                && !record.has_default_bitmap();
            if !keep {
                record.in_pool = false;
                record.inactive_since = None;
                continue;
            }

            let idle = record
                .inactive_since
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));
            if idle <= keep_alive {
                self.entries.push(id);
                continue;
            }

            let key = record.key;
            if let Some(bitmap) = record.release() {
                clear_borrowed_placeholders(store, id, &bitmap);
            }
            log::debug!("released bitmap of {} after {:?} idle", key, idle);
            released += 1;
        }

        self.reclaimed_total += released as u64;
        released
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reclaimed_total(&self) -> u64 {
        self.reclaimed_total
    }
}

/// Descendants cropped from `bitmap` lose their placeholder
fn clear_borrowed_placeholders(store: &mut TileStore, id: TileId, bitmap: &Arc<Bitmap>) {
    let mut stack: Vec<TileId> = store[id].children.map(Vec::from).unwrap_or_default();
    while let Some(child) = stack.pop() {
        let record = &mut store[child];
        if !record.placeholder.as_ref().map_or(false, |p| p.borrows(bitmap)) {
            continue;
        }
        record.placeholder = None;
        if let Some(children) = record.children {
            stack.extend(children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileKey;
    use crate::tiles::record::TileSourceKind;
    use crate::tiles::transition::Placeholder;

    fn loaded(store: &mut TileStore, key: TileKey, now: Instant) -> TileId {
        let id = store.get_or_create(key, None);
        store[id].install(Arc::new(Bitmap::solid(32, 32, [7; 4])), TileSourceKind::Online, now);
        id
    }

    #[test]
    fn test_release_after_keep_alive() {
        let mut store = TileStore::new(4096.0);
        let mut pool = InactivePool::new(Duration::from_secs(3));
        let start = Instant::now();
        let id = loaded(&mut store, TileKey::new(0, 0, 4), start);
        pool.park(&mut store, id, start);
        assert_eq!(pool.len(), 1);

        let keep_alive = Duration::from_secs(10);
        assert_eq!(pool.sweep_now(&mut store, keep_alive, start + Duration::from_secs(5)), 0);
        assert!(store[id].bitmap.is_some());

        let late = start + Duration::from_secs(11);
        assert_eq!(pool.sweep_now(&mut store, keep_alive, late), 1);
        assert!(store[id].bitmap.is_none());
        assert_eq!(store[id].status, TileStatus::Inactive);

        // A second sweep changes nothing
        assert_eq!(pool.sweep_now(&mut store, keep_alive, late), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.reclaimed_total(), 1);
    }

    #[test]
    fn test_tiles_back_in_use_leave_the_pool() {
        let mut store = TileStore::new(4096.0);
        let mut pool = InactivePool::new(Duration::from_secs(3));
        let start = Instant::now();
        let id = loaded(&mut store, TileKey::new(1, 0, 4), start);
        pool.park(&mut store, id, start);

        store[id].visible = true;
        let late = start + Duration::from_secs(60);
        assert_eq!(pool.sweep_now(&mut store, Duration::from_secs(1), late), 0);
        assert!(store[id].bitmap.is_some());
        assert!(!store[id].in_pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_revisit_restarts_keep_alive() {
        let mut store = TileStore::new(4096.0);
        let mut pool = InactivePool::new(Duration::from_secs(3));
        let start = Instant::now();
        let id = loaded(&mut store, TileKey::new(1, 1, 4), start);
        pool.park(&mut store, id, start);

        // Shown again and hidden again before any sweep ran
        let hidden_again = start + Duration::from_secs(4);
        pool.park(&mut store, id, hidden_again);
        assert_eq!(pool.len(), 1);

        let keep_alive = Duration::from_secs(5);
        let released = pool.sweep_now(&mut store, keep_alive, start + Duration::from_secs(6));
        assert_eq!(released, 0);
        assert!(store[id].bitmap.is_some());

        let late = hidden_again + Duration::from_secs(6);
        assert_eq!(pool.sweep_now(&mut store, keep_alive, late), 1);
    }

    #[test]
    fn test_default_placeholder_is_never_released() {
        let mut store = TileStore::new(4096.0);
        let mut pool = InactivePool::new(Duration::from_secs(3));
        let start = Instant::now();
        let id = store.get_or_create(TileKey::new(2, 0, 4), None);
        store[id].install(Bitmap::default_placeholder(), TileSourceKind::Unknown, start);
        pool.park(&mut store, id, start);

        let late = start + Duration::from_secs(60);
        assert_eq!(pool.sweep_now(&mut store, Duration::from_secs(1), late), 0);
        assert!(store[id].has_default_bitmap());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_release_clears_child_placeholders() {
        let mut store = TileStore::new(4096.0);
        let mut pool = InactivePool::new(Duration::from_secs(3));
        let start = Instant::now();
        let parent = loaded(&mut store, TileKey::new(0, 0, 4), start);
        let children = store.ensure_children(parent);
        let grandchildren = store.ensure_children(children[0]);

        let child_ph = Placeholder::inherit(&store[parent], store[children[0]].key);
        store[children[0]].placeholder = child_ph;
        let grandchild_ph = Placeholder::inherit(&store[children[0]], store[grandchildren[3]].key);
        store[grandchildren[3]].placeholder = grandchild_ph;

        pool.park(&mut store, parent, start);
        let late = start + Duration::from_secs(30);
        assert_eq!(pool.sweep_now(&mut store, Duration::from_secs(10), late), 1);
        assert!(store[children[0]].placeholder.is_none());
        assert!(store[grandchildren[3]].placeholder.is_none());
    }

    #[test]
    fn test_sweep_is_interval_gated() {
        let mut store = TileStore::new(4096.0);
        let mut pool = InactivePool::new(Duration::from_secs(3));
        let start = Instant::now();
        let id = loaded(&mut store, TileKey::new(3, 0, 4), start);
        pool.park(&mut store, id, start);

        let zero = Duration::ZERO;
        assert_eq!(pool.sweep(&mut store, zero, start), 0);
        // Inside the interval the sweep is skipped even though the tile expired
        assert_eq!(pool.sweep(&mut store, zero, start + Duration::from_secs(1)), 0);
        assert!(store[id].bitmap.is_some());
        assert_eq!(pool.sweep(&mut store, zero, start + Duration::from_secs(4)), 1);
    }
}
