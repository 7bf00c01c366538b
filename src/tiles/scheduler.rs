//! Priority queue of tiles waiting for content.
//!
//! Tiles are admitted closest-first (`distance_to_camera × zoom`) while fewer
//! than `max_concurrent` loads are in flight. Removals null their slot and a
//! compaction pass drops the holes before the next sort.

use crate::core::geo::TileKey;
use crate::prelude::{Duration, Instant};
use crate::tiles::record::{TileId, TileStatus};
use crate::tiles::store::TileStore;

#[derive(Debug)]
pub struct LoadScheduler {
    queue: Vec<Option<TileId>>,
    has_holes: bool,
    loading: usize,
    max_concurrent: usize,
    timeout: Duration,
}

impl LoadScheduler {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            queue: Vec::new(),
            has_holes: false,
            loading: 0,
            max_concurrent,
            timeout,
        }
    }

    /// Queue an `Inactive` tile. Any other status is already in the pipeline
    /// or loaded, so the call is a no-op.
    pub fn enqueue(&mut self, store: &mut TileStore, id: TileId, now: Instant) -> bool {
        let record = &mut store[id];
        if record.status != TileStatus::Inactive {
            return false;
        }
        record.status = TileStatus::InQueue;
        record.queued_at = Some(now);
        self.queue.push(Some(id));
        true
    }

    /// Drop queued tiles that waited past the timeout and are no longer visible
    pub fn expire(&mut self, store: &mut TileStore, now: Instant) -> Vec<TileKey> {
        let mut expired = Vec::new();
        for slot in self.queue.iter_mut() {
            let Some(id) = *slot else { continue };
            let record = &mut store[id];
            if record.status != TileStatus::InQueue {
                *slot = None;
                self.has_holes = true;
                continue;
            }
            let waited = record
                .queued_at
                .map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
            if waited > self.timeout && !record.visible {
                record.reset();
                expired.push(record.key);
                *slot = None;
                self.has_holes = true;
            }
        }
        if !expired.is_empty() {
            log::debug!("{} queued tiles timed out", expired.len());
        }
        expired
    }

    pub fn compact(&mut self) {
        if self.has_holes {
            self.queue.retain(Option::is_some);
            self.has_holes = false;
        }
    }

    /// Move the highest-priority visible tiles to `Loading`, as many as the
    /// concurrency limit allows. Returned tiles must each be reported back
    /// through [`LoadScheduler::complete`].
    pub fn admit(&mut self, store: &mut TileStore) -> Vec<TileId> {
        self.compact();
        let slots = self.max_concurrent.saturating_sub(self.loading);
        if slots == 0 || self.queue.is_empty() {
            return Vec::new();
        }

        self.queue.sort_by(|a, b| {
            let pa = a.map_or(f64::INFINITY, |id| priority(store, id));
            let pb = b.map_or(f64::INFINITY, |id| priority(store, id));
            pa.total_cmp(&pb)
        });

        let mut admitted = Vec::with_capacity(slots);
        for slot in self.queue.iter_mut() {
            if admitted.len() == slots {
                break;
            }
            let Some(id) = *slot else { continue };
            let record = &mut store[id];
            if record.status != TileStatus::InQueue || !record.visible {
                continue;
            }
            record.status = TileStatus::Loading;
            admitted.push(id);
            *slot = None;
            self.has_holes = true;
        }
        self.loading += admitted.len();
        self.compact();
        admitted
    }

    /// A previously admitted load finished, whatever its outcome
    pub fn complete(&mut self) {
        self.loading = self.loading.saturating_sub(1);
    }

    pub fn loading(&self) -> usize {
        self.loading
    }

    pub fn queued_len(&self) -> usize {
        self.queue.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

fn priority(store: &TileStore, id: TileId) -> f64 {
    let record = &store[id];
    record.distance_to_camera * record.key.zoom as f64
}
