//! The tile streaming engine.
//!
//! One [`TileEngine::update`] call is one tick: apply finished loads, walk the
//! quadtree for the current camera, admit queued tiles into the load pipeline,
//! sweep the inactive pool and keep the disk cache within budget. Loads run on
//! the engine's [`AsyncSpawner`] and report back over a channel; the store is
//! only ever touched from the tick.

use crate::core::builder::TileEngineBuilder;
use crate::core::config::TileStreamConfig;
use crate::core::geo::TileKey;
use crate::prelude::{Arc, HashMap, Instant, SystemTime};
use crate::runtime::{self, AsyncHandle, AsyncSpawner};
use crate::spatial::camera::CameraView;
use crate::tiles::disk_cache::DiskCache;
use crate::tiles::pool::InactivePool;
use crate::tiles::record::{TileId, TileRecord, TileStatus};
use crate::tiles::scheduler::LoadScheduler;
use crate::tiles::selector::Selector;
use crate::tiles::source::{Resolved, SourceChain};
use crate::tiles::store::TileStore;
use crate::tiles::transition::RenderTile;
use crate::{Result, TileError};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// A finished load on its way back to the tick
struct Completion {
    id: TileId,
    key: TileKey,
    result: Result<Resolved>,
}

/// Most recent load failure. Errors never escape the tick; this is the only
/// place they surface.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    last_error: Option<(String, SystemTime)>,
    error_count: u64,
}

impl Diagnostics {
    pub fn record(&mut self, error: &TileError) {
        log::warn!("{}", error);
        self.last_error = Some((error.to_string(), SystemTime::now()));
        self.error_count += 1;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_ref().map(|(msg, _)| msg.as_str())
    }

    pub fn last_error_at(&self) -> Option<SystemTime> {
        self.last_error.as_ref().map(|(_, at)| *at)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub visible: usize,
    pub enqueued: usize,
    pub admitted: usize,
    pub completed: usize,
    /// Loads that finished after their tile left use
    pub discarded: usize,
    pub failed: usize,
    pub expired: usize,
    pub reclaimed: usize,
    /// A background disk-cache eviction pass was started
    pub disk_eviction_started: bool,
    /// Bitmaps were released; a good moment for the host to free GPU or
    /// texture resources it no longer references.
    pub release_unused_resources: bool,
}

/// Point-in-time engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub records: usize,
    pub visible: usize,
    pub queued: usize,
    pub loading: usize,
    pub loaded: usize,
    pub pooled: usize,
    pub reclaimed_total: u64,
    pub disk_usage_bytes: Option<u64>,
    pub errors: u64,
}

pub struct TileEngine {
    config: TileStreamConfig,
    store: TileStore,
    selector: Selector,
    scheduler: LoadScheduler,
    pool: InactivePool,
    chain: Arc<SourceChain>,
    spawner: Arc<dyn AsyncSpawner>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    in_flight: HashMap<TileKey, Box<dyn AsyncHandle>>,
    diagnostics: Diagnostics,
    ticks: u64,
}

impl TileEngine {
    pub fn builder() -> TileEngineBuilder {
        TileEngineBuilder::new()
    }

    pub(crate) fn from_parts(
        config: TileStreamConfig,
        chain: SourceChain,
        spawner: Arc<dyn AsyncSpawner>,
    ) -> Self {
        let (completions_tx, completions_rx) = unbounded();
        Self {
            store: TileStore::new(config.world_size),
            selector: Selector::new(),
            scheduler: LoadScheduler::new(config.max_concurrent_loads, config.queue_timeout()),
            pool: InactivePool::new(config.sweep_interval()),
            chain: Arc::new(chain),
            spawner,
            completions_tx,
            completions_rx,
            in_flight: HashMap::default(),
            diagnostics: Diagnostics::default(),
            ticks: 0,
            config,
        }
    }

    /// Run one tick for `camera` at time `now`
    pub fn update(&mut self, camera: &dyn CameraView, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        self.apply_completions(now, &mut report);

        let selection = self.selector.update(
            &mut self.store,
            camera,
            &self.config,
            &mut self.scheduler,
            &mut self.pool,
            now,
        );
        report.visible = selection.visible;
        report.enqueued = selection.enqueued;

        let expired = self.scheduler.expire(&mut self.store, now);
        for key in &expired {
            log::debug!("{}", TileError::Timeout(*key));
        }
        report.expired = expired.len();
        for id in self.scheduler.admit(&mut self.store) {
            self.start_load(id);
            report.admitted += 1;
        }

        report.reclaimed = self
            .pool
            .sweep(&mut self.store, self.config.keep_alive(), now);
        report.release_unused_resources = report.reclaimed > 0;

        report.disk_eviction_started = self.enforce_disk_budget();
        self.ticks += 1;

        log::debug!(
            "tick {}: {} visible, {} admitted, {} completed, {} loading, {} queued",
            self.ticks,
            report.visible,
            report.admitted,
            report.completed,
            self.scheduler.loading(),
            self.scheduler.queued_len()
        );
        report
    }

    fn start_load(&mut self, id: TileId) {
        let key = self.store[id].key;
        let chain = Arc::clone(&self.chain);
        let tx = self.completions_tx.clone();
        let handle = runtime::spawn(self.spawner.as_ref(), async move {
            let result = chain.resolve(key).await;
            // The engine may be gone; nothing to report to then
            let _ = tx.send(Completion { id, key, result });
        });
        self.in_flight.insert(key, handle);
    }

    fn apply_completions(&mut self, now: Instant, report: &mut TickReport) {
        while let Ok(done) = self.completions_rx.try_recv() {
            self.scheduler.complete();
            self.in_flight.remove(&done.key);
            report.completed += 1;

            let record = &mut self.store[done.id];
            if record.status != TileStatus::Loading {
                report.discarded += 1;
                continue;
            }
            match done.result {
                Ok(resolved) if record.is_in_use() => {
                    log::debug!("loaded {} from {:?}", done.key, resolved.source);
                    record.install(resolved.bitmap, resolved.source, now);
                }
                Ok(_) => {
                    record.reset();
                    report.discarded += 1;
                }
                Err(e) => {
                    record.reset();
                    report.failed += 1;
                    self.diagnostics.record(&e);
                }
            }
        }
    }

    fn enforce_disk_budget(&self) -> bool {
        let Some(disk) = self.chain.disk_cache() else {
            return false;
        };
        let budget = self.config.disk_budget_bytes();
        if !disk.over_budget(budget) || !disk.enforce_budget_in_background(budget) {
            return false;
        }
        log::info!(
            "{}, evicting",
            TileError::QuotaExceeded {
                used: disk.usage_bytes(),
                budget
            }
        );
        true
    }

    /// Draw list for the tiles selected by the last tick
    pub fn render_list(&self, now: Instant) -> Vec<RenderTile> {
        let crossfade = self.config.crossfade();
        self.selector
            .visible()
            .iter()
            .map(|&(id, offset_x)| {
                RenderTile::from_record(&self.store[id], offset_x, crossfade, now)
            })
            .collect()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            records: self.store.len(),
            visible: self.selector.visible().len(),
            queued: self.scheduler.queued_len(),
            loading: self.scheduler.loading(),
            loaded: self.store.iter().filter(|(_, r)| r.is_loaded()).count(),
            pooled: self.pool.len(),
            reclaimed_total: self.pool.reclaimed_total(),
            disk_usage_bytes: self.chain.disk_cache().map(DiskCache::usage_bytes),
            errors: self.diagnostics.error_count(),
        }
    }

    /// Nothing queued and nothing loading
    pub fn is_idle(&self) -> bool {
        self.scheduler.loading() == 0 && self.scheduler.queued_len() == 0
    }

    pub fn tile(&self, key: TileKey) -> Option<&TileRecord> {
        self.store.by_key(key)
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn config(&self) -> &TileStreamConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn disk_cache(&self) -> Option<&DiskCache> {
        self.chain.disk_cache()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Cancel outstanding loads and persist the disk cache index
    pub fn shutdown(&mut self) -> Result<()> {
        for (_, handle) in self.in_flight.drain() {
            handle.cancel();
        }
        match self.chain.disk_cache() {
            Some(disk) => disk.flush_index(),
            None => Ok(()),
        }
    }
}

impl Drop for TileEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("tile engine shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::Point;
    use crate::prelude::Duration;
    use crate::runtime::TokioSpawner;
    use crate::spatial::camera::TopDownCamera;
    use crate::tiles::decode::test_support::png_bytes;
    use crate::tiles::decode::ImageDecoder;
    use crate::tiles::record::TileSourceKind;
    use crate::tiles::source::test_support::{DownFetcher, StaticFetcher};
    use crate::core::bounds::Bounds;
    use crate::tiles::source::{HttpFetcher, TileFetcher};

    fn engine(
        rt: &tokio::runtime::Runtime,
        config: TileStreamConfig,
        fetcher: Arc<dyn TileFetcher>,
    ) -> TileEngine {
        let spawner: Arc<dyn AsyncSpawner> = Arc::new(TokioSpawner::new(rt.handle().clone()));
        let chain = SourceChain::new(&config, fetcher, Arc::new(ImageDecoder));
        TileEngine::from_parts(config, chain, spawner)
    }

    fn config() -> TileStreamConfig {
        TileStreamConfig {
            use_disk_cache: false,
            cache_dir: None,
            max_concurrent_loads: 2,
            ..TileStreamConfig::default()
        }
    }

    fn close_camera() -> TopDownCamera {
        TopDownCamera::new(Point::new(128.0, 128.0), 2.0, 200.0, 200.0)
    }

    /// Tick until `done` holds or a few seconds pass
    fn run_until(
        engine: &mut TileEngine,
        camera: &dyn CameraView,
        mut done: impl FnMut(&TileEngine) -> bool,
    ) -> Vec<TickReport> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut reports = Vec::new();
        while !done(engine) && Instant::now() < deadline {
            reports.push(engine.update(camera, Instant::now()));
            assert!(engine.stats().loading <= engine.config().max_concurrent_loads);
            std::thread::sleep(Duration::from_millis(5));
        }
        reports
    }

    #[test]
    fn test_visible_tiles_load() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new(png_bytes(32, 32, [10, 20, 30, 255])));
        let mut engine = engine(&rt, config(), fetcher.clone());
        let camera = close_camera();

        run_until(&mut engine, &camera, |e| {
            e.render_list(Instant::now()).iter().all(|t| t.bitmap.is_some())
                && e.stats().visible == 4
        });

        let stats = engine.stats();
        assert_eq!(stats.visible, 4);
        assert_eq!(stats.loaded, 4);
        assert_eq!(fetcher.calls(), 4);
        for tile in engine.render_list(Instant::now()) {
            let record = engine.tile(tile.key).unwrap();
            assert_eq!(record.source, TileSourceKind::Online);
        }
        assert_eq!(engine.in_flight(), 0);
    }

    #[test]
    fn test_failures_surface_in_diagnostics() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut engine = engine(&rt, config(), Arc::new(DownFetcher));
        let camera = close_camera();

        run_until(&mut engine, &camera, |e| e.diagnostics().error_count() > 0);

        let diagnostics = engine.diagnostics();
        assert!(diagnostics.last_error().unwrap().contains("503"));
        assert!(diagnostics.last_error_at().is_some());
        assert_eq!(engine.stats().loaded, 0);
    }

    #[test]
    fn test_hidden_results_are_discarded() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new(png_bytes(32, 32, [1; 4])));
        let mut engine = engine(&rt, config(), fetcher);

        let admitted = engine.update(&close_camera(), Instant::now()).admitted;
        assert_eq!(admitted, 2);

        // Look somewhere else before the loads are applied
        let elsewhere = TopDownCamera::new(Point::new(3000.0, 3000.0), 2.0, 200.0, 200.0);
        let reports = run_until(&mut engine, &elsewhere, |e| e.in_flight() == 0);
        let discarded: usize = reports.iter().map(|r| r.discarded).sum();
        assert!(discarded >= 2);

        let root = TileKey::new(0, 0, 4).children();
        assert!(root
            .iter()
            .all(|k| engine.tile(*k).map_or(true, |r| r.bitmap.is_none())));
    }

    #[test]
    fn test_wrapped_tiles_render_where_the_camera_looks() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new(png_bytes(32, 32, [1; 4])));
        let mut engine = engine(
            &rt,
            TileStreamConfig {
                wrap_horizontally: true,
                ..config()
            },
            fetcher,
        );
        // Past the east edge of the map
        let camera = TopDownCamera::new(Point::new(4200.0, 128.0), 2.0, 200.0, 200.0);
        engine.update(&camera, Instant::now());

        let view = camera.world_view();
        let tiles = engine.render_list(Instant::now());
        assert_eq!(tiles.len(), 4);
        for tile in tiles {
            let corners: Vec<Point> = tile.corners.iter().map(|c| Point::new(c.x, c.z)).collect();
            let footprint = Bounds::from_points(&corners).unwrap();
            assert!(footprint.overlaps(&view), "{} drawn off-screen", tile.key);
        }
    }

    #[test]
    fn test_request_timeouts_surface_in_diagnostics() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        // Accepts connections into its backlog and never answers
        let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = TileStreamConfig {
            url_template: format!(
                "http://127.0.0.1:{}/{{z}}/{{x}}/{{y}}.png",
                silent.local_addr().unwrap().port()
            ),
            request_timeout_ms: 50,
            ..config()
        };
        let fetcher = Arc::new(HttpFetcher::new(&config).unwrap());
        let mut engine = engine(&rt, config, fetcher);

        run_until(&mut engine, &close_camera(), |e| e.diagnostics().error_count() > 0);
        let last_error = engine.diagnostics().last_error().unwrap();
        assert!(last_error.contains("timed out"), "{}", last_error);
    }

    #[test]
    fn test_pinned_preload_does_not_rescan_every_tick() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let spawner: Arc<dyn AsyncSpawner> = Arc::new(TokioSpawner::new(rt.handle().clone()));
        let config = TileStreamConfig {
            use_disk_cache: true,
            cache_dir: Some(tmp.path().to_path_buf()),
            disk_cache_budget_mb: 1,
            ..config()
        };
        let disk = DiskCache::open(&config, Arc::clone(&spawner)).unwrap();
        for x in 0..3 {
            disk.write(TileKey::new(x, 0, 4), &vec![0u8; 1024 * 1024]).unwrap();
        }
        disk.enforce_budget(config.disk_budget_bytes()).unwrap();

        let chain = SourceChain::new(&config, Arc::new(DownFetcher), Arc::new(ImageDecoder))
            .with_disk_cache(disk);
        let mut engine = TileEngine::from_parts(config, chain, spawner);

        // Looking away from the map: no loads, no new cache writes
        let nowhere = TopDownCamera::new(Point::new(-9000.0, -9000.0), 2.0, 200.0, 200.0);
        for _ in 0..5 {
            let report = engine.update(&nowhere, Instant::now());
            assert!(!report.disk_eviction_started);
        }
        assert_eq!(engine.stats().disk_usage_bytes, Some(3 * 1024 * 1024));
    }

    #[test]
    fn test_keep_alive_reclaims_bitmaps() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new(png_bytes(32, 32, [1; 4])));
        let mut engine = engine(
            &rt,
            TileStreamConfig {
                keep_alive_secs: 0,
                sweep_interval_ms: 0,
                max_concurrent_loads: 4,
                ..config()
            },
            fetcher,
        );
        let camera = close_camera();
        run_until(&mut engine, &camera, |e| e.stats().loaded == 4);

        // Zoom out: the four children leave use and are parked
        let far = TopDownCamera::new(Point::new(2048.0, 2048.0), 0.25, 1024.0, 1024.0);
        let now = Instant::now();
        engine.update(&far, now);
        let report = engine.update(&far, now + Duration::from_millis(10));
        assert!(report.release_unused_resources);
        assert_eq!(report.reclaimed, 4);
        let child = TileKey::new(0, 0, 4).children()[0];
        assert!(engine.tile(child).unwrap().bitmap.is_none());
    }
}
