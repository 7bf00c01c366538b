//! Engine builder for fluent configuration
//!
//! Starts from a [`TileStreamProfile`] and lets the host plug in its own
//! provider, bundled assets, network transport, decoder and executor. Anything
//! left unset falls back to the defaults: HTTP via `reqwest`, decoding via the
//! `image` crate, and the tokio runtime the caller is running on.

use crate::{
    core::{
        config::{TileStreamConfig, TileStreamProfile},
        engine::TileEngine,
        geo::LatLngBounds,
    },
    prelude::Arc,
    runtime::{AsyncSpawner, TokioSpawner},
    tiles::{
        decode::{ImageDecoder, TileDecoder},
        disk_cache::DiskCache,
        source::{AssetBundle, HttpFetcher, SourceChain, TileFetcher, TileProvider},
    },
    Result,
};
use std::path::PathBuf;

/// Builder for creating and configuring [`TileEngine`] instances
#[derive(Default)]
pub struct TileEngineBuilder {
    config: TileStreamConfig,
    provider: Option<Arc<dyn TileProvider>>,
    assets: Option<Arc<dyn AssetBundle>>,
    fetcher: Option<Arc<dyn TileFetcher>>,
    decoder: Option<Arc<dyn TileDecoder>>,
    spawner: Option<Arc<dyn AsyncSpawner>>,
}

impl TileEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration with a preset
    pub fn with_profile(mut self, profile: TileStreamProfile) -> Self {
        self.config = profile.resolve();
        self
    }

    pub fn with_config(mut self, config: TileStreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_zoom_limits(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.config.min_zoom = min_zoom;
        self.config.max_zoom = max_zoom;
        self
    }

    pub fn with_max_concurrent_loads(mut self, max: usize) -> Self {
        self.config.max_concurrent_loads = max;
        self
    }

    /// Enable the disk cache rooted at `dir`
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self.config.use_disk_cache = true;
        self
    }

    pub fn with_disk_cache_budget_mb(mut self, mb: u64) -> Self {
        self.config.disk_cache_budget_mb = mb;
        self
    }

    pub fn without_disk_cache(mut self) -> Self {
        self.config.use_disk_cache = false;
        self
    }

    pub fn with_offline_only(mut self, offline: bool) -> Self {
        self.config.offline_only = offline;
        self
    }

    pub fn with_restricted_area(mut self, area: LatLngBounds) -> Self {
        self.config.restrict_to_area = Some(area);
        self
    }

    /// Remote server identity and URL pattern
    pub fn with_server(
        mut self,
        server_id: impl Into<String>,
        url_template: impl Into<String>,
        subdomains: Vec<String>,
    ) -> Self {
        self.config.server_id = server_id.into();
        self.config.url_template = url_template.into();
        self.config.subdomains = subdomains;
        self
    }

    pub fn with_world_size(mut self, world_size: f64) -> Self {
        self.config.world_size = world_size;
        self
    }

    pub fn with_horizontal_wrap(mut self, wrap: bool) -> Self {
        self.config.wrap_horizontally = wrap;
        self
    }

    pub fn with_provider(mut self, provider: impl TileProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn with_assets(mut self, assets: impl AssetBundle + 'static) -> Self {
        self.assets = Some(Arc::new(assets));
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl TileFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Share a fetcher the caller keeps a handle to
    pub fn with_shared_fetcher(mut self, fetcher: Arc<dyn TileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_decoder(mut self, decoder: impl TileDecoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn AsyncSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn config(&self) -> &TileStreamConfig {
        &self.config
    }

    /// Validate the configuration and assemble the engine. Opening the disk
    /// cache trims it to budget before the first tick.
    pub fn build(self) -> Result<TileEngine> {
        let config = self.config;
        config.validate()?;

        let spawner = match self.spawner {
            Some(spawner) => spawner,
            None => TokioSpawner::shared()?,
        };
        let fetcher: Arc<dyn TileFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&config)?),
        };
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(ImageDecoder) as Arc<dyn TileDecoder>);

        let mut chain = SourceChain::new(&config, fetcher, decoder);
        if let Some(provider) = self.provider {
            chain = chain.with_provider(provider);
        }
        if let Some(assets) = self.assets {
            chain = chain.with_assets(assets);
        }
        if config.use_disk_cache {
            let disk = DiskCache::open(&config, Arc::clone(&spawner))?;
            match disk.enforce_budget(config.disk_budget_bytes()) {
                Ok(eviction) if eviction.removed > 0 => log::info!(
                    "startup eviction removed {} tiles, {} bytes in use",
                    eviction.removed,
                    eviction.usage_bytes
                ),
                Ok(_) => {}
                Err(e) => log::warn!("startup eviction failed: {}", e),
            }
            chain = chain.with_disk_cache(disk);
        }

        log::info!(
            "tile engine ready: server {}, zoom {}..={}, {} concurrent loads",
            config.server_id,
            config.min_zoom,
            config.max_zoom,
            config.max_concurrent_loads
        );
        Ok(TileEngine::from_parts(config, chain, spawner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileError;

    #[test]
    fn test_build_without_runtime_needs_spawner() {
        let result = TileEngineBuilder::new().without_disk_cache().build();
        assert!(matches!(result, Err(TileError::Config(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let spawner: Arc<dyn AsyncSpawner> = Arc::new(TokioSpawner::new(rt.handle().clone()));
        let result = TileEngineBuilder::new()
            .without_disk_cache()
            .with_zoom_limits(10, 3)
            .with_spawner(spawner)
            .build();
        assert!(matches!(result, Err(TileError::Config(_))));
    }

    #[test]
    fn test_builder_applies_options() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let spawner: Arc<dyn AsyncSpawner> = Arc::new(TokioSpawner::new(rt.handle().clone()));

        let engine = TileEngineBuilder::new()
            .with_profile(TileStreamProfile::LowResource)
            .with_cache_dir(tmp.path())
            .with_server("test", "https://tiles.test/{z}/{x}/{y}.png", Vec::new())
            .with_max_concurrent_loads(3)
            .with_spawner(spawner)
            .build()
            .unwrap();

        assert_eq!(engine.config().max_concurrent_loads, 3);
        assert_eq!(engine.config().disk_cache_budget_mb, 128);
        let disk = engine.disk_cache().unwrap();
        assert!(disk.dir().ends_with("test"));
        assert_eq!(engine.stats().disk_usage_bytes, Some(0));
    }
}
