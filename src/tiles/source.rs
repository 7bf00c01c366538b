//! Where tile content comes from.
//!
//! [`SourceChain::resolve`] tries, in order: the application's provider
//! callback, bundled assets, the disk cache and finally the network. The first
//! tier that yields a usable bitmap wins and is recorded as the tile's source.

use crate::core::config::TileStreamConfig;
use crate::core::constants::ASSET_ROOT;
use crate::core::geo::TileKey;
use crate::prelude::{Arc, Duration};
use crate::tiles::decode::{decode_checked, Bitmap, TileDecoder};
use crate::tiles::disk_cache::DiskCache;
use crate::tiles::record::TileSourceKind;
use crate::{Result, TileError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Shared async HTTP client for tile fetching
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    build_client("tilestream/0.1", Duration::from_secs(10)).unwrap_or_default()
});

fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
}

/// Application hook consulted before any other source.
///
/// `Ok(None)` means "not mine, keep looking"; errors are logged and the chain
/// moves on.
pub trait TileProvider: Send + Sync {
    fn try_provide_tile(
        &self,
        zoom: u8,
        x: u32,
        y: u32,
    ) -> std::result::Result<Option<Bitmap>, String>;
}

impl<F> TileProvider for F
where
    F: Fn(u8, u32, u32) -> std::result::Result<Option<Bitmap>, String> + Send + Sync,
{
    fn try_provide_tile(
        &self,
        zoom: u8,
        x: u32,
        y: u32,
    ) -> std::result::Result<Option<Bitmap>, String> {
        self(zoom, x, y)
    }
}

/// Read-only bundle of tile images shipped with the application
#[async_trait]
pub trait AssetBundle: Send + Sync {
    /// Raw bytes for `path` (for example `Tiles/osm/z4_x1_y2`), `None` when absent
    async fn load(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Assets served from a directory. Paths are tried bare and with common
/// image extensions.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    const EXTENSIONS: [&'static str; 3] = ["", ".png", ".jpg"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetBundle for DirectoryAssets {
    async fn load(&self, path: &str) -> Result<Option<Vec<u8>>> {
        for ext in Self::EXTENSIONS {
            let candidate = self.root.join(format!("{}{}", path, ext));
            match tokio::fs::read(&candidate).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

/// Network transport for remote tiles
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, key: TileKey, url: &str) -> Result<Vec<u8>>;
}

/// [`TileFetcher`] over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Client with the configured user agent and request timeout
    pub fn new(config: &TileStreamConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(&config.user_agent, config.request_timeout())?,
        })
    }

    /// Fetcher on the process-wide client
    pub fn shared() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
        }
    }
}

#[async_trait]
impl TileFetcher for HttpFetcher {
    async fn fetch(&self, key: TileKey, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TileError::Fetch {
                    key,
                    reason: format!("request timed out: {}", e),
                }
            } else {
                e.into()
            }
        })?;
        if !response.status().is_success() {
            return Err(TileError::Fetch {
                key,
                reason: format!("HTTP {}", response.status()),
            });
        }
        let bytes = response.bytes().await?;
        log::debug!("downloaded tile {} ({} bytes)", key, bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Remote URL pattern with `{zoom}`/`{z}`, `{x}`, `{y}` and `{s}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    template: String,
    subdomains: Vec<String>,
}

impl UrlTemplate {
    pub fn new(template: impl Into<String>, subdomains: Vec<String>) -> Self {
        Self {
            template: template.into(),
            subdomains,
        }
    }

    pub fn from_config(config: &TileStreamConfig) -> Self {
        Self::new(config.url_template.clone(), config.subdomains.clone())
    }

    pub fn url_for(&self, key: TileKey) -> String {
        let subdomain = if self.subdomains.is_empty() {
            ""
        } else {
            let idx = ((key.x as usize) + (key.y as usize)) % self.subdomains.len();
            self.subdomains[idx].as_str()
        };
        self.template
            .replace("{zoom}", &key.zoom.to_string())
            .replace("{z}", &key.zoom.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string())
            .replace("{s}", subdomain)
    }
}

/// Bundled asset path, without extension
pub fn asset_path(server_id: &str, key: TileKey) -> String {
    format!(
        "{}/{}/z{}_x{}_y{}",
        ASSET_ROOT, server_id, key.zoom, key.x, key.y
    )
}

/// A resolved bitmap and the tier it came from
#[derive(Debug, Clone)]
pub struct Resolved {
    pub bitmap: Arc<Bitmap>,
    pub source: TileSourceKind,
}

/// The ordered list of tile sources
pub struct SourceChain {
    provider: Option<Arc<dyn TileProvider>>,
    assets: Option<Arc<dyn AssetBundle>>,
    disk: Option<DiskCache>,
    fetcher: Arc<dyn TileFetcher>,
    decoder: Arc<dyn TileDecoder>,
    urls: UrlTemplate,
    server_id: String,
    offline_only: bool,
}

impl SourceChain {
    pub fn new(
        config: &TileStreamConfig,
        fetcher: Arc<dyn TileFetcher>,
        decoder: Arc<dyn TileDecoder>,
    ) -> Self {
        Self {
            provider: None,
            assets: None,
            disk: None,
            fetcher,
            decoder,
            urls: UrlTemplate::from_config(config),
            server_id: config.server_id.clone(),
            offline_only: config.offline_only,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn TileProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetBundle>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn with_disk_cache(mut self, disk: DiskCache) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn disk_cache(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    pub fn urls(&self) -> &UrlTemplate {
        &self.urls
    }

    pub async fn resolve(&self, key: TileKey) -> Result<Resolved> {
        if let Some(bitmap) = self.from_provider(key) {
            return Ok(Resolved {
                bitmap,
                source: TileSourceKind::Resources,
            });
        }

        if let Some(bitmap) = self.from_assets(key).await {
            return Ok(Resolved {
                bitmap,
                source: TileSourceKind::Resources,
            });
        }

        if self.offline_only {
            log::debug!("no bundled asset for {}, using placeholder", key);
            return Ok(Resolved {
                bitmap: Bitmap::default_placeholder(),
                source: TileSourceKind::Unknown,
            });
        }

        if let Some(disk) = &self.disk {
            if let Some(bytes) = disk.get(key) {
                return match decode_checked(self.decoder.as_ref(), key, &bytes) {
                    Ok(bitmap) => {
                        log::debug!("cache hit for {}", key);
                        Ok(Resolved {
                            bitmap,
                            source: TileSourceKind::Cache,
                        })
                    }
                    Err(e) => {
                        // The next attempt falls through to the network
                        if let Err(io) = disk.remove(key) {
                            log::warn!("failed to delete corrupt cache file for {}: {}", key, io);
                        }
                        Err(e)
                    }
                };
            }
        }

        let url = self.urls.url_for(key);
        let bytes = self.fetcher.fetch(key, &url).await?;
        let bitmap = decode_checked(self.decoder.as_ref(), key, &bytes)?;
        if let Some(disk) = &self.disk {
            disk.put(key, bytes);
        }
        Ok(Resolved {
            bitmap,
            source: TileSourceKind::Online,
        })
    }

    fn from_provider(&self, key: TileKey) -> Option<Arc<Bitmap>> {
        let provider = self.provider.as_ref()?;
        match provider.try_provide_tile(key.zoom, key.x, key.y) {
            Ok(Some(bitmap)) => Some(Arc::new(bitmap)),
            Ok(None) => None,
            Err(e) => {
                log::warn!("tile provider failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn from_assets(&self, key: TileKey) -> Option<Arc<Bitmap>> {
        let assets = self.assets.as_ref()?;
        let path = asset_path(&self.server_id, key);
        match assets.load(&path).await {
            Ok(Some(bytes)) => match decode_checked(self.decoder.as_ref(), key, &bytes) {
                Ok(bitmap) => Some(bitmap),
                Err(e) => {
                    log::warn!("bundled asset {} unusable: {}", path, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("failed to read bundled asset {}: {}", path, e);
                None
            }
        }
    }
}
