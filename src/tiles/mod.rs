pub mod decode;
pub mod disk_cache;
pub mod pool;
pub mod record;
pub mod scheduler;
pub mod selector;
pub mod source;
pub mod store;
pub mod transition;

pub use decode::{Bitmap, ImageDecoder, TileDecoder};
pub use disk_cache::{DiskCache, Eviction};
pub use pool::InactivePool;
pub use record::{TileId, TileRecord, TileSourceKind, TileStatus};
pub use scheduler::LoadScheduler;
pub use selector::{Selection, Selector};
pub use source::{
    AssetBundle, DirectoryAssets, HttpFetcher, Resolved, SourceChain, TileFetcher, TileProvider,
    UrlTemplate,
};
pub use store::TileStore;
pub use transition::{Placeholder, RenderTile, UvRect};
