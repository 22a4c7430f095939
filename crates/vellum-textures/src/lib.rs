//! Vellum Textures - throttled loading and reference-counted caching of GPU textures.
//!
//! Two pieces do the work:
//!
//! - [`LoadThrottler`] runs expensive load functions on a bounded set of
//!   workers, servicing explicit requests before speculative ones.
//! - [`TextureCache`] hands out counted [`TextureHandle`]s per asset path,
//!   coalesces concurrent loads of the same path, and reclaims textures that
//!   are unreferenced or idle when the frame driver calls
//!   [`TextureCache::sweep`].
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vellum_core::TaskPool;
//! use vellum_textures::*;
//!
//! let pool = Arc::new(TaskPool::new(4));
//! let throttler = Arc::new(LoadThrottler::new(ThrottlerConfig::default(), &pool));
//! let cache = TextureCache::new(CacheConfig::default(), source, backend, throttler.clone(), pool);
//!
//! let handle = cache.acquire("ui/icon/060000/060001.tex", true);
//!
//! // Every frame:
//! cache.sweep();
//! cache.release_frame();
//! for event in cache.drain_events() {
//!     tracing::debug!("{:?}", event);
//! }
//! ```

pub mod basis;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod gpu;
pub mod handle;
pub mod icon;
pub mod io;
pub mod record;
pub mod release;
pub mod throttler;

pub use basis::{SharedBasis, ThrottleBasis, ThrottleBasisProvider, compare_priority};
pub use cache::{CacheStats, PathSubstitution, TextureCache};
pub use cancel::CancellationToken;
pub use config::{CacheConfig, DEFAULT_IDLE_TIMEOUT, LoadMode};
pub use error::{TextureError, TextureResult};
pub use event::{DEFAULT_EVENT_CAPACITY, TextureEvent, TextureEventBuffer};
pub use gpu::{GpuBackend, GpuTexture, PixelFormat, RawImage, RawTexture, Region};
pub use handle::TextureHandle;
pub use icon::{IconLanguage, IconLookup, format_icon_path};
pub use io::{AssetSource, ImageFuture, MemorySource};
pub use record::{RecordSnapshot, TextureRecord};
pub use release::{DeferredRelease, FrameReleaseQueue, ImmediateRelease};
pub use throttler::{
    LoadFuture, LoadThrottler, MAX_WORKERS, ThrottlerConfig, ThrottlerStats, default_worker_count,
};
