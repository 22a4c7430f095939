//! Vellum - a texture residency engine
//!
//! Vellum loads, shares and reclaims GPU textures requested by many callers
//! at once while keeping the number of expensive loads in flight bounded.
//!
//! - **Load throttling**: explicit requests are serviced before speculative
//!   prefetches, on at most one worker per core.
//! - **Texture cache**: reference-counted handles per asset path, coalesced
//!   loads, idle eviction, keep-alive pinning.
//! - **Icons**: icon ids resolved to asset paths with language and
//!   resolution fallbacks.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vellum::prelude::*;
//!
//! let service = TextureService::builder()
//!     .with_logging(true)
//!     .build(Arc::new(MemorySource::new()), backend);
//!
//! let icon = service.cache().acquire_icon(IconLookup::new(60_001), true)?;
//!
//! loop {
//!     // Once per frame:
//!     let report = service.tick();
//!     if let Some(texture) = icon.texture() {
//!         draw(texture.native_handle());
//!     }
//! }
//! ```

pub mod service;

pub use vellum_core as core;
pub use vellum_textures as textures;

pub use service::{FrameReport, TextureService, TextureServiceBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::service::{FrameReport, TextureService, TextureServiceBuilder};

    pub use vellum_core::{Clock, Config, ManualClock, SystemClock, TaskPool};

    pub use vellum_textures::{
        AssetSource, CacheConfig, CancellationToken, GpuBackend, GpuTexture, IconLanguage,
        IconLookup, LoadMode, LoadThrottler, MemorySource, PixelFormat, RawImage, RawTexture,
        Region, TextureCache, TextureError, TextureEvent, TextureHandle, TextureResult,
        ThrottleBasis, ThrottlerConfig,
    };
}
