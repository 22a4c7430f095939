//! One-stop wiring of the task pool, load throttler and texture cache.

use std::sync::Arc;

use vellum_core::profiling::{self, ProfilingBackend, profile_function};
use vellum_core::{Config, TaskPool, logging};
use vellum_textures::{
    AssetSource, CacheConfig, GpuBackend, LoadThrottler, TextureCache, TextureEvent,
    ThrottlerConfig,
};

/// What one [`TextureService::tick`] did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameReport {
    /// Textures the sweep freed.
    pub freed: usize,
    /// Textures destroyed by the frame release queue.
    pub released: usize,
    /// Events buffered since the previous tick.
    pub events: Vec<TextureEvent>,
}

/// Builder for [`TextureService`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vellum::prelude::*;
/// use vellum_test_utils::{MockAssetSource, MockGpuBackend};
///
/// let service = TextureService::builder()
///     .with_config(Config::new().with_task_threads(2))
///     .with_throttler(ThrottlerConfig::new().with_workers(2))
///     .build(Arc::new(MockAssetSource::new()), Arc::new(MockGpuBackend::new()));
///
/// assert_eq!(service.throttler().worker_count(), 2);
/// service.shutdown();
/// ```
#[derive(Debug, Default)]
pub struct TextureServiceBuilder {
    config: Config,
    throttler: ThrottlerConfig,
    cache: CacheConfig,
    init_logging: bool,
}

impl TextureServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_throttler(mut self, throttler: ThrottlerConfig) -> Self {
        self.throttler = throttler;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Install the tracing subscriber with the config's log filter on build.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Start the pool and the throttler workers and create the cache.
    pub fn build(
        self,
        source: Arc<dyn AssetSource>,
        backend: Arc<dyn GpuBackend>,
    ) -> TextureService {
        if self.init_logging {
            logging::init_with_filter(&self.config.log_filter);
        }
        if self.config.profiling {
            profiling::init_profiling(profiling_backend());
        }

        let pool = Arc::new(TaskPool::new(self.config.resolved_task_threads()));
        let throttler = Arc::new(LoadThrottler::new(self.throttler, &pool));
        let cache = TextureCache::new(
            self.cache,
            source,
            backend,
            Arc::clone(&throttler),
            Arc::clone(&pool),
        );

        tracing::info!(
            threads = pool.thread_count(),
            workers = throttler.worker_count(),
            "texture service started"
        );

        TextureService {
            pool,
            throttler,
            cache,
            profiling: self.config.profiling,
        }
    }
}

#[cfg(feature = "profiling")]
fn profiling_backend() -> ProfilingBackend {
    ProfilingBackend::PuffinHttp
}

#[cfg(not(feature = "profiling"))]
fn profiling_backend() -> ProfilingBackend {
    ProfilingBackend::InProcess
}

/// The texture system of one process.
///
/// Owns the task pool, the throttler and the cache. The frame driver calls
/// [`tick`](Self::tick) once per frame and [`shutdown`](Self::shutdown) on exit.
pub struct TextureService {
    pool: Arc<TaskPool>,
    throttler: Arc<LoadThrottler>,
    cache: TextureCache,
    profiling: bool,
}

impl TextureService {
    pub fn builder() -> TextureServiceBuilder {
        TextureServiceBuilder::new()
    }

    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    pub fn throttler(&self) -> &Arc<LoadThrottler> {
        &self.throttler
    }

    pub fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }

    /// Run the per-frame housekeeping: sweep, release the textures freed by
    /// the previous frames, and collect events.
    ///
    /// The release runs before the sweep so that textures freed this frame
    /// survive until the next tick.
    pub fn tick(&self) -> FrameReport {
        if self.profiling {
            profiling::new_frame();
        }
        profile_function!();

        let released = self.cache.release_frame();
        let freed = self.cache.sweep();
        let events = self.cache.drain_events();

        for event in &events {
            if let TextureEvent::LoadFailed { key, error } = event {
                tracing::debug!(%key, %error, "texture load failed");
            }
        }

        FrameReport {
            freed,
            released,
            events,
        }
    }

    /// Stop everything: cancel loads, free textures, stop the workers and
    /// join the pool threads.
    ///
    /// Handles still alive keep working but report no texture.
    pub fn shutdown(self) {
        let TextureService {
            pool,
            throttler,
            cache,
            ..
        } = self;

        cache.shutdown();
        let released = cache.release_frame();
        drop(cache);
        throttler.shutdown();
        drop(throttler);

        match Arc::try_unwrap(pool) {
            Ok(pool) => pool.shutdown(),
            // Outstanding handles keep the cache, and with it the pool, alive.
            // Its threads exit once the last reference is dropped.
            Err(_) => tracing::debug!("task pool still shared; detaching its threads"),
        }

        tracing::info!(released, "texture service stopped");
    }
}

impl std::fmt::Debug for TextureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureService")
            .field("threads", &self.pool.thread_count())
            .field("throttler", &self.throttler)
            .field("cache", &self.cache)
            .finish()
    }
}
