//! A texture cache wired to mocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use vellum_core::{ManualClock, TaskPool};
use vellum_textures::{CacheConfig, LoadThrottler, TextureCache, ThrottlerConfig};

use crate::{MockAssetSource, MockGpuBackend};

/// Everything a cache test needs, with time under test control.
pub struct TestRig {
    pub clock: Arc<ManualClock>,
    pub source: Arc<MockAssetSource>,
    pub gpu: Arc<MockGpuBackend>,
    pub pool: Arc<TaskPool>,
    pub throttler: Arc<LoadThrottler>,
    pub cache: TextureCache,
}

impl TestRig {
    /// Two pool threads, two throttler workers, default cache settings.
    pub fn new() -> Self {
        Self::with_config(2, CacheConfig::default())
    }

    /// Build a rig with `workers` throttler workers.
    ///
    /// The config's clock is replaced by the rig's [`ManualClock`].
    pub fn with_config(workers: usize, config: CacheConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let source = Arc::new(MockAssetSource::new());
        let gpu = Arc::new(MockGpuBackend::new());
        let pool = Arc::new(TaskPool::new(workers.max(1) + 1));
        let throttler = Arc::new(LoadThrottler::new(
            ThrottlerConfig::new().with_workers(workers),
            &pool,
        ));

        let cache = TextureCache::new(
            config.with_clock(clock.clone()),
            source.clone(),
            gpu.clone(),
            throttler.clone(),
            pool.clone(),
        );

        Self {
            clock,
            source,
            gpu,
            pool,
            throttler,
            cache,
        }
    }

    /// Move the rig's clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

impl Default for TestRig {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestRig {
    fn drop(&mut self) {
        self.cache.shutdown();
        self.throttler.shutdown();
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
