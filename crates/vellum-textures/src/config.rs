//! Texture cache configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use vellum_core::{Clock, SystemClock};

use crate::event::DEFAULT_EVENT_CAPACITY;
use crate::icon::IconLanguage;
use crate::release::{DeferredRelease, ImmediateRelease};

/// Default idle time after which an unpinned texture is freed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(2000);

/// How the cache runs its loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Submit loads to the [`LoadThrottler`](crate::LoadThrottler).
    #[default]
    Throttled,
    /// Spawn loads directly on the task pool.
    Immediate,
}

/// Configuration for a [`TextureCache`](crate::TextureCache).
#[derive(Clone)]
pub struct CacheConfig {
    /// Idle time after which a texture without keep-alive holders is freed.
    pub idle_timeout: Duration,
    /// Whether loads go through the throttler.
    pub load_mode: LoadMode,
    /// Time source for idle tracking and request ticks.
    pub clock: Arc<dyn Clock>,
    /// Language folder used by icon lookups that do not name one.
    pub icon_language: IconLanguage,
    /// Where freed textures go. `None` queues them until
    /// [`TextureCache::release_frame`](crate::TextureCache::release_frame).
    pub release: Option<Arc<dyn DeferredRelease>>,
    /// Events buffered between drains before the oldest are dropped.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            load_mode: LoadMode::default(),
            clock: Arc::new(SystemClock),
            icon_language: IconLanguage::default(),
            release: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_icon_language(mut self, language: IconLanguage) -> Self {
        self.icon_language = language;
        self
    }

    pub fn with_release(mut self, release: Arc<dyn DeferredRelease>) -> Self {
        self.release = Some(release);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Drop freed textures as soon as they are freed.
    pub fn with_immediate_release(self) -> Self {
        self.with_release(Arc::new(ImmediateRelease))
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("idle_timeout", &self.idle_timeout)
            .field("load_mode", &self.load_mode)
            .field("icon_language", &self.icon_language)
            .field("custom_release", &self.release.is_some())
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::ManualClock;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.idle_timeout, Duration::from_millis(2000));
        assert_eq!(config.load_mode, LoadMode::Throttled);
        assert!(config.release.is_none());
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_builders() {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig::new()
            .with_idle_timeout(Duration::from_secs(5))
            .with_load_mode(LoadMode::Immediate)
            .with_clock(clock.clone())
            .with_immediate_release();

        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.load_mode, LoadMode::Immediate);
        assert!(config.release.is_some());

        clock.advance(Duration::from_millis(10));
        assert_eq!(config.clock.ticks(), 10);
    }
}
