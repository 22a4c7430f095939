//! Reference-counted texture cache with idle eviction.
//!
//! Records are created on first acquire and live until a [`TextureCache::sweep`]
//! finds nobody referencing them. A record's texture is loaded at most once at
//! a time; concurrent acquires of a key that is still loading share the load.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use vellum_core::TaskPool;
use vellum_core::alloc::HashMap;
use vellum_core::profiling::profile_function;

use crate::basis::{SharedBasis, ThrottleBasis, ThrottleBasisProvider};
use crate::cancel::CancellationToken;
use crate::config::{CacheConfig, LoadMode};
use crate::error::{TextureError, TextureResult};
use crate::event::{TextureEvent, TextureEventBuffer};
use crate::gpu::{GpuBackend, GpuTexture, RawImage, Region};
use crate::handle::TextureHandle;
use crate::icon::IconLookup;
use crate::io::AssetSource;
use crate::record::{InFlightLoad, RecordSnapshot, RecordState, TextureRecord};
use crate::release::{DeferredRelease, FrameReleaseQueue};
use crate::throttler::{LoadFuture, LoadThrottler, guarded};

const CACHE_NAME: &str = "TextureCache";

type TextureFuture = Pin<Box<dyn Future<Output = TextureResult<Arc<GpuTexture>>> + Send + 'static>>;

/// Maps a requested path to the path that is actually read.
///
/// Returning `None` keeps the requested path.
pub type PathSubstitution = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Default)]
struct SubstitutionSlot {
    hook: RwLock<Option<PathSubstitution>>,
}

impl SubstitutionSlot {
    fn resolve(&self, path: &str) -> String {
        match self.hook.read().as_ref().and_then(|hook| hook(path)) {
            Some(substituted) => {
                tracing::trace!(path, substituted = %substituted, "substituting texture path");
                substituted
            }
            None => path.to_string(),
        }
    }
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Records in the table.
    pub records: usize,
    /// Records holding a texture.
    pub loaded: usize,
    /// Records with a load in flight.
    pub loading: usize,
    /// Sum of reference counts.
    pub total_refs: u64,
    /// Acquires that found a resident texture.
    pub hits: u64,
    /// Acquires that did not.
    pub misses: u64,
}

/// What a handle waiting for its texture gets back.
pub(crate) enum Waiting {
    Ready(Arc<GpuTexture>),
    Pending(flume::Receiver<TextureResult<Arc<GpuTexture>>>),
}

/// State shared between the cache, its handles and its completion tasks.
pub(crate) struct CacheInner {
    config: CacheConfig,
    records: Mutex<HashMap<String, Arc<TextureRecord>>>,
    source: Arc<dyn AssetSource>,
    backend: Arc<dyn GpuBackend>,
    throttler: Arc<LoadThrottler>,
    pool: Arc<TaskPool>,
    release: Arc<dyn DeferredRelease>,
    frame_queue: Option<Arc<FrameReleaseQueue>>,
    substitution: Arc<SubstitutionSlot>,
    events: Mutex<TextureEventBuffer>,
    next_load_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    disposed: AtomicBool,
}

impl CacheInner {
    fn now(&self) -> Instant {
        self.config.clock.now()
    }

    fn push_events(&self, events: Vec<TextureEvent>) {
        if events.is_empty() {
            return;
        }
        let mut buffer = self.events.lock();
        for event in events {
            buffer.push(event);
        }
    }

    fn disposed_error() -> TextureError {
        TextureError::Disposed { what: CACHE_NAME }
    }

    /// Take a reference to `key`, starting a load if nothing is resident or
    /// loading.
    pub(crate) fn acquire(self: &Arc<Self>, key: &str, keep_alive: bool, eager: bool) -> TextureHandle {
        let now = self.now();
        let tick = self.config.clock.ticks();

        let mut records = self.records.lock();
        let record = match records.get(key) {
            Some(record) => Arc::clone(record),
            None => {
                let record = Arc::new(TextureRecord::new(key, now));
                records.insert(key.to_string(), Arc::clone(&record));
                record
            }
        };

        {
            let mut state = record.state.lock();
            state.ref_count += 1;
            if keep_alive {
                state.keep_alive_count += 1;
            }
            state.last_access = now;

            if state.texture.is_some() {
                self.hits.fetch_add(1, Ordering::Relaxed);
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                match &state.load {
                    Some(load) => load.basis.request(eager, tick),
                    None => self.start_load(&record, &mut state, eager, tick),
                }
            }
        }
        drop(records);

        TextureHandle::new(Arc::clone(self), record, keep_alive)
    }

    /// Drop one reference taken by [`CacheInner::acquire`].
    pub(crate) fn release_ref(&self, record: &TextureRecord, keep_alive: bool) {
        let mut state = record.state.lock();
        state.ref_count = state.ref_count.saturating_sub(1);
        if keep_alive {
            state.keep_alive_count = state.keep_alive_count.saturating_sub(1);
        }
        tracing::trace!(key = record.key(), refs = state.ref_count, "released texture reference");
    }

    /// Refresh the record's access time and return its texture.
    pub(crate) fn touch(&self, record: &TextureRecord) -> Option<Arc<GpuTexture>> {
        let now = self.now();
        let mut state = record.state.lock();
        state.last_access = now;
        state.texture.clone()
    }

    /// Register interest in the record's texture, starting an eager load if
    /// none is running.
    pub(crate) fn wait_for(self: &Arc<Self>, record: &Arc<TextureRecord>) -> TextureResult<Waiting> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Self::disposed_error());
        }

        let now = self.now();
        let tick = self.config.clock.ticks();
        let mut state = record.state.lock();
        if state.removed {
            return Err(TextureError::Disposed {
                what: "TextureHandle",
            });
        }

        state.last_access = now;
        if let Some(texture) = &state.texture {
            return Ok(Waiting::Ready(Arc::clone(texture)));
        }

        match &state.load {
            Some(load) => load.basis.request(true, tick),
            None => self.start_load(record, &mut state, true, tick),
        }

        let (sender, receiver) = flume::bounded(1);
        match state.load.as_mut() {
            Some(load) => {
                load.waiters.push(sender);
                Ok(Waiting::Pending(receiver))
            }
            None => Err(state.last_error.clone().unwrap_or_else(Self::disposed_error)),
        }
    }

    /// Build the load function for a keyed texture.
    fn keyed_loader(&self, key: String) -> impl FnOnce(CancellationToken) -> TextureFuture + Send + 'static {
        let source = Arc::clone(&self.source);
        let backend = Arc::clone(&self.backend);
        let substitution = Arc::clone(&self.substitution);

        move |cancel: CancellationToken| -> TextureFuture {
            Box::pin(async move {
                cancel.check()?;
                let path = substitution.resolve(&key);
                let image = source.read_image(&path).await?;
                cancel.check()?;
                let texture = GpuTexture::upload(&backend, &image, key)?;
                Ok::<_, TextureError>(Arc::new(texture))
            })
        }
    }

    /// Start loading `record`. The caller holds the record lock.
    fn start_load(self: &Arc<Self>, record: &Arc<TextureRecord>, state: &mut RecordState, eager: bool, tick: i64) {
        if self.disposed.load(Ordering::Acquire) {
            state.last_error = Some(Self::disposed_error());
            return;
        }

        let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let basis = Arc::new(SharedBasis::new(eager, tick));
        let load = self.keyed_loader(record.key().to_string());

        let result: TextureFuture = match self.config.load_mode {
            LoadMode::Throttled => Box::pin(self.throttler.create_loader(basis.clone(), load, cancel.clone())),
            LoadMode::Immediate => {
                let token = cancel.clone();
                let key = record.key().to_string();
                Box::pin(async move { guarded(&key, load(token)).await })
            }
        };

        tracing::debug!(key = record.key(), eager, mode = ?self.config.load_mode, "starting texture load");

        let inner = Arc::clone(self);
        let completed = Arc::clone(record);
        self.pool.spawn_detached(async move {
            let result = result.await;
            inner.finish_load(&completed, id, result);
        });

        state.load = Some(InFlightLoad {
            id,
            cancel,
            basis,
            waiters: Vec::new(),
            restart: false,
        });
    }

    /// Install the result of load `id`, unless that load was abandoned.
    ///
    /// The event is buffered before waiters are woken, so a caller that saw
    /// the result also sees the event.
    fn finish_load(self: &Arc<Self>, record: &Arc<TextureRecord>, id: u64, result: TextureResult<Arc<GpuTexture>>) {
        let now = self.now();
        let mut state = record.state.lock();
        let Some(load) = state.load.take_if(|load| load.id == id) else {
            drop(state);
            tracing::trace!(key = record.key(), "discarding result of abandoned load");
            if let Ok(texture) = result {
                self.release.defer(texture);
            }
            return;
        };

        if load.restart {
            // Invalidated while in flight: the result is stale.
            let eager = !load.basis.is_opportunistic();
            self.start_load(record, &mut state, eager, self.config.clock.ticks());
            match state.load.as_mut() {
                Some(next) => next.waiters.extend(load.waiters),
                None => {
                    let error = state.last_error.clone().unwrap_or_else(Self::disposed_error);
                    for waiter in load.waiters {
                        let _ = waiter.send(Err(error.clone()));
                    }
                }
            }
            drop(state);
            tracing::debug!(key = record.key(), "restarted invalidated texture load");
            if let Ok(texture) = result {
                self.release.defer(texture);
            }
            return;
        }

        match &result {
            Ok(texture) => {
                state.texture = Some(Arc::clone(texture));
                state.last_error = None;
                state.last_access = now;
                tracing::debug!(key = record.key(), "texture loaded");
                self.events.lock().push(TextureEvent::Loaded {
                    key: record.key().to_string(),
                    width: texture.width(),
                    height: texture.height(),
                });
            }
            Err(error) => {
                state.last_error = Some(error.clone());
                if !error.is_cancelled() {
                    tracing::warn!("Failed to load texture '{}': {}", record.key(), error);
                    self.events.lock().push(TextureEvent::LoadFailed {
                        key: record.key().to_string(),
                        error: error.clone(),
                    });
                }
            }
        }

        for waiter in load.waiters {
            let _ = waiter.send(result.clone());
        }
    }

    fn sweep(&self) -> usize {
        profile_function!();
        let now = self.now();
        let idle_timeout = self.config.idle_timeout;
        let mut freed = Vec::new();
        let mut events = Vec::new();

        let mut records = self.records.lock();
        records.retain(|key, record| {
            let mut state = record.state.lock();

            if state.ref_count == 0 {
                if let Some(load) = state.load.take() {
                    load.abandon(TextureError::Cancelled);
                }
                freed.extend(state.texture.take());
                state.removed = true;
                events.push(TextureEvent::Removed { key: key.clone() });
                return false;
            }

            let idle = now.saturating_duration_since(state.last_access);
            if state.keep_alive_count == 0 && state.load.is_none() && idle > idle_timeout {
                if let Some(texture) = state.texture.take() {
                    freed.push(texture);
                    events.push(TextureEvent::Evicted { key: key.clone() });
                }
            }
            true
        });
        drop(records);

        let count = freed.len();
        for texture in freed {
            self.release.defer(texture);
        }
        if !events.is_empty() {
            tracing::debug!(freed = count, events = events.len(), "texture sweep");
        }
        self.push_events(events);
        count
    }

    fn invalidate(&self, key: &str) -> bool {
        let mut events = vec![TextureEvent::Invalidated { key: key.to_string() }];

        let freed = {
            let mut records = self.records.lock();
            let Some(record) = records.get(key).cloned() else {
                return false;
            };

            let mut state = record.state.lock();
            let freed = state.texture.take();
            state.last_error = None;

            if state.ref_count == 0 {
                if let Some(load) = state.load.take() {
                    load.abandon(TextureError::Cancelled);
                }
                state.removed = true;
                drop(state);
                records.remove(key);
                events.push(TextureEvent::Removed { key: key.to_string() });
            } else if let Some(load) = state.load.as_mut() {
                // Referenced and loading: the load is replaced once it has
                // wound down, keeping its waiters.
                load.cancel.cancel();
                load.restart = true;
            }
            freed
        };

        if let Some(texture) = freed {
            self.release.defer(texture);
        }
        tracing::debug!(key, "invalidated texture");
        self.push_events(events);
        true
    }

    fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::debug!("Shutting down TextureCache");
        let records = std::mem::take(&mut *self.records.lock());
        let mut freed = Vec::new();
        for (_, record) in records {
            let mut state = record.state.lock();
            if let Some(load) = state.load.take() {
                load.abandon(Self::disposed_error());
            }
            freed.extend(state.texture.take());
            state.removed = true;
        }

        for texture in freed {
            self.release.defer(texture);
        }
    }
}

/// Reference-counted cache of GPU textures keyed by asset path.
///
/// # Example
///
/// ```ignore
/// let cache = TextureCache::new(config, source, backend, throttler, pool);
///
/// // Per frame:
/// let handle = cache.acquire("ui/icon/000000/000001.tex", false);
/// if let Some(texture) = handle.texture() {
///     draw(texture.native_handle());
/// }
/// cache.sweep();
/// cache.release_frame();
/// ```
pub struct TextureCache {
    inner: Arc<CacheInner>,
}

impl TextureCache {
    /// Create a cache. Every collaborator is passed in explicitly.
    pub fn new(
        config: CacheConfig,
        source: Arc<dyn AssetSource>,
        backend: Arc<dyn GpuBackend>,
        throttler: Arc<LoadThrottler>,
        pool: Arc<TaskPool>,
    ) -> Self {
        let (release, frame_queue): (Arc<dyn DeferredRelease>, _) = match &config.release {
            Some(release) => (Arc::clone(release), None),
            None => {
                let queue = Arc::new(FrameReleaseQueue::new());
                (queue.clone(), Some(queue))
            }
        };

        tracing::debug!(?config, "TextureCache created");
        let events = TextureEventBuffer::with_capacity(config.event_capacity);

        Self {
            inner: Arc::new(CacheInner {
                config,
                records: Mutex::new(HashMap::default()),
                source,
                backend,
                throttler,
                pool,
                release,
                frame_queue,
                substitution: Arc::new(SubstitutionSlot::default()),
                events: Mutex::new(events),
                next_load_id: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Take a reference to the texture at `key`.
    ///
    /// Never blocks. Starts a load when the texture is neither resident nor
    /// loading; the load is eager when `keep_alive` is set and opportunistic
    /// otherwise. A keep-alive reference also pins the texture against idle
    /// eviction.
    pub fn acquire(&self, key: &str, keep_alive: bool) -> TextureHandle {
        self.inner.acquire(key, keep_alive, keep_alive)
    }

    /// Take a reference and wait for the texture.
    ///
    /// On failure the reference is dropped and the error returned. `cancel`
    /// abandons the wait; the shared load keeps running for other holders.
    pub async fn acquire_loaded(
        &self,
        key: &str,
        keep_alive: bool,
        cancel: CancellationToken,
    ) -> TextureResult<TextureHandle> {
        let handle = self.inner.acquire(key, keep_alive, true);
        match handle.loaded_with(cancel).await {
            Ok(_) => Ok(handle),
            Err(error) => {
                handle.dispose();
                Err(error)
            }
        }
    }

    /// Resolve an icon to its asset path and acquire it.
    pub fn acquire_icon(&self, lookup: IconLookup, keep_alive: bool) -> TextureResult<TextureHandle> {
        let path = lookup.resolve(self.inner.source.as_ref(), self.inner.config.icon_language)?;
        Ok(self.acquire(&path, keep_alive))
    }

    /// Upload a caller-provided image through the throttler.
    ///
    /// The result is not cached; the caller owns the texture.
    pub fn create_from_raw(
        &self,
        image: RawImage,
        opportunistic: bool,
        cancel: CancellationToken,
    ) -> LoadFuture<Arc<GpuTexture>> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return LoadFuture::ready(Err(CacheInner::disposed_error()));
        }

        let tick = self.inner.config.clock.ticks();
        let backend = Arc::clone(&self.inner.backend);
        self.inner.throttler.create_loader(
            Arc::new(ThrottleBasis::new(opportunistic, tick, tick)),
            move |token: CancellationToken| async move {
                token.check()?;
                let texture = GpuTexture::upload(&backend, &image, "raw image")?;
                Ok::<_, TextureError>(Arc::new(texture))
            },
            cancel,
        )
    }

    /// Copy `region` of a cached texture into a new, uncached texture.
    ///
    /// Waits for the source texture first, then submits the copy through the
    /// throttler as an eager request.
    pub async fn convert_region(
        &self,
        handle: &TextureHandle,
        region: Region,
        cancel: CancellationToken,
    ) -> TextureResult<Arc<GpuTexture>> {
        let source = handle.loaded_with(cancel.clone()).await?;
        if !region.fits(source.width(), source.height()) {
            return Err(TextureError::InvalidRegion {
                width: source.width(),
                height: source.height(),
                region: region.to_string(),
            });
        }

        let label = format!("{}[{}]", handle.key(), region);
        self.inner
            .throttler
            .create_loader(
                Arc::new(ThrottleBasis::eager(self.inner.config.clock.ticks())),
                move |token: CancellationToken| async move {
                    token.check()?;
                    Ok::<_, TextureError>(Arc::new(source.copy_region(region, None, label)?))
                },
                cancel,
            )
            .await
    }

    /// Reclaim unreferenced records and idle textures.
    ///
    /// Call once per frame from the frame driver. Returns the number of
    /// textures freed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Destroy the textures freed since the previous call.
    ///
    /// Returns 0 when a custom [`DeferredRelease`] is configured.
    pub fn release_frame(&self) -> usize {
        self.inner
            .frame_queue
            .as_ref()
            .map_or(0, |queue| queue.release())
    }

    /// Install or clear the path substitution hook.
    ///
    /// Applies to loads that start after the call.
    pub fn set_substitution(&self, hook: Option<PathSubstitution>) {
        *self.inner.substitution.hook.write() = hook;
    }

    /// Drop the textures of `keys` so the next use reloads them.
    ///
    /// Records nobody references are deleted. In-flight loads are cancelled;
    /// if callers are waiting on one, a fresh load replaces it. Returns the
    /// number of keys that were present.
    pub fn invalidate<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter(|key| self.inner.invalidate(key.as_ref()))
            .count()
    }

    /// Take every event buffered since the previous call.
    ///
    /// Call once per frame; the buffer is bounded by
    /// [`CacheConfig::event_capacity`] and drops its oldest events when full.
    pub fn drain_events(&self) -> Vec<TextureEvent> {
        self.inner.events.lock().take()
    }

    pub fn stats(&self) -> CacheStats {
        let records = self.inner.records.lock();
        let mut stats = CacheStats {
            records: records.len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        for record in records.values() {
            let state = record.state.lock();
            stats.loaded += usize::from(state.texture.is_some());
            stats.loading += usize::from(state.load.is_some());
            stats.total_refs += u64::from(state.ref_count);
        }
        stats
    }

    /// Debug view of the record for `key`.
    pub fn record_info(&self, key: &str) -> Option<RecordSnapshot> {
        let now = self.inner.now();
        let record = self.inner.records.lock().get(key).cloned()?;
        Some(record.snapshot(now))
    }

    /// Whether a record exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.records.lock().contains_key(key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.lock().is_empty()
    }

    /// Cancel every load, free every texture and refuse new loads.
    ///
    /// Outstanding handles stay valid but report no texture. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureCache")
            .field("stats", &self.stats())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
