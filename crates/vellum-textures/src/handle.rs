//! Counted references to cached textures.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::{CacheInner, Waiting};
use crate::cancel::CancellationToken;
use crate::error::{TextureError, TextureResult};
use crate::gpu::GpuTexture;
use crate::record::TextureRecord;

/// One counted reference to a cache record.
///
/// Created by [`TextureCache::acquire`](crate::TextureCache::acquire). The
/// reference is dropped by [`TextureHandle::dispose`] or by `Drop`, whichever
/// comes first; disposing again is a no-op.
///
/// # Example
///
/// ```ignore
/// let handle = cache.acquire("ui/icon/000000/000001.tex", false);
///
/// // Non-blocking: `None` until the load completes.
/// if let Some(texture) = handle.texture() {
///     draw(texture.native_handle());
/// }
///
/// // Or wait for it.
/// let texture = handle.loaded().await?;
/// ```
pub struct TextureHandle {
    cache: Arc<CacheInner>,
    record: Arc<TextureRecord>,
    keep_alive: bool,
    disposed: AtomicBool,
}

impl TextureHandle {
    pub(crate) fn new(cache: Arc<CacheInner>, record: Arc<TextureRecord>, keep_alive: bool) -> Self {
        Self {
            cache,
            record,
            keep_alive,
            disposed: AtomicBool::new(false),
        }
    }

    /// Cache key.
    pub fn key(&self) -> &str {
        self.record.key()
    }

    /// Whether this reference pins the texture against idle eviction.
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The resident texture, if any.
    ///
    /// Counts as a use for idle eviction. Returns `None` while loading, after
    /// eviction and after dispose.
    pub fn texture(&self) -> Option<Arc<GpuTexture>> {
        if self.is_disposed() {
            return None;
        }
        self.cache.touch(&self.record)
    }

    pub fn width(&self) -> Option<u32> {
        self.texture().map(|t| t.width())
    }

    pub fn height(&self) -> Option<u32> {
        self.texture().map(|t| t.height())
    }

    /// Backend-native handle of the resident texture.
    pub fn native_handle(&self) -> Option<u64> {
        self.texture().map(|t| t.native_handle())
    }

    /// Wait for the texture, loading it if needed.
    ///
    /// Retries a load that previously failed and reloads an evicted texture.
    pub async fn loaded(&self) -> TextureResult<Arc<GpuTexture>> {
        self.loaded_with(CancellationToken::none()).await
    }

    /// Like [`TextureHandle::loaded`], giving up with
    /// [`TextureError::Cancelled`] as soon as `cancel` fires.
    ///
    /// Only this wait is abandoned; the load is shared and keeps running for
    /// the other holders.
    pub async fn loaded_with(&self, cancel: CancellationToken) -> TextureResult<Arc<GpuTexture>> {
        if self.is_disposed() {
            return Err(TextureError::Disposed {
                what: "TextureHandle",
            });
        }
        cancel.check()?;

        let receiver = match self.cache.wait_for(&self.record)? {
            Waiting::Ready(texture) => return Ok(texture),
            Waiting::Pending(receiver) => receiver,
        };

        let result = futures_lite::future::or(
            async {
                receiver
                    .recv_async()
                    .await
                    .unwrap_or(Err(TextureError::Cancelled))
            },
            async {
                cancel.cancelled().await;
                Err(TextureError::Cancelled)
            },
        )
        .await;

        cancel.check()?;
        result
    }

    /// Take another reference to the same key.
    pub fn share(&self) -> TextureResult<TextureHandle> {
        if self.is_disposed() {
            return Err(TextureError::Disposed {
                what: "TextureHandle",
            });
        }
        Ok(self.cache.acquire(self.key(), self.keep_alive, self.keep_alive))
    }

    /// Drop this reference. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cache.release_ref(&self.record, self.keep_alive);
    }
}

impl Drop for TextureHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureHandle")
            .field("key", &self.key())
            .field("keep_alive", &self.keep_alive)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
