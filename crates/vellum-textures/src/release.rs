//! Deferred destruction of freed textures.
//!
//! A texture freed by a sweep may still be referenced by a render pass that
//! was recorded this frame. The cache therefore never drops its last `Arc`
//! inline; it hands the texture to a [`DeferredRelease`] collaborator.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::GpuTexture;

/// Receives textures the cache no longer holds.
pub trait DeferredRelease: Send + Sync {
    /// Take ownership of a freed texture.
    fn defer(&self, texture: Arc<GpuTexture>);
}

/// Drops freed textures immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateRelease;

impl DeferredRelease for ImmediateRelease {
    fn defer(&self, texture: Arc<GpuTexture>) {
        drop(texture);
    }
}

/// Holds freed textures until the frame driver calls [`FrameReleaseQueue::release`].
#[derive(Debug, Default)]
pub struct FrameReleaseQueue {
    queue: Mutex<Vec<Arc<GpuTexture>>>,
}

impl FrameReleaseQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every queued texture. Returns how many were released.
    ///
    /// Textures still shared elsewhere are destroyed when their last holder
    /// lets go.
    pub fn release(&self) -> usize {
        let released = std::mem::take(&mut *self.queue.lock());
        let count = released.len();
        if count > 0 {
            tracing::trace!(count, "releasing deferred textures");
        }
        drop(released);
        count
    }

    /// Number of textures waiting for release.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl DeferredRelease for FrameReleaseQueue {
    fn defer(&self, texture: Arc<GpuTexture>) {
        self.queue.lock().push(texture);
    }
}
