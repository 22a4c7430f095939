//! Asset source seam: where decoded images come from.

use std::future::Future;
use std::pin::Pin;

use parking_lot::RwLock;
use vellum_core::alloc::HashMap;

use crate::error::{TextureError, TextureResult};
use crate::gpu::RawImage;

/// Future type for async image reads.
pub type ImageFuture = Pin<Box<dyn Future<Output = TextureResult<RawImage>> + Send + 'static>>;

/// Trait for reading decoded images by path.
///
/// Decoding container formats is the source's business; the texture system
/// only needs pixels.
pub trait AssetSource: Send + Sync {
    /// Read and decode the image at `path`.
    ///
    /// Returns [`TextureError::NotFound`] if nothing exists at `path`.
    fn read_image(&self, path: &str) -> ImageFuture;

    /// Check if a path exists without reading it.
    fn exists(&self, path: &str) -> bool;
}

/// In-memory image source for embedded assets and tests.
#[derive(Default)]
pub struct MemorySource {
    images: RwLock<HashMap<String, RawImage>>,
}

impl MemorySource {
    /// Create a new empty memory source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the image for a path.
    pub fn insert(&self, path: impl Into<String>, image: RawImage) {
        self.images.write().insert(path.into(), image);
    }

    /// Remove the image for a path.
    pub fn remove(&self, path: &str) -> Option<RawImage> {
        self.images.write().remove(path)
    }

    /// Number of stored images.
    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.images.read().is_empty()
    }
}

impl AssetSource for MemorySource {
    fn read_image(&self, path: &str) -> ImageFuture {
        let result = self
            .images
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| TextureError::not_found(path));

        Box::pin(async move { result })
    }

    fn exists(&self, path: &str) -> bool {
        self.images.read().contains_key(path)
    }
}
