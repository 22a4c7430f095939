//! Mock GPU backend that records every call.
//!
//! No device is touched; textures are plain ids. Tests assert on the
//! recorded [`GpuCall`]s and on which textures are still alive.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use vellum_textures::{GpuBackend, PixelFormat, RawImage, RawTexture, Region, TextureError, TextureResult};

/// Records a backend call for verification in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCall {
    CreateTexture {
        native: u64,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    DestroyTexture {
        native: u64,
    },
    CopyRegion {
        source: u64,
        native: u64,
        region: Region,
    },
}

/// Mock implementation of [`GpuBackend`] for testing.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use vellum_test_utils::MockGpuBackend;
/// use vellum_textures::{GpuBackend, GpuTexture, RawImage};
///
/// let mock = Arc::new(MockGpuBackend::new());
/// let backend: Arc<dyn GpuBackend> = mock.clone();
///
/// let texture = GpuTexture::upload(&backend, &RawImage::transparent(4, 4), "a").unwrap();
/// assert_eq!(mock.live_count(), 1);
///
/// drop(texture);
/// assert_eq!(mock.live_count(), 0);
/// assert_eq!(mock.count_destroys(), 1);
/// ```
#[derive(Default)]
pub struct MockGpuBackend {
    calls: Mutex<Vec<GpuCall>>,
    live: Mutex<BTreeSet<u64>>,
    next_native: Mutex<u64>,
    fail_creates: Mutex<u32>,
}

impl MockGpuBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` texture creations fail with a backend error.
    pub fn fail_next_creates(&self, count: u32) {
        *self.fail_creates.lock() = count;
    }

    /// Get a copy of all recorded calls.
    pub fn calls(&self) -> Vec<GpuCall> {
        self.calls.lock().clone()
    }

    /// Count texture creations.
    pub fn count_creates(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, GpuCall::CreateTexture { .. }))
            .count()
    }

    /// Count texture destructions.
    pub fn count_destroys(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, GpuCall::DestroyTexture { .. }))
            .count()
    }

    /// Count region copies.
    pub fn count_copies(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, GpuCall::CopyRegion { .. }))
            .count()
    }

    /// Number of textures created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Whether a native handle is still alive.
    pub fn is_live(&self, native: u64) -> bool {
        self.live.lock().contains(&native)
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn allocate(&self) -> u64 {
        let mut next = self.next_native.lock();
        *next += 1;
        *next
    }
}

impl GpuBackend for MockGpuBackend {
    fn create_texture(&self, image: &RawImage) -> TextureResult<RawTexture> {
        {
            let mut failures = self.fail_creates.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(TextureError::backend("injected create failure"));
            }
        }

        let native = self.allocate();
        self.live.lock().insert(native);
        self.calls.lock().push(GpuCall::CreateTexture {
            native,
            width: image.width,
            height: image.height,
            format: image.format,
        });

        Ok(RawTexture {
            native,
            width: image.width,
            height: image.height,
            format: image.format,
        })
    }

    fn destroy_texture(&self, texture: RawTexture) {
        let was_live = self.live.lock().remove(&texture.native);
        assert!(was_live, "texture {} destroyed twice or never created", texture.native);
        self.calls.lock().push(GpuCall::DestroyTexture {
            native: texture.native,
        });
    }

    fn copy_region(
        &self,
        source: &RawTexture,
        region: Region,
        format: Option<PixelFormat>,
    ) -> TextureResult<RawTexture> {
        if !self.is_live(source.native) {
            return Err(TextureError::backend("copy from a destroyed texture"));
        }

        let native = self.allocate();
        self.live.lock().insert(native);
        self.calls.lock().push(GpuCall::CopyRegion {
            source: source.native,
            native,
            region,
        });

        Ok(RawTexture {
            native,
            width: region.width,
            height: region.height,
            format: format.unwrap_or(source.format),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vellum_textures::GpuTexture;

    fn backend() -> (Arc<MockGpuBackend>, Arc<dyn GpuBackend>) {
        let mock = Arc::new(MockGpuBackend::new());
        let backend: Arc<dyn GpuBackend> = mock.clone();
        (mock, backend)
    }

    #[test]
    fn test_create_and_destroy_recorded() {
        let (mock, backend) = backend();

        let texture = GpuTexture::upload(&backend, &RawImage::transparent(8, 4), "t").unwrap();
        let native = texture.native_handle();
        assert!(mock.is_live(native));

        drop(texture);
        assert!(!mock.is_live(native));
        assert_eq!(
            mock.calls(),
            vec![
                GpuCall::CreateTexture {
                    native,
                    width: 8,
                    height: 4,
                    format: PixelFormat::Rgba8Unorm,
                },
                GpuCall::DestroyTexture { native },
            ]
        );
    }

    #[test]
    fn test_injected_failures() {
        let (mock, backend) = backend();
        mock.fail_next_creates(1);

        let err = GpuTexture::upload(&backend, &RawImage::transparent(1, 1), "t").unwrap_err();
        assert!(matches!(err, TextureError::Backend { .. }));

        assert!(GpuTexture::upload(&backend, &RawImage::transparent(1, 1), "t").is_ok());
    }

    #[test]
    fn test_copy_region() {
        let (mock, backend) = backend();
        let texture = GpuTexture::upload(&backend, &RawImage::transparent(16, 16), "t").unwrap();

        let copy = texture.copy_region(Region::new(4, 4, 8, 8), None, "copy").unwrap();
        assert_eq!((copy.width(), copy.height()), (8, 8));
        assert_eq!(mock.count_copies(), 1);
        assert_eq!(mock.live_count(), 2);
    }
}
