//! GPU backend seam and owned texture resources.
//!
//! The backend performs the actual device calls. Everything above this module
//! only ever sees [`GpuTexture`], which owns exactly one backend texture and
//! destroys it when the last reference goes away.

use std::fmt;
use std::sync::Arc;

use crate::error::{TextureError, TextureResult};

/// Pixel layout of an image or texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit RGBA.
    Rgba8Unorm,
    /// 8-bit BGRA.
    Bgra8Unorm,
    /// 8-bit single channel.
    R8Unorm,
    /// BC1 block compression (8 bytes per 4x4 block).
    Bc1,
    /// BC3 block compression (16 bytes per 4x4 block).
    Bc3,
    /// BC7 block compression (16 bytes per 4x4 block).
    Bc7,
}

impl PixelFormat {
    /// Whether the format stores 4x4 blocks instead of pixels.
    pub fn is_block_compressed(self) -> bool {
        matches!(self, PixelFormat::Bc1 | PixelFormat::Bc3 | PixelFormat::Bc7)
    }

    /// Bytes per row of `width` pixels (or per row of blocks).
    ///
    /// Computed in 64 bits; callers storing a `u32` pitch must check the fit.
    pub fn row_pitch(self, width: u32) -> u64 {
        let width = u64::from(width);
        match self {
            PixelFormat::Rgba8Unorm | PixelFormat::Bgra8Unorm => width * 4,
            PixelFormat::R8Unorm => width,
            PixelFormat::Bc1 => width.div_ceil(4) * 8,
            PixelFormat::Bc3 | PixelFormat::Bc7 => width.div_ceil(4) * 16,
        }
    }

    /// Number of rows (or block rows) for `height` pixels.
    pub fn rows(self, height: u32) -> u32 {
        if self.is_block_compressed() {
            height.div_ceil(4)
        } else {
            height
        }
    }

    /// Tightly packed size of a `width` x `height` image, saturating at `u64::MAX`.
    pub fn size_in_bytes(self, width: u32, height: u32) -> u64 {
        self.row_pitch(width).saturating_mul(u64::from(self.rows(height)))
    }
}

/// Decoded pixel data ready for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Bytes per row in `data`.
    pub pitch: u32,
    /// Pixel bytes.
    pub data: Arc<[u8]>,
}

impl RawImage {
    /// Create an image with a tightly packed pitch.
    ///
    /// A row too wide for a `u32` pitch is not an error here; [`RawImage::validate`]
    /// rejects it.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            format,
            pitch: u32::try_from(format.row_pitch(width)).unwrap_or(u32::MAX),
            data: data.into(),
        }
    }

    /// Create an RGBA8 image.
    pub fn rgba(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(width, height, PixelFormat::Rgba8Unorm, data)
    }

    /// A fully transparent RGBA8 image.
    ///
    /// Dimensions whose rows do not fit a `u32` pitch get no pixel data and
    /// fail [`RawImage::validate`].
    pub fn transparent(width: u32, height: u32) -> Self {
        let format = PixelFormat::Rgba8Unorm;
        let len = if format.row_pitch(width) <= u64::from(u32::MAX) {
            usize::try_from(format.size_in_bytes(width, height)).unwrap_or(0)
        } else {
            0
        };
        Self::rgba(width, height, vec![0u8; len])
    }

    /// Check that the dimensions are non-zero and the data covers every row.
    pub fn validate(&self) -> TextureResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TextureError::backend(format!(
                "image has zero extent ({}x{})",
                self.width, self.height
            )));
        }

        let min_pitch = self.format.row_pitch(self.width);
        if u64::from(self.pitch) < min_pitch {
            return Err(TextureError::backend(format!(
                "pitch {} is smaller than one row ({} bytes)",
                self.pitch, min_pitch
            )));
        }

        let required = u64::from(self.pitch) * u64::from(self.format.rows(self.height));
        if (self.data.len() as u64) < required {
            return Err(TextureError::backend(format!(
                "image data is {} bytes, expected at least {}",
                self.data.len(),
                required
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("pitch", &self.pitch)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A backend texture as seen by the backend itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawTexture {
    /// Backend-native handle value (a pointer, descriptor index or id).
    pub native: u64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
}

/// A rectangle inside a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Region {
    /// Create a region.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The region covering a whole `width` x `height` texture.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Whether the region is non-empty and lies inside a `width` x `height` texture.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self
                .x
                .checked_add(self.width)
                .is_some_and(|right| right <= width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= height)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// The device operations the texture system needs.
///
/// Implementations must be callable from any task-pool thread.
pub trait GpuBackend: Send + Sync {
    /// Upload an image into a new texture.
    fn create_texture(&self, image: &RawImage) -> TextureResult<RawTexture>;

    /// Destroy a texture created by this backend.
    ///
    /// Called exactly once per texture, by [`GpuTexture`]'s `Drop`.
    fn destroy_texture(&self, texture: RawTexture);

    /// Copy `region` of `source` into a new texture, converting to `format`
    /// when given.
    fn copy_region(
        &self,
        source: &RawTexture,
        region: Region,
        format: Option<PixelFormat>,
    ) -> TextureResult<RawTexture>;

    /// Whether textures of `format` can be created directly.
    fn supports_format(&self, format: PixelFormat) -> bool {
        let _ = format;
        true
    }
}

/// An owned GPU texture.
///
/// Shared as `Arc<GpuTexture>`; the backend texture is destroyed when the
/// last `Arc` is dropped.
pub struct GpuTexture {
    raw: RawTexture,
    label: String,
    backend: Arc<dyn GpuBackend>,
}

impl GpuTexture {
    /// Take ownership of a texture created by `backend`.
    pub fn new(backend: Arc<dyn GpuBackend>, raw: RawTexture, label: impl Into<String>) -> Self {
        Self {
            raw,
            label: label.into(),
            backend,
        }
    }

    /// Upload `image` through `backend`.
    pub fn upload(
        backend: &Arc<dyn GpuBackend>,
        image: &RawImage,
        label: impl Into<String>,
    ) -> TextureResult<Self> {
        image.validate()?;
        let raw = backend.create_texture(image)?;
        Ok(Self::new(Arc::clone(backend), raw, label))
    }

    /// Copy a region of this texture into a new one.
    pub fn copy_region(
        &self,
        region: Region,
        format: Option<PixelFormat>,
        label: impl Into<String>,
    ) -> TextureResult<Self> {
        if !region.fits(self.raw.width, self.raw.height) {
            return Err(TextureError::InvalidRegion {
                width: self.raw.width,
                height: self.raw.height,
                region: region.to_string(),
            });
        }
        let raw = self.backend.copy_region(&self.raw, region, format)?;
        Ok(Self::new(Arc::clone(&self.backend), raw, label))
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.raw.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.raw.height
    }

    /// Pixel layout.
    pub fn format(&self) -> PixelFormat {
        self.raw.format
    }

    /// Backend-native handle value, valid while this texture is alive.
    pub fn native_handle(&self) -> u64 {
        self.raw.native
    }

    /// Debug label (usually the cache key).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Estimated memory footprint.
    pub fn size_in_bytes(&self) -> u64 {
        self.raw.format.size_in_bytes(self.raw.width, self.raw.height)
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("label", &self.label)
            .field("raw", &self.raw)
            .finish()
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        tracing::trace!(label = %self.label, native = self.raw.native, "destroying texture");
        self.backend.destroy_texture(self.raw);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Minimal backend used by unit tests inside this crate.
    #[derive(Default)]
    pub(crate) struct CountingBackend {
        next: AtomicU64,
        pub(crate) destroyed: Mutex<Vec<u64>>,
    }

    impl GpuBackend for CountingBackend {
        fn create_texture(&self, image: &RawImage) -> TextureResult<RawTexture> {
            Ok(RawTexture {
                native: self.next.fetch_add(1, Ordering::Relaxed) + 1,
                width: image.width,
                height: image.height,
                format: image.format,
            })
        }

        fn destroy_texture(&self, texture: RawTexture) {
            self.destroyed.lock().push(texture.native);
        }

        fn copy_region(
            &self,
            source: &RawTexture,
            region: Region,
            format: Option<PixelFormat>,
        ) -> TextureResult<RawTexture> {
            Ok(RawTexture {
                native: self.next.fetch_add(1, Ordering::Relaxed) + 1,
                width: region.width,
                height: region.height,
                format: format.unwrap_or(source.format),
            })
        }
    }

    #[test]
    fn test_oversized_rows_rejected_without_overflow() {
        let wide = 1u32 << 30;
        assert_eq!(PixelFormat::Rgba8Unorm.row_pitch(wide), 1u64 << 32);
        assert_eq!(PixelFormat::Bc7.size_in_bytes(u32::MAX, u32::MAX), u64::MAX);

        let image = RawImage::new(wide, 1, PixelFormat::Rgba8Unorm, Vec::<u8>::new());
        assert_eq!(image.pitch, u32::MAX);
        assert!(matches!(image.validate(), Err(TextureError::Backend { .. })));

        let image = RawImage::transparent(wide, 1);
        assert!(image.data.is_empty());
        assert!(image.validate().is_err());
    }

    #[test]
    fn test_row_pitch_and_size() {
        assert_eq!(PixelFormat::Rgba8Unorm.row_pitch(10), 40);
        assert_eq!(PixelFormat::R8Unorm.row_pitch(10), 10);
        assert_eq!(PixelFormat::Bc1.row_pitch(10), 24);
        assert_eq!(PixelFormat::Bc7.size_in_bytes(8, 8), 64);
        assert_eq!(PixelFormat::Rgba8Unorm.size_in_bytes(4, 4), 64);
    }

    #[test]
    fn test_image_validation() {
        assert!(RawImage::transparent(4, 4).validate().is_ok());
        assert!(RawImage::rgba(4, 4, vec![0u8; 10]).validate().is_err());
        assert!(RawImage::rgba(0, 4, Vec::<u8>::new()).validate().is_err());
    }

    #[test]
    fn test_region_fits() {
        assert!(Region::full(16, 16).fits(16, 16));
        assert!(Region::new(8, 8, 8, 8).fits(16, 16));
        assert!(!Region::new(9, 8, 8, 8).fits(16, 16));
        assert!(!Region::new(0, 0, 0, 8).fits(16, 16));
        assert!(!Region::new(u32::MAX, 0, 2, 2).fits(16, 16));
    }

    #[test]
    fn test_texture_destroyed_once_on_last_drop() {
        let backend = Arc::new(CountingBackend::default());
        let dyn_backend: Arc<dyn GpuBackend> = backend.clone();

        let texture = Arc::new(
            GpuTexture::upload(&dyn_backend, &RawImage::transparent(2, 2), "a.png").unwrap(),
        );
        let native = texture.native_handle();
        let second = Arc::clone(&texture);

        drop(texture);
        assert!(backend.destroyed.lock().is_empty());

        drop(second);
        assert_eq!(*backend.destroyed.lock(), vec![native]);
    }

    #[test]
    fn test_copy_region_rejects_out_of_bounds() {
        let backend: Arc<dyn GpuBackend> = Arc::new(CountingBackend::default());
        let texture = GpuTexture::upload(&backend, &RawImage::transparent(4, 4), "src").unwrap();

        let err = texture
            .copy_region(Region::new(2, 2, 4, 4), None, "dst")
            .unwrap_err();
        assert!(matches!(err, TextureError::InvalidRegion { .. }));

        let copy = texture
            .copy_region(Region::new(0, 0, 2, 2), Some(PixelFormat::Bgra8Unorm), "dst")
            .unwrap();
        assert_eq!((copy.width(), copy.height()), (2, 2));
        assert_eq!(copy.format(), PixelFormat::Bgra8Unorm);
    }
}
