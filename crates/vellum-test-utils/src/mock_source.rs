//! Mock asset source with controllable reads.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use vellum_core::alloc::HashMap;
use vellum_textures::{AssetSource, ImageFuture, RawImage, TextureError};

/// A gate that holds reads of one path until opened.
///
/// Readers wait on `wait`; dropping the gate drops `_open`, which
/// disconnects the channel and releases them.
struct Gate {
    _open: flume::Sender<()>,
    wait: flume::Receiver<()>,
}

/// Mock implementation of [`AssetSource`] for testing.
///
/// Beyond serving images from memory it can:
/// - hold reads of a path until [`MockAssetSource::open`] is called, which
///   keeps a load in flight for as long as a test needs;
/// - fail or panic on a path;
/// - count reads per path.
///
/// # Example
///
/// ```rust
/// use vellum_test_utils::MockAssetSource;
/// use vellum_textures::AssetSource;
///
/// let source = MockAssetSource::new();
/// source.insert_rgba("ui/a.tex", 4, 4);
///
/// let image = pollster::block_on(source.read_image("ui/a.tex")).unwrap();
/// assert_eq!(image.width, 4);
/// assert_eq!(source.read_count("ui/a.tex"), 1);
/// ```
#[derive(Default)]
pub struct MockAssetSource {
    images: Mutex<HashMap<String, RawImage>>,
    failures: Mutex<HashMap<String, TextureError>>,
    panics: Mutex<HashMap<String, String>>,
    gates: Mutex<HashMap<String, Gate>>,
    reads: Mutex<HashMap<String, usize>>,
    total_reads: AtomicUsize,
}

impl MockAssetSource {
    /// Create a new empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `image` at `path`.
    pub fn insert(&self, path: impl Into<String>, image: RawImage) {
        self.images.lock().insert(path.into(), image);
    }

    /// Serve a transparent RGBA image of the given size at `path`.
    pub fn insert_rgba(&self, path: impl Into<String>, width: u32, height: u32) {
        self.insert(path, RawImage::transparent(width, height));
    }

    /// Stop serving `path`.
    pub fn remove(&self, path: &str) {
        self.images.lock().remove(path);
    }

    /// Fail every read of `path` with `error` until [`MockAssetSource::clear_failure`].
    pub fn fail(&self, path: impl Into<String>, error: TextureError) {
        self.failures.lock().insert(path.into(), error);
    }

    pub fn clear_failure(&self, path: &str) {
        self.failures.lock().remove(path);
    }

    /// Panic inside every read of `path`.
    pub fn panic_on(&self, path: impl Into<String>, message: impl Into<String>) {
        self.panics.lock().insert(path.into(), message.into());
    }

    /// Hold reads of `path` until [`MockAssetSource::open`] is called.
    pub fn hold(&self, path: impl Into<String>) {
        let (open, wait) = flume::bounded(0);
        self.gates.lock().insert(path.into(), Gate { _open: open, wait });
    }

    /// Let held reads of `path` proceed.
    pub fn open(&self, path: &str) {
        self.gates.lock().remove(path);
    }

    /// Number of reads of `path` that have started.
    pub fn read_count(&self, path: &str) -> usize {
        self.reads.lock().get(path).copied().unwrap_or(0)
    }

    /// Number of reads of any path that have started.
    pub fn total_reads(&self) -> usize {
        self.total_reads.load(Ordering::SeqCst)
    }
}

impl AssetSource for MockAssetSource {
    fn read_image(&self, path: &str) -> ImageFuture {
        *self.reads.lock().entry(path.to_string()).or_insert(0) += 1;
        self.total_reads.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(path, "mock read");

        let gate = self.gates.lock().get(path).map(|gate| gate.wait.clone());
        let panic = self.panics.lock().get(path).cloned();
        let result = match self.failures.lock().get(path) {
            Some(error) => Err(error.clone()),
            None => self
                .images
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| TextureError::not_found(path)),
        };

        Box::pin(async move {
            if let Some(wait) = gate {
                let _ = wait.recv_async().await;
            }
            if let Some(message) = panic {
                panic!("{}", message);
            }
            result
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.images.lock().contains_key(path)
    }
}
