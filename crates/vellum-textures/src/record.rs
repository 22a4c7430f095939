//! Per-key cache entries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::basis::SharedBasis;
use crate::cancel::CancellationToken;
use crate::error::{TextureError, TextureResult};
use crate::gpu::GpuTexture;

pub(crate) type Waiter = flume::Sender<TextureResult<Arc<GpuTexture>>>;

/// A load in flight for one record.
pub(crate) struct InFlightLoad {
    /// Distinguishes this load from any earlier, abandoned one.
    pub(crate) id: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) basis: Arc<SharedBasis>,
    pub(crate) waiters: Vec<Waiter>,
    /// Set by invalidation: the load is cancelled and a fresh one starts
    /// once it has been collected, so at most one load per key runs.
    pub(crate) restart: bool,
}

impl InFlightLoad {
    /// Cancel the load and fail everyone waiting on it.
    pub(crate) fn abandon(self, error: TextureError) {
        self.cancel.cancel();
        for waiter in self.waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}

/// Mutable state of a record, guarded by the record lock.
pub(crate) struct RecordState {
    pub(crate) texture: Option<Arc<GpuTexture>>,
    pub(crate) ref_count: u32,
    /// Never exceeds `ref_count`.
    pub(crate) keep_alive_count: u32,
    pub(crate) last_access: Instant,
    pub(crate) load: Option<InFlightLoad>,
    pub(crate) last_error: Option<TextureError>,
    /// Set once the record has left the table.
    pub(crate) removed: bool,
}

/// A cache entry for one key.
///
/// Lock order: the cache table lock, then a record lock, then the event
/// buffer. Never take the table lock while holding a record lock.
pub struct TextureRecord {
    key: String,
    pub(crate) state: Mutex<RecordState>,
}

impl TextureRecord {
    pub(crate) fn new(key: impl Into<String>, now: Instant) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(RecordState {
                texture: None,
                ref_count: 0,
                keep_alive_count: 0,
                last_access: now,
                load: None,
                last_error: None,
                removed: false,
            }),
        }
    }

    /// Cache key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Point-in-time copy of the record's state.
    pub fn snapshot(&self, now: Instant) -> RecordSnapshot {
        let state = self.state.lock();
        RecordSnapshot {
            key: self.key.clone(),
            ref_count: state.ref_count,
            keep_alive_count: state.keep_alive_count,
            loaded: state.texture.is_some(),
            loading: state.load.is_some(),
            idle: now.saturating_duration_since(state.last_access),
            size_in_bytes: state.texture.as_ref().map_or(0, |t| t.size_in_bytes()),
            last_error: state.last_error.clone(),
        }
    }
}

impl std::fmt::Debug for TextureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TextureRecord")
            .field("key", &self.key)
            .field("ref_count", &state.ref_count)
            .field("keep_alive_count", &state.keep_alive_count)
            .field("loaded", &state.texture.is_some())
            .field("loading", &state.load.is_some())
            .finish()
    }
}

/// Debug view of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    pub key: String,
    pub ref_count: u32,
    pub keep_alive_count: u32,
    /// Whether a texture is resident.
    pub loaded: bool,
    /// Whether a load is in flight.
    pub loading: bool,
    /// Time since the record was last acquired or read.
    pub idle: Duration,
    pub size_in_bytes: u64,
    /// Error of the most recent failed load, cleared by a successful one.
    pub last_error: Option<TextureError>,
}
