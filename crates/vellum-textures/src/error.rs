//! Error types for texture loading and caching.

use std::fmt;

/// Errors that can occur while loading, converting or caching textures.
///
/// Errors are `Clone` so that one failed load can be reported to every
/// caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    /// The requested asset does not exist.
    ///
    /// Not cached: the next acquire of the same key retries.
    NotFound {
        /// The path that was looked up.
        path: String,
    },

    /// Decoding or uploading failed.
    LoadFailed {
        /// The key or description of what was being loaded.
        key: String,
        /// Description of the error.
        message: String,
    },

    /// The GPU backend rejected an operation.
    Backend {
        /// Description of the error.
        message: String,
    },

    /// A conversion region does not fit inside its source texture.
    InvalidRegion {
        /// Source width.
        width: u32,
        /// Source height.
        height: u32,
        /// Human-readable region description.
        region: String,
    },

    /// The caller's or the throttler's cancellation token fired before the
    /// work finished.
    Cancelled,

    /// The operation was requested after shutdown.
    Disposed {
        /// Which component was already shut down.
        what: &'static str,
    },
}

impl TextureError {
    /// Build a [`TextureError::LoadFailed`].
    pub fn load_failed(key: impl Into<String>, message: impl Into<String>) -> Self {
        TextureError::LoadFailed {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Build a [`TextureError::Backend`].
    pub fn backend(message: impl Into<String>) -> Self {
        TextureError::Backend {
            message: message.into(),
        }
    }

    /// Build a [`TextureError::NotFound`].
    pub fn not_found(path: impl Into<String>) -> Self {
        TextureError::NotFound { path: path.into() }
    }

    /// Returns `true` for [`TextureError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TextureError::Cancelled)
    }

    /// Returns `true` for [`TextureError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, TextureError::NotFound { .. })
    }

    /// Returns `true` for [`TextureError::Disposed`].
    pub fn is_disposed(&self) -> bool {
        matches!(self, TextureError::Disposed { .. })
    }
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::NotFound { path } => {
                write!(f, "Texture asset not found: {}", path)
            }
            TextureError::LoadFailed { key, message } => {
                write!(f, "Failed to load texture '{}': {}", key, message)
            }
            TextureError::Backend { message } => {
                write!(f, "GPU backend error: {}", message)
            }
            TextureError::InvalidRegion {
                width,
                height,
                region,
            } => {
                write!(
                    f,
                    "Region {} does not fit in a {}x{} texture",
                    region, width, height
                )
            }
            TextureError::Cancelled => write!(f, "Texture load was cancelled"),
            TextureError::Disposed { what } => write!(f, "{} has been shut down", what),
        }
    }
}

impl std::error::Error for TextureError {}

/// Result type alias for texture operations.
pub type TextureResult<T> = Result<T, TextureError>;
