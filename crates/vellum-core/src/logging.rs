//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,vellum_textures=debug";

/// Install a formatted tracing subscriber with the default filter.
///
/// `RUST_LOG` overrides the default when present.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Install a formatted tracing subscriber, falling back to `default_filter`
/// when `RUST_LOG` is not set.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_err()
    {
        tracing::trace!("tracing subscriber already installed");
    }
}
