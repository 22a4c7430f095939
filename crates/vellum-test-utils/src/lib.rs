//! Test utilities for Vellum.
//!
//! Mock collaborators for the texture system:
//!
//! - [`MockGpuBackend`] - records backend calls and tracks live textures
//! - [`MockAssetSource`] - serves images from memory, with failure injection
//!   and gates that hold reads in flight
//! - [`TestRig`] - a task pool, throttler and cache wired to the mocks with a
//!   manual clock
//!
//! # Example
//!
//! ```rust
//! use vellum_test_utils::TestRig;
//!
//! let rig = TestRig::new();
//! rig.source.insert_rgba("ui/a.tex", 4, 4);
//!
//! let handle = pollster::block_on(rig.cache.acquire_loaded(
//!     "ui/a.tex",
//!     false,
//!     vellum_textures::CancellationToken::none(),
//! ))
//! .unwrap();
//! assert_eq!(handle.width(), Some(4));
//! ```

pub mod mock_gpu;
pub mod mock_source;
pub mod rig;

pub use mock_gpu::{GpuCall, MockGpuBackend};
pub use mock_source::MockAssetSource;
pub use rig::{TestRig, wait_until};
