//! Vellum Core
//!
//! This crate contains the shared runtime pieces for the Vellum texture
//! residency engine: hashed collections, logging setup, profiling scopes,
//! configuration, the async task pool and the monotonic clock.

pub mod alloc;
pub mod config;
pub mod logging;
pub mod profiling;
pub mod task_pool;
pub mod time;

pub use config::Config;
pub use task_pool::TaskPool;
pub use time::{Clock, ManualClock, SystemClock};
