//! Named thread groups with rendezvous barriers and cooperative interruption.
//!
//! A [`ThreadGroupRegistry`] owns a map of group name to worker threads and an
//! optional barrier. Workers are plain OS threads; cancellation is
//! cooperative and only takes effect at cancellation points:
//!
//! - [`ThreadGroupRegistry::wait`] (barrier rendezvous)
//! - [`ThreadGroupRegistry::join`] and its variants
//! - [`interruption_point`]
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use qmx_threads::{ThreadGroupRegistry, interruption_point};
//!
//! let registry = Arc::new(ThreadGroupRegistry::new());
//! registry.create_group("workers")?;
//! registry.set_barrier_size("workers", 2)?;
//!
//! for name in ["a", "b"] {
//!     let reg = registry.clone();
//!     registry.create_thread("workers", name, move || {
//!         reg.wait("workers")?;
//!         interruption_point()
//!     })?;
//! }
//! registry.join_all("workers")?;
//! ```

mod barrier;
pub mod error;
pub mod hardware;
pub mod interrupt;
pub mod registry;
mod worker;

pub use error::{Result, ThreadError};
pub use hardware::{logical_core_count, physical_core_count};
pub use interrupt::{
    interruption_enabled, interruption_point, interruption_requested, DisableInterruption,
};
pub use registry::{Disposal, ThreadGroupRegistry};
pub use worker::WorkerExit;
