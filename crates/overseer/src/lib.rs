//! # overseer
//!
//! Pidfile-based reconciliation engine for daemons that detach and manage
//! their own pidfile.
//!
//! The engine knows nothing about what an instance *is*. A concrete
//! [`InstanceProvider`] discovers instances, names their pidfiles, builds
//! their command lines and regenerates their configuration; the engine turns
//! that into start, stop, restart, reload and ensure operations that poll
//! for convergence and report a [`StatusMap`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use overseer::{InstanceProvider, Supervisor, SupervisorConfig, TracingSink};
//!
//! fn run<P: InstanceProvider>(provider: P) -> Result<(), P::Error> {
//!     let sup = Supervisor::new(provider, SupervisorConfig::default(), Arc::new(TracingSink));
//!     for (key, status) in sup.ensure(None)? {
//!         println!("{key}: {status}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod probe;
pub mod sink;
pub mod types;

pub use engine::{InstanceProvider, Supervisor, SupervisorConfig};
pub use sink::{LogSink, Severity, TracingSink};
#[cfg(any(test, feature = "test-support"))]
pub use sink::MemorySink;
pub use types::*;
