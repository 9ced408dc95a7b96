//! # Swarm
//!
//! Concurrency plumbing for the façades.
//!
//! ## Flow
//!
//! ```text
//! façade → scatter (one task per source / plan item) → join barrier → component
//! ```

pub mod fanout;

pub use fanout::{cancellation, gather, CancelHandle, Cancellation, TaskOutcome};
