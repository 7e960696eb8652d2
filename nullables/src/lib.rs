//! Nullable infrastructure for deterministic testing.
//!
//! All external dependencies of the services (clock, datastore, upstream
//! provider) are abstracted behind traits. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (time, failures, latency)
//! - Count the calls made against them
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod source;
pub mod store;

pub use clock::NullClock;
pub use source::NullNodeSource;
pub use store::{DatastoreOp, NullDatastore};
