//! LMDB datastore backend for the nodegraph services.
//!
//! Implements [`nodegraph_store::Datastore`] using the `heed` LMDB bindings.
//! Each collection maps to one named LMDB database within a single
//! environment; documents are stored as JSON keyed by their rendered unique
//! key.

pub mod datastore;
pub mod environment;
pub mod error;

pub use datastore::LmdbDatastore;
pub use environment::LmdbEnvironment;
pub use error::LmdbError;
