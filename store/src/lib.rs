//! Abstract datastore gateway for the nodegraph services.
//!
//! Every storage backend (LMDB, in-memory for testing) implements
//! [`Datastore`]. The services depend only on the trait and exchange
//! schemaless [`Document`]s with it, converting to and from typed records at
//! the edge with [`to_document`] / [`from_document`].

pub mod collection;
pub mod datastore;
pub mod document;
pub mod error;
pub mod query;

pub use collection::Collection;
pub use datastore::{Datastore, DeleteResult};
pub use document::{from_document, to_document, Document};
pub use error::StoreError;
pub use query::{compare_values, Filter, FindOptions, Sort, SortDirection};
