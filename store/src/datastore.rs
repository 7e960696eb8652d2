//! The datastore gateway trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Collection, Document, Filter, FindOptions, StoreError};

/// Outcome of a `delete_many`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Generic create/read/update/delete over named collections.
///
/// Every single call is atomic on its own; there are no cross-collection or
/// multi-call transactions. Implementations must be safe for concurrent use
/// from several services at once.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Insert one document. Fails with [`StoreError::Duplicate`] if its unique
    /// key already exists.
    async fn create(&self, collection: Collection, document: Document) -> Result<(), StoreError>;

    /// Insert many documents and return how many were written.
    ///
    /// With `skip_duplicates`, documents whose unique key already exists (in
    /// the collection or earlier in the same batch) are silently skipped.
    /// Without it, the first duplicate fails the whole call and nothing is
    /// written.
    async fn create_many(
        &self,
        collection: Collection,
        documents: Vec<Document>,
        skip_duplicates: bool,
    ) -> Result<u64, StoreError>;

    /// Update the document whose rendered unique key is `key` by merging the
    /// fields of `update` over it, or insert `create` if there is none.
    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        create: Document,
        update: Document,
    ) -> Result<(), StoreError>;

    /// Return documents matching `filter`, shaped by `options`.
    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Delete every document matching `filter`.
    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<DeleteResult, StoreError>;
}
