//! LMDB implementation of `Datastore`.
//!
//! Filters, sorting and projections are evaluated in-process over a full
//! scan of the collection. Every call runs inside one LMDB transaction, which
//! gives the per-operation atomicity the services rely on.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use nodegraph_store::{
    Collection, Datastore, DeleteResult, Document, Filter, FindOptions, StoreError,
};

use crate::{LmdbEnvironment, LmdbError};

pub struct LmdbDatastore {
    env: LmdbEnvironment,
}

fn encode(document: &Document) -> Result<Vec<u8>, LmdbError> {
    serde_json::to_vec(document).map_err(|e| LmdbError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Document, LmdbError> {
    serde_json::from_slice(bytes).map_err(|e| LmdbError::Serialization(e.to_string()))
}

impl LmdbDatastore {
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        Ok(Self {
            env: LmdbEnvironment::open(path, map_size)?,
        })
    }

    /// Access the underlying environment.
    pub fn environment(&self) -> &LmdbEnvironment {
        &self.env
    }
}

#[async_trait]
impl Datastore for LmdbDatastore {
    async fn create(&self, collection: Collection, document: Document) -> Result<(), StoreError> {
        let db = self.env.db(collection)?;
        let key = collection.key_of(&document)?;
        let mut wtxn = self.env.env.write_txn().map_err(LmdbError::from)?;
        let exists = db
            .get(&wtxn, key.as_bytes())
            .map_err(LmdbError::from)?
            .is_some();
        if exists {
            return Err(StoreError::Duplicate(format!("{collection}/{key}")));
        }
        db.put(&mut wtxn, key.as_bytes(), &encode(&document)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    async fn create_many(
        &self,
        collection: Collection,
        documents: Vec<Document>,
        skip_duplicates: bool,
    ) -> Result<u64, StoreError> {
        let db = self.env.db(collection)?;
        let mut wtxn = self.env.env.write_txn().map_err(LmdbError::from)?;
        let mut seen = HashSet::with_capacity(documents.len());
        let mut written = 0u64;

        for document in &documents {
            let key = collection.key_of(document)?;
            let exists = seen.contains(&key)
                || db
                    .get(&wtxn, key.as_bytes())
                    .map_err(LmdbError::from)?
                    .is_some();
            if exists {
                if skip_duplicates {
                    continue;
                }
                // Dropping the write transaction aborts it.
                return Err(StoreError::Duplicate(format!("{collection}/{key}")));
            }
            db.put(&mut wtxn, key.as_bytes(), &encode(document)?)
                .map_err(LmdbError::from)?;
            seen.insert(key);
            written += 1;
        }

        wtxn.commit().map_err(LmdbError::from)?;
        tracing::trace!(%collection, written, offered = documents.len(), "create_many");
        Ok(written)
    }

    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        create: Document,
        update: Document,
    ) -> Result<(), StoreError> {
        let db = self.env.db(collection)?;
        let mut wtxn = self.env.env.write_txn().map_err(LmdbError::from)?;
        let existing = match db.get(&wtxn, key.as_bytes()).map_err(LmdbError::from)? {
            Some(bytes) => Some(decode(bytes)?),
            None => None,
        };
        let document = match existing {
            Some(mut current) => {
                current.extend(update);
                current
            }
            None => create,
        };
        db.put(&mut wtxn, key.as_bytes(), &encode(&document)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let db = self.env.db(collection)?;
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        let mut matched = Vec::new();
        for entry in db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_, value) = entry.map_err(LmdbError::from)?;
            let document = decode(value)?;
            if filter.matches(&document) {
                matched.push(document);
            }
        }
        Ok(options.apply(matched))
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<DeleteResult, StoreError> {
        let db = self.env.db(collection)?;
        let mut wtxn = self.env.env.write_txn().map_err(LmdbError::from)?;

        let mut doomed = Vec::new();
        for entry in db.iter(&wtxn).map_err(LmdbError::from)? {
            let (key, value) = entry.map_err(LmdbError::from)?;
            if filter.matches(&decode(value)?) {
                doomed.push(key.to_vec());
            }
        }

        for key in &doomed {
            db.delete(&mut wtxn, key).map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;

        Ok(DeleteResult {
            deleted_count: doomed.len() as u64,
        })
    }
}
