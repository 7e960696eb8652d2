//! Nullable datastore: thread-safe in-memory gateway for testing.

use async_trait::async_trait;
use nodegraph_store::{
    Collection, Datastore, DeleteResult, Document, Filter, FindOptions, StoreError,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// Datastore operations, for call counting and failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatastoreOp {
    Create,
    CreateMany,
    Upsert,
    FindMany,
    DeleteMany,
}

/// An in-memory datastore for testing.
///
/// Behaves like a real gateway (unique keys, skip-duplicate inserts, merge
/// upserts, filter/sort/limit/projection) and additionally:
/// - counts every call per operation,
/// - fails chosen operations (optionally only for one collection),
/// - sleeps for a configurable latency before every call.
///
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullDatastore {
    collections: Mutex<HashMap<Collection, BTreeMap<String, Document>>>,
    calls: Mutex<HashMap<DatastoreOp, usize>>,
    failures: Mutex<Vec<(DatastoreOp, Option<Collection>)>>,
    latency: Mutex<Duration>,
}

impl NullDatastore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Number of calls made for `op` so far.
    pub fn calls(&self, op: DatastoreOp) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Reset all call counters.
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every `op` call fail, for `collection` only or for all of them.
    pub fn fail_on(&self, op: DatastoreOp, collection: Option<Collection>) {
        self.failures.lock().unwrap().push((op, collection));
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Sleep this long before serving each call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Insert a document directly, bypassing counters and failures.
    ///
    /// Overwrites any document with the same unique key.
    pub fn seed(&self, collection: Collection, document: Document) {
        let key = collection
            .key_of(&document)
            .expect("seeded document must carry its unique key");
        self.collections
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .insert(key, document);
    }

    /// Snapshot of every document in a collection, in key order.
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(&collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(&collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Whether a collection holds no documents.
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    async fn enter(&self, op: DatastoreOp, collection: Collection) -> Result<(), StoreError> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let failing = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|(o, c)| *o == op && c.map_or(true, |c| c == collection));
        if failing {
            return Err(StoreError::Backend(format!(
                "injected {op:?} failure on {collection}"
            )));
        }
        Ok(())
    }
}

impl Default for NullDatastore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for NullDatastore {
    async fn create(&self, collection: Collection, document: Document) -> Result<(), StoreError> {
        self.enter(DatastoreOp::Create, collection).await?;
        let key = collection.key_of(&document)?;
        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(collection).or_default();
        if docs.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("{collection}/{key}")));
        }
        docs.insert(key, document);
        Ok(())
    }

    async fn create_many(
        &self,
        collection: Collection,
        documents: Vec<Document>,
        skip_duplicates: bool,
    ) -> Result<u64, StoreError> {
        self.enter(DatastoreOp::CreateMany, collection).await?;
        let mut keyed = Vec::with_capacity(documents.len());
        for document in documents {
            keyed.push((collection.key_of(&document)?, document));
        }

        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(collection).or_default();
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        for (key, document) in keyed {
            if docs.contains_key(&key) || !seen.insert(key.clone()) {
                if skip_duplicates {
                    continue;
                }
                return Err(StoreError::Duplicate(format!("{collection}/{key}")));
            }
            accepted.push((key, document));
        }
        let written = accepted.len() as u64;
        docs.extend(accepted);
        Ok(written)
    }

    async fn upsert(
        &self,
        collection: Collection,
        key: &str,
        create: Document,
        update: Document,
    ) -> Result<(), StoreError> {
        self.enter(DatastoreOp::Upsert, collection).await?;
        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(collection).or_default();
        match docs.get_mut(key) {
            Some(current) => current.extend(update),
            None => {
                docs.insert(key.to_string(), create);
            }
        }
        Ok(())
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.enter(DatastoreOp::FindMany, collection).await?;
        let matched: Vec<Document> = self
            .collections
            .lock()
            .unwrap()
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|d| filter.matches(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(options.apply(matched))
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<DeleteResult, StoreError> {
        self.enter(DatastoreOp::DeleteMany, collection).await?;
        let mut collections = self.collections.lock().unwrap();
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(DeleteResult::default());
        };
        let before = docs.len();
        docs.retain(|_, d| !filter.matches(d));
        Ok(DeleteResult {
            deleted_count: (before - docs.len()) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn counts_calls_per_operation() {
        let store = NullDatastore::new();
        store
            .create(Collection::Nodes, doc(json!({"pubkey": "a"})))
            .await
            .unwrap();
        store
            .find_many(Collection::Nodes, &Filter::All, &FindOptions::new())
            .await
            .unwrap();
        store
            .find_many(Collection::Nodes, &Filter::All, &FindOptions::new())
            .await
            .unwrap();
        assert_eq!(store.calls(DatastoreOp::Create), 1);
        assert_eq!(store.calls(DatastoreOp::FindMany), 2);
        assert_eq!(store.calls(DatastoreOp::DeleteMany), 0);
    }

    #[tokio::test]
    async fn injected_failure_is_scoped_to_collection() {
        let store = NullDatastore::new();
        store.fail_on(DatastoreOp::DeleteMany, Some(Collection::History));
        assert!(store
            .delete_many(Collection::Nodes, &Filter::All)
            .await
            .is_ok());
        assert!(store
            .delete_many(Collection::History, &Filter::All)
            .await
            .is_err());
        store.clear_failures();
        assert!(store
            .delete_many(Collection::History, &Filter::All)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn create_many_skip_duplicates_within_batch() {
        let store = NullDatastore::new();
        let peer = |p: &str| doc(json!({"node_pubkey": "a", "peer_pubkey": p, "timestamp": 1}));
        let written = store
            .create_many(
                Collection::PeersOfPeers,
                vec![peer("b"), peer("b"), peer("c")],
                true,
            )
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.len(Collection::PeersOfPeers), 2);
    }

    #[tokio::test]
    async fn upsert_inserts_then_merges() {
        let store = NullDatastore::new();
        let create = doc(json!({"pubkey": "a", "alias": "x", "rank": 3}));
        let update = doc(json!({"alias": "y"}));
        store
            .upsert(Collection::Nodes, "a", create.clone(), update.clone())
            .await
            .unwrap();
        assert_eq!(store.documents(Collection::Nodes)[0], create);
        store
            .upsert(Collection::Nodes, "a", create, update)
            .await
            .unwrap();
        let d = &store.documents(Collection::Nodes)[0];
        assert_eq!(d.get("alias"), Some(&json!("y")));
        assert_eq!(d.get("rank"), Some(&json!(3)));
    }
}
