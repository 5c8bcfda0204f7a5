//! An in-memory [`Gateway`] backed by a [`DashMap`], used by tests and local
//! development. Never reaches a real Couchbase cluster and is never wired
//! into the production server entry point — see `fhirdock-server`'s
//! bootstrap, which only ever constructs a [`fhirdock_db_couchbase::CouchbaseGateway`].
//!
//! Documents are keyed by `(bucket, scope, collection, key)` so the same
//! routing rules (`fhirdock_storage::routing`) work unchanged against this
//! backend. `search_query` has no real FTS engine behind it; it interprets
//! the small subset of the query shape `fhirdock-db-couchbase` actually
//! builds (`prefix`/`match`/date-range conjuncts over `_id`/`lastUpdated`)
//! by scanning the `Admin.versions` documents directly.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use fhirdock_storage::gateway::{
    guarded, CircuitBreaker, CircuitState, CollectionRef, DocMutation, Gateway, SearchHit, SearchHits, SearchQuery,
};
use fhirdock_storage::StorageError;

fn storage_key(collection: &CollectionRef, key: &str) -> String {
    format!("{}\u{0}{}\u{0}{}\u{0}{}", collection.bucket, collection.scope, collection.collection, key)
}

#[derive(Default)]
pub struct MemoryGateway {
    documents: DashMap<String, Value>,
    breaker: CircuitBreaker,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the `lastUpdated` date-range conjuncts `fhirdock-db-couchbase`'s
    /// history query builds; the prefix conjunct itself is already handled by
    /// the caller's key filter before this runs.
    fn matches_date_range(&self, query: &Value, body: &Value) -> bool {
        let Some(conjuncts) = query.get("conjuncts").and_then(Value::as_array) else {
            return true;
        };
        let last_updated = body.get("meta").and_then(|m| m.get("lastUpdated")).and_then(Value::as_str).unwrap_or_default();
        conjuncts.iter().all(|clause| {
            if clause.get("field").and_then(Value::as_str) != Some("lastUpdated") {
                return true;
            }
            if let Some(start) = clause.get("start").and_then(Value::as_str) {
                if last_updated < start {
                    return false;
                }
            }
            if let Some(end) = clause.get("end").and_then(Value::as_str) {
                if last_updated > end {
                    return false;
                }
            }
            true
        })
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn get(&self, collection: &CollectionRef, key: &str) -> Result<Option<Value>, StorageError> {
        guarded(&self.breaker, || async {
            Ok(self.documents.get(&storage_key(collection, key)).map(|entry| entry.value().clone()))
        })
        .await
    }

    async fn get_many(&self, collection: &CollectionRef, keys: &[String]) -> Result<Vec<Option<Value>>, StorageError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(collection, key).await?);
        }
        Ok(results)
    }

    async fn insert(&self, collection: &CollectionRef, key: &str, body: &Value) -> Result<(), StorageError> {
        guarded(&self.breaker, || async {
            let storage_key = storage_key(collection, key);
            if self.documents.contains_key(&storage_key) {
                return Err(StorageError::already_exists(&collection.collection, key));
            }
            self.documents.insert(storage_key, body.clone());
            Ok(())
        })
        .await
    }

    async fn replace(&self, collection: &CollectionRef, key: &str, body: &Value) -> Result<(), StorageError> {
        guarded(&self.breaker, || async {
            let storage_key = storage_key(collection, key);
            if !self.documents.contains_key(&storage_key) {
                return Err(StorageError::not_found(&collection.collection, key));
            }
            self.documents.insert(storage_key, body.clone());
            Ok(())
        })
        .await
    }

    async fn remove(&self, collection: &CollectionRef, key: &str) -> Result<(), StorageError> {
        guarded(&self.breaker, || async {
            self.documents.remove(&storage_key(collection, key));
            Ok(())
        })
        .await
    }

    async fn search_query(&self, query: &SearchQuery) -> Result<SearchHits, StorageError> {
        guarded(&self.breaker, || async {
            let prefix = query
                .query
                .get("conjuncts")
                .and_then(Value::as_array)
                .and_then(|clauses| clauses.iter().find_map(|c| c.get("prefix").and_then(Value::as_str)))
                .unwrap_or_default();

            let mut matched: Vec<(String, Value)> = self
                .documents
                .iter()
                .filter_map(|entry| {
                    let (_, _, _, stored_key) = split_storage_key(entry.key())?;
                    stored_key.starts_with(prefix).then(|| (stored_key.to_string(), entry.value().clone()))
                })
                .filter(|(_, body)| self.matches_date_range(&query.query, body))
                .collect();

            matched.sort_by(|a, b| {
                let a_updated = a.1.get("meta").and_then(|m| m.get("lastUpdated")).and_then(Value::as_str).unwrap_or_default();
                let b_updated = b.1.get("meta").and_then(|m| m.get("lastUpdated")).and_then(Value::as_str).unwrap_or_default();
                b_updated.cmp(a_updated)
            });

            let total_hits = matched.len() as u64;
            let hits = matched
                .into_iter()
                .skip(query.from)
                .take(query.size)
                .map(|(key, _)| SearchHit { key, score: 1.0 })
                .collect();

            Ok(SearchHits { hits, total_hits })
        })
        .await
    }

    async fn run_transaction(&self, mutations: Vec<DocMutation>) -> Result<(), StorageError> {
        guarded(&self.breaker, || async {
            for mutation in &mutations {
                match mutation {
                    DocMutation::Insert { collection, key, body } => self.insert(collection, key, body).await?,
                    DocMutation::Replace { collection, key, body } => self.replace(collection, key, body).await?,
                    DocMutation::Remove { collection, key } => self.remove(collection, key).await?,
                }
            }
            Ok(())
        })
        .await
    }

    fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    async fn ping(&self) -> bool {
        true
    }
}

fn split_storage_key(storage_key: &str) -> Option<(&str, &str, &str, &str)> {
    let mut parts = storage_key.splitn(4, '\u{0}');
    Some((parts.next()?, parts.next()?, parts.next()?, parts.next()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirdock_storage::gateway::CollectionRef;
    use serde_json::json;

    fn collection() -> CollectionRef {
        CollectionRef::new("tenant-a", "Resources", "Patient")
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let gateway = MemoryGateway::new();
        let doc = json!({"resourceType": "Patient", "id": "1"});
        gateway.insert(&collection(), "Patient/1", &doc).await.unwrap();
        let fetched = gateway.get(&collection(), "Patient/1").await.unwrap();
        assert_eq!(fetched, Some(doc));
    }

    #[tokio::test]
    async fn insert_twice_fails_with_already_exists() {
        let gateway = MemoryGateway::new();
        let doc = json!({"resourceType": "Patient", "id": "1"});
        gateway.insert(&collection(), "Patient/1", &doc).await.unwrap();
        let err = gateway.insert(&collection(), "Patient/1", &doc).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn replace_of_missing_key_fails_with_not_found() {
        let gateway = MemoryGateway::new();
        let doc = json!({"resourceType": "Patient", "id": "1"});
        let err = gateway.replace(&collection(), "Patient/1", &doc).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn remove_of_missing_key_is_a_no_op() {
        let gateway = MemoryGateway::new();
        assert!(gateway.remove(&collection(), "Patient/1").await.is_ok());
    }

    fn _assert_gateway_object_safe(_: &dyn Gateway) {}
}
