//! The Couchbase implementation of [`fhirdock_storage::gateway::Gateway`]:
//! every KV, FTS, and multi-document-transaction call this server makes
//! flows through here, wrapped in the shared circuit breaker.

use async_trait::async_trait;
use couchbase::Cluster;
use serde_json::Value;
use tracing::instrument;

use fhirdock_storage::gateway::{
    guarded, CircuitBreaker, CircuitState, CollectionRef, DocMutation, Gateway, SearchHit, SearchHits, SearchQuery,
};
use fhirdock_storage::StorageError;

use crate::config::CouchbaseConfig;

/// A live connection to a Couchbase cluster, gated by a circuit breaker.
/// Every tenant bucket is reached through the same cluster handle; the
/// bucket name is part of each [`CollectionRef`], not baked into this type.
pub struct CouchbaseGateway {
    cluster: Cluster,
    breaker: CircuitBreaker,
}

impl CouchbaseGateway {
    /// Connects to the cluster named in `config`. Does not touch any
    /// particular bucket yet — bucket/scope/collection resolution happens
    /// per call via [`CollectionRef`].
    #[instrument(skip(config), fields(connection_string = %config.connection_string))]
    pub async fn connect(config: &CouchbaseConfig) -> Result<Self, StorageError> {
        let cluster = Cluster::connect(&config.connection_string, &config.username, &config.password)
            .await
            .map_err(|e| StorageError::connection_error(e.to_string()))?;
        Ok(Self {
            cluster,
            breaker: CircuitBreaker::new(),
        })
    }

    fn collection(&self, target: &CollectionRef) -> couchbase::Collection {
        self.cluster
            .bucket(&target.bucket)
            .scope(&target.scope)
            .collection(&target.collection)
    }
}

#[async_trait]
impl Gateway for CouchbaseGateway {
    #[instrument(skip(self), fields(bucket = %collection.bucket, collection = %collection.collection, key))]
    async fn get(&self, collection: &CollectionRef, key: &str) -> Result<Option<Value>, StorageError> {
        guarded(&self.breaker, || async {
            let handle = self.collection(collection);
            match handle.get(key, Default::default()).await {
                Ok(result) => {
                    let body: Value = result
                        .content()
                        .map_err(|e| StorageError::internal(format!("malformed document body: {e}")))?;
                    Ok(Some(body))
                }
                Err(couchbase::CouchbaseError::DocumentNotFound) => Ok(None),
                Err(e) => Err(StorageError::internal(e.to_string())),
            }
        })
        .await
    }

    #[instrument(skip(self, keys), fields(bucket = %collection.bucket, collection = %collection.collection, count = keys.len()))]
    async fn get_many(&self, collection: &CollectionRef, keys: &[String]) -> Result<Vec<Option<Value>>, StorageError> {
        let fetches = keys.iter().map(|key| self.get(collection, key));
        futures_util::future::try_join_all(fetches).await
    }

    #[instrument(skip(self, body), fields(bucket = %collection.bucket, collection = %collection.collection, key))]
    async fn insert(&self, collection: &CollectionRef, key: &str, body: &Value) -> Result<(), StorageError> {
        guarded(&self.breaker, || async {
            let handle = self.collection(collection);
            handle
                .insert(key, body, Default::default())
                .await
                .map(|_| ())
                .map_err(|e| match e {
                    couchbase::CouchbaseError::DocumentExists => {
                        StorageError::already_exists(&collection.collection, key)
                    }
                    other => StorageError::internal(other.to_string()),
                })
        })
        .await
    }

    #[instrument(skip(self, body), fields(bucket = %collection.bucket, collection = %collection.collection, key))]
    async fn replace(&self, collection: &CollectionRef, key: &str, body: &Value) -> Result<(), StorageError> {
        guarded(&self.breaker, || async {
            let handle = self.collection(collection);
            handle
                .replace(key, body, Default::default())
                .await
                .map(|_| ())
                .map_err(|e| match e {
                    couchbase::CouchbaseError::DocumentNotFound => {
                        StorageError::not_found(&collection.collection, key)
                    }
                    other => StorageError::internal(other.to_string()),
                })
        })
        .await
    }

    #[instrument(skip(self), fields(bucket = %collection.bucket, collection = %collection.collection, key))]
    async fn remove(&self, collection: &CollectionRef, key: &str) -> Result<(), StorageError> {
        guarded(&self.breaker, || async {
            let handle = self.collection(collection);
            match handle.remove(key, Default::default()).await {
                Ok(_) | Err(couchbase::CouchbaseError::DocumentNotFound) => Ok(()),
                Err(e) => Err(StorageError::internal(e.to_string())),
            }
        })
        .await
    }

    #[instrument(skip(self, query), fields(index = %query.index, size = query.size, from = query.from))]
    async fn search_query(&self, query: &SearchQuery) -> Result<SearchHits, StorageError> {
        guarded(&self.breaker, || async {
            let fts_query = QueryStringQuery::new(query.query.to_string());
            let mut options = couchbase::SearchOptions::default()
                .limit(query.size as u32)
                .skip(query.from as u32);
            if !query.sort.is_empty() {
                options = options.sort(query.sort.clone());
            }
            let mut result = self
                .cluster
                .search_query(&query.index, fts_query, options)
                .await
                .map_err(|e| StorageError::internal(e.to_string()))?;

            let mut hits = Vec::new();
            while let Some(row) = result.rows().next().await {
                let row = row.map_err(|e| StorageError::internal(e.to_string()))?;
                hits.push(SearchHit { key: row.id().to_string(), score: row.score() });
            }
            let total_hits = result
                .metadata()
                .await
                .map(|meta| meta.metrics().total_hits())
                .unwrap_or(hits.len() as u64);

            Ok(SearchHits { hits, total_hits })
        })
        .await
    }

    #[instrument(skip(self, mutations), fields(count = mutations.len()))]
    async fn run_transaction(&self, mutations: Vec<DocMutation>) -> Result<(), StorageError> {
        guarded(&self.breaker, || async {
            self.cluster
                .transactions()
                .run(|ctx| {
                    let mutations = mutations.clone();
                    async move {
                        for mutation in mutations {
                            match mutation {
                                DocMutation::Insert { collection, key, body } => {
                                    let handle = self.collection(&collection);
                                    ctx.insert(&handle, &key, &body).await?;
                                }
                                DocMutation::Replace { collection, key, body } => {
                                    let handle = self.collection(&collection);
                                    let doc = ctx.get(&handle, &key).await?;
                                    ctx.replace(&doc, &body).await?;
                                }
                                DocMutation::Remove { collection, key } => {
                                    let handle = self.collection(&collection);
                                    let doc = ctx.get(&handle, &key).await?;
                                    ctx.remove(&doc).await?;
                                }
                            }
                        }
                        Ok(())
                    }
                })
                .await
                .map_err(|e| StorageError::transaction_error(e.to_string()))
        })
        .await
    }

    fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    async fn ping(&self) -> bool {
        self.cluster.ping(Default::default()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_gateway_object_safe(_: &dyn Gateway) {}
}
