//! The database gateway: the single entry point through which every KV,
//! N1QL-style, and full-text-search call to the document database flows,
//! and the circuit breaker that guards it.
//!
//! Backends (`fhirdock-db-couchbase`, `fhirdock-db-memory`) implement
//! [`Gateway`]; every other crate that needs to talk to the database takes
//! `Arc<dyn Gateway>` rather than a backend-specific type.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::StorageError;

/// How long the circuit stays `Open` before allowing a half-open probe.
pub const RESET_TIMEOUT: time::Duration = time::Duration::seconds(30);

/// Observable state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls fail fast with `DatabaseUnavailable`; the cooldown has not elapsed.
    Open,
    /// The cooldown elapsed; the next call is let through as a probe.
    HalfOpen,
}

/// Shared, CAS-updated circuit breaker state.
///
/// `is_open` and `last_failure_time` are the two pieces of shared mutable
/// state spec.md's concurrency model calls out explicitly; both are updated
/// with atomics rather than a lock, since a torn read here only causes an
/// extra probe or an extra 30s of fail-fast, never an incorrect write.
#[derive(Debug)]
pub struct CircuitBreaker {
    is_open: AtomicBool,
    last_failure_unix_ns: AtomicI64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            is_open: AtomicBool::new(false),
            last_failure_unix_ns: AtomicI64::new(0),
        }
    }

    /// Returns the current state, resolving `Open` to `HalfOpen` once the
    /// cooldown has elapsed.
    pub fn state(&self) -> CircuitState {
        if !self.is_open.load(Ordering::Acquire) {
            return CircuitState::Closed;
        }
        let last_failure_ns = self.last_failure_unix_ns.load(Ordering::Acquire);
        let last_failure = OffsetDateTime::from_unix_timestamp_nanos(last_failure_ns as i128)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        if OffsetDateTime::now_utc() - last_failure >= RESET_TIMEOUT {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Returns `true` when a call should be allowed through (`Closed` or
    /// `HalfOpen`).
    pub fn allow_call(&self) -> bool {
        !matches!(self.state(), CircuitState::Open)
    }

    /// Records a connectivity failure: opens the circuit and refreshes the
    /// failure timestamp, whether it was already open or not.
    pub fn record_failure(&self) {
        self.is_open.store(true, Ordering::Release);
        self.last_failure_unix_ns
            .store(OffsetDateTime::now_utc().unix_timestamp_nanos() as i64, Ordering::Release);
    }

    /// Records a success: closes the circuit.
    pub fn record_success(&self) {
        self.is_open.store(false, Ordering::Release);
    }
}

/// Classifies an error message as a recognized connectivity/timeout failure.
///
/// The gateway only has the stringified error (and its cause chain, already
/// flattened into `message` by the backend) to work with, so classification
/// is substring matching on the vocabulary spec.md calls out: timeouts,
/// cancellations, explicit unavailability, and connection-refused phrasing.
/// Anything else is an application error and must be re-thrown, not
/// absorbed into the circuit breaker.
pub fn is_connectivity_error(message: &str) -> bool {
    const NEEDLES: &[&str] = &[
        "timeout",
        "timed out",
        "cancelled",
        "canceled",
        "service not available",
        "temporary failure",
        "connection refused",
        "no active connection",
        "could not connect",
        "i/o error",
        "io error",
        "connection reset",
        "broken pipe",
    ];
    let lower = message.to_ascii_lowercase();
    NEEDLES.iter().any(|needle| lower.contains(needle))
}

/// A single full-text-search query, already compiled to the backend's FTS
/// query-language representation.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub index: String,
    pub query: Value,
    pub size: usize,
    pub from: usize,
    pub sort: Vec<String>,
}

/// A single FTS hit: the matched document key and the score/sort values
/// needed to preserve FTS order through the fastpath assembler.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub key: String,
    pub score: f64,
}

/// The result of a `searchQuery` call: ordered hits plus the server-reported
/// total (`totalHits`).
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    pub hits: Vec<SearchHit>,
    pub total_hits: u64,
}

/// A target collection within a bucket, as resolved by
/// [`crate::routing::route`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(bucket: impl Into<String>, scope: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            scope: scope.into(),
            collection: collection.into(),
        }
    }
}

/// A single-document mutation to be applied as part of a multi-document
/// transaction (see spec.md §4.3/§4.4).
#[derive(Debug, Clone)]
pub enum DocMutation {
    Insert { collection: CollectionRef, key: String, body: Value },
    Replace { collection: CollectionRef, key: String, body: Value },
    Remove { collection: CollectionRef, key: String },
}

/// The single entry point for all database operations. Every call is gated
/// by the circuit breaker: a recognized connectivity failure opens it and
/// is translated to [`StorageError::DatabaseUnavailable`]; any other error
/// is passed through unchanged.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetches one document's raw JSON body by key, or `None` if absent.
    async fn get(&self, collection: &CollectionRef, key: &str) -> Result<Option<Value>, StorageError>;

    /// Fetches many documents in parallel, preserving input order. Missing
    /// keys produce `None` at their position rather than failing the batch.
    async fn get_many(
        &self,
        collection: &CollectionRef,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StorageError>;

    /// Inserts a new document; fails with [`StorageError::AlreadyExists`] if
    /// the key is taken.
    async fn insert(&self, collection: &CollectionRef, key: &str, body: &Value) -> Result<(), StorageError>;

    /// Replaces an existing document unconditionally.
    async fn replace(&self, collection: &CollectionRef, key: &str, body: &Value) -> Result<(), StorageError>;

    /// Removes a document; a no-op is not an error.
    async fn remove(&self, collection: &CollectionRef, key: &str) -> Result<(), StorageError>;

    /// Executes a full-text-search query and returns ordered hits plus the
    /// total hit count.
    async fn search_query(&self, query: &SearchQuery) -> Result<SearchHits, StorageError>;

    /// Applies a batch of mutations as one multi-document transaction:
    /// all-or-nothing.
    async fn run_transaction(&self, mutations: Vec<DocMutation>) -> Result<(), StorageError>;

    /// The circuit breaker's current state, consumed by health probes.
    fn circuit_state(&self) -> CircuitState;

    /// `true` once the gateway has a live connection to the backend.
    async fn ping(&self) -> bool;
}

/// Readiness/liveness summary derived from a [`Gateway`], matching spec.md
/// §4.1's health-probe semantics.
pub fn is_ready(gateway: &dyn Gateway) -> bool {
    !matches!(gateway.circuit_state(), CircuitState::Open)
}

/// Convenience wrapper: runs `op` only if the breaker allows it, recording
/// success/failure based on the outcome. Backends call this around every
/// underlying SDK call rather than re-implementing the classify-and-record
/// dance at each call site.
pub async fn guarded<T, F, Fut>(breaker: &CircuitBreaker, op: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, StorageError>>,
{
    if !breaker.allow_call() {
        return Err(StorageError::database_unavailable(
            "circuit breaker open: database calls are failing fast",
        ));
    }
    match op().await {
        Ok(value) => {
            breaker.record_success();
            Ok(value)
        }
        Err(err) => {
            if is_connectivity_error(&err.to_string()) {
                breaker.record_failure();
                Err(StorageError::database_unavailable(err.to_string()))
            } else {
                Err(err)
            }
        }
    }
}

/// Type alias for a shared gateway handle, the shape every higher crate
/// (search, write path, transaction processor) is constructed with.
pub type DynGateway = Arc<dyn Gateway>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_starts_closed() {
        let breaker = CircuitBreaker::new();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_call());
    }

    #[test]
    fn failure_opens_the_circuit() {
        let breaker = CircuitBreaker::new();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_call());
    }

    #[test]
    fn success_closes_the_circuit() {
        let breaker = CircuitBreaker::new();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_call());
    }

    #[test]
    fn classifies_known_connectivity_phrases() {
        assert!(is_connectivity_error("Connection refused (os error 111)"));
        assert!(is_connectivity_error("operation timed out"));
        assert!(is_connectivity_error("No active connection to cluster"));
        assert!(is_connectivity_error("Could not connect to any node"));
        assert!(is_connectivity_error("Temporary failure in name resolution"));
    }

    #[test]
    fn does_not_classify_application_errors() {
        assert!(!is_connectivity_error("duplicate key violates unique constraint"));
        assert!(!is_connectivity_error("invalid resource: missing resourceType"));
    }

    #[tokio::test]
    async fn guarded_fails_fast_when_open() {
        let breaker = CircuitBreaker::new();
        breaker.record_failure();
        let result: Result<(), StorageError> = guarded(&breaker, || async { Ok(()) }).await;
        assert!(matches!(result, Err(StorageError::DatabaseUnavailable { .. })));
    }

    #[tokio::test]
    async fn guarded_opens_circuit_on_connectivity_error() {
        let breaker = CircuitBreaker::new();
        let result: Result<(), StorageError> = guarded(&breaker, || async {
            Err(StorageError::connection_error("Connection refused"))
        })
        .await;
        assert!(matches!(result, Err(StorageError::DatabaseUnavailable { .. })));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn guarded_passes_through_application_errors_without_opening() {
        let breaker = CircuitBreaker::new();
        let result: Result<(), StorageError> = guarded(&breaker, || async {
            Err(StorageError::invalid_resource("bad data"))
        })
        .await;
        assert!(matches!(result, Err(StorageError::InvalidResource { .. })));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
