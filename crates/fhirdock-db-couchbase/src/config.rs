//! Connection configuration for the Couchbase storage backend.
//!
//! One `CouchbaseConfig` describes a cluster connection; the tenant
//! (`bucket` in spec.md's sense) is supplied per call by the caller, not
//! baked into this config, since a single cluster connection serves every
//! tenant bucket.

use serde::{Deserialize, Serialize};

/// Configuration for connecting to a Couchbase cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchbaseConfig {
    /// Connection string, e.g. `couchbase://localhost` or
    /// `couchbases://cb.example.com` for TLS.
    pub connection_string: String,
    pub username: String,
    pub password: String,
    /// KV operation timeout in milliseconds.
    pub kv_timeout_ms: u64,
    /// FTS query timeout in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for CouchbaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "couchbase://localhost".into(),
            username: "Administrator".into(),
            password: String::new(),
            kv_timeout_ms: 2_500,
            query_timeout_ms: 10_000,
        }
    }
}

impl CouchbaseConfig {
    #[must_use]
    pub fn new(connection_string: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_kv_timeout_ms(mut self, timeout: u64) -> Self {
        self.kv_timeout_ms = timeout;
        self
    }

    #[must_use]
    pub fn with_query_timeout_ms(mut self, timeout: u64) -> Self {
        self.query_timeout_ms = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_localhost() {
        let config = CouchbaseConfig::default();
        assert_eq!(config.connection_string, "couchbase://localhost");
        assert_eq!(config.kv_timeout_ms, 2_500);
    }

    #[test]
    fn builder_overrides_timeouts() {
        let config = CouchbaseConfig::new("couchbases://cb.example.com", "svc", "secret")
            .with_kv_timeout_ms(5_000)
            .with_query_timeout_ms(20_000);
        assert_eq!(config.kv_timeout_ms, 5_000);
        assert_eq!(config.query_timeout_ms, 20_000);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = CouchbaseConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: CouchbaseConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.connection_string, back.connection_string);
    }
}
