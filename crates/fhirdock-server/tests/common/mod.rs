use std::collections::HashMap;
use std::sync::Arc;

use fhirdock_config::{AppConfig, BucketProvisioning};
use fhirdock_db_memory::{MemoryGateway, MemoryStorage};
use fhirdock_search::{build_registry, SearchEngine, SearchEngineConfig};
use fhirdock_server::{build_app, AppState, JwtVerifier};
use fhirdock_storage::bucket::ValidationMode;
use fhirdock_storage::gateway::DynGateway;
use fhirdock_txn::TransactionProcessor;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

pub const JWT_SECRET: &str = "test-secret";
pub const TENANT: &str = "tenant-a";

#[derive(Serialize)]
struct Claims {
    sub: String,
    jti: String,
    exp: i64,
    scope: Option<String>,
}

/// Mints a bearer token this server's [`JwtVerifier`] will accept.
pub fn bearer_token(sub: &str) -> String {
    let claims = Claims { sub: sub.to_string(), jti: uuid::Uuid::new_v4().to_string(), exp: 9_999_999_999, scope: None };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

/// Builds an in-process router backed by `fhirdock-db-memory`, with
/// `tenant-a` already provisioned as a strict-mode base-R4 bucket.
pub async fn test_app() -> axum::Router {
    let gateway: DynGateway = Arc::new(MemoryGateway::new());
    let storage = Arc::new(MemoryStorage::new(gateway.clone()));
    let search_engine = Arc::new(SearchEngine::new(gateway.clone(), Arc::new(build_registry()), SearchEngineConfig::default()));
    let txn_processor = Arc::new(TransactionProcessor::new(gateway.clone(), search_engine.clone()));
    let token_verifier = Arc::new(JwtVerifier::new(JWT_SECRET));

    let mut buckets = HashMap::new();
    buckets.insert(
        TENANT.to_string(),
        BucketProvisioning { validation_mode: ValidationMode::Strict, validation_profile: "base-r4".to_string(), allow_unknown_elements: false },
    );
    let mut config = AppConfig::default();
    config.buckets = buckets;

    fhirdock_server::bootstrap::provision_buckets(&gateway, &config).await;

    let state = Arc::new(AppState { storage, search_engine, txn_processor, gateway, config, token_verifier });
    build_app(state)
}
