//! Bucket provisioning: on startup, every bucket named in
//! [`fhirdock_config::AppConfig::buckets`] gets a `fhir-config` document
//! seeded under `Admin.config` if one is not already present. The document
//! is never overwritten once it exists — provisioning is idempotent, and a
//! bucket's validation policy only changes via the (not-yet-built) admin
//! config-update path, not by restarting the server with a different file.

use fhirdock_storage::gateway::DynGateway;
use fhirdock_storage::routing::admin_config;
use tracing::{info, warn};

use fhirdock_config::AppConfig;

const FHIR_CONFIG_KEY: &str = "fhir-config";

/// Seeds the `fhir-config` document for every configured bucket that does
/// not already have one. Logs one line per bucket at INFO; a failure to
/// reach the database for one bucket is logged at WARN and does not stop
/// provisioning of the others.
pub async fn provision_buckets(gateway: &DynGateway, config: &AppConfig) {
    for (bucket, provisioning) in &config.buckets {
        let collection = admin_config(bucket);
        match gateway.get(&collection, FHIR_CONFIG_KEY).await {
            Ok(Some(_)) => {
                info!(bucket, "bucket already provisioned");
            }
            Ok(None) => {
                let bucket_config = provisioning.to_bucket_config();
                let body = match serde_json::to_value(&bucket_config) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(bucket, error = %e, "failed to serialize fhir-config, skipping");
                        continue;
                    }
                };
                match gateway.insert(&collection, FHIR_CONFIG_KEY, &body).await {
                    Ok(()) => info!(bucket, "provisioned bucket"),
                    Err(e) => warn!(bucket, error = %e, "failed to provision bucket"),
                }
            }
            Err(e) => {
                warn!(bucket, error = %e, "could not check bucket provisioning state");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirdock_config::BucketProvisioning;
    use fhirdock_db_memory::MemoryGateway;
    use fhirdock_storage::bucket::ValidationMode;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn config_with_one_bucket() -> AppConfig {
        let mut buckets = HashMap::new();
        buckets.insert(
            "tenant-a".to_string(),
            BucketProvisioning {
                validation_mode: ValidationMode::Strict,
                validation_profile: "base-r4".to_string(),
                allow_unknown_elements: false,
            },
        );
        let mut config = AppConfig::default();
        config.buckets = buckets;
        config
    }

    #[tokio::test]
    async fn seeds_fhir_config_for_unprovisioned_bucket() {
        let gateway: DynGateway = Arc::new(MemoryGateway::new());
        let config = config_with_one_bucket();

        provision_buckets(&gateway, &config).await;

        let collection = admin_config("tenant-a");
        let doc = gateway.get(&collection, FHIR_CONFIG_KEY).await.unwrap();
        assert!(doc.is_some());
        assert_eq!(doc.unwrap()["isFHIR"], true);
    }

    #[tokio::test]
    async fn does_not_overwrite_an_existing_fhir_config() {
        let gateway: DynGateway = Arc::new(MemoryGateway::new());
        let config = config_with_one_bucket();
        let collection = admin_config("tenant-a");
        gateway.insert(&collection, FHIR_CONFIG_KEY, &serde_json::json!({"isFHIR": true, "marker": "original"})).await.unwrap();

        provision_buckets(&gateway, &config).await;

        let doc = gateway.get(&collection, FHIR_CONFIG_KEY).await.unwrap().unwrap();
        assert_eq!(doc["marker"], "original");
    }
}
