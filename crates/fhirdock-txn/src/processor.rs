//! Drives a parsed, UUID-resolved Bundle through validation and the
//! gateway: a `transaction` Bundle builds one [`DocMutation`] list and
//! commits it with a single [`Gateway::run_transaction`] call, aborting
//! before any mutation is submitted if any entry fails to prepare; a
//! `batch` Bundle prepares and commits each entry independently.

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use fhirdock_core::resource::{id_of, resource_type_of, stamp_meta};
use fhirdock_core::now_utc;
use fhirdock_search::SearchEngine;
use fhirdock_storage::gateway::{DocMutation, DynGateway};
use fhirdock_storage::routing::{admin_versions, current_key, history_key, route};
use fhirdock_storage::{BucketConfig, SearchMode};
use fhirdock_validation::{validate, ValidationOptions};

use crate::bundle::{parse_bundle, BundleEntry, BundleType, EntryMethod};
use crate::error::TxnError;
use crate::response::{response_bundle, EntryOutcome};
use crate::uuid_resolution::{resolve_ids, rewrite_references, UuidResolution};

/// One entry's prepared effect: the mutations it contributes and the
/// response metadata to report once those mutations are committed.
#[derive(Clone)]
struct PreparedEntry {
    outcome: EntryOutcome,
    mutations: Vec<DocMutation>,
}

fn next_version(current_version: Option<&str>) -> String {
    let n: u64 = current_version.and_then(|v| v.parse().ok()).unwrap_or(0);
    (n + 1).to_string()
}

fn is_tombstone(doc: &Value) -> bool {
    doc.get("_tombstone").and_then(Value::as_bool).unwrap_or(false)
}

/// Ties the validation pipeline, a search engine (for conditional
/// create/update/delete), and a gateway together to process transaction
/// and batch Bundles.
pub struct TransactionProcessor {
    gateway: DynGateway,
    search_engine: Arc<SearchEngine>,
}

impl TransactionProcessor {
    #[must_use]
    pub fn new(gateway: DynGateway, search_engine: Arc<SearchEngine>) -> Self {
        Self { gateway, search_engine }
    }

    /// Processes a `Bundle.type = transaction | batch` request body and
    /// returns the `transaction-response` / `batch-response` Bundle.
    #[instrument(skip(self, bundle_config, bundle), fields(bucket))]
    pub async fn process(&self, bucket: &str, bundle_config: &BucketConfig, bundle: &Value) -> Result<Value, TxnError> {
        let parsed = parse_bundle(bundle)?;
        let resolution = resolve_ids(&parsed.entries)?;

        let mut ordered: Vec<&BundleEntry> = parsed.entries.iter().collect();
        ordered.sort_by_key(|e| e.method.order_group());

        match parsed.bundle_type {
            BundleType::Transaction => self.process_transaction(bucket, bundle_config, &ordered, &resolution).await,
            BundleType::Batch => self.process_batch(bucket, bundle_config, &ordered, &resolution).await,
        }
    }

    async fn process_transaction(
        &self,
        bucket: &str,
        bundle_config: &BucketConfig,
        ordered: &[&BundleEntry],
        resolution: &UuidResolution,
    ) -> Result<Value, TxnError> {
        let mut prepared_by_index = vec![None; ordered.len()];
        let mut all_mutations = Vec::new();

        for entry in ordered {
            let prepared = self.prepare_entry(bucket, bundle_config, entry, resolution).await?;
            all_mutations.extend(prepared.mutations.clone());
            prepared_by_index[entry.index] = Some(prepared.outcome);
        }

        if !all_mutations.is_empty() {
            self.gateway.run_transaction(all_mutations).await?;
        }

        let outcomes: Vec<EntryOutcome> = prepared_by_index.into_iter().flatten().collect();
        Ok(response_bundle("transaction-response", &outcomes))
    }

    async fn process_batch(
        &self,
        bucket: &str,
        bundle_config: &BucketConfig,
        ordered: &[&BundleEntry],
        resolution: &UuidResolution,
    ) -> Result<Value, TxnError> {
        let mut outcomes_by_index = vec![None; ordered.len()];

        for entry in ordered {
            let outcome = match self.prepare_entry(bucket, bundle_config, entry, resolution).await {
                Ok(prepared) => {
                    if !prepared.mutations.is_empty() {
                        match self.gateway.run_transaction(prepared.mutations).await {
                            Ok(()) => prepared.outcome,
                            Err(err) => EntryOutcome::failed(entry.index, err.to_string()),
                        }
                    } else {
                        prepared.outcome
                    }
                }
                Err(err) => EntryOutcome::failed(entry.index, err.to_string()),
            };
            outcomes_by_index[entry.index] = Some(outcome);
        }

        let outcomes: Vec<EntryOutcome> = outcomes_by_index.into_iter().flatten().collect();
        Ok(response_bundle("batch-response", &outcomes))
    }

    async fn prepare_entry(
        &self,
        bucket: &str,
        bundle_config: &BucketConfig,
        entry: &BundleEntry,
        resolution: &UuidResolution,
    ) -> Result<PreparedEntry, TxnError> {
        match entry.method {
            EntryMethod::Post => self.prepare_create(bucket, bundle_config, entry, resolution).await,
            EntryMethod::Put | EntryMethod::Patch => self.prepare_put(bucket, bundle_config, entry, resolution.map()).await,
            EntryMethod::Delete => self.prepare_delete(bucket, entry).await,
        }
    }

    async fn prepare_create(
        &self,
        bucket: &str,
        bundle_config: &BucketConfig,
        entry: &BundleEntry,
        resolution: &UuidResolution,
    ) -> Result<PreparedEntry, TxnError> {
        let mut resource = entry
            .resource
            .clone()
            .ok_or_else(|| TxnError::malformed_entry(entry.index, "POST entry is missing a resource body"))?;
        rewrite_references(&mut resource, resolution.map());

        let resource_type = resource_type_of(&resource).map_err(|e| TxnError::malformed_entry(entry.index, e.to_string()))?;

        if let Some(query) = entry.if_none_exist.as_deref() {
            let matches = self.conditional_matches(entry.index, bucket, resource_type.as_str(), query).await?;
            if matches.len() > 1 {
                return Err(TxnError::malformed_entry(entry.index, "ifNoneExist matched more than one resource"));
            }
            if let Some(key) = matches.into_iter().next() {
                let (_, id) = key.split_once('/').unwrap_or(("", key.as_str()));
                let existing = self.gateway.get(&route(bucket, &resource_type), &key).await?;
                let version = existing
                    .as_ref()
                    .and_then(|d| d.get("meta")).and_then(|m| m.get("versionId")).and_then(Value::as_str)
                    .unwrap_or("1").to_string();
                return Ok(PreparedEntry {
                    outcome: EntryOutcome::ok(entry.index, "200 OK", resource_type.as_str(), id, &version),
                    mutations: Vec::new(),
                });
            }
        }

        let outcome = validate(&resource, bundle_config, ValidationOptions::default());
        if !outcome.is_valid() {
            return Err(TxnError::malformed_entry(entry.index, "validation failed"));
        }

        let id = resolution
            .assigned_ids
            .get(&entry.index)
            .cloned()
            .ok_or_else(|| TxnError::malformed_entry(entry.index, "no id was assigned to this POST entry"))?;
        let version_id = "1".to_string();
        stamp_meta(&mut resource, &id, &version_id);

        let collection = route(bucket, &resource_type);
        let current = current_key(&resource_type, &id);
        let versions = admin_versions(bucket);
        let history = history_key(&resource_type, &id, &version_id);

        Ok(PreparedEntry {
            outcome: EntryOutcome::ok(entry.index, "201 Created", resource_type.as_str(), &id, &version_id),
            mutations: vec![
                DocMutation::Insert { collection: versions, key: history, body: resource.clone() },
                DocMutation::Insert { collection, key: current, body: resource },
            ],
        })
    }

    async fn prepare_put(
        &self,
        bucket: &str,
        bundle_config: &BucketConfig,
        entry: &BundleEntry,
        urn_map: &std::collections::HashMap<String, String>,
    ) -> Result<PreparedEntry, TxnError> {
        let mut resource = entry
            .resource
            .clone()
            .ok_or_else(|| TxnError::malformed_entry(entry.index, "PUT/PATCH entry is missing a resource body"))?;
        rewrite_references(&mut resource, urn_map);

        let resource_type = resource_type_of(&resource).map_err(|e| TxnError::malformed_entry(entry.index, e.to_string()))?;

        let id = if let Some((_, id)) = entry.target_type_and_id() {
            id.to_string()
        } else {
            let query = entry.url.split_once('?').map(|(_, q)| q).unwrap_or_default();
            let matches = self.conditional_matches(entry.index, bucket, resource_type.as_str(), query).await?;
            match matches.len() {
                0 => id_of(&resource).map(str::to_string).unwrap_or_else(fhirdock_core::generate_id),
                1 => matches[0].split_once('/').map(|(_, id)| id.to_string()).unwrap_or_default(),
                _ => return Err(TxnError::malformed_entry(entry.index, "conditional update matched more than one resource")),
            }
        };

        let collection = route(bucket, &resource_type);
        let current = current_key(&resource_type, &id);
        let existing = self.gateway.get(&collection, &current).await?;
        let current_version = match &existing {
            Some(doc) if is_tombstone(doc) => None,
            Some(doc) => doc.get("meta").and_then(|m| m.get("versionId")).and_then(Value::as_str).map(str::to_string),
            None => None,
        };

        if let Some(expected) = &entry.if_match {
            match &current_version {
                Some(actual) if actual != expected => {
                    return Err(TxnError::malformed_entry(entry.index, format!("If-Match '{expected}' does not match current version '{actual}'")));
                }
                None => return Err(TxnError::malformed_entry(entry.index, format!("resource {resource_type}/{id} not found for If-Match"))),
                _ => {}
            }
        }

        let outcome = validate(&resource, bundle_config, ValidationOptions::default());
        if !outcome.is_valid() {
            return Err(TxnError::malformed_entry(entry.index, "validation failed"));
        }

        let version_id = next_version(current_version.as_deref());
        stamp_meta(&mut resource, &id, &version_id);

        let versions = admin_versions(bucket);
        let history = history_key(&resource_type, &id, &version_id);
        let status = if existing.is_some() { "200 OK" } else { "201 Created" };

        let mut mutations = vec![DocMutation::Insert { collection: versions, key: history, body: resource.clone() }];
        mutations.push(if existing.is_some() {
            DocMutation::Replace { collection, key: current, body: resource }
        } else {
            DocMutation::Insert { collection, key: current, body: resource }
        });

        Ok(PreparedEntry {
            outcome: EntryOutcome::ok(entry.index, status, resource_type.as_str(), &id, &version_id),
            mutations,
        })
    }

    async fn prepare_delete(&self, bucket: &str, entry: &BundleEntry) -> Result<PreparedEntry, TxnError> {
        let resource_type = entry.target_type().parse().map_err(|_| TxnError::malformed_entry(entry.index, format!("invalid resourceType '{}'", entry.target_type())))?;

        let ids: Vec<String> = if let Some((_, id)) = entry.target_type_and_id() {
            vec![id.to_string()]
        } else {
            let query = entry.url.split_once('?').map(|(_, q)| q).unwrap_or_default();
            let matches = self.conditional_matches(entry.index, bucket, entry.target_type(), query).await?;
            if matches.len() > 1 {
                return Err(TxnError::malformed_entry(entry.index, "conditional delete matched more than one resource"));
            }
            matches.into_iter().filter_map(|key| key.split_once('/').map(|(_, id)| id.to_string())).collect()
        };

        let Some(id) = ids.into_iter().next() else {
            return Ok(PreparedEntry { outcome: EntryOutcome::no_content(entry.index), mutations: Vec::new() });
        };

        let collection = route(bucket, &resource_type);
        let current = current_key(&resource_type, &id);
        let existing = self.gateway.get(&collection, &current).await?;
        let Some(existing) = existing else {
            return Ok(PreparedEntry { outcome: EntryOutcome::no_content(entry.index), mutations: Vec::new() });
        };
        if is_tombstone(&existing) {
            return Ok(PreparedEntry { outcome: EntryOutcome::no_content(entry.index), mutations: Vec::new() });
        }

        let current_version = existing.get("meta").and_then(|m| m.get("versionId")).and_then(Value::as_str);
        let version_id = next_version(current_version);
        let tombstone = serde_json::json!({
            "resourceType": resource_type.as_str(),
            "id": id,
            "meta": { "versionId": version_id, "lastUpdated": now_utc() },
            "_tombstone": true,
        });

        let versions = admin_versions(bucket);
        let history = history_key(&resource_type, &id, &version_id);

        Ok(PreparedEntry {
            outcome: EntryOutcome::no_content(entry.index),
            mutations: vec![
                DocMutation::Insert { collection: versions, key: history, body: tombstone.clone() },
                DocMutation::Replace { collection, key: current, body: tombstone },
            ],
        })
    }

    /// Runs `query` against `resource_type` and returns the matching
    /// primary keys, used for `ifNoneExist` and conditional update/delete.
    async fn conditional_matches(&self, index: usize, bucket: &str, resource_type: &str, query: &str) -> Result<Vec<String>, TxnError> {
        let result = self
            .search_engine
            .search(bucket, resource_type, query)
            .await
            .map_err(|e| TxnError::malformed_entry(index, e.to_string()))?;
        Ok(result.entries.into_iter().filter(|e| matches!(e.mode, SearchMode::Match)).map(|e| e.key).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_version_starts_at_one_and_increments() {
        assert_eq!(next_version(None), "1");
        assert_eq!(next_version(Some("1")), "2");
        assert_eq!(next_version(Some("9")), "10");
    }

    #[test]
    fn tombstone_detection_reads_the_marker_field() {
        let tombstone = serde_json::json!({"_tombstone": true});
        assert!(is_tombstone(&tombstone));
        assert!(!is_tombstone(&serde_json::json!({})));
    }
}
