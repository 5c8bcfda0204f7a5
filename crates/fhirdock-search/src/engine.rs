//! Top-level search engine: parses a query string, validates it against the
//! registry, translates it to an FTS query, resolves chains and
//! `_include`/`_revinclude`, and returns ordered raw hits ready for the
//! Bundle fastpath assembler.

use std::sync::Arc;

use fhirdock_storage::gateway::{DynGateway, SearchHits, SearchQuery};
use fhirdock_storage::routing::route;
use fhirdock_storage::{RawSearchResult, RawStoredResource, SearchMode, StorageError};

use crate::chaining::{self, ChainError};
use crate::fts::{self, FtsBuildError};
use crate::include::{self, IncludeError, MAX_BUNDLE_SIZE};
use crate::parser::{parse_query, ParsedParameters, SearchValidationError};
use crate::registry::SearchParameterRegistry;

#[derive(Debug, thiserror::Error)]
pub enum SearchEngineError {
    #[error(transparent)]
    Validation(#[from] SearchValidationError),
    #[error(transparent)]
    Fts(#[from] FtsBuildError),
    #[error(transparent)]
    Include(#[from] IncludeError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct SearchEngineConfig {
    pub default_count: usize,
    pub max_count: usize,
}

impl Default for SearchEngineConfig {
    fn default() -> Self {
        Self { default_count: 10, max_count: 50 }
    }
}

/// Ties the registry, parser, FTS translation, chaining, and include
/// expansion together into one `search()` entry point.
pub struct SearchEngine {
    gateway: DynGateway,
    registry: Arc<SearchParameterRegistry>,
    config: SearchEngineConfig,
}

impl SearchEngine {
    #[must_use]
    pub fn new(gateway: DynGateway, registry: Arc<SearchParameterRegistry>, config: SearchEngineConfig) -> Self {
        Self { gateway, registry, config }
    }

    /// Runs a search: validates `query` for `resource_type`, resolves any
    /// chained parameters, builds and runs the FTS query, expands
    /// `_include`/`_revinclude`, and returns raw (unparsed) hits with
    /// pagination metadata. `total` always reflects primaries only.
    ///
    /// Unrecognized query patterns this engine doesn't cover (chains deeper
    /// than supported, `_summary`/`_elements`) are the caller's signal to
    /// fall back to the parsed assembly path — this method does not
    /// implement that fallback itself.
    pub async fn search(&self, bucket: &str, resource_type: &str, query: &str) -> Result<RawSearchResult, SearchEngineError> {
        let parsed = parse_query(query);
        parsed.validate(resource_type, &self.registry, self.config.max_count)?;

        let primary_clause = self.build_primary_clause(resource_type, &parsed).await?;

        let count = parsed.parse_count(self.config.default_count, self.config.max_count);
        let offset = parsed.parse_offset(0);
        let sort: Vec<String> = parsed.sort().into_iter().map(|(field, desc)| if desc { format!("-{field}") } else { field }).collect();

        let fts_query = SearchQuery { index: fts::RESOURCES_INDEX.to_string(), query: primary_clause, size: count, from: offset, sort };
        let hits: SearchHits = self.gateway.search_query(&fts_query).await?;

        let resource_collection = route(bucket, &resource_type.parse().map_err(|_| StorageError::invalid_resource(format!("invalid resourceType '{resource_type}'")))?);
        let keys: Vec<String> = hits.hits.iter().map(|h| h.key.clone()).collect();
        let primary_bodies = self.gateway.get_many(&resource_collection, &keys).await?;

        let mut entries = Vec::new();
        let mut primary_docs = Vec::new();
        let mut primary_keys = Vec::new();
        for (key, body) in keys.into_iter().zip(primary_bodies) {
            let Some(body) = body else { continue };
            let raw_json = serde_json::to_string(&body).unwrap_or_default();
            entries.push(RawStoredResource { key: key.clone(), raw_json, mode: SearchMode::Match });
            primary_keys.push(key);
            primary_docs.push(body);
        }

        let include_budget = MAX_BUNDLE_SIZE.saturating_sub(entries.len());
        let included = self.expand_includes(bucket, resource_type, &parsed, &primary_docs, &primary_keys, include_budget).await?;
        for doc in included {
            let key = format!("{}/{}", doc.get("resourceType").and_then(serde_json::Value::as_str).unwrap_or(resource_type), doc.get("id").and_then(serde_json::Value::as_str).unwrap_or_default());
            entries.push(RawStoredResource { key, raw_json: serde_json::to_string(&doc).unwrap_or_default(), mode: SearchMode::Include });
        }

        Ok(RawSearchResult { entries, total: hits.total_hits, has_more: offset + count < hits.total_hits as usize })
    }

    /// Builds the FTS clause for every non-chained search parameter, ANDing
    /// in any chained parameters' resolved reference sets.
    async fn build_primary_clause(&self, resource_type: &str, parsed: &ParsedParameters) -> Result<serde_json::Value, SearchEngineError> {
        let mut conjuncts = Vec::new();

        for p in parsed.search_params() {
            let Some(param) = self.registry.get(resource_type, &p.name) else { continue };
            conjuncts.push(fts::build_clause(&param, p)?);
        }

        for (parsed_param, reference_param, chained_code) in parsed.chained_params() {
            let value_query = parsed_param.values.iter().map(|v| v.raw.as_str()).collect::<Vec<_>>().join(",");
            let keys = chaining::resolve_chain(&self.gateway, &self.registry, resource_type, reference_param, chained_code, &value_query).await?;
            let Some(ref_param) = self.registry.get(resource_type, reference_param) else { continue };
            let field = format!("{}.reference", fts::field_name(&ref_param));
            conjuncts.push(chaining::reference_in_clause(&field, &keys));
        }

        Ok(if conjuncts.is_empty() { serde_json::json!({"match_all": {}}) } else { serde_json::json!({"conjuncts": conjuncts}) })
    }

    async fn expand_includes(
        &self,
        bucket: &str,
        resource_type: &str,
        parsed: &ParsedParameters,
        primary_docs: &[serde_json::Value],
        primary_keys: &[String],
        mut budget: usize,
    ) -> Result<Vec<serde_json::Value>, SearchEngineError> {
        let mut included = Vec::new();

        for value in parsed.includes() {
            let spec = include::parse_include("_include", value, &self.registry, false)?;
            if spec.source_type != resource_type {
                continue;
            }
            let resolved = include::expand_forward(&self.gateway, bucket, &spec, &self.registry, primary_docs, budget).await?;
            budget = budget.saturating_sub(resolved.len());
            included.extend(resolved);
        }

        for value in parsed.rev_includes() {
            let spec = include::parse_include("_revinclude", value, &self.registry, true)?;
            let resolved = include::expand_reverse(&self.gateway, &spec, &self.registry, primary_keys, budget).await?;
            budget = budget.saturating_sub(resolved.len());
            included.extend(resolved);
        }

        Ok(included)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_common_fhir_server_defaults() {
        let config = SearchEngineConfig::default();
        assert_eq!(config.default_count, 10);
        assert_eq!(config.max_count, 50);
    }
}
