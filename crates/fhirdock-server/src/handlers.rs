//! HTTP handlers: one function per REST interaction, each converting its
//! backend error at the boundary via [`crate::errors`] and leaving Bundle
//! and OperationOutcome assembly to `fhirdock-api`.

use std::time::{Duration, Instant};

use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::Deserialize;
use serde_json::Value;

use fhirdock_api::{
    bundle_from_history, bundle_from_search_raw, check_if_none_match, ApiError, ApiResponse, CapabilityStatementBuilder,
    HistoryBundleEntry, HistoryBundleMethod, RawJson,
};
use fhirdock_storage::gateway::CollectionRef;
use fhirdock_storage::routing::admin_config;
use fhirdock_storage::{BucketConfig, HistoryParams, SearchMode};
use fhirdock_validation::{validate, ValidationOptions};

const IF_NONE_EXIST: &str = "If-None-Exist";

use crate::audit::{self, AuditEntry, Outcome as AuditOutcome};
use crate::errors::{search_to_api, storage_to_api, txn_to_api};
use crate::middleware::AuthenticatedActor;
use crate::server::SharedState;

const ADMIN_CONFIG_KEY: &str = "fhir-config";

/// Strips an `If-Match` header's weak-ETag wrapping (`W/"2"` -> `2`) down to
/// the bare version id storage compares against -- `ApiResponse::
/// with_etag_weak` is what wrote it in that form in the first place.
fn parse_if_match(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::IF_MATCH).and_then(|v| v.to_str().ok())?;
    let unwrapped = raw.strip_prefix("W/").unwrap_or(raw).trim();
    Some(unwrapped.trim_matches('"').to_string())
}

async fn load_bucket_config(state: &SharedState, bucket: &str) -> Result<BucketConfig, ApiError> {
    let collection: CollectionRef = admin_config(bucket);
    let doc = state
        .gateway
        .get(&collection, ADMIN_CONFIG_KEY)
        .await
        .map_err(storage_to_api)?
        .ok_or_else(|| ApiError::not_found(format!("bucket '{bucket}' is not FHIR-enabled")))?;
    serde_json::from_value(doc).map_err(|e| ApiError::internal(format!("corrupt fhir-config document: {e}")))
}

fn actor_sub(actor: Option<Extension<AuthenticatedActor>>) -> Option<String> {
    actor.map(|Extension(a)| a.0.sub)
}

async fn record_audit(state: &SharedState, operation: &str, bucket: &str, actor: Option<String>, outcome: AuditOutcome, started: Instant) -> Duration {
    let elapsed = started.elapsed();
    audit::record(&state.gateway, AuditEntry::new(operation, bucket, actor, outcome, elapsed)).await;
    elapsed
}

/// Runs `query` against `resource_type` and returns the matching primary
/// keys (`Type/id`), used for `If-None-Exist` and conditional update/delete
/// — the same search the transaction processor runs for `ifNoneExist`.
async fn conditional_matches(state: &SharedState, bucket: &str, resource_type: &str, query: &str) -> Result<Vec<String>, ApiError> {
    let result = state.search_engine.search(bucket, resource_type, query).await.map_err(search_to_api)?;
    Ok(result.entries.into_iter().filter(|e| matches!(e.mode, SearchMode::Match)).map(|e| e.key).collect())
}

// -------------------------
// CRUD
// -------------------------

pub async fn create(
    State(state): State<SharedState>,
    Path((bucket, resource_type)): Path<(String, String)>,
    headers: HeaderMap,
    actor: Option<Extension<AuthenticatedActor>>,
    axum::Json(resource): axum::Json<Value>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = create_inner(&state, &bucket, &resource_type, &headers, resource).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "create", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn create_inner(state: &SharedState, bucket: &str, resource_type: &str, headers: &HeaderMap, resource: Value) -> Result<Response, ApiError> {
    let bucket_config = load_bucket_config(state, bucket).await?;

    if resource.get("resourceType").and_then(Value::as_str) != Some(resource_type) {
        return Err(ApiError::bad_request("resourceType in body does not match the request path"));
    }

    if let Some(query) = headers.get(IF_NONE_EXIST).and_then(|v| v.to_str().ok()) {
        let matches = conditional_matches(state, bucket, resource_type, query).await?;
        if matches.len() > 1 {
            return Err(ApiError::precondition_failed("If-None-Exist matched more than one resource"));
        }
        if let Some(key) = matches.into_iter().next() {
            let id = key.split_once('/').map(|(_, id)| id).unwrap_or(key.as_str());
            let stored = state
                .storage
                .read(bucket, resource_type, id)
                .await
                .map_err(storage_to_api)?
                .ok_or_else(|| ApiError::internal(format!("If-None-Exist match {resource_type}/{id} disappeared")))?;
            return Ok(ApiResponse::new(stored.resource, StatusCode::OK).with_etag_weak(stored.version_id).into_response());
        }
    }

    let validation = validate(&resource, &bucket_config, ValidationOptions::default());
    if !validation.is_valid() {
        return Err(ApiError::unprocessable_entity("resource failed validation", Some(validation.to_operation_outcome())));
    }

    let stored = state.storage.create(bucket, &resource).await.map_err(storage_to_api)?;
    Ok(ApiResponse::new(stored.resource, StatusCode::CREATED)
        .with_etag_weak(stored.version_id)
        .into_response())
}

pub async fn read(
    State(state): State<SharedState>,
    Path((bucket, resource_type, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    match read_inner(&state, &bucket, &resource_type, &id, &headers).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn read_inner(state: &SharedState, bucket: &str, resource_type: &str, id: &str, headers: &HeaderMap) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;
    let stored = state
        .storage
        .read(bucket, resource_type, id)
        .await
        .map_err(storage_to_api)?
        .ok_or_else(|| ApiError::not_found(format!("{resource_type}/{id} not found")))?;

    if check_if_none_match(headers, stored.version_id.as_str()) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    Ok(ApiResponse::new(stored.resource, StatusCode::OK).with_etag_weak(stored.version_id).into_response())
}

pub async fn update(
    State(state): State<SharedState>,
    Path((bucket, resource_type, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    actor: Option<Extension<AuthenticatedActor>>,
    axum::Json(resource): axum::Json<Value>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = update_inner(&state, &bucket, &resource_type, &id, &headers, resource).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "update", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn update_inner(
    state: &SharedState,
    bucket: &str,
    resource_type: &str,
    id: &str,
    headers: &HeaderMap,
    mut resource: Value,
) -> Result<Response, ApiError> {
    let bucket_config = load_bucket_config(state, bucket).await?;

    if resource.get("resourceType").and_then(Value::as_str) != Some(resource_type) {
        return Err(ApiError::bad_request("resourceType in body does not match the request path"));
    }
    resource["id"] = Value::String(id.to_string());

    let validation = validate(&resource, &bucket_config, ValidationOptions::default());
    if !validation.is_valid() {
        return Err(ApiError::unprocessable_entity("resource failed validation", Some(validation.to_operation_outcome())));
    }

    let if_match = parse_if_match(headers);
    let stored = state.storage.update(bucket, &resource, if_match.as_deref()).await.map_err(storage_to_api)?;
    Ok(ApiResponse::new(stored.resource, StatusCode::OK).with_etag_weak(stored.version_id).into_response())
}

pub async fn conditional_update(
    State(state): State<SharedState>,
    Path((bucket, resource_type)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    actor: Option<Extension<AuthenticatedActor>>,
    axum::Json(resource): axum::Json<Value>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = conditional_update_inner(&state, &bucket, &resource_type, query.as_deref().unwrap_or(""), &headers, resource).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "conditional_update", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn conditional_update_inner(
    state: &SharedState,
    bucket: &str,
    resource_type: &str,
    query: &str,
    headers: &HeaderMap,
    mut resource: Value,
) -> Result<Response, ApiError> {
    let bucket_config = load_bucket_config(state, bucket).await?;

    if resource.get("resourceType").and_then(Value::as_str) != Some(resource_type) {
        return Err(ApiError::bad_request("resourceType in body does not match the request path"));
    }

    let matches = conditional_matches(state, bucket, resource_type, query).await?;
    let id = match matches.len() {
        0 => resource.get("id").and_then(Value::as_str).map(str::to_string).unwrap_or_else(fhirdock_core::generate_id),
        1 => matches[0].split_once('/').map(|(_, id)| id.to_string()).unwrap_or_default(),
        _ => return Err(ApiError::precondition_failed("conditional update matched more than one resource")),
    };
    resource["id"] = Value::String(id);

    let validation = validate(&resource, &bucket_config, ValidationOptions::default());
    if !validation.is_valid() {
        return Err(ApiError::unprocessable_entity("resource failed validation", Some(validation.to_operation_outcome())));
    }

    let if_match = parse_if_match(headers);
    let stored = state.storage.update(bucket, &resource, if_match.as_deref()).await.map_err(storage_to_api)?;
    Ok(ApiResponse::new(stored.resource, StatusCode::OK).with_etag_weak(stored.version_id).into_response())
}

pub async fn conditional_delete(
    State(state): State<SharedState>,
    Path((bucket, resource_type)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    actor: Option<Extension<AuthenticatedActor>>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = conditional_delete_inner(&state, &bucket, &resource_type, query.as_deref().unwrap_or("")).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "conditional_delete", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn conditional_delete_inner(state: &SharedState, bucket: &str, resource_type: &str, query: &str) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;

    let matches = conditional_matches(state, bucket, resource_type, query).await?;
    if matches.len() > 1 {
        return Err(ApiError::precondition_failed("conditional delete matched more than one resource"));
    }
    let Some(key) = matches.into_iter().next() else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let id = key.split_once('/').map(|(_, id)| id.to_string()).unwrap_or(key);
    state.storage.delete(bucket, resource_type, &id).await.map_err(storage_to_api)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn delete(
    State(state): State<SharedState>,
    Path((bucket, resource_type, id)): Path<(String, String, String)>,
    actor: Option<Extension<AuthenticatedActor>>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = delete_inner(&state, &bucket, &resource_type, &id).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "delete", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn delete_inner(state: &SharedState, bucket: &str, resource_type: &str, id: &str) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;
    state.storage.delete(bucket, resource_type, id).await.map_err(storage_to_api)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn patch(
    State(state): State<SharedState>,
    Path((bucket, resource_type, id)): Path<(String, String, String)>,
    actor: Option<Extension<AuthenticatedActor>>,
    body: axum::body::Bytes,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = patch_inner(&state, &bucket, &resource_type, &id, &body).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "patch", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn patch_inner(state: &SharedState, bucket: &str, resource_type: &str, id: &str, body: &[u8]) -> Result<Response, ApiError> {
    let bucket_config = load_bucket_config(state, bucket).await?;
    let current = state
        .storage
        .read(bucket, resource_type, id)
        .await
        .map_err(storage_to_api)?
        .ok_or_else(|| ApiError::not_found(format!("{resource_type}/{id} not found")))?;

    let patched = crate::patch::apply_json_patch(&current.resource, body)?;

    let validation = validate(&patched, &bucket_config, ValidationOptions::default());
    if !validation.is_valid() {
        return Err(ApiError::unprocessable_entity("resource failed validation", Some(validation.to_operation_outcome())));
    }

    let stored = state
        .storage
        .update(bucket, &patched, Some(&current.version_id))
        .await
        .map_err(storage_to_api)?;
    Ok(ApiResponse::new(stored.resource, StatusCode::OK).with_etag_weak(stored.version_id).into_response())
}

pub async fn vread(
    State(state): State<SharedState>,
    Path((bucket, resource_type, id, vid)): Path<(String, String, String, String)>,
) -> Response {
    match vread_inner(&state, &bucket, &resource_type, &id, &vid).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn vread_inner(state: &SharedState, bucket: &str, resource_type: &str, id: &str, vid: &str) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;
    let stored = state
        .storage
        .vread(bucket, resource_type, id, vid)
        .await
        .map_err(storage_to_api)?
        .ok_or_else(|| ApiError::not_found(format!("{resource_type}/{id}/_history/{vid} not found")))?;
    Ok(ApiResponse::new(stored.resource, StatusCode::OK).with_etag_weak(stored.version_id).into_response())
}

// -------------------------
// History
// -------------------------

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    #[serde(rename = "_count")]
    pub count: Option<u32>,
}

pub async fn history(
    State(state): State<SharedState>,
    Path((bucket, resource_type, id)): Path<(String, String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match history_inner(&state, &bucket, &resource_type, &id, query).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn history_inner(state: &SharedState, bucket: &str, resource_type: &str, id: &str, query: HistoryQuery) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;
    let mut params = HistoryParams::new();
    if let Some(count) = query.count {
        params = params.count(count);
    }

    let result = state.storage.history(bucket, resource_type, Some(id), &params).await.map_err(storage_to_api)?;

    let base_url = format!("/fhir/{bucket}");
    let entries: Vec<HistoryBundleEntry> = result
        .entries
        .into_iter()
        .map(|entry| HistoryBundleEntry {
            resource: RawJson::from_string(entry.resource.resource.to_string()),
            id: entry.resource.id.clone(),
            resource_type: entry.resource.resource_type.clone(),
            version_id: entry.resource.version_id.clone(),
            last_modified: entry
                .resource
                .last_updated
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            method: match entry.method {
                fhirdock_storage::HistoryMethod::Create => HistoryBundleMethod::Create,
                fhirdock_storage::HistoryMethod::Update => HistoryBundleMethod::Update,
                fhirdock_storage::HistoryMethod::Delete => HistoryBundleMethod::Delete,
            },
        })
        .collect();

    let bundle = bundle_from_history(entries, &base_url, resource_type, Some(id), 0, query.count.unwrap_or(20) as usize, result.total);
    Ok(ApiResponse::ok(bundle).into_response())
}

// -------------------------
// Search
// -------------------------

pub async fn search(
    State(state): State<SharedState>,
    Path((bucket, resource_type)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Response {
    match search_inner(&state, &bucket, &resource_type, query.as_deref().unwrap_or("")).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn search_inner(state: &SharedState, bucket: &str, resource_type: &str, query: &str) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;

    let result = state.search_engine.search(bucket, resource_type, query).await.map_err(search_to_api)?;
    let base_url = format!("/fhir/{bucket}");
    let query_suffix = if query.is_empty() { None } else { Some(query) };

    if state.config.fhir.bundle_fastpath_enabled && !fhirdock_api::fastpath::requires_parsed_assembly(query) {
        return Ok(search_fastpath(result, &base_url, resource_type, query_suffix));
    }

    let mut resources = Vec::new();
    let mut resource_ids = Vec::new();
    let mut included = Vec::new();

    for entry in result.entries {
        let raw = RawJson::from_string(entry.raw_json);
        match entry.mode {
            SearchMode::Match => {
                let id = raw.get_str_field("id").unwrap_or_default();
                resource_ids.push(id);
                resources.push(raw);
            }
            SearchMode::Include => {
                let id = raw.get_str_field("id").unwrap_or_default();
                let rt = raw.get_str_field("resourceType").unwrap_or_default();
                included.push(fhirdock_api::RawIncludedEntry { resource: raw, resource_type: rt, id });
            }
        }
    }

    let bundle = bundle_from_search_raw(result.total as usize, resources, resource_ids, included, &base_url, resource_type, 0, 20, query_suffix);
    Ok(ApiResponse::ok(bundle).into_response())
}

/// Streams the Bundle bytes straight from the raw, already-validated
/// resource JSON the search engine returned, without building a [`Bundle`]
/// value at all -- the path `requires_parsed_assembly` keeps eligible.
fn search_fastpath(result: fhirdock_storage::RawSearchResult, base_url: &str, resource_type: &str, query_suffix: Option<&str>) -> Response {
    use fhirdock_api::fastpath::{assemble_searchset, FastpathEntry, SearchEntryMode};

    let links = fhirdock_api::build_search_links(result.total as usize, base_url, resource_type, 0, 20, query_suffix);
    let self_link = links.iter().find(|l| l.relation == "self").map(|l| l.url.as_str()).unwrap_or(base_url);
    let next_link = links.iter().find(|l| l.relation == "next").map(|l| l.url.as_str());

    let entries: Vec<FastpathEntry> = result
        .entries
        .into_iter()
        .map(|entry| {
            let raw = RawJson::from_string(entry.raw_json);
            let id = raw.get_str_field("id").unwrap_or_default();
            let rt = raw.get_str_field("resourceType").unwrap_or_else(|| resource_type.to_string());
            let mode = match entry.mode {
                SearchMode::Match => SearchEntryMode::Match,
                SearchMode::Include => SearchEntryMode::Include,
            };
            FastpathEntry { full_url: format!("{base_url}/{rt}/{id}"), resource: raw, mode }
        })
        .collect();

    let body = assemble_searchset(result.total, &entries, self_link, next_link);
    axum::http::Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/fhir+json")
        .body(axum::body::Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// -------------------------
// Transaction / batch
// -------------------------

pub async fn transaction_bundle(
    State(state): State<SharedState>,
    Path(bucket): Path<String>,
    actor: Option<Extension<AuthenticatedActor>>,
    axum::Json(bundle): axum::Json<Value>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = transaction_bundle_inner(&state, &bucket, bundle).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "transaction", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn transaction_bundle_inner(state: &SharedState, bucket: &str, bundle: Value) -> Result<Response, ApiError> {
    let bucket_config = load_bucket_config(state, bucket).await?;
    let response_bundle = state.txn_processor.process(bucket, &bucket_config, &bundle).await.map_err(txn_to_api)?;
    Ok(ApiResponse::ok(response_bundle).into_response())
}

// -------------------------
// Metadata / health
// -------------------------

pub async fn capability_statement(State(_state): State<SharedState>, Path(_bucket): Path<String>) -> Response {
    let cs = CapabilityStatementBuilder::new_json_r4()
        .add_resource("Patient", &["read", "vread", "update", "patch", "delete", "history-instance", "create", "search-type"], fhirdock_api::common_search_params())
        .add_resource("Observation", &["read", "vread", "update", "patch", "delete", "history-instance", "create", "search-type"], fhirdock_api::common_search_params())
        .build();
    ApiResponse::ok(cs).into_response()
}

// -------------------------
// Group engine
// -------------------------

#[derive(Debug, Deserialize)]
pub struct GroupCreateRequest {
    pub name: String,
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub filter: String,
    #[serde(rename = "createdBy")]
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberQuery {
    pub reference: String,
}

/// Pages the search engine in `_count`-sized chunks, collecting `Match`-mode
/// keys, until either `MAX_GROUP_MEMBERS` is reached or a page comes back
/// short of a full page — the engine's own `_count` ceiling is well below
/// the Group engine's member cap, so one call can never do this.
async fn resolve_group_members(state: &SharedState, bucket: &str, resource_type: &str, filter: &str) -> Result<Vec<String>, ApiError> {
    const PAGE_SIZE: usize = 50;
    let mut keys = Vec::new();
    let mut offset = 0usize;
    loop {
        let separator = if filter.is_empty() { "" } else { "&" };
        let query = format!("{filter}{separator}_count={PAGE_SIZE}&_offset={offset}");
        let result = state.search_engine.search(bucket, resource_type, &query).await.map_err(search_to_api)?;
        let page_len = result.entries.len();
        keys.extend(result.entries.into_iter().filter(|e| matches!(e.mode, SearchMode::Match)).map(|e| e.key));
        if keys.len() >= fhirdock_storage::MAX_GROUP_MEMBERS || page_len < PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }
    keys.truncate(fhirdock_storage::MAX_GROUP_MEMBERS);
    Ok(keys)
}

/// Extracts `(resourceType, filter)` back out of a stored Group's
/// creation-filter extension (`"<Type>?<query>"`), the same shape
/// `fhirdock_db_couchbase::group::create` wrote it in.
fn group_filter_parts(group: &Value) -> Result<(String, String), ApiError> {
    let stored = group
        .get("extension")
        .and_then(Value::as_array)
        .and_then(|exts| exts.iter().find(|e| e.get("url").and_then(Value::as_str) == Some(fhirdock_storage::group_extensions::CREATION_FILTER)))
        .and_then(|ext| ext.get("valueString"))
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::internal("Group is missing its creation-filter extension"))?;

    let (resource_type, filter) = stored.split_once('?').unwrap_or((stored, ""));
    Ok((resource_type.to_string(), filter.to_string()))
}

pub async fn group_create(
    State(state): State<SharedState>,
    Path(bucket): Path<String>,
    actor: Option<Extension<AuthenticatedActor>>,
    axum::Json(request): axum::Json<GroupCreateRequest>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = group_create_inner(&state, &bucket, request).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "group_create", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn group_create_inner(state: &SharedState, bucket: &str, request: GroupCreateRequest) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;
    let member_refs = resolve_group_members(state, bucket, &request.resource_type, &request.filter).await?;
    let group = state
        .storage
        .group_create(bucket, &request.name, &request.resource_type, &request.filter, &request.created_by, member_refs)
        .await
        .map_err(storage_to_api)?;
    Ok(ApiResponse::new(group, StatusCode::CREATED).into_response())
}

pub async fn group_refresh(
    State(state): State<SharedState>,
    Path((bucket, id)): Path<(String, String)>,
    actor: Option<Extension<AuthenticatedActor>>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = group_refresh_inner(&state, &bucket, &id).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "group_refresh", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn group_refresh_inner(state: &SharedState, bucket: &str, id: &str) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;
    let existing = state
        .storage
        .read(bucket, "Group", id)
        .await
        .map_err(storage_to_api)?
        .ok_or_else(|| ApiError::not_found(format!("Group/{id} not found")))?
        .resource;

    let (resource_type, filter) = group_filter_parts(&existing)?;
    let member_refs = resolve_group_members(state, bucket, &resource_type, &filter).await?;
    let group = state.storage.group_refresh(bucket, id, member_refs).await.map_err(storage_to_api)?;
    Ok(ApiResponse::ok(group).into_response())
}

pub async fn group_remove_member(
    State(state): State<SharedState>,
    Path((bucket, id)): Path<(String, String)>,
    Query(query): Query<RemoveMemberQuery>,
    actor: Option<Extension<AuthenticatedActor>>,
) -> Response {
    let started = Instant::now();
    let sub = actor_sub(actor);
    let result = group_remove_member_inner(&state, &bucket, &id, &query.reference).await;
    let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure };
    record_audit(&state, "group_remove_member", &bucket, sub, outcome, started).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn group_remove_member_inner(state: &SharedState, bucket: &str, id: &str, reference: &str) -> Result<Response, ApiError> {
    load_bucket_config(state, bucket).await?;
    let group = state.storage.group_remove_member(bucket, id, reference).await.map_err(storage_to_api)?;
    Ok(ApiResponse::ok(group).into_response())
}

// -------------------------
// Health
// -------------------------

pub async fn liveness() -> Response {
    StatusCode::OK.into_response()
}

pub async fn readiness(State(state): State<SharedState>) -> Response {
    if fhirdock_storage::gateway::is_ready(state.gateway.as_ref()) {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}
