//! Translation of the per-crate error taxonomies (`StorageError`,
//! `fhirdock_search::SearchEngineError`, `fhirdock_txn::TxnError`) onto
//! [`fhirdock_api::ApiError`], the single HTTP-facing taxonomy. Every
//! handler converts at its boundary exactly once, matching the teacher's
//! convention of one conversion site per error family rather than
//! threading backend errors through the router.

use fhirdock_api::ApiError;
use fhirdock_search::SearchEngineError;
use fhirdock_storage::StorageError;
use fhirdock_txn::TxnError;

pub fn storage_to_api(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound { resource_type, id } => {
            ApiError::not_found(format!("{resource_type}/{id} not found"))
        }
        StorageError::Gone { resource_type, id } => {
            ApiError::gone(format!("{resource_type}/{id} has been deleted"))
        }
        StorageError::AlreadyExists { resource_type, id } => {
            ApiError::conflict(format!("{resource_type}/{id} already exists"))
        }
        StorageError::VersionConflict { expected, actual } => ApiError::precondition_failed(
            format!("If-Match '{expected}' does not match current version '{actual}'"),
        ),
        StorageError::PreconditionFailed { message } => ApiError::precondition_failed(message),
        StorageError::InvalidResource { message } => ApiError::bad_request(message),
        StorageError::TransactionError { message } => ApiError::internal(message),
        StorageError::ConnectionError { message } | StorageError::DatabaseUnavailable { message } => {
            ApiError::database_unavailable(message)
        }
        StorageError::Internal { message } => ApiError::internal(message),
    }
}

pub fn search_to_api(err: SearchEngineError) -> ApiError {
    match err {
        SearchEngineError::Validation(e) => ApiError::bad_request(e.to_string()),
        SearchEngineError::Fts(e) => ApiError::bad_request(e.to_string()),
        SearchEngineError::Include(e) => ApiError::bad_request(e.to_string()),
        SearchEngineError::Chain(e) => ApiError::bad_request(e.to_string()),
        SearchEngineError::Storage(e) => storage_to_api(e),
    }
}

pub fn txn_to_api(err: TxnError) -> ApiError {
    match err {
        TxnError::MalformedBundle(message) => ApiError::bad_request(message),
        TxnError::EntryFailed { index, message } => {
            ApiError::bad_request(format!("entry {index}: {message}"))
        }
        TxnError::Storage(e) => storage_to_api(e),
    }
}
