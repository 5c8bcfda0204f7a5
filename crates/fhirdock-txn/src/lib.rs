//! # fhirdock-txn
//!
//! Transaction and batch Bundle processing: `urn:uuid` resolution, the
//! POST/PUT-PATCH/DELETE entry ordering, and atomic multi-document commit
//! for `Bundle.type = transaction`, independent per-entry commit for
//! `Bundle.type = batch` (spec.md §4.4).
//!
//! Bypasses `fhirdock_storage::FhirStorage` entirely and builds
//! [`fhirdock_storage::gateway::DocMutation`] batches directly against the
//! [`fhirdock_storage::gateway::Gateway`] trait — the single-resource write
//! path (`fhirdock-db-couchbase`) explicitly declines to support
//! multi-entry transactions for this reason.

pub mod bundle;
pub mod error;
pub mod processor;
pub mod response;
pub mod uuid_resolution;

pub use bundle::{BundleEntry, BundleType, EntryMethod, ParsedBundle, parse_bundle};
pub use error::TxnError;
pub use processor::TransactionProcessor;
pub use response::{EntryOutcome, response_bundle};
pub use uuid_resolution::{UuidResolution, resolve_ids, rewrite_references};
