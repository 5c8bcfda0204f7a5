//! # fhirdock-search
//!
//! Search parameter parsing and full-text-search query translation: a
//! bundled registry of recognized search parameters, a query-string
//! parser/validator, an FTS clause builder, chained-search resolution, and
//! `_include`/`_revinclude` expansion, tied together by [`SearchEngine`].

pub mod bundled;
pub mod chaining;
pub mod common;
pub mod engine;
pub mod fts;
pub mod include;
pub mod parameters;
pub mod parser;
pub mod registry;

pub use bundled::{build_registry, bundled_parameters};
pub use chaining::{ChainError, MAX_CHAIN_DEPTH};
pub use common::register_common_parameters;
pub use engine::{SearchEngine, SearchEngineConfig, SearchEngineError};
pub use fts::{FtsBuildError, RESOURCES_INDEX};
pub use include::{IncludeError, IncludeSpec, MAX_BUNDLE_SIZE};
pub use parameters::{SearchModifier, SearchParameter, SearchParameterType, SearchPrefix};
pub use parser::{parse_query, ParsedParam, ParsedParameters, ParsedValue, SearchValidationError};
pub use registry::SearchParameterRegistry;
