//! Layered runtime configuration for fhirdock: defaults, an optional
//! TOML file, and `FHIRDOCK__*` environment overrides, matching the
//! teacher's `config`/`dotenvy`-based loading idiom.

pub mod app;
pub mod error;

pub use app::{
    ApiConfig, AppConfig, BucketProvisioning, CircuitConfig, FhirConfig, GroupConfig,
    SearchLimitsConfig,
};
pub use error::ConfigError;
