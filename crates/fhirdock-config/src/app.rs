//! The server's recognized runtime configuration: defaults merged with an
//! optional TOML file and `FHIRDOCK__*` environment overrides, in that
//! priority order (lowest to highest), mirroring the teacher's own
//! default/file/environment layering.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use fhirdock_storage::bucket::{BucketConfig, ValidationMode, PROFILE_BASE_R4, PROFILE_US_CORE};

use crate::error::ConfigError;

/// The complete set of configuration this server recognizes. Every field
/// has a documented default; an operator only needs to set the values
/// they want to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fhir: FhirConfig,
    pub circuit: CircuitConfig,
    pub search: SearchLimitsConfig,
    pub group: GroupConfig,
    pub api: ApiConfig,
    /// Per-bucket provisioning policy, keyed by bucket name. Read at
    /// startup when seeding a bucket's `fhir-config` document; never
    /// consulted again afterward (the stored `BucketConfig` document is
    /// authoritative from then on).
    pub buckets: HashMap<String, BucketProvisioning>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fhir: FhirConfig::default(),
            circuit: CircuitConfig::default(),
            search: SearchLimitsConfig::default(),
            group: GroupConfig::default(),
            api: ApiConfig::default(),
            buckets: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration layered as defaults < `path` (if given and
    /// present) < `FHIRDOCK__*` environment variables, then validates the
    /// result. Calls `dotenvy::dotenv()` first so a `.env` file in the
    /// working directory can populate those environment variables in
    /// development.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .set_default("fhir.bundle_fastpath_enabled", true)?
            .set_default("circuit.reset_timeout_ms", 30_000i64)?
            .set_default("search.max_count_per_page", 50i64)?
            .set_default("search.max_bundle_size", 100i64)?
            .set_default("group.max_members", 10_000i64)?
            .set_default("api.token_validity_days", 90i64)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FHIRDOCK")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder.build()?;
        let app: AppConfig = raw.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.max_count_per_page == 0 {
            return Err(ConfigError::validation("search.max_count_per_page must be > 0"));
        }
        if self.search.max_bundle_size == 0 {
            return Err(ConfigError::validation("search.max_bundle_size must be > 0"));
        }
        if self.search.max_count_per_page > self.search.max_bundle_size {
            return Err(ConfigError::validation(
                "search.max_count_per_page must be <= search.max_bundle_size",
            ));
        }
        if self.group.max_members == 0 {
            return Err(ConfigError::validation("group.max_members must be > 0"));
        }
        if self.circuit.reset_timeout_ms == 0 {
            return Err(ConfigError::validation("circuit.reset_timeout_ms must be > 0"));
        }
        for (name, bucket) in &self.buckets {
            if bucket.validation_profile != PROFILE_BASE_R4 && bucket.validation_profile != PROFILE_US_CORE {
                return Err(ConfigError::validation(format!(
                    "buckets.{name}.validation_profile must be '{PROFILE_BASE_R4}' or '{PROFILE_US_CORE}'"
                )));
            }
        }
        Ok(())
    }
}

/// `fhir.bundle.fastpath.enabled`: master switch for the streamed Bundle
/// assembler (spec.md §4.6). When disabled, every search and
/// transaction-response Bundle goes through the parsed assembly path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirConfig {
    pub bundle_fastpath_enabled: bool,
}

impl Default for FhirConfig {
    fn default() -> Self {
        Self { bundle_fastpath_enabled: true }
    }
}

/// `circuit.reset.timeout.ms`: how long the circuit breaker stays `Open`
/// before a half-open probe is allowed (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub reset_timeout_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self { reset_timeout_ms: 30_000 }
    }
}

/// `search.max.count.per.page` / `search.max.bundle.size` (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimitsConfig {
    pub max_count_per_page: u32,
    pub max_bundle_size: u32,
}

impl Default for SearchLimitsConfig {
    fn default() -> Self {
        Self { max_count_per_page: 50, max_bundle_size: 100 }
    }
}

/// `group.max.members` (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub max_members: u32,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self { max_members: 10_000 }
    }
}

/// `api.token.validity.days`: lifetime assigned to tokens issued by the
/// admin token endpoint, consumed by `fhirdock-server::authn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub token_validity_days: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { token_validity_days: 90 }
    }
}

/// Seed policy for a bucket's `fhir-config` document, matching
/// [`BucketConfig`]'s fields (spec.md §3 "Bucket config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketProvisioning {
    #[serde(default)]
    pub validation_mode: ValidationMode,
    #[serde(default = "default_validation_profile")]
    pub validation_profile: String,
    #[serde(default)]
    pub allow_unknown_elements: bool,
}

fn default_validation_profile() -> String {
    PROFILE_BASE_R4.to_string()
}

impl BucketProvisioning {
    pub fn to_bucket_config(&self) -> BucketConfig {
        BucketConfig::new(self.validation_mode, self.validation_profile.clone())
            .with_allow_unknown_elements(self.allow_unknown_elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = AppConfig::default();
        assert!(config.fhir.bundle_fastpath_enabled);
        assert_eq!(config.circuit.reset_timeout_ms, 30_000);
        assert_eq!(config.search.max_count_per_page, 50);
        assert_eq!(config.search.max_bundle_size, 100);
        assert_eq!(config.group.max_members, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_count_per_page_exceeding_bundle_size() {
        let mut config = AppConfig::default();
        config.search.max_count_per_page = 200;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_count_per_page"));
    }

    #[test]
    fn validate_rejects_unknown_validation_profile() {
        let mut config = AppConfig::default();
        config.buckets.insert(
            "acme".to_string(),
            BucketProvisioning {
                validation_mode: ValidationMode::Strict,
                validation_profile: "custom".to_string(),
                allow_unknown_elements: false,
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("acme"));
    }

    #[test]
    fn load_applies_file_overrides_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fhirdock.toml");
        std::fs::write(
            &path,
            r#"
[search]
max_count_per_page = 25

[group]
max_members = 500
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.search.max_count_per_page, 25);
        assert_eq!(config.search.max_bundle_size, 100);
        assert_eq!(config.group.max_members, 500);
    }

    #[test]
    fn load_tolerates_a_missing_file() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/fhirdock.toml"))).unwrap();
        assert_eq!(config.circuit.reset_timeout_ms, 30_000);
    }

    #[test]
    fn bucket_provisioning_converts_to_a_bucket_config() {
        let provisioning = BucketProvisioning {
            validation_mode: ValidationMode::Lenient,
            validation_profile: PROFILE_US_CORE.to_string(),
            allow_unknown_elements: true,
        };
        let bucket_config = provisioning.to_bucket_config();
        assert!(bucket_config.is_fhir);
        assert_eq!(bucket_config.validation_profile, PROFILE_US_CORE);
        assert!(!bucket_config.rejects_unknown_elements());
    }
}
