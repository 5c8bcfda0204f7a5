//! Command-line entry point: bind address, config file path, and the
//! Couchbase connection settings, all overridable via environment
//! variables per the teacher's `clap(env)` convention.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "fhirdock-server", about = "FHIR R4 multi-tenant server")]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "FHIRDOCK_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Path to an optional TOML config file layered under environment
    /// overrides; see `fhirdock_config::AppConfig::load`.
    #[arg(long, env = "FHIRDOCK_CONFIG_PATH")]
    pub config_path: Option<std::path::PathBuf>,

    #[arg(long, env = "FHIRDOCK_COUCHBASE_CONNECTION_STRING", default_value = "couchbase://localhost")]
    pub couchbase_connection_string: String,

    #[arg(long, env = "FHIRDOCK_COUCHBASE_USERNAME", default_value = "Administrator")]
    pub couchbase_username: String,

    #[arg(long, env = "FHIRDOCK_COUCHBASE_PASSWORD", default_value = "")]
    pub couchbase_password: String,

    /// HMAC secret used to verify bearer tokens. In production this must
    /// be overridden; the default is only usable against a local/dev
    /// deployment.
    #[arg(long, env = "FHIRDOCK_JWT_SECRET", default_value = "dev-secret-change-me")]
    pub jwt_secret: String,
}

impl Cli {
    pub fn couchbase_config(&self) -> fhirdock_db_couchbase::CouchbaseConfig {
        fhirdock_db_couchbase::CouchbaseConfig::new(
            self.couchbase_connection_string.clone(),
            self.couchbase_username.clone(),
            self.couchbase_password.clone(),
        )
    }
}
