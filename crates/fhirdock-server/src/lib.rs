//! HTTP surface for the FHIR R4 multi-tenant server: routing, handlers,
//! bearer-token authentication, bucket bootstrap, and the audit log.
//! `main.rs` wires the concrete Couchbase-backed dependencies and drives
//! [`server::run`]; everything else stays backend-agnostic behind
//! [`fhirdock_storage`]'s and [`fhirdock_search`]'s traits so the same
//! router is exercised in tests against `fhirdock-db-memory`.

pub mod audit;
pub mod authn;
pub mod bootstrap;
pub mod cli;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod patch;
pub mod server;

pub use authn::{AuthError, DynTokenVerifier, JwtVerifier, TokenClaims, TokenVerifier};
pub use cli::Cli;
pub use server::{build_app, run, AppState, SharedState};

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber honoring `RUST_LOG`, defaulting to
/// `info` when unset.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
