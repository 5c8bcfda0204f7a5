//! Router assembly and the shared application state every handler closes
//! over. Mirrors the teacher's `server.rs` shape: an `AppState` of `Arc`s,
//! a `build_app` that lays out the route table and middleware stack, and
//! a thin runner that drives `axum::serve` with graceful shutdown.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use fhirdock_config::AppConfig;
use fhirdock_search::SearchEngine;
use fhirdock_storage::gateway::DynGateway;
use fhirdock_storage::DynStorage;
use fhirdock_txn::TransactionProcessor;

use crate::authn::DynTokenVerifier;

/// Everything a handler needs, shared behind `Arc` and cloned cheaply per
/// request via axum's `State` extractor.
pub struct AppState {
    pub storage: DynStorage,
    pub search_engine: Arc<SearchEngine>,
    pub txn_processor: Arc<TransactionProcessor>,
    pub gateway: DynGateway,
    pub config: AppConfig,
    pub token_verifier: DynTokenVerifier,
}

pub type SharedState = Arc<AppState>;

/// Builds the full route table: unauthenticated health/metadata routes,
/// and the bearer-token-guarded `/fhir/{bucket}/...` group.
pub fn build_app(state: SharedState) -> Router {
    let fhir_routes = Router::new()
        .route("/fhir/{bucket}", post(crate::handlers::transaction_bundle))
        .route(
            "/fhir/{bucket}/{resource_type}",
            get(crate::handlers::search)
                .post(crate::handlers::create)
                .put(crate::handlers::conditional_update)
                .delete(crate::handlers::conditional_delete),
        )
        .route(
            "/fhir/{bucket}/{resource_type}/{id}",
            get(crate::handlers::read).put(crate::handlers::update).delete(crate::handlers::delete).patch(crate::handlers::patch),
        )
        .route("/fhir/{bucket}/{resource_type}/{id}/_history", get(crate::handlers::history))
        .route("/fhir/{bucket}/{resource_type}/{id}/_history/{vid}", get(crate::handlers::vread))
        .route("/fhir/{bucket}/Group", post(crate::handlers::group_create))
        .route("/fhir/{bucket}/Group/{id}/$refresh", post(crate::handlers::group_refresh))
        .route("/fhir/{bucket}/Group/{id}/member", axum::routing::delete(crate::handlers::group_remove_member))
        .layer(axum::middleware::from_fn_with_state(state.token_verifier.clone(), crate::middleware::require_bearer_token));

    let health_routes = Router::new()
        .route("/health/liveness", get(crate::handlers::liveness))
        .route("/health/readiness", get(crate::handlers::readiness))
        .route("/health", get(crate::handlers::readiness))
        .route("/fhir/{bucket}/metadata", get(crate::handlers::capability_statement));

    Router::new()
        .merge(fhir_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(crate::middleware::request_id))
                .layer(axum::middleware::from_fn(crate::middleware::content_negotiation))
                .layer(CompressionLayer::new())
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

/// Runs the server until a SIGINT/SIGTERM is received, then drains
/// in-flight requests before returning.
pub async fn run(bind_addr: &str, state: SharedState) -> anyhow::Result<()> {
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}
