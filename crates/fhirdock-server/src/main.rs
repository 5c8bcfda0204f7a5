use std::sync::Arc;

use clap::Parser;

use fhirdock_db_couchbase::{CouchbaseGateway, CouchbaseStorage};
use fhirdock_search::{build_registry, SearchEngine, SearchEngineConfig};
use fhirdock_server::{bootstrap, AppState, Cli, JwtVerifier};
use fhirdock_storage::gateway::DynGateway;
use fhirdock_txn::TransactionProcessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fhirdock_server::init_tracing();

    let cli = Cli::parse();
    let config = fhirdock_config::AppConfig::load(cli.config_path.as_deref())?;

    let gateway: DynGateway = Arc::new(CouchbaseGateway::connect(&cli.couchbase_config()).await?);
    let storage = Arc::new(CouchbaseStorage::new(gateway.clone()));
    let search_engine = Arc::new(SearchEngine::new(
        gateway.clone(),
        Arc::new(build_registry()),
        SearchEngineConfig { max_count: config.search.max_count_per_page as usize, ..SearchEngineConfig::default() },
    ));
    let txn_processor = Arc::new(TransactionProcessor::new(gateway.clone(), search_engine.clone()));
    let token_verifier = Arc::new(JwtVerifier::new(cli.jwt_secret.clone()));

    bootstrap::provision_buckets(&gateway, &config).await;

    let state = Arc::new(AppState {
        storage,
        search_engine,
        txn_processor,
        gateway,
        config,
        token_verifier,
    });

    fhirdock_server::run(&cli.bind_addr, state).await
}
