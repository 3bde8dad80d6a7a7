use std::sync::Arc;

use miette::IntoDiagnostic;
use tokio::net::TcpListener;

use astrochat::config::GatewayConfig;
use astrochat::context::ContextAssembler;
use astrochat::embedding::GeminiEmbeddingProvider;
use astrochat::gateway::StreamingGateway;
use astrochat::search::SemanticSearchEngine;
use astrochat::server::{AppState, Authenticator, BearerTokenAuthenticator};
use astrochat::store::MessageStore;
use astrochat::worker::EmbeddingWorker;
use astrochat::{server, telemetry};

#[tokio::main]
async fn main() -> miette::Result<()> {
    telemetry::init();
    let config = GatewayConfig::from_env();

    let store = MessageStore::open(&config.db_path)
        .await
        .map_err(|err| miette::miette!("failed to open message store: {err}"))?;

    let client = reqwest::Client::new();
    let embedder: Arc<dyn astrochat::embedding::EmbeddingProvider> =
        Arc::new(GeminiEmbeddingProvider::new(client.clone(), &config));
    let engine = SemanticSearchEngine::new(store.clone());
    let assembler = ContextAssembler::new(engine.clone(), embedder.clone());
    let gateway = Arc::new(StreamingGateway::with_client(
        client,
        config.clone(),
        assembler,
    ));
    let worker = Arc::new(EmbeddingWorker::spawn(embedder.clone(), store.clone()));

    let auth: Arc<dyn Authenticator> = match &config.auth_token {
        Some(token) => Arc::new(BearerTokenAuthenticator::new(token)),
        None => {
            tracing::warn!("ASTROCHAT_AUTH_TOKEN is not set; all requests will be rejected");
            Arc::new(BearerTokenAuthenticator::new(String::new()))
        }
    };

    let app = server::router(AppState {
        gateway,
        auth,
        store,
        worker,
        embedder,
        engine,
    });

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .into_diagnostic()?;
    tracing::info!(addr = %config.bind_addr, "gateway listening");
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}
