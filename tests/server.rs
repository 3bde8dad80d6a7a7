//! HTTP surface tests over an ephemeral listener.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use astrochat::config::GatewayConfig;
use astrochat::context::ContextAssembler;
use astrochat::embedding::{EmbeddingProvider, MockEmbeddingProvider};
use astrochat::gateway::StreamingGateway;
use astrochat::search::SemanticSearchEngine;
use astrochat::server::{AppState, Authenticator, BearerTokenAuthenticator, router};
use astrochat::store::MessageStore;
use astrochat::worker::EmbeddingWorker;

const TOKEN: &str = "test-token";

/// Serve the router on an ephemeral port; returns the base URL and the
/// seeded store.
async fn spawn_server() -> (String, MessageStore) {
    let store = MessageStore::open_in_memory().await.unwrap();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new());
    let engine = SemanticSearchEngine::new(store.clone());
    let assembler = ContextAssembler::new(engine.clone(), embedder.clone());
    let gateway = Arc::new(StreamingGateway::new(GatewayConfig::default(), assembler));
    let worker = Arc::new(EmbeddingWorker::spawn(embedder.clone(), store.clone()));
    let auth: Arc<dyn Authenticator> = Arc::new(BearerTokenAuthenticator::new(TOKEN));

    let app = router(AppState {
        gateway,
        auth,
        store: store.clone(),
        worker,
        embedder,
        engine,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("server error: {err:?}");
        }
    });
    (format!("http://{addr}"), store)
}

async fn seed_message(store: &MessageStore, owner: &str, content: &str) {
    let conv = store.create_conversation(owner, "Seeded").await.unwrap();
    let msg = store.insert_message(&conv.id, "user", content).await.unwrap();
    let vector = MockEmbeddingProvider::new().embed(content).await.unwrap();
    store.upsert_embedding(&msg.id, &vector).await.unwrap();
}

#[tokio::test]
async fn semantic_search_returns_matching_messages() {
    let (base, store) = spawn_server().await;
    // The bundled authenticator maps the token to owner "local".
    seed_message(&store, "local", "Tardigrades survive hard vacuum").await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/search/semantic"))
        .bearer_auth(TOKEN)
        .json(&json!({ "query": "Tardigrades survive hard vacuum" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["total"], 1);
    assert_eq!(
        body["results"][0]["content"],
        "Tardigrades survive hard vacuum"
    );
    assert!(body["results"][0]["similarity"].as_f64().unwrap() > 0.99);
}

#[tokio::test]
async fn semantic_search_does_not_leak_other_owners_messages() {
    let (base, store) = spawn_server().await;
    seed_message(&store, "someone-else", "secret lunar notes").await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/search/semantic"))
        .bearer_auth(TOKEN)
        .json(&json!({ "query": "secret lunar notes", "similarityThreshold": 0.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 0);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn semantic_search_requires_authentication() {
    let (base, _store) = spawn_server().await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/search/semantic"))
        .json(&json!({ "query": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn semantic_search_rejects_invalid_parameters() {
    let (base, _store) = spawn_server().await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "query": "" }),
        json!({ "query": "ok", "limit": 0 }),
        json!({ "query": "ok", "limit": 21 }),
        json!({ "query": "ok", "similarityThreshold": 1.5 }),
        json!({ "query": "ok", "role": "robot" }),
    ] {
        let response = client
            .post(format!("{base}/api/search/semantic"))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "body {body} should be rejected");
    }
}

#[tokio::test]
async fn appended_message_becomes_searchable() {
    let (base, _store) = spawn_server().await;
    let client = reqwest::Client::new();

    let conv: Value = client
        .post(format!("{base}/conversations"))
        .bearer_auth(TOKEN)
        .json(&json!({ "title": "Europa" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let conv_id = conv["id"].as_str().unwrap();

    let response = client
        .post(format!("{base}/conversations/{conv_id}/messages"))
        .bearer_auth(TOKEN)
        .json(&json!({ "role": "user", "content": "subsurface ocean chemistry" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // The embedding catches up off the request path.
    let mut found = false;
    for _ in 0..50 {
        let body: Value = client
            .post(format!("{base}/api/search/semantic"))
            .bearer_auth(TOKEN)
            .json(&json!({ "query": "subsurface ocean chemistry" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["count"] == 1 {
            found = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(found, "appended message never became searchable");
}
