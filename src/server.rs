//! HTTP surface: chat streaming plus conversation and message management.
//!
//! The handlers stay thin; all chat semantics live in
//! [`StreamingGateway`](crate::gateway::StreamingGateway). Errors raised
//! before streaming begins map to status codes here. Faults after streaming
//! begins cannot change the status anymore; they terminate the body.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Deserialize;
use serde_json::json;

use crate::embedding::EmbeddingProvider;
use crate::errors::{EmbeddingError, GatewayError};
use crate::gateway::{ReplyBody, StreamingGateway};
use crate::message::{ChatMessage, is_known_role};
use crate::search::{SearchOrder, SearchQuery, SemanticSearchEngine};
use crate::store::MessageStore;
use crate::worker::{EmbeddingJob, EmbeddingWorker};

/// The identity a request resolved to.
#[derive(Clone, Debug)]
pub struct AuthedUser {
    pub id: String,
}

/// Resolves request headers to an identity, or rejects the request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<AuthedUser>;
}

/// Bundled authenticator: a single static bearer token maps to a single
/// owner identity. Deployments with real identity swap in their own
/// [`Authenticator`].
pub struct BearerTokenAuthenticator {
    token: String,
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<AuthedUser> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?;
        if !self.token.is_empty() && token == self.token {
            Some(AuthedUser {
                id: "local".to_string(),
            })
        } else {
            None
        }
    }
}

/// Shared application state behind the router.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<StreamingGateway>,
    pub auth: Arc<dyn Authenticator>,
    pub store: MessageStore,
    pub worker: Arc<EmbeddingWorker>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub engine: SemanticSearchEngine,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/search/semantic", post(semantic_search))
        .route("/conversations", post(create_conversation))
        .route("/conversations/{id}/messages", post(append_message))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::extract::Json<ChatRequest>,
) -> Response {
    let Some(user) = state.auth.authenticate(&headers).await else {
        return error_response(GatewayError::Auth);
    };

    match state.gateway.respond(&user.id, &body.messages).await {
        Ok(reply) => {
            let builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, reply.content_type)
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive");
            let result = match reply.body {
                ReplyBody::Stream(stream) => builder.body(Body::from_stream(stream)),
                ReplyBody::Full(text) => builder.body(Body::from(text)),
            };
            match result {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(error = %err, "failed to build chat response");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        Err(err) => error_response(err),
    }
}

/// Inbound shape of the semantic search endpoint. `query` is required; the
/// rest fall back to the engine defaults when omitted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SemanticSearchRequest {
    query: String,
    limit: Option<usize>,
    page: Option<usize>,
    similarity_threshold: Option<f64>,
    conversation_id: Option<String>,
    role: Option<String>,
    order: Option<SearchOrder>,
}

/// Maximum query length accepted by the search endpoint.
const SEARCH_QUERY_MAX_CHARS: usize = 1000;
/// Maximum page size accepted by the search endpoint (tighter than the
/// engine's own cap).
const SEARCH_LIMIT_MAX: usize = 20;
const SEARCH_LIMIT_DEFAULT: usize = 5;

fn validate_search_request(body: &SemanticSearchRequest) -> Result<SearchQuery, GatewayError> {
    if body.query.trim().is_empty() {
        return Err(GatewayError::Validation(
            "query must not be empty".to_string(),
        ));
    }
    if body.query.chars().count() > SEARCH_QUERY_MAX_CHARS {
        return Err(GatewayError::Validation(format!(
            "query must be at most {SEARCH_QUERY_MAX_CHARS} characters"
        )));
    }
    let limit = body.limit.unwrap_or(SEARCH_LIMIT_DEFAULT);
    if !(1..=SEARCH_LIMIT_MAX).contains(&limit) {
        return Err(GatewayError::Validation(format!(
            "limit must be between 1 and {SEARCH_LIMIT_MAX}"
        )));
    }
    let min_similarity = body.similarity_threshold.unwrap_or(0.7);
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(GatewayError::Validation(
            "similarityThreshold must be between 0 and 1".to_string(),
        ));
    }
    if let Some(role) = &body.role {
        if !is_known_role(role) {
            return Err(GatewayError::Validation(format!("unknown role: {role}")));
        }
    }

    Ok(SearchQuery {
        limit,
        page: body.page.unwrap_or(1).max(1),
        min_similarity,
        conversation_id: body.conversation_id.clone(),
        role: body.role.clone(),
        order: body.order.unwrap_or(SearchOrder::Similarity),
    })
}

async fn semantic_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::extract::Json<SemanticSearchRequest>,
) -> Response {
    let Some(user) = state.auth.authenticate(&headers).await else {
        return error_response(GatewayError::Auth);
    };
    let query = match validate_search_request(&body) {
        Ok(query) => query,
        Err(err) => return error_response(err),
    };

    let vector = match state.embedder.embed(&body.query).await {
        Ok(vector) => vector,
        Err(EmbeddingError::EmptyInput) => {
            return error_response(GatewayError::Validation(
                "query must not be empty".to_string(),
            ));
        }
        Err(err) => {
            return error_response(GatewayError::UpstreamCall {
                status: None,
                message: err.to_string(),
            });
        }
    };

    match state.engine.search(&user.id, &vector, &query).await {
        Ok(page) => axum::Json(json!({
            "results": page.results,
            "count": page.results.len(),
            "total": page.total,
        }))
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "semantic search failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateConversationRequest {
    #[serde(default)]
    title: Option<String>,
}

async fn create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::extract::Json<CreateConversationRequest>,
) -> Response {
    let Some(user) = state.auth.authenticate(&headers).await else {
        return error_response(GatewayError::Auth);
    };

    let title = body.title.as_deref().unwrap_or("New conversation");
    match state.store.create_conversation(&user.id, title).await {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to create conversation");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppendMessageRequest {
    role: String,
    content: String,
}

async fn append_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    body: axum::extract::Json<AppendMessageRequest>,
) -> Response {
    let Some(user) = state.auth.authenticate(&headers).await else {
        return error_response(GatewayError::Auth);
    };
    if !is_known_role(&body.role) {
        return error_response(GatewayError::Validation(format!(
            "unknown role: {}",
            body.role
        )));
    }
    if body.content.trim().is_empty() {
        return error_response(GatewayError::Validation(
            "message content must not be empty".to_string(),
        ));
    }

    match state
        .store
        .conversation_owned_by(&conversation_id, &user.id)
        .await
    {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "ownership lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match state
        .store
        .insert_message(&conversation_id, &body.role, &body.content)
        .await
    {
        Ok(record) => {
            // The message is durable; the embedding catches up off-path.
            state.worker.enqueue(EmbeddingJob {
                message_id: record.id.clone(),
                content: record.content.clone(),
            });
            (StatusCode::CREATED, axum::Json(record)).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to insert message");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn error_response(err: GatewayError) -> Response {
    let status = match &err {
        GatewayError::Auth => StatusCode::UNAUTHORIZED,
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::UpstreamConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::UpstreamCall { .. } => StatusCode::BAD_GATEWAY,
    };
    let body = axum::Json(json!({ "error": err.to_string() }));
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn bearer_authenticator_accepts_only_its_token() {
        let auth = BearerTokenAuthenticator::new("secret");
        assert!(auth.authenticate(&bearer("Bearer secret")).await.is_some());
        assert!(auth.authenticate(&bearer("Bearer wrong")).await.is_none());
        assert!(auth.authenticate(&bearer("secret")).await.is_none());
        assert!(auth.authenticate(&HeaderMap::new()).await.is_none());
    }

    fn search_body(query: &str) -> SemanticSearchRequest {
        SemanticSearchRequest {
            query: query.to_string(),
            limit: None,
            page: None,
            similarity_threshold: None,
            conversation_id: None,
            role: None,
            order: None,
        }
    }

    #[test]
    fn search_validation_applies_defaults() {
        let query = validate_search_request(&search_body("brine pools")).unwrap();
        assert_eq!(query.limit, SEARCH_LIMIT_DEFAULT);
        assert_eq!(query.page, 1);
        assert_eq!(query.min_similarity, 0.7);
        assert_eq!(query.order, SearchOrder::Similarity);
    }

    #[test]
    fn search_validation_rejects_out_of_range_inputs() {
        let empty = validate_search_request(&search_body("   "));
        assert!(matches!(empty, Err(GatewayError::Validation(_))));

        let long = validate_search_request(&search_body(&"q".repeat(1001)));
        assert!(matches!(long, Err(GatewayError::Validation(_))));

        let mut body = search_body("ok");
        body.limit = Some(21);
        assert!(matches!(
            validate_search_request(&body),
            Err(GatewayError::Validation(_))
        ));
        body.limit = Some(0);
        assert!(matches!(
            validate_search_request(&body),
            Err(GatewayError::Validation(_))
        ));

        let mut body = search_body("ok");
        body.similarity_threshold = Some(1.5);
        assert!(matches!(
            validate_search_request(&body),
            Err(GatewayError::Validation(_))
        ));

        let mut body = search_body("ok");
        body.role = Some("robot".to_string());
        assert!(matches!(
            validate_search_request(&body),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn gateway_errors_map_to_expected_statuses() {
        let cases = [
            (GatewayError::Auth, StatusCode::UNAUTHORIZED),
            (
                GatewayError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::UpstreamConfig("missing"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GatewayError::UpstreamCall {
                    status: Some(500),
                    message: "boom".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(error_response(err).status(), expected);
        }
    }
}
