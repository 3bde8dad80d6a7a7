//! Error taxonomy for the gateway and its collaborators.
//!
//! Errors that occur *before* any bytes have been streamed to the caller are
//! modeled as [`GatewayError`] and map cleanly onto HTTP rejections. Once the
//! response stream has started, no status code can be sent anymore; faults
//! from that point on travel through the stream itself as [`RelayError`]
//! items, terminating it with an error signal rather than a clean close.

use miette::Diagnostic;
use thiserror::Error;

/// Request-scoped failures raised before the response stream begins.
#[derive(Debug, Error, Diagnostic)]
pub enum GatewayError {
    /// No authenticated identity could be resolved for the request.
    #[error("unauthorized")]
    #[diagnostic(code(astrochat::gateway::auth))]
    Auth,

    /// The inbound request was malformed.
    #[error("invalid request: {0}")]
    #[diagnostic(
        code(astrochat::gateway::validation),
        help("The chat body must be a JSON object with a non-empty `messages` array.")
    )]
    Validation(String),

    /// A credential required to reach the selected backend is missing.
    #[error("upstream configuration error: {0}")]
    #[diagnostic(
        code(astrochat::gateway::upstream_config),
        help("Set HYBRID_CHAT_ENDPOINT or GEMINI_API_KEY before serving chat requests.")
    )]
    UpstreamConfig(&'static str),

    /// The selected backend returned a non-success response or could not be
    /// reached. There is no fallback to another backend once one was chosen.
    #[error("upstream call failed: {message}")]
    #[diagnostic(code(astrochat::gateway::upstream_call))]
    UpstreamCall {
        /// HTTP status from the backend, when a response was received at all.
        status: Option<u16>,
        message: String,
    },
}

impl GatewayError {
    /// Build an [`UpstreamCall`](Self::UpstreamCall) from a transport error
    /// that produced no HTTP response.
    pub fn upstream(err: reqwest::Error) -> Self {
        GatewayError::UpstreamCall {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Fault encountered after streaming has begun.
///
/// Carried as the error item of the outgoing byte stream; the HTTP layer can
/// only terminate the connection at that point.
#[derive(Debug, Error)]
#[error("stream relay fault: {0}")]
pub struct RelayError(pub String);

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError(err.to_string())
    }
}

/// Errors from the embedding provider.
#[derive(Debug, Error, Diagnostic)]
pub enum EmbeddingError {
    /// The input text was empty after trimming.
    #[error("embedding input is empty")]
    #[diagnostic(code(astrochat::embedding::empty_input))]
    EmptyInput,

    /// The upstream embedding model call failed. No retries are attempted.
    #[error("embedding provider error: {message}")]
    #[diagnostic(code(astrochat::embedding::provider))]
    Provider { message: String },
}

/// Errors from the persistence collaborator (conversations, messages,
/// embeddings, vector search).
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("storage error: {0}")]
    #[diagnostic(code(astrochat::store::storage))]
    Storage(String),
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}
