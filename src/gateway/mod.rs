//! The streaming protocol gateway.
//!
//! Produces one ordered output byte stream (or one complete text body) for a
//! chat turn, regardless of which backend served it and regardless of
//! whether that backend streams or buffers.
//!
//! Backend selection is closed on failure: when a hybrid endpoint is
//! configured it is used exclusively, and a hybrid failure never falls back
//! to the primary backend. Without a hybrid endpoint the primary backend is
//! used and requires a credential, checked before any network call.

mod hybrid;
mod primary;

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::config::GatewayConfig;
use crate::context::ContextAssembler;
use crate::errors::{GatewayError, RelayError};
use crate::message::ChatMessage;

/// Boxed byte stream handed to the HTTP layer.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

/// Normalized reply body: incremental chunks or one complete text.
pub enum ReplyBody {
    /// Chunked output; a fault mid-stream terminates it with an error item.
    Stream(BoxByteStream),
    /// One complete (non-streamed) text body.
    Full(String),
}

impl std::fmt::Debug for ReplyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyBody::Stream(_) => f.debug_tuple("Stream").finish(),
            ReplyBody::Full(text) => f.debug_tuple("Full").field(text).finish(),
        }
    }
}

/// The gateway's normalized response.
#[derive(Debug)]
pub struct ChatReply {
    pub content_type: String,
    pub body: ReplyBody,
}

impl ChatReply {
    pub(crate) fn stream(content_type: impl Into<String>, body: BoxByteStream) -> Self {
        Self {
            content_type: content_type.into(),
            body: ReplyBody::Stream(body),
        }
    }

    pub(crate) fn full(text: String) -> Self {
        Self {
            content_type: "text/plain; charset=utf-8".to_string(),
            body: ReplyBody::Full(text),
        }
    }
}

/// Streaming chat gateway.
///
/// Holds an explicitly constructed HTTP client injected at build time; there
/// is no process-wide provider client. One outbound call per request to
/// exactly one backend; no retries, no response caching.
pub struct StreamingGateway {
    client: reqwest::Client,
    config: GatewayConfig,
    assembler: ContextAssembler,
}

impl StreamingGateway {
    pub fn new(config: GatewayConfig, assembler: ContextAssembler) -> Self {
        Self::with_client(reqwest::Client::new(), config, assembler)
    }

    /// Build with a caller-supplied client (tests substitute one here).
    pub fn with_client(
        client: reqwest::Client,
        config: GatewayConfig,
        assembler: ContextAssembler,
    ) -> Self {
        Self {
            client,
            config,
            assembler,
        }
    }

    /// Serve one chat turn for `owner_id`.
    ///
    /// Validation and configuration are checked before any network call,
    /// including the retrieval call, so rejected requests touch the network
    /// zero times.
    pub async fn respond(
        &self,
        owner_id: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatReply, GatewayError> {
        if messages.is_empty() {
            return Err(GatewayError::Validation(
                "messages must be a non-empty array".to_string(),
            ));
        }
        if self.config.no_backend_available() {
            return Err(GatewayError::UpstreamConfig(
                "no hybrid endpoint configured and GEMINI_API_KEY is not set",
            ));
        }

        let prompt = self.assembler.assemble(owner_id, messages).await;

        match self.config.hybrid_endpoint.as_deref() {
            Some(endpoint) => {
                hybrid::call_hybrid(&self.client, &self.config, endpoint, &prompt).await
            }
            None => primary::call_primary(&self.client, &self.config, &prompt).await,
        }
    }
}
