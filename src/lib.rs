//! Streaming chat gateway with retrieval-augmented context.
//!
//! The crate serves chat turns over HTTP: each request selects exactly one
//! generation backend (a retrieval-augmented "hybrid" endpoint when
//! configured, otherwise the Gemini API), assembles a prompt enriched with
//! semantically similar prior messages, and relays the backend's output as a
//! single ordered byte stream.
//!
//! Core pieces:
//!
//! - [`gateway::StreamingGateway`]: backend selection, one outbound call per
//!   request, normalized streaming/full replies.
//! - [`decoder::LineProtocolDecoder`]: incremental decoding of the primary
//!   backend's `data: `-prefixed event lines.
//! - [`relay::preview_stream`]: buffer-then-splice previewing of one-shot
//!   response bodies.
//! - [`search::SemanticSearchEngine`]: cosine-similarity search over stored
//!   message embeddings, scoped per owner.
//! - [`context::ContextAssembler`]: prompt assembly from retrieved context
//!   and the running conversation.
//! - [`store::MessageStore`] / [`worker::EmbeddingWorker`]: synchronous
//!   persistence with asynchronous embedding catch-up.

pub mod config;
pub mod context;
pub mod decoder;
pub mod embedding;
pub mod errors;
pub mod gateway;
pub mod message;
pub mod relay;
pub mod search;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod worker;
