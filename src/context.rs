//! Prompt assembly from retrieved context and the running conversation.
//!
//! Retrieval failure is never fatal to a chat turn: the assembler logs and
//! proceeds with an empty context block.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::message::{ChatMessage, backend_role};
use crate::search::{SearchOrder, SearchQuery, SearchResult, SemanticSearchEngine};
use crate::store::timestamp;

/// System instruction prepended to every generation prompt.
pub const SYSTEM_INSTRUCTION: &str = "You are a knowledgeable space biology expert. \
Help users understand astrobiology, space medicine, extremophiles, and life in space. \
Provide accurate, engaging, and educational responses.";

/// Header line above the enumerated context entries.
const CONTEXT_HEADER: &str =
    "Here are relevant notes from your past chats. Use them when helpful:";

/// Fixed retrieval parameters for chat turns.
const RETRIEVAL_LIMIT: usize = 6;
const RETRIEVAL_MIN_SIMILARITY: f64 = 0.72;

/// One prompt turn in the backend's role vocabulary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: String,
    pub text: String,
}

impl PromptTurn {
    fn new(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            text: text.into(),
        }
    }
}

/// The assembled generation prompt.
#[derive(Clone, Debug)]
pub struct AssembledPrompt {
    pub system_instruction: String,
    /// Rendered context block; `None` when retrieval found nothing or failed.
    pub context_block: Option<String>,
    /// Conversation turns with roles mapped for the backend; blank turns
    /// already dropped.
    pub turns: Vec<PromptTurn>,
    /// The latest non-blank user utterance, if any.
    pub question: Option<String>,
}

impl AssembledPrompt {
    /// Flatten into the ordered turn list the backends consume:
    /// system instruction, context block (if non-empty), conversation turns.
    #[must_use]
    pub fn contents(&self) -> Vec<PromptTurn> {
        let mut contents = Vec::with_capacity(self.turns.len() + 2);
        contents.push(PromptTurn::new("user", self.system_instruction.clone()));
        if let Some(block) = &self.context_block {
            contents.push(PromptTurn::new("user", block.clone()));
        }
        contents.extend(self.turns.iter().cloned());
        contents
    }

    /// Single-text rendering used by the hybrid backend's `context` field.
    #[must_use]
    pub fn conversation_context(&self) -> String {
        let mut parts: Vec<String> = vec![self.system_instruction.clone()];
        if let Some(block) = &self.context_block {
            parts.push(block.clone());
        }
        for turn in &self.turns {
            parts.push(format!("{}: {}", turn.role, turn.text));
        }
        parts.retain(|part| !part.is_empty());
        parts.join("\n\n")
    }
}

/// Builds generation prompts, pulling semantically relevant prior messages
/// through the search engine.
pub struct ContextAssembler {
    engine: SemanticSearchEngine,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ContextAssembler {
    pub fn new(engine: SemanticSearchEngine, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { engine, embedder }
    }

    /// Assemble the prompt for a chat turn. Infallible: retrieval errors
    /// degrade to an empty context block.
    pub async fn assemble(&self, owner_id: &str, messages: &[ChatMessage]) -> AssembledPrompt {
        let question = messages
            .iter()
            .rev()
            .find(|msg| msg.has_role(ChatMessage::USER) && !msg.is_blank())
            .map(|msg| msg.content.clone());

        let context_block = match &question {
            Some(question) => self.retrieve(owner_id, question).await,
            None => None,
        };

        let turns = messages
            .iter()
            .filter(|msg| !msg.is_blank())
            .map(|msg| PromptTurn::new(backend_role(&msg.role), msg.content.clone()))
            .collect();

        AssembledPrompt {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            context_block,
            turns,
            question,
        }
    }

    async fn retrieve(&self, owner_id: &str, question: &str) -> Option<String> {
        let query = SearchQuery {
            limit: RETRIEVAL_LIMIT,
            min_similarity: RETRIEVAL_MIN_SIMILARITY,
            order: SearchOrder::Similarity,
            ..Default::default()
        };

        let vector = match self.embedder.embed(question).await {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!(error = %err, "failed to embed retrieval query; continuing without context");
                return None;
            }
        };
        match self.engine.search(owner_id, &vector, &query).await {
            Ok(page) if page.results.is_empty() => None,
            Ok(page) => Some(render_context_block(&page.results)),
            Err(err) => {
                tracing::warn!(error = %err, "semantic retrieval failed; continuing without context");
                None
            }
        }
    }
}

/// Deterministic rendering of retrieved results:
/// `N. [ROLE • conversationTitle • ISO-8601 timestamp • sim X.XX] content`.
fn render_context_block(results: &[SearchResult]) -> String {
    let mut lines = vec![CONTEXT_HEADER.to_string()];
    for (index, item) in results.iter().take(RETRIEVAL_LIMIT).enumerate() {
        lines.push(format!(
            "{}. [{} • {} • {} • sim {:.2}] {}",
            index + 1,
            item.role.to_uppercase(),
            item.conversation_title,
            timestamp(item.created_at),
            item.similarity,
            item.content
        ));
    }
    lines.join("\n")
}
