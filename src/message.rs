use serde::{Deserialize, Serialize};

/// A single turn of a conversation, as submitted by the caller.
///
/// Messages carry a role (typically "user", "assistant", or "system") and
/// text content. This is the inbound shape of the chat endpoint; persisted
/// messages additionally carry identity and timing (see
/// [`MessageRecord`](crate::store::MessageRecord)).
///
/// # Examples
///
/// ```
/// use astrochat::message::ChatMessage;
///
/// let user_msg = ChatMessage::user("What is extremophile biology?");
/// let assistant_msg = ChatMessage::assistant("Extremophiles thrive in...");
///
/// assert!(user_msg.has_role(ChatMessage::USER));
/// assert!(!user_msg.is_blank());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: String,
    /// The text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// AI assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt or instruction message role.
    pub const SYSTEM: &'static str = "system";

    /// Creates a new message with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Returns true if the content is empty after trimming.
    ///
    /// Blank turns are dropped from assembled prompts.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Map a conversation role onto the generation backend's role vocabulary.
///
/// The primary backend speaks "user"/"model"; assistant turns are renamed,
/// user and system turns pass through unchanged.
#[must_use]
pub fn backend_role(role: &str) -> &str {
    match role {
        ChatMessage::ASSISTANT => "model",
        other => other,
    }
}

/// Returns true if `role` is one of the three conversation roles.
#[must_use]
pub fn is_known_role(role: &str) -> bool {
    matches!(
        role,
        ChatMessage::USER | ChatMessage::ASSISTANT | ChatMessage::SYSTEM
    )
}
