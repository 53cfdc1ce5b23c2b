//! Chat streaming shared by the relay and the voice client

mod consumer;
pub mod sse;

pub use consumer::{ResponseConsumer, StreamedResponse};

/// A message in chat-completion form
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}
