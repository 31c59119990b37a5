//! Chat transport trait.
//!
//! Implemented by the `diagbot-transport` crate for Telegram, the console and
//! a scripted mock.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::ConversationId;

/// A chat backend that delivers user text and sends replies.
///
/// Messages for one conversation must be returned in the order they were
/// sent; the serve loop relies on it.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Human-readable transport name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Wait for the next batch of inbound messages.
    ///
    /// `Ok(None)` means the transport is closed and no more messages will
    /// arrive. An empty batch is allowed (e.g. a long poll that timed out).
    async fn receive(&self) -> anyhow::Result<Option<Vec<InboundMessage>>>;

    /// Deliver one reply.
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()>;

    /// The bot's own username as the backend reports it, if it has one.
    ///
    /// Called once before serving; an error here aborts startup.
    async fn identity(&self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    /// Decide what the serve loop does after `receive` fails.
    fn classify_error(&self, _error: &anyhow::Error) -> ErrorAction {
        ErrorAction::Retry
    }
}

/// How the serve loop reacts to a failed receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Poll again after the configured retry delay.
    Retry,
    /// Poll again once the backend's requested delay has passed.
    RetryAfter(Duration),
    /// Retrying cannot help; stop serving.
    Stop,
}

/// Text received from a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation: ConversationId,
    pub text: String,
}

impl InboundMessage {
    pub fn new(conversation: impl Into<ConversationId>, text: impl Into<String>) -> Self {
        Self {
            conversation: conversation.into(),
            text: text.into(),
        }
    }
}

/// Text to send back to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub conversation: ConversationId,
    pub text: String,
    /// Ask the client to hide any custom reply keyboard.
    #[serde(default)]
    pub remove_keyboard: bool,
}
