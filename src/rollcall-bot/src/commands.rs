//! Slack slash command handling.
//!
//! Supports the following slash commands:
//! - `/ping` - Liveness check, answered with "Pong!"
//! - `/add-all` - Add every active workspace member to the current channel
//!
//! Commands are acknowledged by the transport as soon as they arrive; the
//! actual answer goes through `response_url` or the Web API afterwards.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Slack slash command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashCommandPayload {
    /// Team ID.
    #[serde(default)]
    pub team_id: String,
    /// Channel ID where command was invoked.
    pub channel_id: String,
    /// Channel name.
    #[serde(default)]
    pub channel_name: String,
    /// User ID who invoked the command.
    pub user_id: String,
    /// Username.
    #[serde(default)]
    pub user_name: String,
    /// The command (e.g., "/add-all").
    pub command: String,
    /// Text after the command.
    #[serde(default)]
    pub text: String,
    /// URL for delayed responses.
    #[serde(default)]
    pub response_url: String,
    /// Trigger ID for opening modals.
    #[serde(default)]
    pub trigger_id: String,
}

/// Response type for slash command responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Only visible to the user who invoked the command.
    #[default]
    Ephemeral,
}

/// Delayed response sent via response_url.
///
/// Can be sent up to 30 minutes after the original command or action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayedResponse {
    /// Response type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    /// Whether to replace the original message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_original: Option<bool>,
    /// Whether to delete the original message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_original: Option<bool>,
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Block Kit blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
}

impl DelayedResponse {
    /// Create a new delayed response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set Block Kit blocks.
    pub fn with_blocks(mut self, blocks: serde_json::Value) -> Self {
        self.blocks = Some(blocks);
        self
    }

    /// Set response type to ephemeral.
    pub fn ephemeral(mut self) -> Self {
        self.response_type = Some(ResponseType::Ephemeral);
        self
    }

    /// Replace the original message.
    pub fn replace_original(mut self) -> Self {
        self.replace_original = Some(true);
        self
    }

    /// Delete the original message.
    pub fn delete_original(mut self) -> Self {
        self.delete_original = Some(true);
        self
    }
}

/// Parsed slash command.
#[derive(Debug, Clone)]
pub enum ParsedCommand {
    /// /ping
    Ping { context: CommandContext },
    /// /add-all
    AddAll { context: CommandContext },
    /// Unknown command.
    Unknown {
        /// The command name.
        command: String,
        /// Context from the slash command.
        context: CommandContext,
    },
}

impl ParsedCommand {
    /// Context of the invocation, whatever the command.
    pub fn context(&self) -> &CommandContext {
        match self {
            ParsedCommand::Ping { context }
            | ParsedCommand::AddAll { context }
            | ParsedCommand::Unknown { context, .. } => context,
        }
    }
}

/// Context information from a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// User ID who invoked the command.
    pub user_id: String,
    /// Username, for logging.
    pub user_name: String,
    /// Channel ID where command was invoked.
    pub channel_id: String,
    /// URL for delayed responses.
    pub response_url: String,
}

impl From<&SlashCommandPayload> for CommandContext {
    fn from(payload: &SlashCommandPayload) -> Self {
        Self {
            user_id: payload.user_id.clone(),
            user_name: payload.user_name.clone(),
            channel_id: payload.channel_id.clone(),
            response_url: payload.response_url.clone(),
        }
    }
}

/// Parse a slash command payload into a structured command.
pub fn parse_command(payload: &SlashCommandPayload) -> ParsedCommand {
    let context = CommandContext::from(payload);

    match payload.command.trim().to_lowercase().as_str() {
        "/ping" => ParsedCommand::Ping { context },
        "/add-all" => {
            if !payload.text.trim().is_empty() {
                warn!("/add-all ignores its arguments: {}", payload.text.trim());
            }
            ParsedCommand::AddAll { context }
        }
        _ => ParsedCommand::Unknown {
            command: payload.command.clone(),
            context,
        },
    }
}
