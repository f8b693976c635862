//! Message formatting for Slack.
//!
//! Block Kit types plus the fixed texts the bot sends: the bulk-add
//! confirmation prompt, its outcome report and the canned replies.

use serde::{Deserialize, Serialize};

use crate::error::SlackError;
use crate::membership::Member;

/// Block id of the confirm/cancel actions block.
pub const CONFIRMATION_BLOCK_ID: &str = "add_all_confirmation";
/// Action id of the confirm button.
pub const CONFIRM_ACTION_ID: &str = "confirm_add_all";
/// Action id of the cancel button.
pub const CANCEL_ACTION_ID: &str = "cancel_add_all";

/// Reply to `/ping`.
pub const PONG_TEXT: &str = "Pong!";
/// Reply to an app mention.
pub const ALIVE_TEXT: &str = "👋 I'm alive! Try `/ping` or say 'hello'!";
/// Reported when nobody needs to be added.
pub const ALREADY_COMPLETE_TEXT: &str = "✅ All workspace members are already in this channel!";
/// Logged (and used as fallback text) when a prompt is cancelled.
pub const CANCELLED_TEXT: &str = "❌ Cancelled. No users were added.";

/// Slack Block Kit block types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackBlock {
    /// Section block (main content).
    Section { text: SlackTextObject },
    /// Actions block (buttons).
    Actions {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        elements: Vec<SlackBlockElement>,
    },
}

/// Slack text object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackTextObject {
    #[serde(rename = "type")]
    pub text_type: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<bool>,
}

impl SlackTextObject {
    /// Create a plain text object.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text_type: "plain_text".to_string(),
            text: text.into(),
            emoji: Some(true),
        }
    }

    /// Create a mrkdwn text object.
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            text_type: "mrkdwn".to_string(),
            text: text.into(),
            emoji: None,
        }
    }
}

/// Button style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

/// Slack block element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackBlockElement {
    /// Button element.
    Button {
        text: SlackTextObject,
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        style: Option<ButtonStyle>,
    },
}

impl SlackBlockElement {
    /// Create a button.
    pub fn button(text: impl Into<String>, action_id: impl Into<String>) -> Self {
        SlackBlockElement::Button {
            text: SlackTextObject::plain(text),
            action_id: action_id.into(),
            value: None,
            style: None,
        }
    }

    /// Attach a value that is echoed back when the button is pressed.
    pub fn with_value(self, new_value: impl Into<String>) -> Self {
        match self {
            SlackBlockElement::Button {
                text,
                action_id,
                style,
                ..
            } => SlackBlockElement::Button {
                text,
                action_id,
                value: Some(new_value.into()),
                style,
            },
        }
    }

    /// Set the button style.
    pub fn with_style(self, new_style: ButtonStyle) -> Self {
        match self {
            SlackBlockElement::Button {
                text,
                action_id,
                value,
                ..
            } => SlackBlockElement::Button {
                text,
                action_id,
                value,
                style: Some(new_style),
            },
        }
    }
}

/// Slack message content with blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackMessageContent {
    /// Fallback text for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Block Kit blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<SlackBlock>>,
    /// Thread timestamp (for replies).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl SlackMessageContent {
    /// Create a new message content.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set fallback text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set blocks.
    pub fn with_blocks(mut self, blocks: Vec<SlackBlock>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    /// Set thread timestamp (for replies).
    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    /// Text plus a single mrkdwn section carrying the same text.
    pub fn section_text(text: impl Into<String>) -> Self {
        let text = text.into();
        SlackMessageBuilder::new()
            .fallback(text.clone())
            .section(text)
            .build()
    }
}

/// Builder for creating rich Slack messages.
pub struct SlackMessageBuilder {
    blocks: Vec<SlackBlock>,
    fallback_text: Option<String>,
}

impl SlackMessageBuilder {
    /// Create a new message builder.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            fallback_text: None,
        }
    }

    /// Set fallback text for notifications.
    pub fn fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = Some(text.into());
        self
    }

    /// Add a section with mrkdwn text.
    pub fn section(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(SlackBlock::Section {
            text: SlackTextObject::mrkdwn(text),
        });
        self
    }

    /// Add an actions block.
    pub fn actions(mut self, block_id: impl Into<String>, elements: Vec<SlackBlockElement>) -> Self {
        self.blocks.push(SlackBlock::Actions {
            block_id: Some(block_id.into()),
            elements,
        });
        self
    }

    /// Build the message content.
    pub fn build(self) -> SlackMessageContent {
        SlackMessageContent {
            text: self.fallback_text,
            blocks: Some(self.blocks),
            thread_ts: None,
        }
    }
}

impl Default for SlackMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a user mention.
pub fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}

/// Space-separated mentions for a list of members.
pub fn mention_list(members: &[Member]) -> String {
    members
        .iter()
        .map(|m| mention(&m.id))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reply to a message containing "hello".
pub fn greeting(user_id: &str) -> String {
    format!("Hey there {}!", mention(user_id))
}

/// The ephemeral confirmation prompt for a bulk add.
///
/// The confirm button carries the target channel id as its value; that is
/// the only state the prompt holds.
pub fn format_confirmation_prompt(channel_id: &str, to_add: &[Member]) -> SlackMessageContent {
    let mentions = mention_list(to_add);
    let count = to_add.len();

    SlackMessageBuilder::new()
        .fallback(format!(
            "⚠️ You're about to add {} members to this channel:\n\n{}",
            count, mentions
        ))
        .section(format!(
            "⚠️ *Add {} members to this channel?*\n\n{}",
            count, mentions
        ))
        .actions(
            CONFIRMATION_BLOCK_ID,
            vec![
                SlackBlockElement::button("✅ Confirm", CONFIRM_ACTION_ID)
                    .with_value(channel_id)
                    .with_style(ButtonStyle::Primary),
                SlackBlockElement::button("❌ Cancel", CANCEL_ACTION_ID)
                    .with_style(ButtonStyle::Danger),
            ],
        )
        .build()
}

/// Outcome line posted to the channel after a confirmed bulk add.
pub fn format_outcome_text(succeeded: usize, failed: usize) -> String {
    let mut text = format!(
        "✅ Successfully added {} members to this channel!",
        succeeded
    );
    if failed > 0 {
        text.push_str(&format!("\n⚠️ Failed to add {} users.", failed));
    }
    text
}

/// Error reply for a failed bulk-add step.
pub fn format_error_text(error: &SlackError) -> String {
    if error.is_channel_error() {
        format!(
            "❌ Error: {}\nI'm probably not a member of this channel yet. Invite me with `/invite @rollcall` and try again.",
            error
        )
    } else {
        format!("❌ Error: {}", error)
    }
}
