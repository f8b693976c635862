//! Interactive component payloads (button presses).
//!
//! Slack delivers these as `block_actions` payloads, either inside a Socket
//! Mode `interactive` envelope or as the `payload` form field over HTTP.

use serde::{Deserialize, Serialize};

use crate::messages::{CANCEL_ACTION_ID, CONFIRM_ACTION_ID};

/// A `block_actions` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockActionPayload {
    /// Payload type (`block_actions`).
    #[serde(rename = "type")]
    pub payload_type: String,
    /// User who pressed the control.
    pub user: ActionUser,
    /// Channel the originating message lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ActionChannel>,
    /// Container of the originating message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ActionContainer>,
    /// URL for replacing or deleting the originating message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_url: Option<String>,
    /// The actions that fired (Slack sends exactly one for buttons).
    #[serde(default)]
    pub actions: Vec<BlockAction>,
}

/// User section of an action payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Channel section of an action payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionChannel {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Container section of an action payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionContainer {
    #[serde(rename = "type")]
    pub container_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub is_ephemeral: bool,
}

/// A single fired action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockAction {
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    /// Value carried by the control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_ts: Option<String>,
}

/// Everything a handler needs to resolve a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    /// User who pressed the button.
    pub user_id: String,
    /// Channel of the originating message.
    pub channel_id: Option<String>,
    /// Timestamp of the originating message.
    pub message_ts: Option<String>,
    /// URL for replacing or deleting the originating message.
    pub response_url: Option<String>,
}

impl From<&BlockActionPayload> for ActionContext {
    fn from(payload: &BlockActionPayload) -> Self {
        let container = payload.container.as_ref();
        Self {
            user_id: payload.user.id.clone(),
            channel_id: payload
                .channel
                .as_ref()
                .map(|c| c.id.clone())
                .or_else(|| container.and_then(|c| c.channel_id.clone())),
            message_ts: container.and_then(|c| c.message_ts.clone()),
            response_url: payload.response_url.clone(),
        }
    }
}

/// Parsed button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAction {
    /// Confirm a pending bulk add; `channel_id` is the correlation token.
    ConfirmAddAll {
        channel_id: String,
        context: ActionContext,
    },
    /// Cancel a pending bulk add.
    CancelAddAll { context: ActionContext },
    /// Anything else (including a confirm with no token).
    Unknown {
        action_id: String,
        context: ActionContext,
    },
}

/// Parse the first action of a payload.
pub fn parse_action(payload: &BlockActionPayload) -> Option<ParsedAction> {
    let action = payload.actions.first()?;
    let context = ActionContext::from(payload);

    let parsed = match action.action_id.as_str() {
        CONFIRM_ACTION_ID => match action.value.as_deref().map(str::trim) {
            Some(channel_id) if !channel_id.is_empty() => ParsedAction::ConfirmAddAll {
                channel_id: channel_id.to_string(),
                context,
            },
            _ => ParsedAction::Unknown {
                action_id: action.action_id.clone(),
                context,
            },
        },
        CANCEL_ACTION_ID => ParsedAction::CancelAddAll { context },
        other => ParsedAction::Unknown {
            action_id: other.to_string(),
            context,
        },
    };

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(action_id: &str, value: Option<&str>) -> BlockActionPayload {
        let mut action = serde_json::json!({
            "action_id": action_id,
            "block_id": "add_all_confirmation",
            "type": "button",
            "action_ts": "1700000000.000100"
        });
        if let Some(value) = value {
            action["value"] = serde_json::json!(value);
        }
        serde_json::from_value(serde_json::json!({
            "type": "block_actions",
            "user": {"id": "U1", "username": "alice"},
            "container": {
                "type": "message",
                "message_ts": "1700000000.000001",
                "channel_id": "C9",
                "is_ephemeral": true
            },
            "channel": {"id": "C9", "name": "general"},
            "response_url": "https://hooks.slack.com/actions/T/1/x",
            "actions": [action]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_confirm() {
        let parsed = parse_action(&payload(CONFIRM_ACTION_ID, Some("C9"))).unwrap();
        match parsed {
            ParsedAction::ConfirmAddAll {
                channel_id,
                context,
            } => {
                assert_eq!(channel_id, "C9");
                assert_eq!(context.user_id, "U1");
                assert_eq!(context.message_ts.as_deref(), Some("1700000000.000001"));
                assert_eq!(
                    context.response_url.as_deref(),
                    Some("https://hooks.slack.com/actions/T/1/x")
                );
            }
            other => panic!("Expected confirm, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_confirm_without_token_is_unknown() {
        let parsed = parse_action(&payload(CONFIRM_ACTION_ID, None)).unwrap();
        assert!(matches!(parsed, ParsedAction::Unknown { .. }));

        let parsed = parse_action(&payload(CONFIRM_ACTION_ID, Some("  "))).unwrap();
        assert!(matches!(parsed, ParsedAction::Unknown { .. }));
    }

    #[test]
    fn test_parse_cancel_and_unknown() {
        let parsed = parse_action(&payload(CANCEL_ACTION_ID, None)).unwrap();
        assert!(matches!(parsed, ParsedAction::CancelAddAll { .. }));

        let parsed = parse_action(&payload("something_else", Some("x"))).unwrap();
        assert!(matches!(parsed, ParsedAction::Unknown { action_id, .. } if action_id == "something_else"));
    }

    #[test]
    fn test_parse_no_actions() {
        let mut p = payload(CANCEL_ACTION_ID, None);
        p.actions.clear();
        assert!(parse_action(&p).is_none());
    }

    #[test]
    fn test_context_falls_back_to_container_channel() {
        let mut p = payload(CANCEL_ACTION_ID, None);
        p.channel = None;
        let ctx = ActionContext::from(&p);
        assert_eq!(ctx.channel_id.as_deref(), Some("C9"));
    }
}
