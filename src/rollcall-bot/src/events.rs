//! Event handling for Slack events.
//!
//! Handles the following Events API events:
//! - `app_mention` - When the bot is @mentioned (health check)
//! - `message` - Channel messages (keyword replies)
//! - `channel_created` - A new public channel (auto-join)
//!
//! Raw payloads from either transport are decoded once, here, into the
//! closed [`Inbound`] type.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commands::SlashCommandPayload;
use crate::error::{SlackError, SlackResult};
use crate::interactions::BlockActionPayload;

/// Slack event types that we handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    /// App mention event (@rollcall in a channel).
    AppMention(AppMentionEvent),
    /// Message event.
    Message(MessageEvent),
    /// A public channel was created.
    ChannelCreated(ChannelCreatedEvent),
    /// Unknown event type (for forward compatibility).
    #[serde(other)]
    Unknown,
}

/// Event payload for app mentions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMentionEvent {
    /// User who mentioned the bot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Text of the message (including the mention).
    #[serde(default)]
    pub text: String,
    /// Channel where the mention occurred.
    pub channel: String,
    /// Timestamp of the message.
    pub ts: String,
    /// Thread timestamp (if in a thread).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

/// Event payload for messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// User who sent the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Text of the message.
    #[serde(default)]
    pub text: String,
    /// Channel where the message was sent.
    pub channel: String,
    /// Channel type (im, channel, group, mpim).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<String>,
    /// Timestamp of the message.
    pub ts: String,
    /// Thread timestamp (if in a thread).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Subtype of message (e.g., "bot_message").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Bot ID (if message is from a bot).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
}

impl MessageEvent {
    /// Check if this is a bot message (should be ignored).
    pub fn is_bot_message(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    /// Edits, deletions, joins and other subtyped messages are not user chatter.
    pub fn is_plain_user_message(&self) -> bool {
        self.subtype.is_none() && !self.is_bot_message() && self.user.is_some()
    }
}

/// Event payload for `channel_created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCreatedEvent {
    pub channel: CreatedChannel,
}

/// The channel announced by `channel_created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedChannel {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

/// Socket Mode envelope wrapping events, commands and interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeEnvelope {
    /// Envelope ID for acknowledgment (absent on `hello`/`disconnect`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_id: Option<String>,
    /// Type of payload.
    #[serde(rename = "type")]
    pub envelope_type: String,
    /// Actual payload; its shape depends on `envelope_type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Disconnect reason, when `envelope_type` is `disconnect`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Event callback payload (`events_api` envelopes and HTTP event requests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    /// Team ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// The actual event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<serde_json::Value>,
    /// Payload type (`event_callback` or `url_verification`).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    pub payload_type: Option<String>,
    /// Challenge to echo for `url_verification`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    /// Event ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Socket Mode acknowledgment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeAck {
    /// Envelope ID being acknowledged.
    pub envelope_id: String,
    /// Optional response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl SocketModeAck {
    /// Create a simple acknowledgment.
    pub fn new(envelope_id: impl Into<String>) -> Self {
        Self {
            envelope_id: envelope_id.into(),
            payload: None,
        }
    }
}

/// A decoded inbound request, regardless of transport.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Slash command invocation.
    Command(SlashCommandPayload),
    /// Button press.
    Action(BlockActionPayload),
    /// Events API notification.
    Event(SlackEvent),
}

/// Parse a raw event from an event callback.
pub fn parse_event(payload: &EventPayload) -> SlackResult<SlackEvent> {
    let event_json = payload
        .event
        .as_ref()
        .ok_or_else(|| SlackError::InvalidPayload("Missing event field".to_string()))?;

    let event_type = event_json
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown");

    debug!("Parsing event type: {}", event_type);

    match event_type {
        "app_mention" => Ok(SlackEvent::AppMention(serde_json::from_value(
            event_json.clone(),
        )?)),
        "message" => Ok(SlackEvent::Message(serde_json::from_value(
            event_json.clone(),
        )?)),
        "channel_created" => Ok(SlackEvent::ChannelCreated(serde_json::from_value(
            event_json.clone(),
        )?)),
        _ => {
            debug!("Ignoring event type: {}", event_type);
            Ok(SlackEvent::Unknown)
        }
    }
}

/// Decode an interactive payload; only `block_actions` is handled.
pub fn parse_interactive(value: serde_json::Value) -> SlackResult<Option<BlockActionPayload>> {
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();

    if kind != "block_actions" {
        debug!("Ignoring interactive payload type: {}", kind);
        return Ok(None);
    }

    Ok(Some(serde_json::from_value(value)?))
}

/// Decode the payload of a Socket Mode envelope.
///
/// Returns `Ok(None)` for control envelopes (`hello`, `disconnect`) and
/// payload kinds the bot does not handle.
pub fn decode_envelope(envelope: &SocketModeEnvelope) -> SlackResult<Option<Inbound>> {
    let payload = match (&envelope.payload, envelope.envelope_type.as_str()) {
        (_, "hello") | (_, "disconnect") => return Ok(None),
        (Some(payload), _) => payload.clone(),
        (None, other) => {
            return Err(SlackError::InvalidPayload(format!(
                "{} envelope without payload",
                other
            )));
        }
    };

    match envelope.envelope_type.as_str() {
        "events_api" => {
            let payload: EventPayload = serde_json::from_value(payload)?;
            Ok(Some(Inbound::Event(parse_event(&payload)?)))
        }
        "slash_commands" => Ok(Some(Inbound::Command(serde_json::from_value(payload)?))),
        "interactive" => Ok(parse_interactive(payload)?.map(Inbound::Action)),
        other => {
            debug!("Unknown envelope type: {}", other);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(kind: &str, payload: serde_json::Value) -> SocketModeEnvelope {
        serde_json::from_value(serde_json::json!({
            "envelope_id": "env-1",
            "type": kind,
            "payload": payload,
            "accepts_response_payload": false
        }))
        .unwrap()
    }

    #[test]
    fn test_message_event_is_bot_message() {
        let bot_event = MessageEvent {
            user: None,
            text: "bot message".to_string(),
            channel: "C12345".to_string(),
            channel_type: None,
            ts: "1234567890.123456".to_string(),
            thread_ts: None,
            subtype: Some("bot_message".to_string()),
            bot_id: Some("B12345".to_string()),
        };
        assert!(bot_event.is_bot_message());
        assert!(!bot_event.is_plain_user_message());

        let user_event = MessageEvent {
            user: Some("U12345".to_string()),
            bot_id: None,
            subtype: None,
            ..bot_event.clone()
        };
        assert!(!user_event.is_bot_message());
        assert!(user_event.is_plain_user_message());

        let edited = MessageEvent {
            subtype: Some("message_changed".to_string()),
            ..user_event
        };
        assert!(!edited.is_plain_user_message());
    }

    #[test]
    fn test_socket_mode_ack_serialization() {
        let ack = SocketModeAck::new("env-123");
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            serde_json::json!({"envelope_id": "env-123"})
        );
    }

    #[test]
    fn test_decode_events_api_app_mention() {
        let env = envelope(
            "events_api",
            serde_json::json!({
                "type": "event_callback",
                "team_id": "T1",
                "event": {
                    "type": "app_mention",
                    "user": "U1",
                    "text": "<@B1> you there?",
                    "channel": "C1",
                    "ts": "1.0"
                }
            }),
        );

        match decode_envelope(&env).unwrap() {
            Some(Inbound::Event(SlackEvent::AppMention(event))) => {
                assert_eq!(event.user.as_deref(), Some("U1"));
                assert_eq!(event.channel, "C1");
            }
            other => panic!("Expected app mention, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_app_mention_without_user() {
        let env = envelope(
            "events_api",
            serde_json::json!({
                "type": "event_callback",
                "event": {
                    "type": "app_mention",
                    "bot_id": "B2",
                    "channel": "C1",
                    "ts": "1.0"
                }
            }),
        );

        match decode_envelope(&env).unwrap() {
            Some(Inbound::Event(SlackEvent::AppMention(event))) => {
                assert!(event.user.is_none());
                assert!(event.text.is_empty());
            }
            other => panic!("Expected app mention, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_channel_created() {
        let env = envelope(
            "events_api",
            serde_json::json!({
                "type": "event_callback",
                "event": {
                    "type": "channel_created",
                    "channel": {"id": "C77", "name": "fresh", "created": 1700000000, "creator": "U1"}
                }
            }),
        );

        match decode_envelope(&env).unwrap() {
            Some(Inbound::Event(SlackEvent::ChannelCreated(event))) => {
                assert_eq!(event.channel.id, "C77");
                assert_eq!(event.channel.name.as_deref(), Some("fresh"));
            }
            other => panic!("Expected channel_created, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_event_type() {
        let env = envelope(
            "events_api",
            serde_json::json!({"type": "event_callback", "event": {"type": "reaction_added"}}),
        );
        assert!(matches!(
            decode_envelope(&env).unwrap(),
            Some(Inbound::Event(SlackEvent::Unknown))
        ));
    }

    #[test]
    fn test_decode_slash_command() {
        let env = envelope(
            "slash_commands",
            serde_json::json!({
                "command": "/add-all",
                "text": "",
                "user_id": "U1",
                "user_name": "alice",
                "channel_id": "C1",
                "team_id": "T1",
                "response_url": "https://hooks.slack.com/commands/1",
                "trigger_id": "t"
            }),
        );
        match decode_envelope(&env).unwrap() {
            Some(Inbound::Command(cmd)) => assert_eq!(cmd.command, "/add-all"),
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_interactive() {
        let env = envelope(
            "interactive",
            serde_json::json!({
                "type": "block_actions",
                "user": {"id": "U1"},
                "actions": [{"action_id": "cancel_add_all"}]
            }),
        );
        assert!(matches!(
            decode_envelope(&env).unwrap(),
            Some(Inbound::Action(_))
        ));

        let env = envelope(
            "interactive",
            serde_json::json!({"type": "view_submission", "user": {"id": "U1"}}),
        );
        assert!(decode_envelope(&env).unwrap().is_none());
    }

    #[test]
    fn test_decode_control_envelopes() {
        let hello: SocketModeEnvelope =
            serde_json::from_value(serde_json::json!({"type": "hello", "num_connections": 1}))
                .unwrap();
        assert!(decode_envelope(&hello).unwrap().is_none());

        let disconnect: SocketModeEnvelope = serde_json::from_value(
            serde_json::json!({"type": "disconnect", "reason": "refresh_requested"}),
        )
        .unwrap();
        assert_eq!(disconnect.reason.as_deref(), Some("refresh_requested"));
        assert!(decode_envelope(&disconnect).unwrap().is_none());
    }

    #[test]
    fn test_decode_missing_payload_is_error() {
        let env: SocketModeEnvelope = serde_json::from_value(
            serde_json::json!({"envelope_id": "e", "type": "events_api"}),
        )
        .unwrap();
        assert!(decode_envelope(&env).is_err());
    }
}
