//! Routes decoded inbound requests to their handlers.
//!
//! The [`Dispatcher`] is built once at startup and shared by `Arc` with
//! whichever transport owns the connection. Handlers never return errors:
//! every failure is logged (and, where a user is waiting, replied to) here.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::bulk_add::{BulkAddWorkflow, ConfirmOutcome, RequestOutcome};
use crate::commands::{CommandContext, DelayedResponse, ParsedCommand, SlashCommandPayload, parse_command};
use crate::directory::DirectoryClient;
use crate::events::{AppMentionEvent, Inbound, MessageEvent, SlackEvent};
use crate::interactions::{BlockActionPayload, ParsedAction, parse_action};
use crate::messages::{ALIVE_TEXT, PONG_TEXT, SlackMessageContent, greeting};
use crate::sweeper::ChannelSweeper;

static HELLO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)hello").expect("Invalid hello regex"));

/// What the dispatcher did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// `/ping` answered.
    Pong,
    /// `/add-all` processed.
    BulkAddRequested(RequestOutcome),
    /// Confirm button processed.
    BulkAddConfirmed(ConfirmOutcome),
    /// Cancel button processed; `true` when the prompt was removed.
    BulkAddCancelled(bool),
    /// A command this bot does not know.
    UnknownCommand(String),
    /// A button this bot does not know.
    UnknownAction(String),
    /// Someone said hello.
    Greeted,
    /// Health-check reply to a mention.
    Alive,
    /// Join attempt for a newly created channel.
    JoinedChannel { channel_id: String, ok: bool },
    /// Nothing to do.
    Ignored,
}

/// Handler registry for commands, actions and events.
pub struct Dispatcher {
    directory: Arc<dyn DirectoryClient>,
    bulk_add: BulkAddWorkflow,
    sweeper: ChannelSweeper,
    bot_user_id: Option<String>,
}

impl Dispatcher {
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self {
            bulk_add: BulkAddWorkflow::new(directory.clone()),
            sweeper: ChannelSweeper::new(directory.clone()),
            directory,
            bot_user_id: None,
        }
    }

    /// Remember the bot's own user ID so its messages are ignored.
    pub fn with_bot_user_id(mut self, bot_user_id: impl Into<String>) -> Self {
        self.bot_user_id = Some(bot_user_id.into());
        self
    }

    /// The bulk-add workflow.
    pub fn bulk_add(&self) -> &BulkAddWorkflow {
        &self.bulk_add
    }

    /// The channel sweeper.
    pub fn sweeper(&self) -> &ChannelSweeper {
        &self.sweeper
    }

    /// Handle one inbound request.
    pub async fn dispatch(&self, inbound: Inbound) -> Handled {
        match inbound {
            Inbound::Command(payload) => self.handle_command(&payload).await,
            Inbound::Action(payload) => self.handle_action(&payload).await,
            Inbound::Event(event) => self.handle_event(event).await,
        }
    }

    async fn handle_command(&self, payload: &SlashCommandPayload) -> Handled {
        info!(
            "Handling slash command {} from user {}",
            payload.command, payload.user_id
        );

        match parse_command(payload) {
            ParsedCommand::Ping { context } => {
                info!("[/ping] Command received from user {}", context.user_name);
                self.reply(&context, PONG_TEXT).await;
                Handled::Pong
            }
            ParsedCommand::AddAll { context } => {
                Handled::BulkAddRequested(self.bulk_add.request(&context).await)
            }
            ParsedCommand::Unknown { command, context } => {
                warn!("Unknown command: {}", command);
                self.reply(&context, &format!("❓ Unknown command: {}", command))
                    .await;
                Handled::UnknownCommand(command)
            }
        }
    }

    async fn handle_action(&self, payload: &BlockActionPayload) -> Handled {
        let Some(action) = parse_action(payload) else {
            debug!("Action payload without actions");
            return Handled::Ignored;
        };

        match action {
            ParsedAction::ConfirmAddAll {
                channel_id,
                context,
            } => Handled::BulkAddConfirmed(self.bulk_add.confirm(&channel_id, &context).await),
            ParsedAction::CancelAddAll { context } => {
                Handled::BulkAddCancelled(self.bulk_add.cancel(&context).await)
            }
            ParsedAction::Unknown { action_id, .. } => {
                debug!("Ignoring action {}", action_id);
                Handled::UnknownAction(action_id)
            }
        }
    }

    async fn handle_event(&self, event: SlackEvent) -> Handled {
        match event {
            SlackEvent::AppMention(event) => self.handle_app_mention(&event).await,
            SlackEvent::Message(event) => self.handle_message(&event).await,
            SlackEvent::ChannelCreated(event) => {
                let channel_id = event.channel.id;
                info!(
                    channel_id = %channel_id,
                    name = event.channel.name.as_deref().unwrap_or(""),
                    "Channel created, joining"
                );
                let ok = self.sweeper.join_one(&channel_id).await.is_ok();
                Handled::JoinedChannel { channel_id, ok }
            }
            SlackEvent::Unknown => {
                debug!("Received unknown event type");
                Handled::Ignored
            }
        }
    }

    async fn handle_app_mention(&self, event: &AppMentionEvent) -> Handled {
        info!(
            "Handling app mention from user {} in channel {}",
            event.user.as_deref().unwrap_or("unknown"),
            event.channel
        );

        let mut message = SlackMessageContent::new().with_text(ALIVE_TEXT);
        if let Some(thread_ts) = &event.thread_ts {
            message = message.in_thread(thread_ts.clone());
        }

        if let Err(e) = self.directory.post_message(&event.channel, &message).await {
            error!("Failed to send health-check reply: {}", e);
        }
        Handled::Alive
    }

    async fn handle_message(&self, event: &MessageEvent) -> Handled {
        if !event.is_plain_user_message() {
            return Handled::Ignored;
        }
        let Some(user_id) = event.user.as_deref() else {
            return Handled::Ignored;
        };
        if self.bot_user_id.as_deref() == Some(user_id) {
            return Handled::Ignored;
        }
        if !HELLO_PATTERN.is_match(&event.text) {
            return Handled::Ignored;
        }

        let mut message = SlackMessageContent::new().with_text(greeting(user_id));
        if let Some(thread_ts) = &event.thread_ts {
            message = message.in_thread(thread_ts.clone());
        }

        match self.directory.post_message(&event.channel, &message).await {
            Ok(_) => info!("[hello] Message detected from user {}", user_id),
            Err(e) => error!("Failed to send greeting: {}", e),
        }
        Handled::Greeted
    }

    /// Private reply to a command invoker.
    async fn reply(&self, context: &CommandContext, text: &str) {
        if !context.response_url.is_empty() {
            let response = DelayedResponse::new().ephemeral().with_text(text);
            match self.directory.respond(&context.response_url, &response).await {
                Ok(()) => return,
                Err(e) => warn!("response_url reply failed: {}", e),
            }
        }

        let message = SlackMessageContent::new().with_text(text);
        if let Err(e) = self
            .directory
            .post_ephemeral(&context.channel_id, &context.user_id, &message)
            .await
        {
            error!("Failed to reply to command: {}", e);
        }
    }
}
