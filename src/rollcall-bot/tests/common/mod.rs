//! In-memory `DirectoryClient` shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use rollcall_bot::commands::{CommandContext, DelayedResponse};
use rollcall_bot::directory::{ChannelPage, DirectoryClient, InviteStatus};
use rollcall_bot::error::{SlackError, SlackResult};
use rollcall_bot::interactions::ActionContext;
use rollcall_bot::membership::Member;
use rollcall_bot::messages::SlackMessageContent;

pub const CHANNEL: &str = "C0GENERAL";
pub const INVOKER: &str = "U0INVOKER";
pub const RESPONSE_URL: &str = "https://hooks.slack.test/actions/T1/1/abc";

/// A recorded call against the fake.
#[derive(Debug, Clone)]
pub enum Call {
    ListWorkspace,
    ListChannel(String),
    Invite { channel: String, user: String },
    Join(String),
    ListChannels(Option<String>),
    PostMessage { channel: String, text: String },
    PostEphemeral { channel: String, user: String, text: String },
    Update { channel: String, ts: String, text: String },
    Delete { channel: String, ts: String },
    Respond { url: String, response: DelayedResponse },
}

/// Workspace state plus failure switches.
#[derive(Default)]
pub struct FakeDirectory {
    members: Vec<Member>,
    channels: Mutex<HashMap<String, Vec<String>>>,
    channel_pages: Vec<ChannelPage>,
    failing_invites: HashSet<String>,
    already_present_invites: HashSet<String>,
    failing_joins: HashSet<String>,
    fail_member_list: bool,
    fail_channel_list_at: Option<usize>,
    fail_respond: bool,
    fail_post_message: bool,
    invite_gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<Call>>,
}

fn text_of(content: &SlackMessageContent) -> String {
    content.text.clone().unwrap_or_default()
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = members;
        self
    }

    pub fn with_channel(self, channel_id: &str, members: &[&str]) -> Self {
        self.channels.lock().unwrap().insert(
            channel_id.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    pub fn with_channel_pages(mut self, pages: Vec<ChannelPage>) -> Self {
        self.channel_pages = pages;
        self
    }

    pub fn failing_invite(mut self, user_id: &str) -> Self {
        self.failing_invites.insert(user_id.to_string());
        self
    }

    /// Invites for `user_id` answer `already_in_channel`.
    pub fn already_present(mut self, user_id: &str) -> Self {
        self.already_present_invites.insert(user_id.to_string());
        self
    }

    pub fn failing_join(mut self, channel_id: &str) -> Self {
        self.failing_joins.insert(channel_id.to_string());
        self
    }

    pub fn failing_member_list(mut self) -> Self {
        self.fail_member_list = true;
        self
    }

    /// `conversations.list` fails on the given zero-based page.
    pub fn failing_channel_list_at(mut self, page: usize) -> Self {
        self.fail_channel_list_at = Some(page);
        self
    }

    pub fn failing_respond(mut self) -> Self {
        self.fail_respond = true;
        self
    }

    pub fn failing_post_message(mut self) -> Self {
        self.fail_post_message = true;
        self
    }

    /// Every invite waits for a permit on `gate` first.
    pub fn with_invite_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.invite_gate = Some(gate);
        self
    }

    /// Add a member to a channel behind the bot's back.
    pub fn add_to_channel(&self, channel_id: &str, user_id: &str) {
        self.channels
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .push(user_id.to_string());
    }

    pub fn channel_members(&self, channel_id: &str) -> Vec<String> {
        self.channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn invites(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Invite { user, .. } => Some(user),
                _ => None,
            })
            .collect()
    }

    pub fn joins(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Join(channel) => Some(channel),
                _ => None,
            })
            .collect()
    }

    pub fn posted_messages(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PostMessage { channel, text } => Some((channel, text)),
                _ => None,
            })
            .collect()
    }

    pub fn ephemerals(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PostEphemeral {
                    channel,
                    user,
                    text,
                } => Some((channel, user, text)),
                _ => None,
            })
            .collect()
    }

    pub fn responses(&self) -> Vec<DelayedResponse> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Respond { response, .. } => Some(response),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn list_workspace_members(&self) -> SlackResult<Vec<Member>> {
        self.record(Call::ListWorkspace);
        if self.fail_member_list {
            return Err(SlackError::Api("users.list failed: internal_error".to_string()));
        }
        Ok(self.members.clone())
    }

    async fn list_channel_members(&self, channel_id: &str) -> SlackResult<Vec<String>> {
        self.record(Call::ListChannel(channel_id.to_string()));
        self.channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| {
                SlackError::Channel("conversations.members failed: channel_not_found".to_string())
            })
    }

    async fn invite_member(&self, channel_id: &str, user_id: &str) -> SlackResult<InviteStatus> {
        if let Some(gate) = &self.invite_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| SlackError::Internal(e.to_string()))?;
        }

        self.record(Call::Invite {
            channel: channel_id.to_string(),
            user: user_id.to_string(),
        });

        if self.failing_invites.contains(user_id) {
            return Err(SlackError::Api(
                "conversations.invite failed: cant_invite".to_string(),
            ));
        }
        if self.already_present_invites.contains(user_id) {
            return Ok(InviteStatus::AlreadyMember);
        }

        let mut channels = self.channels.lock().unwrap();
        let members = channels.entry(channel_id.to_string()).or_default();
        if members.iter().any(|m| m == user_id) {
            return Ok(InviteStatus::AlreadyMember);
        }
        members.push(user_id.to_string());
        Ok(InviteStatus::Invited)
    }

    async fn join_channel(&self, channel_id: &str) -> SlackResult<()> {
        self.record(Call::Join(channel_id.to_string()));
        if self.failing_joins.contains(channel_id) {
            return Err(SlackError::Channel(
                "conversations.join failed: is_archived".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_public_channels(&self, cursor: Option<&str>) -> SlackResult<ChannelPage> {
        self.record(Call::ListChannels(cursor.map(str::to_string)));

        let index = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| SlackError::Api("conversations.list failed: invalid_cursor".to_string()))?,
        };
        if self.fail_channel_list_at == Some(index) {
            return Err(SlackError::RateLimited {
                retry_after_secs: 30,
            });
        }

        Ok(self.channel_pages.get(index).cloned().unwrap_or_default())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<String> {
        self.record(Call::PostMessage {
            channel: channel_id.to_string(),
            text: text_of(content),
        });
        if self.fail_post_message {
            return Err(SlackError::Channel(
                "chat.postMessage failed: not_in_channel".to_string(),
            ));
        }
        Ok("1700000000.000100".to_string())
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()> {
        self.record(Call::PostEphemeral {
            channel: channel_id.to_string(),
            user: user_id.to_string(),
            text: text_of(content),
        });
        Ok(())
    }

    async fn update_message(
        &self,
        channel_id: &str,
        ts: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()> {
        self.record(Call::Update {
            channel: channel_id.to_string(),
            ts: ts.to_string(),
            text: text_of(content),
        });
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, ts: &str) -> SlackResult<()> {
        self.record(Call::Delete {
            channel: channel_id.to_string(),
            ts: ts.to_string(),
        });
        Ok(())
    }

    async fn respond(&self, response_url: &str, response: &DelayedResponse) -> SlackResult<()> {
        self.record(Call::Respond {
            url: response_url.to_string(),
            response: response.clone(),
        });
        if self.fail_respond {
            return Err(SlackError::Api(
                "Failed to send delayed response: 404 Not Found - expired_url".to_string(),
            ));
        }
        Ok(())
    }
}

/// Five members: four humans and one bot.
pub fn sample_members() -> Vec<Member> {
    vec![
        Member::new("U0ALICE"),
        Member::new("U0BOB"),
        Member::new("U0CAROL"),
        Member::new("U0DAVE"),
        Member::new("B0HELPER").bot(),
    ]
}

pub fn command_context() -> CommandContext {
    CommandContext {
        user_id: INVOKER.to_string(),
        user_name: "invoker".to_string(),
        channel_id: CHANNEL.to_string(),
        response_url: RESPONSE_URL.to_string(),
    }
}

pub fn action_context() -> ActionContext {
    ActionContext {
        user_id: INVOKER.to_string(),
        channel_id: Some(CHANNEL.to_string()),
        message_ts: None,
        response_url: Some(RESPONSE_URL.to_string()),
    }
}
