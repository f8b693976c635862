//! The `/add-all` confirm/cancel workflow.
//!
//! ```text
//! Idle ──request──▶ AwaitingConfirmation ──confirm──▶ Applying ──▶ Reported
//!   │                        │
//!   └─▶ (empty diff)         └──cancel──▶ Cancelled
//! ```
//!
//! The pending state lives entirely in the ephemeral prompt: the confirm
//! button carries the target channel id. Nothing is persisted. Confirming
//! always re-reads membership and recomputes the diff, so drift between the
//! prompt and the click is absorbed and a repeated confirm turns into
//! "already complete" rather than a second round of invites. Confirms that
//! race on the same channel are rejected by an in-flight guard.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandContext, DelayedResponse};
use crate::directory::{DirectoryClient, InviteStatus};
use crate::error::{SlackError, SlackResult};
use crate::interactions::ActionContext;
use crate::membership::{self, Member};
use crate::messages::{
    ALREADY_COMPLETE_TEXT, CANCELLED_TEXT, SlackMessageContent, format_confirmation_prompt,
    format_error_text, format_outcome_text,
};

/// Result of starting a bulk add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Everyone is already in the channel; no prompt was shown.
    AlreadyComplete,
    /// A confirmation prompt listing `to_add` was shown to the invoker.
    Prompted { to_add: Vec<Member> },
    /// Building the prompt failed; the invoker got an error reply.
    Failed { error: String },
}

/// Result of confirming a bulk add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The fresh diff was empty; no invites were sent.
    AlreadyComplete,
    /// Invites were attempted for every member of the fresh diff.
    Applied(InviteReport),
    /// Another confirm for the same channel was still applying.
    Duplicate,
    /// Re-reading membership failed; no invites were sent.
    Failed { error: String },
}

/// A member whose invite failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteFailure {
    pub user_id: String,
    pub error: String,
}

/// Tally of one invite pass, in attempt order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteReport {
    /// Members added by this pass.
    pub invited: Vec<String>,
    /// Members Slack reported as already present.
    pub already_present: Vec<String>,
    /// Members that could not be added.
    pub failed: Vec<InviteFailure>,
}

impl InviteReport {
    /// Members that are now in the channel.
    pub fn succeeded(&self) -> usize {
        self.invited.len() + self.already_present.len()
    }

    /// Members that could not be added.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Number of invite calls made.
    pub fn attempts(&self) -> usize {
        self.succeeded() + self.failed_count()
    }
}

/// Marks a channel as being applied until dropped.
struct InFlightGuard<'a> {
    set: &'a DashSet<String>,
    channel_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a DashSet<String>, channel_id: &str) -> Option<Self> {
        if set.insert(channel_id.to_string()) {
            Some(Self {
                set,
                channel_id: channel_id.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.channel_id);
    }
}

/// Orchestrates diff, prompt, confirmation and invites.
pub struct BulkAddWorkflow {
    directory: Arc<dyn DirectoryClient>,
    in_flight: DashSet<String>,
}

impl BulkAddWorkflow {
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self {
            directory,
            in_flight: DashSet::new(),
        }
    }

    /// Whether a confirm for `channel_id` is currently applying.
    pub fn is_applying(&self, channel_id: &str) -> bool {
        self.in_flight.contains(channel_id)
    }

    /// Handle `/add-all`: compute the diff and prompt the invoker.
    pub async fn request(&self, ctx: &CommandContext) -> RequestOutcome {
        let channel_id = ctx.channel_id.as_str();

        let to_add = match self.compute_diff(channel_id).await {
            Ok(to_add) => to_add,
            Err(e) => {
                error!(channel_id, user_id = %ctx.user_id, "Failed to build /add-all prompt: {}", e);
                let reply = SlackMessageContent::section_text(format_error_text(&e));
                if let Err(reply_err) = self.reply_to_invoker(ctx, &reply).await {
                    error!("Failed to deliver /add-all error reply: {}", reply_err);
                }
                return RequestOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if to_add.is_empty() {
            info!(channel_id, "All workspace members are already in the channel");
            let reply = SlackMessageContent::section_text(ALREADY_COMPLETE_TEXT);
            if let Err(e) = self.reply_to_invoker(ctx, &reply).await {
                error!("Failed to deliver /add-all reply: {}", e);
            }
            return RequestOutcome::AlreadyComplete;
        }

        let prompt = format_confirmation_prompt(channel_id, &to_add);
        if let Err(e) = self.reply_to_invoker(ctx, &prompt).await {
            error!(channel_id, "Failed to deliver /add-all prompt: {}", e);
            return RequestOutcome::Failed {
                error: e.to_string(),
            };
        }

        info!(
            channel_id,
            user_id = %ctx.user_id,
            count = to_add.len(),
            "Confirmation sent"
        );
        RequestOutcome::Prompted { to_add }
    }

    /// Handle the confirm button for `channel_id`.
    pub async fn confirm(&self, channel_id: &str, ctx: &ActionContext) -> ConfirmOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, channel_id) else {
            warn!(
                channel_id,
                user_id = %ctx.user_id,
                "Bulk add already in progress for channel, ignoring duplicate confirm"
            );
            if let Err(e) = self.remove_prompt(ctx).await {
                debug!("Could not remove duplicate prompt: {}", e);
            }
            return ConfirmOutcome::Duplicate;
        };

        if let Err(e) = self.directory.join_channel(channel_id).await {
            warn!(channel_id, "Could not join channel before adding members: {}", e);
        }

        let to_add = match self.compute_diff(channel_id).await {
            Ok(to_add) => to_add,
            Err(e) => {
                error!(channel_id, "Error during confirmation: {}", e);
                self.replace_prompt(channel_id, ctx, &format_error_text(&e))
                    .await;
                return ConfirmOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if to_add.is_empty() {
            info!(channel_id, "Nothing left to add at confirmation time");
            self.report(channel_id, ctx, ALREADY_COMPLETE_TEXT).await;
            return ConfirmOutcome::AlreadyComplete;
        }

        let report = self.invite_all(channel_id, &to_add).await;
        info!(
            channel_id,
            added = report.succeeded(),
            failed = report.failed_count(),
            "Bulk add applied"
        );

        let text = format_outcome_text(report.succeeded(), report.failed_count());
        self.report(channel_id, ctx, &text).await;

        ConfirmOutcome::Applied(report)
    }

    /// Handle the cancel button. Returns whether the prompt was removed.
    pub async fn cancel(&self, ctx: &ActionContext) -> bool {
        info!(
            user_id = %ctx.user_id,
            channel_id = ctx.channel_id.as_deref().unwrap_or("unknown"),
            "Bulk add cancelled"
        );

        match self.remove_prompt(ctx).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to remove cancelled prompt: {}", e);
                if let Some(channel_id) = ctx.channel_id.as_deref() {
                    let fallback = SlackMessageContent::section_text(CANCELLED_TEXT);
                    if let Err(e) = self
                        .directory
                        .post_ephemeral(channel_id, &ctx.user_id, &fallback)
                        .await
                    {
                        error!("Failed to send cancel fallback reply: {}", e);
                    }
                }
                false
            }
        }
    }

    async fn compute_diff(&self, channel_id: &str) -> SlackResult<Vec<Member>> {
        let all_members = self.directory.list_workspace_members().await?;
        let channel_members = self.directory.list_channel_members(channel_id).await?;
        let to_add = membership::diff(&all_members, &channel_members);

        debug!(
            channel_id,
            workspace = all_members.len(),
            in_channel = channel_members.len(),
            to_add = to_add.len(),
            "Computed membership diff"
        );
        Ok(to_add)
    }

    /// Invite members one at a time; a failure never stops the pass.
    async fn invite_all(&self, channel_id: &str, to_add: &[Member]) -> InviteReport {
        let mut report = InviteReport::default();

        for member in to_add {
            match self.directory.invite_member(channel_id, &member.id).await {
                Ok(InviteStatus::Invited) => report.invited.push(member.id.clone()),
                Ok(InviteStatus::AlreadyMember) => report.already_present.push(member.id.clone()),
                Err(e) => {
                    warn!(channel_id, user_id = %member.id, "Failed to add user: {}", e);
                    report.failed.push(InviteFailure {
                        user_id: member.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Remove the prompt, then post `text` to the channel.
    ///
    /// Whatever fails along the way, the confirming user still gets `text`
    /// as an ephemeral reply.
    async fn report(&self, channel_id: &str, ctx: &ActionContext, text: &str) {
        let content = SlackMessageContent::section_text(text);
        let mut needs_fallback = false;

        if let Err(e) = self.remove_prompt(ctx).await {
            warn!(channel_id, "Failed to remove confirmation prompt: {}", e);
            needs_fallback = true;
        }

        if let Err(e) = self.directory.post_message(channel_id, &content).await {
            warn!(channel_id, "Failed to post bulk add outcome: {}", e);
            needs_fallback = true;
        }

        if needs_fallback {
            if let Err(e) = self
                .directory
                .post_ephemeral(channel_id, &ctx.user_id, &content)
                .await
            {
                error!(channel_id, "Failed to send fallback outcome reply: {}", e);
            }
        }
    }

    async fn remove_prompt(&self, ctx: &ActionContext) -> SlackResult<()> {
        if let Some(url) = ctx.response_url.as_deref() {
            return self
                .directory
                .respond(url, &DelayedResponse::new().delete_original())
                .await;
        }

        match (ctx.channel_id.as_deref(), ctx.message_ts.as_deref()) {
            (Some(channel_id), Some(ts)) => self.directory.delete_message(channel_id, ts).await,
            _ => Err(SlackError::InvalidPayload(
                "Action carries neither response_url nor message reference".to_string(),
            )),
        }
    }

    async fn replace_prompt(&self, channel_id: &str, ctx: &ActionContext, text: &str) {
        let content = SlackMessageContent::section_text(text);

        let result = match (ctx.response_url.as_deref(), ctx.message_ts.as_deref()) {
            (Some(url), _) => {
                let response = DelayedResponse::new()
                    .replace_original()
                    .with_text(text)
                    .with_blocks(serde_json::to_value(&content.blocks).unwrap_or_default());
                self.directory.respond(url, &response).await
            }
            (None, Some(ts)) => self.directory.update_message(channel_id, ts, &content).await,
            (None, None) => Err(SlackError::InvalidPayload(
                "Action carries neither response_url nor message reference".to_string(),
            )),
        };

        if let Err(e) = result {
            warn!(channel_id, "Failed to replace confirmation prompt: {}", e);
            if let Err(e) = self
                .directory
                .post_ephemeral(channel_id, &ctx.user_id, &content)
                .await
            {
                error!(channel_id, "Failed to send fallback error reply: {}", e);
            }
        }
    }

    /// Reply privately to the user who ran the command.
    async fn reply_to_invoker(
        &self,
        ctx: &CommandContext,
        content: &SlackMessageContent,
    ) -> SlackResult<()> {
        if !ctx.response_url.is_empty() {
            let mut response = DelayedResponse::new().ephemeral();
            if let Some(text) = &content.text {
                response = response.with_text(text.clone());
            }
            if let Some(blocks) = &content.blocks {
                response = response.with_blocks(serde_json::to_value(blocks)?);
            }

            match self.directory.respond(&ctx.response_url, &response).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("response_url reply failed, falling back to chat.postEphemeral: {}", e),
            }
        }

        self.directory
            .post_ephemeral(&ctx.channel_id, &ctx.user_id, content)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_report_counts() {
        let report = InviteReport {
            invited: vec!["U1".to_string()],
            already_present: vec!["U2".to_string()],
            failed: vec![InviteFailure {
                user_id: "U3".to_string(),
                error: "boom".to_string(),
            }],
        };
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.attempts(), 3);
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let set = DashSet::new();
        {
            let guard = InFlightGuard::acquire(&set, "C1");
            assert!(guard.is_some());
            assert!(InFlightGuard::acquire(&set, "C1").is_none());
            assert!(InFlightGuard::acquire(&set, "C2").is_some());
        }
        assert!(set.is_empty());
        assert!(InFlightGuard::acquire(&set, "C1").is_some());
    }
}
