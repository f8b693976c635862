//! Channel auto-join sweeper.
//!
//! Walks every public, non-archived channel and joins the ones the bot is
//! not in yet. Runs once at startup and once per `channel_created` event.
//! A failed join is logged and skipped; nothing is retried.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::directory::{DirectoryClient, MAX_PAGES};
use crate::error::SlackResult;

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Channels joined.
    pub joined: Vec<String>,
    /// Channels whose join failed.
    pub failed: Vec<String>,
    /// Channels already joined or archived.
    pub skipped: usize,
    /// Pages fetched.
    pub pages: usize,
    /// Whether pagination ended early (fetch error or page cap).
    pub truncated: bool,
}

/// Joins public channels the bot is not a member of.
pub struct ChannelSweeper {
    directory: Arc<dyn DirectoryClient>,
}

impl ChannelSweeper {
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self { directory }
    }

    /// Run a full pass over all public channels.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut cursor: Option<String> = None;

        info!("Starting channel auto-join sweep");

        loop {
            let page = match self.directory.list_public_channels(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(pages = report.pages, "Channel listing failed, ending sweep: {}", e);
                    report.truncated = true;
                    break;
                }
            };
            report.pages += 1;

            for channel in &page.channels {
                if !channel.needs_join() {
                    report.skipped += 1;
                    continue;
                }
                match self.join_one(&channel.id).await {
                    Ok(()) => report.joined.push(channel.id.clone()),
                    Err(_) => report.failed.push(channel.id.clone()),
                }
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
            if report.pages >= MAX_PAGES {
                warn!(
                    pages = MAX_PAGES,
                    "conversations.list reached page limit; sweep may be incomplete"
                );
                report.truncated = true;
                break;
            }
        }

        info!(
            joined = report.joined.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            "Channel auto-join sweep finished"
        );
        report
    }

    /// Join a single channel, logging the outcome.
    pub async fn join_one(&self, channel_id: &str) -> SlackResult<()> {
        match self.directory.join_channel(channel_id).await {
            Ok(()) => {
                debug!(channel_id, "Joined channel");
                Ok(())
            }
            Err(e) => {
                warn!(channel_id, "Failed to join channel: {}", e);
                Err(e)
            }
        }
    }
}
