//! Directory and messaging calls against the Slack Web API.
//!
//! [`DirectoryClient`] is the seam between the handlers and Slack: the
//! workflow, sweeper and dispatcher only ever talk to it, and tests swap in
//! an in-memory implementation. [`SlackDirectory`] is the real thing.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::commands::DelayedResponse;
use crate::config::BotConfig;
use crate::error::{SlackApiError, SlackError, SlackResult};
use crate::membership::{Channel, Member};
use crate::messages::SlackMessageContent;

/// Page size for cursor-paginated list calls.
const PAGE_LIMIT: u32 = 200;

/// Upper bound on pages fetched by a single list call.
pub const MAX_PAGES: usize = 50;

/// Result of a single invite attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteStatus {
    /// The member was added.
    Invited,
    /// The member was already in the channel; nothing to do.
    AlreadyMember,
}

/// One page of `conversations.list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPage {
    pub channels: Vec<Channel>,
    /// Cursor for the next page; `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// Operations the bot performs against the workspace.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Every member of the workspace, across all pages.
    async fn list_workspace_members(&self) -> SlackResult<Vec<Member>>;

    /// IDs of every member of a channel, across all pages.
    async fn list_channel_members(&self, channel_id: &str) -> SlackResult<Vec<String>>;

    /// Invite one member to a channel.
    async fn invite_member(&self, channel_id: &str, user_id: &str) -> SlackResult<InviteStatus>;

    /// Join a public channel as the bot.
    async fn join_channel(&self, channel_id: &str) -> SlackResult<()>;

    /// One page of public, non-archived channels.
    async fn list_public_channels(&self, cursor: Option<&str>) -> SlackResult<ChannelPage>;

    /// Post a message visible to the channel; returns its timestamp.
    async fn post_message(
        &self,
        channel_id: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<String>;

    /// Post a message only `user_id` can see.
    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()>;

    /// Replace an existing message.
    async fn update_message(
        &self,
        channel_id: &str,
        ts: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()>;

    /// Delete an existing message.
    async fn delete_message(&self, channel_id: &str, ts: &str) -> SlackResult<()>;

    /// Answer through a command's or action's `response_url`.
    async fn respond(&self, response_url: &str, response: &DelayedResponse) -> SlackResult<()>;
}

/// Slack Web API implementation of [`DirectoryClient`].
pub struct SlackDirectory {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl SlackDirectory {
    /// Create a client from the bot configuration.
    pub fn new(config: &BotConfig) -> SlackResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SlackError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            bot_token: config.bot_token().to_string(),
        })
    }

    /// Verify the token and return the bot's own user ID.
    pub async fn auth_test(&self) -> SlackResult<String> {
        debug!("Testing Slack authentication...");
        let response: serde_json::Value =
            self.api_post("auth.test", &serde_json::json!({})).await?;

        response
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SlackError::Auth("auth.test returned no user_id".to_string()))
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// POST a JSON body to a Web API method.
    async fn api_post<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> SlackResult<T> {
        let response = self
            .client
            .post(self.url(method))
            .bearer_auth(&self.bot_token)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(payload)
            .send()
            .await?;

        self.read_response(method, response).await
    }

    /// GET a read method with query parameters.
    async fn api_get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> SlackResult<T> {
        let response = self
            .client
            .get(self.url(method))
            .bearer_auth(&self.bot_token)
            .query(query)
            .send()
            .await?;

        self.read_response(method, response).await
    }

    async fn read_response<T: DeserializeOwned>(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> SlackResult<T> {
        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(30);
            return Err(SlackError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{} {}: {}", method, status, body)));
        }

        let json: serde_json::Value = response.json().await?;
        if json.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let code = json
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            return Err(SlackApiError::new(method, code).into());
        }

        Ok(serde_json::from_value(json)?)
    }

    /// Walk a cursor-paginated read method, collecting `field` from every page.
    async fn paginate<T: DeserializeOwned>(
        &self,
        method: &str,
        base_query: &[(&str, String)],
        field: &str,
    ) -> SlackResult<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=MAX_PAGES {
            let mut query = base_query.to_vec();
            query.push(("limit", PAGE_LIMIT.to_string()));
            if let Some(ref next) = cursor {
                query.push(("cursor", next.clone()));
            }

            let response: serde_json::Value = self.api_get(method, &query).await?;
            if let Some(values) = response.get(field) {
                let page_items: Vec<T> = serde_json::from_value(values.clone())?;
                items.extend(page_items);
            }

            cursor = next_cursor(&response);
            if cursor.is_none() {
                return Ok(items);
            }
            if page == MAX_PAGES {
                warn!(
                    method,
                    pages = MAX_PAGES,
                    "Reached page limit; result may be incomplete"
                );
            }
        }

        Ok(items)
    }
}

/// Extract a non-empty `response_metadata.next_cursor`.
fn next_cursor(response: &serde_json::Value) -> Option<String> {
    response
        .get("response_metadata")
        .and_then(|rm| rm.get("next_cursor"))
        .and_then(|c| c.as_str())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToOwned::to_owned)
}

/// Copy the text and blocks of a message into a request body.
fn apply_content(payload: &mut serde_json::Value, content: &SlackMessageContent) {
    if let Some(text) = &content.text {
        payload["text"] = serde_json::json!(text);
    }
    if let Some(blocks) = &content.blocks {
        payload["blocks"] = serde_json::json!(blocks);
    }
    if let Some(thread_ts) = &content.thread_ts {
        payload["thread_ts"] = serde_json::json!(thread_ts);
    }
}

#[async_trait]
impl DirectoryClient for SlackDirectory {
    async fn list_workspace_members(&self) -> SlackResult<Vec<Member>> {
        self.paginate("users.list", &[], "members").await
    }

    async fn list_channel_members(&self, channel_id: &str) -> SlackResult<Vec<String>> {
        self.paginate(
            "conversations.members",
            &[("channel", channel_id.to_string())],
            "members",
        )
        .await
    }

    async fn invite_member(&self, channel_id: &str, user_id: &str) -> SlackResult<InviteStatus> {
        let payload = serde_json::json!({
            "channel": channel_id,
            "users": user_id,
        });

        match self
            .api_post::<serde_json::Value>("conversations.invite", &payload)
            .await
        {
            Ok(_) => Ok(InviteStatus::Invited),
            Err(SlackError::Api(msg)) if msg.ends_with("already_in_channel") => {
                debug!(channel_id, user_id, "Member already in channel");
                Ok(InviteStatus::AlreadyMember)
            }
            Err(e) => Err(e),
        }
    }

    async fn join_channel(&self, channel_id: &str) -> SlackResult<()> {
        let response: serde_json::Value = self
            .api_post(
                "conversations.join",
                &serde_json::json!({ "channel": channel_id }),
            )
            .await?;

        if let Some(warning) = response.get("warning").and_then(|w| w.as_str()) {
            debug!(channel_id, warning, "conversations.join warning");
        }
        Ok(())
    }

    async fn list_public_channels(&self, cursor: Option<&str>) -> SlackResult<ChannelPage> {
        let mut query = vec![
            ("types", "public_channel".to_string()),
            ("exclude_archived", "true".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response: serde_json::Value = self.api_get("conversations.list", &query).await?;
        let channels: Vec<Channel> = match response.get("channels") {
            Some(values) => serde_json::from_value(values.clone())?,
            None => Vec::new(),
        };

        Ok(ChannelPage {
            channels,
            next_cursor: next_cursor(&response),
        })
    }

    async fn post_message(
        &self,
        channel_id: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<String> {
        let mut payload = serde_json::json!({ "channel": channel_id });
        apply_content(&mut payload, content);

        let response: serde_json::Value = self.api_post("chat.postMessage", &payload).await?;

        response
            .get("ts")
            .and_then(|ts| ts.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SlackError::Api("Missing ts in response".to_string()))
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()> {
        let mut payload = serde_json::json!({
            "channel": channel_id,
            "user": user_id,
        });
        apply_content(&mut payload, content);

        let _: serde_json::Value = self.api_post("chat.postEphemeral", &payload).await?;
        Ok(())
    }

    async fn update_message(
        &self,
        channel_id: &str,
        ts: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()> {
        let mut payload = serde_json::json!({
            "channel": channel_id,
            "ts": ts,
        });
        apply_content(&mut payload, content);

        let _: serde_json::Value = self.api_post("chat.update", &payload).await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, ts: &str) -> SlackResult<()> {
        let payload = serde_json::json!({
            "channel": channel_id,
            "ts": ts,
        });

        let _: serde_json::Value = self.api_post("chat.delete", &payload).await?;
        Ok(())
    }

    async fn respond(&self, response_url: &str, response: &DelayedResponse) -> SlackResult<()> {
        debug!("Sending delayed response to: {}", response_url);

        let resp = self.client.post(response_url).json(response).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!("Failed to send delayed response: {} - {}", status, body);
            return Err(SlackError::Api(format!(
                "Failed to send delayed response: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_cursor() {
        let page = serde_json::json!({"ok": true, "response_metadata": {"next_cursor": "dXNlcjpVMDYx"}});
        assert_eq!(next_cursor(&page).as_deref(), Some("dXNlcjpVMDYx"));

        let last = serde_json::json!({"ok": true, "response_metadata": {"next_cursor": ""}});
        assert!(next_cursor(&last).is_none());

        assert!(next_cursor(&serde_json::json!({"ok": true})).is_none());
    }

    #[test]
    fn test_apply_content() {
        let mut payload = serde_json::json!({"channel": "C1"});
        let content = SlackMessageContent::section_text("hello");
        apply_content(&mut payload, &content);

        assert_eq!(payload["text"], "hello");
        assert_eq!(payload["blocks"][0]["type"], "section");
        assert!(payload.get("thread_ts").is_none());
    }

    #[test]
    fn test_directory_uses_configured_base() {
        let config = BotConfig::new("xoxb-test").with_api_base("http://localhost:1234/api");
        let directory = SlackDirectory::new(&config).unwrap();
        assert_eq!(
            directory.url("users.list"),
            "http://localhost:1234/api/users.list"
        );
    }
}
