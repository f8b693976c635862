//! Workspace members, channels and the membership diff.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Slack's built-in system user, never added to channels.
pub const SLACKBOT_USER_ID: &str = "USLACKBOT";

/// A workspace member as returned by `users.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// User ID.
    pub id: String,
    /// Whether the account is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// Whether the account has been deactivated.
    #[serde(default, rename = "deleted")]
    pub is_deleted: bool,
}

impl Member {
    /// A regular, active member.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_bot: false,
            is_deleted: false,
        }
    }

    /// Mark the member as a bot.
    pub fn bot(mut self) -> Self {
        self.is_bot = true;
        self
    }

    /// Mark the member as deactivated.
    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    /// Whether this member may be invited to channels at all.
    pub fn is_eligible(&self) -> bool {
        !self.is_bot && !self.is_deleted && self.id != SLACKBOT_USER_ID
    }
}

/// A conversation as returned by `conversations.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID.
    pub id: String,
    /// Whether the bot is already a member.
    #[serde(default)]
    pub is_member: bool,
    /// Whether the channel is archived.
    #[serde(default)]
    pub is_archived: bool,
}

impl Channel {
    /// Whether the sweeper should try to join this channel.
    pub fn needs_join(&self) -> bool {
        !self.is_member && !self.is_archived
    }
}

/// Compute the members that should be added to a channel.
///
/// Keeps the order of `all_members`, drops bots, deactivated accounts and
/// Slackbot, drops anyone already in `channel_members`, and emits each id at
/// most once.
pub fn diff<S: AsRef<str>>(all_members: &[Member], channel_members: &[S]) -> Vec<Member> {
    let present: HashSet<&str> = channel_members.iter().map(|id| id.as_ref()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut to_add = Vec::new();

    for member in all_members {
        if member.is_eligible()
            && !present.contains(member.id.as_str())
            && seen.insert(member.id.as_str())
        {
            to_add.push(member.clone());
        }
    }

    to_add
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(members: &[Member]) -> Vec<&str> {
        members.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_diff_excludes_channel_members_bots_and_deleted() {
        let all = vec![
            Member::new("U1"),
            Member::new("U2"),
            Member::new("U3"),
            Member::new("B1").bot(),
            Member::new("U4").deleted(),
            Member::new(SLACKBOT_USER_ID),
        ];
        let in_channel = vec!["U2"];

        let result = diff(&all, &in_channel);
        assert_eq!(ids(&result), vec!["U1", "U3"]);
    }

    #[test]
    fn test_diff_preserves_input_order() {
        let all = vec![Member::new("U9"), Member::new("U1"), Member::new("U5")];
        let result = diff(&all, &Vec::<String>::new());
        assert_eq!(ids(&result), vec!["U9", "U1", "U5"]);
    }

    #[test]
    fn test_diff_is_stable_across_calls() {
        let all = vec![
            Member::new("U3"),
            Member::new("U1"),
            Member::new("B7").bot(),
            Member::new("U2"),
        ];
        let in_channel = vec!["U1".to_string()];

        assert_eq!(diff(&all, &in_channel), diff(&all, &in_channel));
    }

    #[test]
    fn test_diff_emits_duplicates_once() {
        let all = vec![Member::new("U1"), Member::new("U2"), Member::new("U1")];
        let result = diff(&all, &Vec::<String>::new());
        assert_eq!(ids(&result), vec!["U1", "U2"]);
    }

    #[test]
    fn test_diff_empty_when_everyone_present() {
        let all = vec![Member::new("U1"), Member::new("U2"), Member::new("B1").bot()];
        let in_channel = vec!["U2", "U1"];
        assert!(diff(&all, &in_channel).is_empty());
    }

    #[test]
    fn test_diff_ignores_channel_ids_not_in_workspace() {
        let all = vec![Member::new("U1")];
        let in_channel = vec!["UEXTERNAL"];
        assert_eq!(ids(&diff(&all, &in_channel)), vec!["U1"]);
    }

    #[test]
    fn test_diff_covers_every_eligible_absent_member_exactly_once() {
        // Exhaustive over a small universe: every subset of channel members.
        let all = vec![
            Member::new("U1"),
            Member::new("U2").bot(),
            Member::new("U3"),
            Member::new("U4").deleted(),
            Member::new("U5"),
            Member::new(SLACKBOT_USER_ID),
        ];
        let universe: Vec<&str> = all.iter().map(|m| m.id.as_str()).collect();

        for mask in 0u32..(1 << universe.len()) {
            let in_channel: Vec<&str> = universe
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, id)| *id)
                .collect();

            let result = diff(&all, &in_channel);

            for m in &result {
                assert!(!in_channel.contains(&m.id.as_str()));
                assert!(m.is_eligible());
            }
            for m in all.iter().filter(|m| m.is_eligible()) {
                let expected = usize::from(!in_channel.contains(&m.id.as_str()));
                let count = result.iter().filter(|r| r.id == m.id).count();
                assert_eq!(count, expected, "member {} mask {:b}", m.id, mask);
            }
        }
    }

    #[test]
    fn test_member_deserializes_slack_fields() {
        let json = serde_json::json!({
            "id": "U1",
            "name": "alice",
            "deleted": true,
            "is_bot": false
        });
        let member: Member = serde_json::from_value(json).unwrap();
        assert!(member.is_deleted);
        assert!(!member.is_bot);

        let member: Member = serde_json::from_value(serde_json::json!({"id": "U2"})).unwrap();
        assert!(member.is_eligible());
    }

    #[test]
    fn test_channel_needs_join() {
        let channel = Channel {
            id: "C1".to_string(),
            is_member: false,
            is_archived: false,
        };
        assert!(channel.needs_join());
        assert!(
            !Channel {
                is_member: true,
                ..channel.clone()
            }
            .needs_join()
        );
        assert!(
            !Channel {
                is_archived: true,
                ..channel
            }
            .needs_join()
        );
    }
}
