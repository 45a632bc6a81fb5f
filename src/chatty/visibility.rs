use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chatty::Chatty;
use crate::chatty::database::summary_cache::SummaryCacheEntry;
use crate::chatty::error::{ChattyError, Result};
use crate::chatty::events::PushEvent;
use crate::chatty::groups::Group;
use crate::chatty::messages::Message;
use crate::chatty::summary::SummaryCategory;

/// Per-(group, user) record of which messages the user has seen and when
/// they last acknowledged the group. The seen set only grows.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GroupVisibility {
    pub group_id: i64,
    pub user_id: i64,
    pub last_seen_at: DateTime<Utc>,
    pub seen_message_ids: HashSet<i64>,
}

impl GroupVisibility {
    pub(crate) fn empty(group_id: i64, user_id: i64) -> Self {
        Self {
            group_id,
            user_id,
            last_seen_at: DateTime::UNIX_EPOCH,
            seen_message_ids: HashSet::new(),
        }
    }

    pub fn is_seen(&self, message_id: i64) -> bool {
        self.seen_message_ids.contains(&message_id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen_message_ids.len()
    }
}

impl Chatty {
    /// Marks a batch of group messages as seen by the user.
    ///
    /// The group-level visibility row is the source of truth and is written
    /// first, transactionally, with set-union semantics (re-marking a seen
    /// message is a no-op). The message-level seen rows are then synced
    /// best-effort: a failure there is logged and tolerated, since category
    /// partitioning only consults the group-level state.
    pub async fn mark_messages_seen(
        &self,
        group_id: i64,
        user_id: i64,
        message_ids: &[i64],
    ) -> Result<GroupVisibility> {
        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_member(user_id) {
            return Err(ChattyError::NotGroupMember);
        }

        // Only IDs that are actually messages of this group count
        let messages = Message::find_by_ids(message_ids, &self.database).await?;
        let valid_ids: Vec<i64> = messages
            .iter()
            .filter(|m| m.group_id == Some(group_id))
            .map(|m| m.id)
            .collect();

        if valid_ids.is_empty() {
            return GroupVisibility::load_or_default(group_id, user_id, &self.database).await;
        }

        let now = Utc::now();
        let visibility =
            GroupVisibility::apply_seen(group_id, user_id, &valid_ids, now, &self.database).await?;

        if let Err(e) = Message::record_seen_by(&valid_ids, user_id, now, &self.database).await {
            tracing::warn!(
                target: "chatty::visibility",
                "Message-level seen sync failed for user {} in group {}: {}",
                user_id,
                group_id,
                e
            );
        }

        self.emit(PushEvent::VisibilityUpdated {
            group_id,
            user_id,
            new_seen_count: visibility.seen_count(),
        });
        self.emit(PushEvent::MessageSeenUpdate {
            group_id,
            user_id,
            message_ids: valid_ids,
        });

        Ok(visibility)
    }

    /// A user's visibility state for a group. Absent state reads as empty
    /// (epoch-zero timestamp, no seen IDs), never as an error.
    pub async fn group_visibility(&self, group_id: i64, user_id: i64) -> Result<GroupVisibility> {
        GroupVisibility::load_or_default(group_id, user_id, &self.database).await
    }

    /// Acknowledges the unseen-category summary: clears the user's cached
    /// unseen summaries for the group so the next computation starts fresh.
    /// The seen-message set itself is untouched.
    pub async fn mark_summary_read(&self, group_id: i64, user_id: i64) -> Result<()> {
        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_member(user_id) {
            return Err(ChattyError::NotGroupMember);
        }

        let deleted = SummaryCacheEntry::delete_category(
            group_id,
            user_id,
            SummaryCategory::Unseen,
            &self.database,
        )
        .await?;

        tracing::debug!(
            target: "chatty::visibility",
            "Cleared {} unseen summaries for user {} in group {}",
            deleted,
            user_id,
            group_id
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatty::test_utils::create_mock_chatty;

    #[tokio::test]
    async fn test_mark_seen_is_idempotent() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let alice = chatty.create_user("alice").await.unwrap();
        let bob = chatty.create_user("bob").await.unwrap();
        let group = chatty
            .create_group(alice.id, "eng", "", &[bob.id])
            .await
            .unwrap();

        let m1 = chatty
            .send_group_message(alice.id, group.id, "one", None)
            .await
            .unwrap();
        let m2 = chatty
            .send_group_message(alice.id, group.id, "two", None)
            .await
            .unwrap();

        let once = chatty
            .mark_messages_seen(group.id, bob.id, &[m1.id, m2.id])
            .await
            .unwrap();
        let twice = chatty
            .mark_messages_seen(group.id, bob.id, &[m1.id, m2.id])
            .await
            .unwrap();

        assert_eq!(once.seen_message_ids, twice.seen_message_ids);
        assert_eq!(twice.seen_count(), 2);
    }

    #[tokio::test]
    async fn test_mark_seen_ignores_foreign_messages() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let alice = chatty.create_user("alice").await.unwrap();
        let bob = chatty.create_user("bob").await.unwrap();
        let group_a = chatty
            .create_group(alice.id, "a", "", &[bob.id])
            .await
            .unwrap();
        let group_b = chatty
            .create_group(alice.id, "b", "", &[bob.id])
            .await
            .unwrap();

        let in_a = chatty
            .send_group_message(alice.id, group_a.id, "one", None)
            .await
            .unwrap();
        let in_b = chatty
            .send_group_message(alice.id, group_b.id, "other", None)
            .await
            .unwrap();

        let visibility = chatty
            .mark_messages_seen(group_a.id, bob.id, &[in_a.id, in_b.id])
            .await
            .unwrap();

        assert!(visibility.is_seen(in_a.id));
        assert!(!visibility.is_seen(in_b.id));
    }

    #[tokio::test]
    async fn test_mark_seen_requires_membership() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let alice = chatty.create_user("alice").await.unwrap();
        let outsider = chatty.create_user("outsider").await.unwrap();
        let group = chatty.create_group(alice.id, "eng", "", &[]).await.unwrap();

        let result = chatty.mark_messages_seen(group.id, outsider.id, &[1]).await;
        assert!(matches!(result, Err(ChattyError::NotGroupMember)));
    }

    #[tokio::test]
    async fn test_mark_seen_syncs_message_level_rows() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let alice = chatty.create_user("alice").await.unwrap();
        let bob = chatty.create_user("bob").await.unwrap();
        let group = chatty
            .create_group(alice.id, "eng", "", &[bob.id])
            .await
            .unwrap();

        let message = chatty
            .send_group_message(alice.id, group.id, "hello", None)
            .await
            .unwrap();

        chatty
            .mark_messages_seen(group.id, bob.id, &[message.id])
            .await
            .unwrap();

        let seen = Message::seen_by(message.id, &chatty.database).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, bob.id);
    }

    #[tokio::test]
    async fn test_mark_seen_emits_visibility_event() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let alice = chatty.create_user("alice").await.unwrap();
        let group = chatty.create_group(alice.id, "eng", "", &[]).await.unwrap();
        let message = chatty
            .send_group_message(alice.id, group.id, "hello", None)
            .await
            .unwrap();

        let mut receiver = chatty.push_events().expect("receiver available once");
        chatty
            .mark_messages_seen(group.id, alice.id, &[message.id])
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&PushEvent::VisibilityUpdated {
            group_id: group.id,
            user_id: alice.id,
            new_seen_count: 1
        }));
        assert!(events.contains(&PushEvent::MessageSeenUpdate {
            group_id: group.id,
            user_id: alice.id,
            message_ids: vec![message.id]
        }));
    }

    #[tokio::test]
    async fn test_group_visibility_defaults_when_absent() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;

        let visibility = chatty.group_visibility(12, 34).await.unwrap();
        assert_eq!(visibility.last_seen_at, DateTime::UNIX_EPOCH);
        assert!(visibility.seen_message_ids.is_empty());
    }
}
