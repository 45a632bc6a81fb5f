use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chatty::Chatty;
use crate::chatty::error::{ChattyError, Result};
use crate::chatty::groups::Group;
use crate::chatty::users::User;

/// The in-message token that flags a message for AI summarization.
/// Matching is case-insensitive; the flag is computed once at send time and
/// never changes afterwards.
pub const TRIGGER_TOKEN: &str = "!Chatty";

pub(crate) fn contains_trigger_token(text: &str) -> bool {
    text.to_lowercase().contains(&TRIGGER_TOKEN.to_lowercase())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    /// Set for direct messages, mutually exclusive with `group_id`.
    pub receiver_id: Option<i64>,
    /// Set for group messages, mutually exclusive with `receiver_id`.
    pub group_id: Option<i64>,
    pub text: String,
    /// Opaque pointer into external asset storage; the core never touches
    /// the binary itself.
    pub image_ref: Option<String>,
    pub marked: bool,
    pub created_at: DateTime<Utc>,
}

/// A marked message joined with its sender's display name - the shape the
/// partitioner and summarizer consume.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MarkedMessage {
    pub id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Chatty {
    /// Sends a direct message to another user.
    pub async fn send_direct_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        text: &str,
        image_ref: Option<&str>,
    ) -> Result<Message> {
        if text.is_empty() && image_ref.is_none() {
            return Err(ChattyError::Validation(
                "Message must have text or an image".to_string(),
            ));
        }
        User::find_by_id(receiver_id, &self.database).await?;

        let marked = contains_trigger_token(text);
        Message::insert_new(
            sender_id,
            Some(receiver_id),
            None,
            text,
            image_ref,
            marked,
            &self.database,
        )
        .await
    }

    /// Sends a message to a group; members only. The marked flag is derived
    /// from the text here and is immutable afterwards.
    pub async fn send_group_message(
        &self,
        sender_id: i64,
        group_id: i64,
        text: &str,
        image_ref: Option<&str>,
    ) -> Result<Message> {
        if text.is_empty() && image_ref.is_none() {
            return Err(ChattyError::Validation(
                "Message must have text or an image".to_string(),
            ));
        }

        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_member(sender_id) {
            return Err(ChattyError::NotGroupMember);
        }

        let marked = contains_trigger_token(text);
        let message = Message::insert_new(
            sender_id,
            None,
            Some(group_id),
            text,
            image_ref,
            marked,
            &self.database,
        )
        .await?;

        if marked {
            tracing::debug!(
                target: "chatty::messages",
                "Marked message {} recorded in group {}",
                message.id,
                group_id
            );
        }

        Ok(message)
    }

    /// The two-party conversation between the caller and another user,
    /// oldest first.
    pub async fn direct_conversation(&self, user_id: i64, other_user_id: i64) -> Result<Vec<Message>> {
        Message::direct_conversation(user_id, other_user_id, &self.database).await
    }

    /// A group's messages, oldest first; members only.
    pub async fn group_messages(&self, group_id: i64, user_id: i64) -> Result<Vec<Message>> {
        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_member(user_id) {
            return Err(ChattyError::NotGroupMember);
        }
        Message::for_group(group_id, &self.database).await
    }

    /// Message-level read receipts: who has seen a message and when,
    /// oldest receipt first.
    pub async fn message_seen_by(&self, message_id: i64) -> Result<Vec<(i64, DateTime<Utc>)>> {
        Message::seen_by(message_id, &self.database).await
    }
}
