use serde::Serialize;

/// Events the core emits for the real-time push layer to fan out to
/// connected clients. Delivery is the embedding application's concern; the
/// core only decides what to emit and to whom.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PushEvent {
    /// A user's visibility state for a group changed. Delivered to the same
    /// user's other sessions so open tabs can re-fetch their summary view.
    #[serde(rename_all = "camelCase")]
    VisibilityUpdated {
        group_id: i64,
        user_id: i64,
        new_seen_count: usize,
    },

    /// Message-level read receipts were recorded for a batch of messages.
    #[serde(rename_all = "camelCase")]
    MessageSeenUpdate {
        group_id: i64,
        user_id: i64,
        message_ids: Vec<i64>,
    },

    #[serde(rename_all = "camelCase")]
    GroupCreated { group_id: i64 },

    #[serde(rename_all = "camelCase")]
    GroupUpdated { group_id: i64 },

    #[serde(rename_all = "camelCase")]
    GroupDeleted { group_id: i64, group_name: String },

    /// Sent to a member the admin removed from a group.
    #[serde(rename_all = "camelCase")]
    RemovedFromGroup {
        group_id: i64,
        group_name: String,
        user_id: i64,
    },
}
