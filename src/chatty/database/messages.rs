use chrono::{DateTime, Utc};

use super::{Database, utils::parse_timestamp};
use crate::chatty::error::ChattyError;
use crate::chatty::messages::{MarkedMessage, Message};

/// Internal database row representation for the messages table
#[derive(Debug, Clone)]
struct MessageRow {
    id: i64,
    sender_id: i64,
    receiver_id: Option<i64>,
    group_id: Option<i64>,
    text: String,
    image_ref: Option<String>,
    marked: bool,
    created_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for MessageRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    bool: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let id: i64 = row.try_get("id")?;
        let sender_id: i64 = row.try_get("sender_id")?;
        let receiver_id: Option<i64> = row.try_get("receiver_id")?;
        let group_id: Option<i64> = row.try_get("group_id")?;
        let text: String = row.try_get("text")?;
        let image_ref: Option<String> = row.try_get("image_ref")?;
        let marked: bool = row.try_get("marked")?;
        let created_at = parse_timestamp(row, "created_at")?;

        Ok(Self {
            id,
            sender_id,
            receiver_id,
            group_id,
            text,
            image_ref,
            marked,
            created_at,
        })
    }
}

impl MessageRow {
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            group_id: self.group_id,
            text: self.text,
            image_ref: self.image_ref,
            marked: self.marked,
            created_at: self.created_at,
        }
    }
}

/// Row shape for marked-message queries: message fields joined with the
/// sender's display name, as the summarizer needs them.
#[derive(Debug, Clone)]
struct MarkedMessageRow {
    id: i64,
    sender_id: i64,
    sender_name: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for MarkedMessageRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            sender_name: row.try_get("sender_name")?,
            text: row.try_get("text")?,
            created_at: parse_timestamp(row, "created_at")?,
        })
    }
}

impl Message {
    /// Inserts a message row. Exactly one of `receiver_id`/`group_id` must
    /// be set; the schema CHECK enforces it as a backstop.
    pub(crate) async fn insert_new(
        sender_id: i64,
        receiver_id: Option<i64>,
        group_id: Option<i64>,
        text: &str,
        image_ref: Option<&str>,
        marked: bool,
        database: &Database,
    ) -> Result<Self, ChattyError> {
        let now_ms = Utc::now().timestamp_millis();

        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (sender_id, receiver_id, group_id, text, image_ref, marked, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id, sender_id, receiver_id, group_id, text, image_ref, marked, created_at",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(group_id)
        .bind(text)
        .bind(image_ref)
        .bind(marked)
        .bind(now_ms)
        .fetch_one(&database.pool)
        .await?;

        Ok(row.into_message())
    }

    /// The two-party conversation between `user_a` and `user_b`, oldest first.
    pub(crate) async fn direct_conversation(
        user_a: i64,
        user_b: i64,
        database: &Database,
    ) -> Result<Vec<Self>, ChattyError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, sender_id, receiver_id, group_id, text, image_ref, marked, created_at
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at, id",
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    /// All of a group's messages, oldest first.
    pub(crate) async fn for_group(
        group_id: i64,
        database: &Database,
    ) -> Result<Vec<Self>, ChattyError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, sender_id, receiver_id, group_id, text, image_ref, marked, created_at
             FROM messages
             WHERE group_id = ?
             ORDER BY created_at, id",
        )
        .bind(group_id)
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    /// Finds multiple messages by ID. Missing IDs are absent from the result.
    pub(crate) async fn find_by_ids(
        ids: &[i64],
        database: &Database,
    ) -> Result<Vec<Self>, ChattyError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = "?,".repeat(ids.len());
        let placeholders = placeholders.trim_end_matches(',');

        let query = format!(
            "SELECT id, sender_id, receiver_id, group_id, text, image_ref, marked, created_at
             FROM messages
             WHERE id IN ({})",
            placeholders
        );

        let mut query_builder = sqlx::query_as::<_, MessageRow>(&query);
        for id in ids {
            query_builder = query_builder.bind(id);
        }

        let rows = query_builder.fetch_all(&database.pool).await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    /// All marked messages of a group in creation order, joined with sender
    /// display names. This is the partitioner's input.
    pub(crate) async fn marked_for_group(
        group_id: i64,
        database: &Database,
    ) -> Result<Vec<MarkedMessage>, ChattyError> {
        let rows = sqlx::query_as::<_, MarkedMessageRow>(
            "SELECT m.id, m.sender_id, u.display_name AS sender_name, m.text, m.created_at
             FROM messages m
             INNER JOIN users u ON u.id = m.sender_id
             WHERE m.group_id = ? AND m.marked = 1
             ORDER BY m.created_at, m.id",
        )
        .bind(group_id)
        .fetch_all(&database.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MarkedMessage {
                id: row.id,
                sender_id: row.sender_id,
                sender_name: row.sender_name,
                text: row.text,
                created_at: row.created_at,
            })
            .collect())
    }

    /// Records message-level read receipts for a batch of messages.
    /// Idempotent: re-marking an already-seen message is a no-op.
    pub(crate) async fn record_seen_by(
        message_ids: &[i64],
        user_id: i64,
        seen_at: DateTime<Utc>,
        database: &Database,
    ) -> Result<(), ChattyError> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let seen_at_ms = seen_at.timestamp_millis();

        let mut txn = database.pool.begin().await?;
        for message_id in message_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO message_seen (message_id, user_id, seen_at) VALUES (?, ?, ?)",
            )
            .bind(message_id)
            .bind(user_id)
            .bind(seen_at_ms)
            .execute(&mut *txn)
            .await?;
        }
        txn.commit().await?;

        Ok(())
    }

    /// User IDs that have seen the given message, with their timestamps.
    pub(crate) async fn seen_by(
        message_id: i64,
        database: &Database,
    ) -> Result<Vec<(i64, DateTime<Utc>)>, ChattyError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT user_id, seen_at FROM message_seen WHERE message_id = ? ORDER BY seen_at",
        )
        .bind(message_id)
        .fetch_all(&database.pool)
        .await?;

        rows.into_iter()
            .map(|(user_id, seen_at_ms)| {
                DateTime::from_timestamp_millis(seen_at_ms)
                    .map(|ts| (user_id, ts))
                    .ok_or(ChattyError::Database(
                        super::DatabaseError::InvalidTimestamp {
                            timestamp: seen_at_ms,
                        },
                    ))
            })
            .collect()
    }
}
