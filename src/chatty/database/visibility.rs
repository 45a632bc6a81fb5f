use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::{
    Database,
    utils::{decode_id_set, encode_id_set, parse_timestamp},
};
use crate::chatty::error::ChattyError;
use crate::chatty::visibility::GroupVisibility;

/// Internal database row representation for the group_visibility table
#[derive(Debug, Clone)]
struct VisibilityRow {
    group_id: i64,
    user_id: i64,
    last_seen_at: DateTime<Utc>,
    seen_message_ids: HashSet<i64>,
}

impl<'r, R> sqlx::FromRow<'r, R> for VisibilityRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let group_id: i64 = row.try_get("group_id")?;
        let user_id: i64 = row.try_get("user_id")?;
        let last_seen_at = parse_timestamp(row, "last_seen_at")?;
        let ids_json: String = row.try_get("seen_message_ids")?;
        let seen_message_ids = decode_id_set(&ids_json, "seen_message_ids")?;

        Ok(Self {
            group_id,
            user_id,
            last_seen_at,
            seen_message_ids,
        })
    }
}

impl VisibilityRow {
    fn into_visibility(self) -> GroupVisibility {
        GroupVisibility {
            group_id: self.group_id,
            user_id: self.user_id,
            last_seen_at: self.last_seen_at,
            seen_message_ids: self.seen_message_ids,
        }
    }
}

impl GroupVisibility {
    /// Loads a user's visibility state for a group. An absent row reads as
    /// the empty state (epoch-zero last_seen_at, no seen IDs) - never an
    /// error.
    pub(crate) async fn load_or_default(
        group_id: i64,
        user_id: i64,
        database: &Database,
    ) -> Result<Self, ChattyError> {
        let row = sqlx::query_as::<_, VisibilityRow>(
            "SELECT group_id, user_id, last_seen_at, seen_message_ids
             FROM group_visibility
             WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&database.pool)
        .await?;

        Ok(match row {
            Some(row) => row.into_visibility(),
            None => GroupVisibility::empty(group_id, user_id),
        })
    }

    /// Unions `new_ids` into the user's seen set and bumps `last_seen_at`,
    /// reading and upserting inside one transaction so concurrent calls
    /// cannot lose IDs. Idempotent: already-present IDs are no-ops.
    pub(crate) async fn apply_seen(
        group_id: i64,
        user_id: i64,
        new_ids: &[i64],
        now: DateTime<Utc>,
        database: &Database,
    ) -> Result<Self, ChattyError> {
        let mut txn = database.pool.begin().await?;

        let existing = sqlx::query_as::<_, VisibilityRow>(
            "SELECT group_id, user_id, last_seen_at, seen_message_ids
             FROM group_visibility
             WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *txn)
        .await?;

        let mut seen_message_ids = existing
            .map(|row| row.seen_message_ids)
            .unwrap_or_default();
        seen_message_ids.extend(new_ids.iter().copied());

        let encoded = encode_id_set(&seen_message_ids);

        sqlx::query(
            "INSERT INTO group_visibility (group_id, user_id, last_seen_at, seen_message_ids)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (group_id, user_id) DO UPDATE SET
                 last_seen_at = excluded.last_seen_at,
                 seen_message_ids = excluded.seen_message_ids",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(now.timestamp_millis())
        .bind(&encoded)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;

        Ok(GroupVisibility {
            group_id,
            user_id,
            last_seen_at: now,
            seen_message_ids,
        })
    }
}
