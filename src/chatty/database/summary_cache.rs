use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{Database, utils::parse_timestamp};
use crate::chatty::error::ChattyError;
use crate::chatty::summary::SummaryCategory;

/// A stored summarization result, scoped to one user and covering an exact
/// set of message IDs. Entries are immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryCacheEntry {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub category: SummaryCategory,
    pub cache_key: String,
    /// Sorted, deduplicated, never empty.
    pub message_ids: Vec<i64>,
    pub summary_text: String,
    pub generated_at: DateTime<Utc>,
}

/// Internal database row representation for the summary_cache table
#[derive(Debug, Clone)]
struct SummaryCacheRow {
    id: i64,
    group_id: i64,
    user_id: i64,
    category: String,
    cache_key: String,
    message_ids: String,
    summary_text: String,
    generated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for SummaryCacheRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            group_id: row.try_get("group_id")?,
            user_id: row.try_get("user_id")?,
            category: row.try_get("category")?,
            cache_key: row.try_get("cache_key")?,
            message_ids: row.try_get("message_ids")?,
            summary_text: row.try_get("summary_text")?,
            generated_at: parse_timestamp(row, "generated_at")?,
        })
    }
}

impl SummaryCacheRow {
    fn into_entry(self) -> Result<SummaryCacheEntry, ChattyError> {
        let category = SummaryCategory::from_str(&self.category).map_err(|e| {
            ChattyError::Configuration(format!("Invalid category '{}': {}", self.category, e))
        })?;
        let message_ids: Vec<i64> = serde_json::from_str(&self.message_ids)?;

        Ok(SummaryCacheEntry {
            id: self.id,
            group_id: self.group_id,
            user_id: self.user_id,
            category,
            cache_key: self.cache_key,
            message_ids,
            summary_text: self.summary_text,
            generated_at: self.generated_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, group_id, user_id, category, cache_key, message_ids, summary_text, generated_at";

impl SummaryCacheEntry {
    /// Inserts a new entry and evicts oldest-by-generated_at rows beyond
    /// `bound` for the group, in one transaction so a crash cannot leave the
    /// cache over its limit with the insert applied but the eviction lost.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn store(
        group_id: i64,
        user_id: i64,
        category: SummaryCategory,
        cache_key: &str,
        message_ids: &[i64],
        summary_text: &str,
        generated_at: DateTime<Utc>,
        bound: usize,
        database: &Database,
    ) -> Result<Self, ChattyError> {
        let ids_json = serde_json::to_string(message_ids)?;

        let mut txn = database.pool.begin().await?;

        let row = sqlx::query_as::<_, SummaryCacheRow>(&format!(
            "INSERT INTO summary_cache
                 (group_id, user_id, category, cache_key, message_ids, summary_text, generated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(group_id)
        .bind(user_id)
        .bind(category.as_str())
        .bind(cache_key)
        .bind(&ids_json)
        .bind(summary_text)
        .bind(generated_at.timestamp_millis())
        .fetch_one(&mut *txn)
        .await?;

        sqlx::query(
            "DELETE FROM summary_cache
             WHERE group_id = ?1
               AND id NOT IN (
                   SELECT id FROM summary_cache
                   WHERE group_id = ?1
                   ORDER BY generated_at DESC, id DESC
                   LIMIT ?2
               )",
        )
        .bind(group_id)
        .bind(bound as i64)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;

        row.into_entry()
    }

    /// Exact-key lookup. Duplicate keys are tolerated (concurrent generation
    /// is an accepted race); the most recent entry wins.
    pub(crate) async fn find_exact(
        group_id: i64,
        cache_key: &str,
        database: &Database,
    ) -> Result<Option<Self>, ChattyError> {
        let row = sqlx::query_as::<_, SummaryCacheRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM summary_cache
             WHERE group_id = ? AND cache_key = ?
             ORDER BY generated_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(group_id)
        .bind(cache_key)
        .fetch_optional(&database.pool)
        .await?;

        row.map(SummaryCacheRow::into_entry).transpose()
    }

    /// All of a user's entries in a group, across categories, oldest first.
    /// Input for the best-coverage selection.
    pub(crate) async fn all_for_user(
        group_id: i64,
        user_id: i64,
        database: &Database,
    ) -> Result<Vec<Self>, ChattyError> {
        let rows = sqlx::query_as::<_, SummaryCacheRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM summary_cache
             WHERE group_id = ? AND user_id = ?
             ORDER BY generated_at, id"
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_all(&database.pool)
        .await?;

        rows.into_iter()
            .map(SummaryCacheRow::into_entry)
            .collect::<Result<Vec<_>, _>>()
    }

    /// Deletes a user's entries of one category in a group. Used when the
    /// user dismisses the unseen-category summary.
    pub(crate) async fn delete_category(
        group_id: i64,
        user_id: i64,
        category: SummaryCategory,
        database: &Database,
    ) -> Result<u64, ChattyError> {
        let result = sqlx::query(
            "DELETE FROM summary_cache WHERE group_id = ? AND user_id = ? AND category = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(category.as_str())
        .execute(&database.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[cfg(test)]
    pub(crate) async fn count_for_group(
        group_id: i64,
        database: &Database,
    ) -> Result<i64, ChattyError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM summary_cache WHERE group_id = ?")
                .bind(group_id)
                .fetch_one(&database.pool)
                .await?;
        Ok(count)
    }
}
