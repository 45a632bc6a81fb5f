use chrono::{DateTime, Utc};

use super::{Database, utils::parse_timestamp};
use crate::chatty::error::ChattyError;
use crate::chatty::users::User;

/// Internal database row representation for the users table
#[derive(Debug, Clone)]
pub(crate) struct UserRow {
    pub id: i64,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for UserRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let id: i64 = row.try_get("id")?;
        let display_name: String = row.try_get("display_name")?;
        let created_at = parse_timestamp(row, "created_at")?;
        let updated_at = parse_timestamp(row, "updated_at")?;

        Ok(Self {
            id,
            display_name,
            created_at,
            updated_at,
        })
    }
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: self.id,
            display_name: self.display_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl User {
    pub(crate) async fn insert_new(
        display_name: &str,
        database: &Database,
    ) -> Result<Self, ChattyError> {
        let now_ms = Utc::now().timestamp_millis();

        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (display_name, created_at, updated_at)
             VALUES (?, ?, ?)
             RETURNING id, display_name, created_at, updated_at",
        )
        .bind(display_name)
        .bind(now_ms)
        .bind(now_ms)
        .fetch_one(&database.pool)
        .await?;

        Ok(row.into_user())
    }

    /// Finds a user by ID, mapping a missing row to [`ChattyError::UserNotFound`].
    pub(crate) async fn find_by_id(id: i64, database: &Database) -> Result<Self, ChattyError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, display_name, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&database.pool)
        .await?
        .ok_or(ChattyError::UserNotFound)?;

        Ok(row.into_user())
    }

    /// Finds multiple users by ID. Missing IDs are simply absent from the
    /// result; callers that need all-or-nothing semantics compare lengths.
    pub(crate) async fn find_by_ids(
        ids: &[i64],
        database: &Database,
    ) -> Result<Vec<Self>, ChattyError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Build dynamic query with correct number of placeholders
        let placeholders = "?,".repeat(ids.len());
        let placeholders = placeholders.trim_end_matches(',');

        let query = format!(
            "SELECT id, display_name, created_at, updated_at
             FROM users
             WHERE id IN ({})",
            placeholders
        );

        let mut query_builder = sqlx::query_as::<_, UserRow>(&query);
        for id in ids {
            query_builder = query_builder.bind(id);
        }

        let rows = query_builder.fetch_all(&database.pool).await?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// All users except the given one, for the contact sidebar.
    pub(crate) async fn all_except(
        user_id: i64,
        database: &Database,
    ) -> Result<Vec<Self>, ChattyError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, display_name, created_at, updated_at
             FROM users
             WHERE id != ?
             ORDER BY display_name",
        )
        .bind(user_id)
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }
}
