use chrono::{DateTime, Utc};

use super::{Database, utils::parse_timestamp};
use crate::chatty::error::ChattyError;
use crate::chatty::groups::Group;

/// Internal database row representation for the chat_groups table
#[derive(Debug, Clone)]
struct GroupRow {
    id: i64,
    name: String,
    description: String,
    admin_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for GroupRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let id: i64 = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let description: String = row.try_get("description")?;
        let admin_id: i64 = row.try_get("admin_id")?;
        let created_at = parse_timestamp(row, "created_at")?;
        let updated_at = parse_timestamp(row, "updated_at")?;

        Ok(Self {
            id,
            name,
            description,
            admin_id,
            created_at,
            updated_at,
        })
    }
}

impl GroupRow {
    fn into_group(self, member_ids: Vec<i64>) -> Group {
        Group {
            id: self.id,
            name: self.name,
            description: self.description,
            admin_id: self.admin_id,
            member_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Group {
    /// Creates a group and its membership rows in one transaction. The
    /// admin must already be present in `member_ids`.
    pub(crate) async fn insert_new(
        name: &str,
        description: &str,
        admin_id: i64,
        member_ids: &[i64],
        database: &Database,
    ) -> Result<Self, ChattyError> {
        let now_ms = Utc::now().timestamp_millis();

        let mut txn = database.pool.begin().await?;

        let row = sqlx::query_as::<_, GroupRow>(
            "INSERT INTO chat_groups (name, description, admin_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, name, description, admin_id, created_at, updated_at",
        )
        .bind(name)
        .bind(description)
        .bind(admin_id)
        .bind(now_ms)
        .bind(now_ms)
        .fetch_one(&mut *txn)
        .await?;

        for member_id in member_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)",
            )
            .bind(row.id)
            .bind(member_id)
            .execute(&mut *txn)
            .await?;
        }

        txn.commit().await?;

        Ok(row.into_group(member_ids.to_vec()))
    }

    /// Finds a group by ID with its member list, mapping a missing row to
    /// [`ChattyError::GroupNotFound`].
    pub(crate) async fn find_by_id(id: i64, database: &Database) -> Result<Self, ChattyError> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, description, admin_id, created_at, updated_at
             FROM chat_groups WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&database.pool)
        .await?
        .ok_or(ChattyError::GroupNotFound)?;

        let member_ids = Self::member_ids(id, database).await?;

        Ok(row.into_group(member_ids))
    }

    /// All groups the user is a member of, most recently updated first.
    pub(crate) async fn find_for_member(
        user_id: i64,
        database: &Database,
    ) -> Result<Vec<Self>, ChattyError> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT g.id, g.name, g.description, g.admin_id, g.created_at, g.updated_at
             FROM chat_groups g
             INNER JOIN group_members gm ON gm.group_id = g.id
             WHERE gm.user_id = ?
             ORDER BY g.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&database.pool)
        .await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let member_ids = Self::member_ids(row.id, database).await?;
            groups.push(row.into_group(member_ids));
        }
        Ok(groups)
    }

    pub(crate) async fn add_member_rows(
        group_id: i64,
        member_ids: &[i64],
        database: &Database,
    ) -> Result<(), ChattyError> {
        let now_ms = Utc::now().timestamp_millis();

        let mut txn = database.pool.begin().await?;
        for member_id in member_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)",
            )
            .bind(group_id)
            .bind(member_id)
            .execute(&mut *txn)
            .await?;
        }
        sqlx::query("UPDATE chat_groups SET updated_at = ? WHERE id = ?")
            .bind(now_ms)
            .bind(group_id)
            .execute(&mut *txn)
            .await?;
        txn.commit().await?;

        Ok(())
    }

    pub(crate) async fn remove_member_row(
        group_id: i64,
        member_id: i64,
        database: &Database,
    ) -> Result<(), ChattyError> {
        let now_ms = Utc::now().timestamp_millis();

        let mut txn = database.pool.begin().await?;
        sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(member_id)
            .execute(&mut *txn)
            .await?;
        sqlx::query("UPDATE chat_groups SET updated_at = ? WHERE id = ?")
            .bind(now_ms)
            .bind(group_id)
            .execute(&mut *txn)
            .await?;
        txn.commit().await?;

        Ok(())
    }

    /// Deletes the group row. Messages, memberships, visibility state, and
    /// cache entries all cascade via foreign keys.
    pub(crate) async fn delete_row(group_id: i64, database: &Database) -> Result<(), ChattyError> {
        sqlx::query("DELETE FROM chat_groups WHERE id = ?")
            .bind(group_id)
            .execute(&database.pool)
            .await?;
        Ok(())
    }

    async fn member_ids(group_id: i64, database: &Database) -> Result<Vec<i64>, ChattyError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM group_members WHERE group_id = ? ORDER BY user_id",
        )
        .bind(group_id)
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatty::test_utils::{create_mock_chatty, seed_user};

    #[tokio::test]
    async fn test_insert_and_find_group() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let admin = seed_user(&chatty, "admin").await;
        let member = seed_user(&chatty, "member").await;

        let group = Group::insert_new(
            "engineering",
            "the eng channel",
            admin.id,
            &[admin.id, member.id],
            &chatty.database,
        )
        .await
        .unwrap();

        let found = Group::find_by_id(group.id, &chatty.database).await.unwrap();
        assert_eq!(found.name, "engineering");
        assert_eq!(found.admin_id, admin.id);
        assert_eq!(found.member_ids.len(), 2);
        assert!(found.is_member(member.id));
    }

    #[tokio::test]
    async fn test_find_by_id_not_found() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;

        let result = Group::find_by_id(42, &chatty.database).await;
        assert!(matches!(result, Err(ChattyError::GroupNotFound)));
    }

    #[tokio::test]
    async fn test_find_for_member_only_returns_memberships() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let a = seed_user(&chatty, "a").await;
        let b = seed_user(&chatty, "b").await;

        Group::insert_new("g1", "", a.id, &[a.id], &chatty.database)
            .await
            .unwrap();
        Group::insert_new("g2", "", b.id, &[b.id, a.id], &chatty.database)
            .await
            .unwrap();

        let a_groups = Group::find_for_member(a.id, &chatty.database).await.unwrap();
        assert_eq!(a_groups.len(), 2);

        let b_groups = Group::find_for_member(b.id, &chatty.database).await.unwrap();
        assert_eq!(b_groups.len(), 1);
        assert_eq!(b_groups[0].name, "g2");
    }

    #[tokio::test]
    async fn test_add_member_rows_is_idempotent() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let admin = seed_user(&chatty, "admin").await;
        let member = seed_user(&chatty, "member").await;

        let group = Group::insert_new("g", "", admin.id, &[admin.id], &chatty.database)
            .await
            .unwrap();

        Group::add_member_rows(group.id, &[member.id], &chatty.database)
            .await
            .unwrap();
        Group::add_member_rows(group.id, &[member.id], &chatty.database)
            .await
            .unwrap();

        let found = Group::find_by_id(group.id, &chatty.database).await.unwrap();
        assert_eq!(found.member_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_row_cascades_membership() {
        let (chatty, _data_temp, _logs_temp) = create_mock_chatty().await;
        let admin = seed_user(&chatty, "admin").await;

        let group = Group::insert_new("g", "", admin.id, &[admin.id], &chatty.database)
            .await
            .unwrap();

        Group::delete_row(group.id, &chatty.database).await.unwrap();

        let member_count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM group_members WHERE group_id = ?")
                .bind(group.id)
                .fetch_one(&chatty.database.pool)
                .await
                .unwrap();
        assert_eq!(member_count.0, 0);
    }
}
