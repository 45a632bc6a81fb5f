use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chatty::Chatty;
use crate::chatty::error::{ChattyError, Result};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chatty {
    /// Creates a user. Authentication and credentials live upstream; the
    /// core only needs an identity with a display name.
    pub async fn create_user(&self, display_name: &str) -> Result<User> {
        let trimmed = display_name.trim();
        if trimmed.is_empty() {
            return Err(ChattyError::Validation(
                "Display name is required".to_string(),
            ));
        }

        let user = User::insert_new(trimmed, &self.database).await?;

        tracing::debug!(
            target: "chatty::users",
            "Created user {} ({})",
            user.id,
            user.display_name
        );

        Ok(user)
    }

    pub async fn user(&self, user_id: i64) -> Result<User> {
        User::find_by_id(user_id, &self.database).await
    }

    /// Everyone except the requesting user, for the contact sidebar.
    pub async fn users_directory(&self, requesting_user_id: i64) -> Result<Vec<User>> {
        User::all_except(requesting_user_id, &self.database).await
    }
}
