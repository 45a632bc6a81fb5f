use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chatty::Chatty;
use crate::chatty::error::{ChattyError, Result};
use crate::chatty::events::PushEvent;
use crate::chatty::users::User;

const MAX_NAME_LEN: usize = 50;
const MAX_DESCRIPTION_LEN: usize = 200;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub admin_id: i64,
    pub member_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_id == user_id
    }

    pub fn is_member(&self, user_id: i64) -> bool {
        self.member_ids.contains(&user_id)
    }

    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }
}

impl Chatty {
    /// Creates a group. Any authenticated user may create one; the creator
    /// becomes admin and is always a member.
    pub async fn create_group(
        &self,
        admin_id: i64,
        name: &str,
        description: &str,
        member_ids: &[i64],
    ) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChattyError::Validation("Group name is required".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ChattyError::Validation(format!(
                "Group name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        let description = description.trim();
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(ChattyError::Validation(format!(
                "Group description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }

        User::find_by_id(admin_id, &self.database).await?;
        self.ensure_users_exist(member_ids).await?;

        // Admin is always a member; duplicates collapse
        let mut all_members: Vec<i64> = vec![admin_id];
        let mut present: HashSet<i64> = all_members.iter().copied().collect();
        for id in member_ids {
            if present.insert(*id) {
                all_members.push(*id);
            }
        }

        let group =
            Group::insert_new(name, description, admin_id, &all_members, &self.database).await?;

        tracing::info!(
            target: "chatty::groups",
            "Created group {} ({}) with {} members",
            group.id,
            group.name,
            group.member_count()
        );

        self.emit(PushEvent::GroupCreated { group_id: group.id });

        Ok(group)
    }

    /// All groups the user belongs to, most recently updated first.
    pub async fn user_groups(&self, user_id: i64) -> Result<Vec<Group>> {
        Group::find_for_member(user_id, &self.database).await
    }

    /// Fetches one group; members only.
    pub async fn group(&self, group_id: i64, user_id: i64) -> Result<Group> {
        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_member(user_id) {
            return Err(ChattyError::NotGroupMember);
        }
        Ok(group)
    }

    /// Adds members to a group; admin only. Already-present members are
    /// skipped rather than rejected.
    pub async fn add_group_members(
        &self,
        group_id: i64,
        acting_user_id: i64,
        member_ids: &[i64],
    ) -> Result<Group> {
        if member_ids.is_empty() {
            return Err(ChattyError::Validation("Member IDs are required".to_string()));
        }

        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_admin(acting_user_id) {
            return Err(ChattyError::NotGroupAdmin);
        }

        self.ensure_users_exist(member_ids).await?;

        let new_members: Vec<i64> = member_ids
            .iter()
            .copied()
            .filter(|id| !group.is_member(*id))
            .collect();
        Group::add_member_rows(group_id, &new_members, &self.database).await?;

        let updated = Group::find_by_id(group_id, &self.database).await?;

        self.emit(PushEvent::GroupUpdated { group_id });

        Ok(updated)
    }

    /// Removes a member; admin only. The admin cannot be removed.
    pub async fn remove_group_member(
        &self,
        group_id: i64,
        acting_user_id: i64,
        member_id: i64,
    ) -> Result<Group> {
        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_admin(acting_user_id) {
            return Err(ChattyError::NotGroupAdmin);
        }
        if group.is_admin(member_id) {
            return Err(ChattyError::Validation(
                "Cannot remove group admin".to_string(),
            ));
        }
        if !group.is_member(member_id) {
            return Err(ChattyError::Validation(
                "User is not a member of this group".to_string(),
            ));
        }

        Group::remove_member_row(group_id, member_id, &self.database).await?;

        let updated = Group::find_by_id(group_id, &self.database).await?;

        self.emit(PushEvent::GroupUpdated { group_id });
        self.emit(PushEvent::RemovedFromGroup {
            group_id,
            group_name: updated.name.clone(),
            user_id: member_id,
        });

        Ok(updated)
    }

    /// Deletes a group and, via cascade, its messages, memberships,
    /// visibility state, and cached summaries. Admin only.
    pub async fn delete_group(&self, group_id: i64, acting_user_id: i64) -> Result<()> {
        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_admin(acting_user_id) {
            return Err(ChattyError::NotGroupAdmin);
        }

        Group::delete_row(group_id, &self.database).await?;

        tracing::info!(
            target: "chatty::groups",
            "Deleted group {} ({})",
            group_id,
            group.name
        );

        self.emit(PushEvent::GroupDeleted {
            group_id,
            group_name: group.name,
        });

        Ok(())
    }

    async fn ensure_users_exist(&self, user_ids: &[i64]) -> Result<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let unique: HashSet<i64> = user_ids.iter().copied().collect();
        let unique: Vec<i64> = unique.into_iter().collect();
        let found = User::find_by_ids(&unique, &self.database).await?;
        if found.len() != unique.len() {
            return Err(ChattyError::Validation(
                "One or more member IDs are invalid".to_string(),
            ));
        }
        Ok(())
    }
}
