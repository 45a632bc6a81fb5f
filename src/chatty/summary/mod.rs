//! The summary subsystem: category partitioning, cache consultation, model
//! invocation, and aggregation into the three-category response.
//!
//! For the unseen and previous-day categories the message set is
//! well-defined per request, so exact-match caching applies. The seen
//! category is read-only with respect to summarization: it only surfaces
//! summaries generated earlier (while its messages were unseen or in the
//! previous-day window) via best-coverage lookup, and never triggers a
//! model call of its own.

mod cache;
mod partition;
mod summarizer;
mod types;


pub use summarizer::{GeminiModel, SummarizerAdapter, SummaryModel, SummaryModelError};
pub use types::{
    CategorySummary, GroupSummary, PartitionedMessages, SummaryCategory, SummaryOptions,
};

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::chatty::Chatty;
use crate::chatty::database::summary_cache::SummaryCacheEntry;
use crate::chatty::error::{ChattyError, Result};
use crate::chatty::groups::Group;
use crate::chatty::messages::{MarkedMessage, Message, TRIGGER_TOKEN};
use crate::chatty::visibility::GroupVisibility;

fn empty_category_placeholder(category: SummaryCategory) -> String {
    match category {
        SummaryCategory::Unseen => {
            format!("No {TRIGGER_TOKEN} messages found that you haven't seen yet.")
        }
        SummaryCategory::Seen => {
            format!("No {TRIGGER_TOKEN} messages found that you've already seen.")
        }
        SummaryCategory::PreviousDay => {
            format!("No {TRIGGER_TOKEN} messages found for the previous day.")
        }
    }
}

const GROUP_TOO_NEW_PLACEHOLDER: &str =
    "This group was created recently, so there's no previous day to summarize yet.";

const SEEN_UNAVAILABLE_PLACEHOLDER: &str =
    "Previous summaries are not available for the messages you've already seen.";

impl Chatty {
    /// Builds the aggregated three-category summary for one group member.
    ///
    /// Loads the group's marked messages in creation order, partitions them
    /// against the caller's visibility state, then resolves each category
    /// through the cache, invoking the model only on exact-match misses for
    /// non-empty unseen/previous-day sets. Two concurrent calls may both
    /// miss and both generate; that race is accepted, duplicate entries are
    /// tolerated, and lookups prefer the newest.
    pub async fn group_summary(&self, group_id: i64, user_id: i64) -> Result<GroupSummary> {
        let group = Group::find_by_id(group_id, &self.database).await?;
        if !group.is_member(user_id) {
            return Err(ChattyError::NotGroupMember);
        }

        let marked = Message::marked_for_group(group_id, &self.database).await?;
        let visibility =
            GroupVisibility::load_or_default(group_id, user_id, &self.database).await?;

        let now = Utc::now();
        let tz = self.config.summary.timezone();
        let partitioned = partition::partition(&marked, &visibility, group.created_at, now, tz);

        tracing::debug!(
            target: "chatty::summary",
            "Partitioned {} marked messages for user {} in group {}: {} unseen, {} seen, {} previous-day",
            marked.len(),
            user_id,
            group_id,
            partitioned.unseen.len(),
            partitioned.seen.len(),
            partitioned.previous_day.len()
        );

        let unseen = self
            .resolve_exact_category(
                &group,
                user_id,
                SummaryCategory::Unseen,
                &partitioned.unseen,
                now,
            )
            .await?;

        let previous_day = if partitioned.group_old_enough {
            self.resolve_exact_category(
                &group,
                user_id,
                SummaryCategory::PreviousDay,
                &partitioned.previous_day,
                now,
            )
            .await?
        } else {
            CategorySummary {
                text: GROUP_TOO_NEW_PLACEHOLDER.to_string(),
                message_count: 0,
                generated_at: now,
                is_from_cache: false,
            }
        };

        let seen = self
            .resolve_seen_category(&group, user_id, &partitioned.seen, now)
            .await?;

        let group_age_days = (now - group.created_at).num_days();

        Ok(GroupSummary {
            unseen,
            seen,
            previous_day,
            group_age_days,
        })
    }

    /// Exact-match path for unseen and previous-day: empty sets
    /// short-circuit to a placeholder with no model call and no cache
    /// write; misses generate, store, and evict.
    async fn resolve_exact_category(
        &self,
        group: &Group,
        user_id: i64,
        category: SummaryCategory,
        messages: &[MarkedMessage],
        now: DateTime<Utc>,
    ) -> Result<CategorySummary> {
        if messages.is_empty() {
            return Ok(CategorySummary {
                text: empty_category_placeholder(category),
                message_count: 0,
                generated_at: now,
                is_from_cache: false,
            });
        }

        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        let ids = cache::canonical_ids(&ids);
        let key = cache::derive_cache_key(category, user_id, &ids);

        if let Some(entry) = SummaryCacheEntry::find_exact(group.id, &key, &self.database).await? {
            tracing::debug!(
                target: "chatty::summary",
                "Cache hit for user {} in group {} ({})",
                user_id,
                group.id,
                category
            );
            return Ok(CategorySummary {
                text: entry.summary_text,
                message_count: messages.len(),
                generated_at: entry.generated_at,
                is_from_cache: true,
            });
        }

        let text = self
            .summarizer
            .summarize(messages, &group.name, category)
            .await;

        let entry = SummaryCacheEntry::store(
            group.id,
            user_id,
            category,
            &key,
            &ids,
            &text,
            now,
            self.config.summary.cache_limit,
            &self.database,
        )
        .await?;

        Ok(CategorySummary {
            text,
            message_count: messages.len(),
            generated_at: entry.generated_at,
            is_from_cache: false,
        })
    }

    /// Read-only path for the seen category: best-coverage lookup across
    /// the user's cached entries, never a fresh model call.
    async fn resolve_seen_category(
        &self,
        group: &Group,
        user_id: i64,
        messages: &[MarkedMessage],
        now: DateTime<Utc>,
    ) -> Result<CategorySummary> {
        if messages.is_empty() {
            return Ok(CategorySummary {
                text: empty_category_placeholder(SummaryCategory::Seen),
                message_count: 0,
                generated_at: now,
                is_from_cache: false,
            });
        }

        let candidate_ids: HashSet<i64> = messages.iter().map(|m| m.id).collect();
        let entries = SummaryCacheEntry::all_for_user(group.id, user_id, &self.database).await?;

        match cache::best_coverage(&entries, &candidate_ids) {
            Some(entry) => Ok(CategorySummary {
                text: entry.summary_text.clone(),
                message_count: messages.len(),
                generated_at: entry.generated_at,
                is_from_cache: true,
            }),
            None => Ok(CategorySummary {
                text: SEEN_UNAVAILABLE_PLACEHOLDER.to_string(),
                message_count: messages.len(),
                generated_at: now,
                is_from_cache: false,
            }),
        }
    }
}
