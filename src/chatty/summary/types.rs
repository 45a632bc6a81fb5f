use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::chatty::messages::MarkedMessage;

/// One of the three disjoint-by-rule partitions of a group's marked
/// messages relative to a single user.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SummaryCategory {
    /// Marked messages the user has not yet seen (outside the previous-day
    /// window).
    Unseen,
    /// Marked messages the user has already seen.
    Seen,
    /// Marked messages that arrived during the previous calendar day.
    PreviousDay,
}

impl SummaryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryCategory::Unseen => "unseen",
            SummaryCategory::Seen => "seen",
            SummaryCategory::PreviousDay => "previous_day",
        }
    }

    /// Phrase used in the model prompt to describe the category's window.
    pub(crate) fn period_description(&self) -> &'static str {
        match self {
            SummaryCategory::Unseen => "that you have not seen yet",
            SummaryCategory::Seen => "that you have already seen",
            SummaryCategory::PreviousDay => "from the previous day",
        }
    }
}

impl fmt::Display for SummaryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SummaryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unseen" => Ok(SummaryCategory::Unseen),
            "seen" => Ok(SummaryCategory::Seen),
            "previous_day" => Ok(SummaryCategory::PreviousDay),
            other => Err(format!("unknown summary category: {other}")),
        }
    }
}

/// Configuration for summary generation and caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Maximum cached summaries retained per group; oldest evicted first.
    pub cache_limit: usize,

    /// UTC offset, in minutes, of the calendar used for "yesterday"
    /// boundaries. Pinned explicitly so category boundaries are identical
    /// across deployment environments.
    pub utc_offset_minutes: i32,

    /// Upper bound on a single model call; a timeout degrades to the
    /// fallback summary like any other model failure.
    pub model_timeout: Duration,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            cache_limit: 20,
            utc_offset_minutes: 0,
            model_timeout: Duration::from_secs(20),
        }
    }
}

impl SummaryOptions {
    pub(crate) fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }
}

/// Output of the category partitioner. A message may appear in both
/// `previous_day` and `seen`, but never in both `unseen` and `seen`.
#[derive(Debug, Clone, Default)]
pub struct PartitionedMessages {
    pub unseen: Vec<MarkedMessage>,
    pub seen: Vec<MarkedMessage>,
    pub previous_day: Vec<MarkedMessage>,
    /// False while the group is too young to have a previous-day window;
    /// the previous-day category is then suppressed with a placeholder.
    pub group_old_enough: bool,
}

/// One category's slice of the aggregated summary response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub text: String,
    pub message_count: usize,
    pub generated_at: DateTime<Utc>,
    /// True when the text came from a cache entry rather than a fresh
    /// model call.
    pub is_from_cache: bool,
}

/// The aggregated three-category response for one (group, user) pair.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub unseen: CategorySummary,
    pub seen: CategorySummary,
    pub previous_day: CategorySummary,
    pub group_age_days: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in [
            SummaryCategory::Unseen,
            SummaryCategory::Seen,
            SummaryCategory::PreviousDay,
        ] {
            let parsed = SummaryCategory::from_str(category.as_str()).unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn test_category_from_str_rejects_unknown() {
        assert!(SummaryCategory::from_str("yesterday").is_err());
        assert!(SummaryCategory::from_str("").is_err());
    }

    #[test]
    fn test_default_options() {
        let options = SummaryOptions::default();
        assert_eq!(options.cache_limit, 20);
        assert_eq!(options.utc_offset_minutes, 0);
        assert_eq!(options.timezone().local_minus_utc(), 0);
    }

    #[test]
    fn test_timezone_offset_applied() {
        let options = SummaryOptions {
            utc_offset_minutes: 330, // UTC+5:30
            ..Default::default()
        };
        assert_eq!(options.timezone().local_minus_utc(), 330 * 60);
    }
}
