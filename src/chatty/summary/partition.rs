//! Category partitioning for marked messages.
//!
//! Splits a group's marked messages, relative to one user's visibility
//! state, into the three summary categories. All boundary math runs in the
//! explicitly configured UTC offset so "yesterday" means the same thing on
//! every deployment.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

use super::types::PartitionedMessages;
use crate::chatty::messages::MarkedMessage;
use crate::chatty::visibility::GroupVisibility;

/// Calendar boundaries for the configured offset, as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DayBounds {
    pub yesterday_start: DateTime<Utc>,
    /// Last representable millisecond of yesterday; the window's upper
    /// bound is inclusive.
    pub yesterday_end: DateTime<Utc>,
}

pub(crate) fn day_bounds(now: DateTime<Utc>, tz: FixedOffset) -> DayBounds {
    let local_midnight = now.with_timezone(&tz).date_naive().and_time(NaiveTime::MIN);
    // Local midnight expressed as a UTC instant: local = utc + offset
    let today_start = DateTime::from_naive_utc_and_offset(
        local_midnight - Duration::seconds(tz.local_minus_utc() as i64),
        Utc,
    );

    DayBounds {
        yesterday_start: today_start - Duration::days(1),
        yesterday_end: today_start - Duration::milliseconds(1),
    }
}

/// Partitions marked messages into {unseen, seen, previous_day}.
///
/// Messages inside the previous-day window go to `previous_day` (and also
/// to `seen` when the user has seen them); they never fall through to
/// `unseen`. Everything else splits on the user's seen set. The window only
/// applies once the group existed before yesterday ended, otherwise the
/// previous-day category is suppressed entirely.
pub(crate) fn partition(
    messages: &[MarkedMessage],
    visibility: &GroupVisibility,
    group_created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> PartitionedMessages {
    let bounds = day_bounds(now, tz);
    let group_old_enough = group_created_at < bounds.yesterday_end;

    let mut result = PartitionedMessages {
        group_old_enough,
        ..Default::default()
    };

    for message in messages {
        let in_window = message.created_at >= bounds.yesterday_start
            && message.created_at <= bounds.yesterday_end;

        if in_window && group_old_enough {
            result.previous_day.push(message.clone());
            if visibility.is_seen(message.id) {
                result.seen.push(message.clone());
            }
        } else if visibility.is_seen(message.id) {
            result.seen.push(message.clone());
        } else {
            result.unseen.push(message.clone());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn marked(id: i64, created_at: DateTime<Utc>) -> MarkedMessage {
        MarkedMessage {
            id,
            sender_id: 1,
            sender_name: "alice".to_string(),
            text: format!("!Chatty message {id}"),
            created_at,
        }
    }

    fn visibility_with_seen(ids: &[i64]) -> GroupVisibility {
        GroupVisibility {
            group_id: 1,
            user_id: 2,
            last_seen_at: DateTime::UNIX_EPOCH,
            seen_message_ids: ids.iter().copied().collect::<HashSet<i64>>(),
        }
    }

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_day_bounds_utc() {
        let now = ts(2024, 3, 20, 15, 30);
        let bounds = day_bounds(now, utc());

        assert_eq!(bounds.yesterday_start, ts(2024, 3, 19, 0, 0));
        assert_eq!(
            bounds.yesterday_end,
            ts(2024, 3, 20, 0, 0) - Duration::milliseconds(1)
        );
    }

    #[test]
    fn test_day_bounds_respect_offset() {
        // 01:00 UTC on Mar 20 is 20:00 Mar 19 at UTC-5, so "today" there
        // starts at 05:00 UTC on Mar 19 and "yesterday" a day earlier.
        let now = ts(2024, 3, 20, 1, 0);
        let tz = FixedOffset::east_opt(-5 * 3600).unwrap();
        let bounds = day_bounds(now, tz);

        assert_eq!(bounds.yesterday_start, ts(2024, 3, 18, 5, 0));
        assert_eq!(
            bounds.yesterday_end,
            ts(2024, 3, 19, 5, 0) - Duration::milliseconds(1)
        );
    }

    #[test]
    fn test_boundary_milliseconds_are_deterministic() {
        let now = ts(2024, 3, 20, 12, 0);
        let bounds = day_bounds(now, utc());
        let group_created = ts(2024, 3, 1, 0, 0);
        let visibility = visibility_with_seen(&[]);

        // Exactly at yesterday_start: inside the window
        let at_start = marked(1, bounds.yesterday_start);
        // Exactly at yesterday_end: inside the window
        let at_end = marked(2, bounds.yesterday_end);
        // One millisecond before the window: plain unseen
        let before = marked(3, bounds.yesterday_start - Duration::milliseconds(1));
        // One millisecond past the window (midnight today): plain unseen
        let at_midnight = marked(4, bounds.yesterday_end + Duration::milliseconds(1));

        let result = partition(
            &[at_start, at_end, before, at_midnight],
            &visibility,
            group_created,
            now,
            utc(),
        );

        let prev_ids: Vec<i64> = result.previous_day.iter().map(|m| m.id).collect();
        let unseen_ids: Vec<i64> = result.unseen.iter().map(|m| m.id).collect();
        assert_eq!(prev_ids, vec![1, 2]);
        assert_eq!(unseen_ids, vec![3, 4]);
    }

    #[test]
    fn test_unseen_and_seen_disjoint() {
        let now = ts(2024, 3, 20, 12, 0);
        let group_created = ts(2024, 3, 1, 0, 0);
        let messages: Vec<MarkedMessage> = (1..=6)
            .map(|id| marked(id, ts(2024, 3, 20, 8, id as u32)))
            .collect();
        let visibility = visibility_with_seen(&[2, 4]);

        let result = partition(&messages, &visibility, group_created, now, utc());

        let unseen: HashSet<i64> = result.unseen.iter().map(|m| m.id).collect();
        let seen: HashSet<i64> = result.seen.iter().map(|m| m.id).collect();
        assert!(unseen.is_disjoint(&seen));
        assert_eq!(unseen.len() + seen.len(), 6);
    }

    #[test]
    fn test_young_group_suppresses_previous_day() {
        // Scenario: group created at T0, three marked messages at T0+1h,
        // nothing seen, current time T0+2h on the same day.
        let t0 = ts(2024, 3, 20, 9, 0);
        let now = t0 + Duration::hours(2);
        let messages: Vec<MarkedMessage> =
            (1..=3).map(|id| marked(id, t0 + Duration::hours(1))).collect();
        let visibility = visibility_with_seen(&[]);

        let result = partition(&messages, &visibility, t0, now, utc());

        assert!(!result.group_old_enough);
        assert_eq!(result.unseen.len(), 3);
        assert_eq!(result.seen.len(), 0);
        assert_eq!(result.previous_day.len(), 0);
    }

    #[test]
    fn test_previous_day_window_with_partial_seen() {
        // Scenario: group created three days ago, two marked messages
        // yesterday at 10:00 and 14:00, the 10:00 one seen.
        let now = ts(2024, 3, 20, 12, 0);
        let group_created = now - Duration::days(3);
        let m_ten = marked(1, ts(2024, 3, 19, 10, 0));
        let m_fourteen = marked(2, ts(2024, 3, 19, 14, 0));
        let visibility = visibility_with_seen(&[1]);

        let result = partition(
            &[m_ten, m_fourteen],
            &visibility,
            group_created,
            now,
            utc(),
        );

        assert!(result.group_old_enough);
        assert_eq!(result.previous_day.len(), 2);
        assert_eq!(result.seen.len(), 1);
        assert_eq!(result.seen[0].id, 1);
        // Window messages never fall through to plain unseen
        assert_eq!(result.unseen.len(), 0);
    }

    #[test]
    fn test_window_ignored_for_young_group() {
        // A message timestamped yesterday still counts as unseen when the
        // group itself is newer than the window.
        let now = ts(2024, 3, 20, 12, 0);
        let group_created = ts(2024, 3, 20, 1, 0);
        let backdated = marked(1, ts(2024, 3, 19, 10, 0));
        let visibility = visibility_with_seen(&[]);

        let result = partition(&[backdated], &visibility, group_created, now, utc());

        assert!(!result.group_old_enough);
        assert_eq!(result.previous_day.len(), 0);
        assert_eq!(result.unseen.len(), 1);
    }

    #[test]
    fn test_empty_input_yields_empty_partitions() {
        let now = ts(2024, 3, 20, 12, 0);
        let result = partition(
            &[],
            &visibility_with_seen(&[]),
            ts(2024, 3, 1, 0, 0),
            now,
            utc(),
        );

        assert!(result.unseen.is_empty());
        assert!(result.seen.is_empty());
        assert!(result.previous_day.is_empty());
        assert!(result.group_old_enough);
    }

    #[test]
    fn test_creation_order_preserved_within_categories() {
        let now = ts(2024, 3, 20, 12, 0);
        let group_created = ts(2024, 3, 1, 0, 0);
        let messages: Vec<MarkedMessage> = (1..=4)
            .map(|id| marked(id, ts(2024, 3, 20, 6 + id as u32, 0)))
            .collect();
        let visibility = visibility_with_seen(&[]);

        let result = partition(&messages, &visibility, group_created, now, utc());

        let ids: Vec<i64> = result.unseen.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
