//! Leaderboard snapshots and read-time paging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{EntityType, UNKNOWN_KEY};
use crate::interval::Interval;
use crate::summary::Summary;
use crate::types::UserId;

/// Default page size for leaderboard reads.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One stored row of a leaderboard snapshot.
///
/// The general row has neither `by` nor `key` and holds the user's overall
/// total; aggregated rows carry a dimension and one of its keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardItem {
    pub user_id: UserId,
    pub interval: Interval,
    pub by: Option<EntityType>,
    pub key: Option<String>,
    pub total_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// A leaderboard row with its rank within its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem {
    pub rank: u32,
    pub user_id: UserId,
    pub key: Option<String>,
    pub total_ms: i64,
}

/// Rows produced for one user from a summary over the leaderboard interval.
///
/// Unknown-language time counts toward neither the general row nor any
/// language row.
pub fn items_from_summary(
    summary: &Summary,
    interval: Interval,
    by: &[EntityType],
    created_at: DateTime<Utc>,
) -> Vec<LeaderboardItem> {
    let general = summary.total_ms() - summary.total_by_key(EntityType::Language, UNKNOWN_KEY);
    let mut items = vec![LeaderboardItem {
        user_id: summary.user_id.clone(),
        interval,
        by: None,
        key: None,
        total_ms: general.max(0),
        created_at,
    }];
    for entity_type in by {
        items.extend(
            summary
                .items(*entity_type)
                .iter()
                .filter(|item| item.key != UNKNOWN_KEY)
                .map(|item| LeaderboardItem {
                    user_id: summary.user_id.clone(),
                    interval,
                    by: Some(*entity_type),
                    key: Some(item.key.clone()),
                    total_ms: item.total_ms,
                    created_at,
                }),
        );
    }
    items
}

/// Cuts one page out of rows ordered by rank. When the requesting user is
/// ranked but off the page, their row is appended.
pub fn paginate(
    ranked: &[RankedItem],
    page: usize,
    page_size: usize,
    requester: Option<&UserId>,
) -> Vec<RankedItem> {
    let page_size = page_size.max(1);
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let mut rows: Vec<RankedItem> = ranked.iter().skip(start).take(page_size).cloned().collect();
    if let Some(user_id) = requester {
        if !rows.iter().any(|row| &row.user_id == user_id) {
            if let Some(own) = ranked.iter().find(|row| &row.user_id == user_id) {
                rows.push(own.clone());
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryItem;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn ranked(rank: u32, id: &str) -> RankedItem {
        RankedItem {
            rank,
            user_id: user(id),
            key: None,
            total_ms: 0,
        }
    }

    #[test]
    fn general_row_excludes_unknown_language() {
        let now = Utc::now();
        let mut summary = Summary::new(user("a"), now, now);
        summary.push_item(SummaryItem::new(EntityType::Project, "p", 100_000));
        summary.push_item(SummaryItem::new(EntityType::Language, "Go", 70_000));
        summary.push_item(SummaryItem::new(EntityType::Language, UNKNOWN_KEY, 30_000));

        let items = items_from_summary(&summary, Interval::Past7Days, &[EntityType::Language], now);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].by, None);
        assert_eq!(items[0].total_ms, 70_000);
        assert_eq!(items[1].key.as_deref(), Some("Go"));
        assert_eq!(items[1].by, Some(EntityType::Language));
    }

    #[test]
    fn paginate_appends_requester_when_off_page() {
        let rows: Vec<RankedItem> = (1..=5).map(|i| ranked(i, &format!("u{i}"))).collect();
        let page = paginate(&rows, 1, 2, Some(&user("u5")));
        let ids: Vec<&str> = page.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2", "u5"]);

        let second = paginate(&rows, 2, 2, Some(&user("u3")));
        assert_eq!(second.len(), 2);
        assert!(paginate(&rows, 4, 2, None).is_empty());
    }
}
