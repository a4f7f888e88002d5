use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::ContentItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Highest,
    Lowest,
    Controversial,
    Newest,
    Oldest,
    /// Leaves the input order untouched.
    Unsorted,
}

impl SortMode {
    pub fn from_key(key: &str) -> SortMode {
        match key.trim().to_ascii_lowercase().as_str() {
            "highest" => SortMode::Highest,
            "lowest" => SortMode::Lowest,
            "controversial" => SortMode::Controversial,
            "newest" => SortMode::Newest,
            "oldest" => SortMode::Oldest,
            _ => SortMode::Unsorted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Highest => "highest",
            SortMode::Lowest => "lowest",
            SortMode::Controversial => "controversial",
            SortMode::Newest => "newest",
            SortMode::Oldest => "oldest",
            SortMode::Unsorted => "unsorted",
        }
    }
}

/// Unconfirmed items come first; a confirmed item already present among them
/// (same id) is skipped. The merged list is then stably sorted by `mode`.
pub fn merge_and_sort(
    unconfirmed: Vec<ContentItem>,
    confirmed: Vec<ContentItem>,
    mode: SortMode,
) -> Vec<ContentItem> {
    let pending: HashSet<String> = unconfirmed.iter().map(|item| item.id.clone()).collect();
    let mut merged = unconfirmed;
    merged.extend(
        confirmed
            .into_iter()
            .filter(|item| !pending.contains(&item.id)),
    );
    sort_items(&mut merged, mode);
    merged
}

pub fn sort_items(items: &mut [ContentItem], mode: SortMode) {
    match mode {
        SortMode::Highest => items.sort_by(|a, b| b.score().cmp(&a.score())),
        SortMode::Lowest => items.sort_by(|a, b| a.score().cmp(&b.score())),
        SortMode::Controversial => items.sort_by(|a, b| {
            b.engagement()
                .cmp(&a.engagement())
                .then_with(|| polarization(a).total_cmp(&polarization(b)))
        }),
        SortMode::Newest => items.sort_by(|a, b| by_time(a, b, true)),
        SortMode::Oldest => items.sort_by(|a, b| by_time(a, b, false)),
        SortMode::Unsorted => {}
    }
}

/// |up - down| / (up + down); an item nobody voted on counts as fully one-sided.
pub fn polarization(item: &ContentItem) -> f64 {
    let total = item.engagement();
    if total == 0 {
        return 1.0;
    }
    item.score().unsigned_abs() as f64 / total as f64
}

/// Undated items go last in both directions.
fn by_time(a: &ContentItem, b: &ContentItem, newest_first: bool) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(a), Some(b)) if newest_first => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
