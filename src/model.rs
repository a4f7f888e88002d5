use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub posts: Vec<String>,
    /// Slug of the bridged Discourse category, when one exists.
    #[serde(default)]
    pub alt_title: Option<String>,
}

/// Token gate: holders of at least `min_amount` base units of `token` may join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub token: String,
    #[serde(default)]
    pub min_amount: u128,
    #[serde(default)]
    pub decimals: u8,
}

impl Requirement {
    pub fn display_amount(&self) -> String {
        let raw = self.min_amount.to_string();
        let decimals = self.decimals as usize;
        if decimals == 0 {
            return raw;
        }
        let padded = if raw.len() <= decimals {
            format!("{}{}", "0".repeat(decimals - raw.len() + 1), raw)
        } else {
            raw
        };
        let (whole, fraction) = padded.split_at(padded.len() - decimals);
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{fraction}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Empty until the member has been resolved against the backend.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identity_commitment: String,
    pub group_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentKind {
    #[default]
    Post,
    Poll,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(default)]
    pub kind: ContentKind,
    pub group_id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub upvotes: u64,
    #[serde(default)]
    pub downvotes: u64,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Saturates at the `i64` bounds.
    pub fn score(&self) -> i64 {
        let score = i128::from(self.upvotes) - i128::from(self.downvotes);
        score.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    pub fn engagement(&self) -> u64 {
        self.upvotes.saturating_add(self.downvotes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiscoursePost {
    #[serde(default)]
    pub id: u64,
    pub post_number: u64,
    #[serde(default)]
    pub reply_to_post_number: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub cooked: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PostStream {
    #[serde(default)]
    pub posts: Vec<DiscoursePost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Topic {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub post_stream: PostStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_amount_scales_by_decimals() {
        let req = Requirement {
            token: "0xabc".into(),
            min_amount: 1500,
            decimals: 3,
        };
        assert_eq!(req.display_amount(), "1.5");

        let small = Requirement {
            min_amount: 5,
            decimals: 2,
            ..req.clone()
        };
        assert_eq!(small.display_amount(), "0.05");

        let whole = Requirement {
            min_amount: 2_000_000,
            decimals: 6,
            ..req
        };
        assert_eq!(whole.display_amount(), "2");
    }

    #[test]
    fn content_item_parses_backend_json() {
        let raw = r#"{
            "id": "17",
            "kind": "COMMENT",
            "groupId": 3,
            "body": "hello",
            "upvotes": 4,
            "downvotes": 6
        }"#;
        let item: ContentItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.kind, ContentKind::Comment);
        assert_eq!(item.title, None);
        assert_eq!(item.score(), -2);
        assert_eq!(item.engagement(), 10);
    }

    #[test]
    fn topic_tolerates_missing_fields() {
        let raw = r#"{"id": 9, "post_stream": {"posts": [{"post_number": 1}]}}"#;
        let topic: Topic = serde_json::from_str(raw).unwrap();
        assert_eq!(topic.post_stream.posts.len(), 1);
        assert_eq!(topic.post_stream.posts[0].reply_to_post_number, None);
    }

    #[test]
    fn extreme_counts_saturate() {
        let item = ContentItem {
            id: "big".into(),
            upvotes: u64::MAX,
            downvotes: 2,
            ..ContentItem::default()
        };
        assert_eq!(item.engagement(), u64::MAX);
        assert_eq!(item.score(), i64::MAX);
        let item = ContentItem {
            upvotes: 0,
            downvotes: u64::MAX,
            ..item
        };
        assert_eq!(item.score(), i64::MIN);
    }
}
