use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::{lenient, null_as_default};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Event,
    Course,
    Blog,
}

impl ItemType {
    pub const ALL: [ItemType; 3] = [ItemType::Event, ItemType::Course, ItemType::Blog];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Event => "event",
            ItemType::Course => "course",
            ItemType::Blog => "blog",
        }
    }

    pub fn plural_label(&self) -> &'static str {
        match self {
            ItemType::Event => "Events",
            ItemType::Course => "Courses",
            ItemType::Blog => "Blogs",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_end_matches('s') {
            "event" => Ok(ItemType::Event),
            "course" => Ok(ItemType::Course),
            "blog" => Ok(ItemType::Blog),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

/// One extracted unit of content tied to the email it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email_subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender_email: String,
    #[serde(default, deserialize_with = "lenient")]
    pub received_at: Option<DateTime<Utc>>,
    pub item_type: ItemType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_free: Option<bool>,

    // Events
    #[serde(default, deserialize_with = "lenient")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub organizer: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub cost: Option<String>,

    // Courses
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub certificate_offered: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub what_you_learn: Vec<String>,

    // Blogs
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reading_time: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_points: Vec<String>,

    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub extracted_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    /// Teaser line for list rendering: the hook if present, else the description.
    pub fn summary(&self) -> Option<&str> {
        self.hook
            .as_deref()
            .into_iter()
            .chain(self.description.as_deref())
            .find(|s| !s.trim().is_empty())
    }

    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        self.tags.iter().any(|tag| tags.contains(tag))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<FeedItem>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<ItemType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<FeedItem>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_parses_singular_and_plural() {
        assert_eq!("events".parse::<ItemType>(), Ok(ItemType::Event));
        assert_eq!("Course".parse::<ItemType>(), Ok(ItemType::Course));
        assert!("podcast".parse::<ItemType>().is_err());
    }

    #[test]
    fn sparse_item_deserializes_with_absent_optionals() {
        let json = r#"{
            "id": "evt-1",
            "email_id": "E1",
            "email_subject": null,
            "sender": "Meetup",
            "sender_email": "info@meetup.com",
            "received_at": "2025-02-10T08:00:00",
            "item_type": "event",
            "title": "Rust Berlin",
            "tags": null,
            "start_time": "",
            "key_points": null
        }"#;
        let item: FeedItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.item_type, ItemType::Event);
        assert!(item.tags.is_empty());
        assert!(item.start_time.is_none());
        assert!(item.received_at.is_some());
        assert_eq!(item.email_subject, "");
    }

    #[test]
    fn summary_prefers_hook() {
        let item = FeedItem {
            hook: Some("Hands-on async".into()),
            description: Some("Long description".into()),
            ..Default::default()
        };
        assert_eq!(item.summary(), Some("Hands-on async"));

        let blank = FeedItem {
            hook: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(blank.summary(), None);
    }

    #[test]
    fn search_request_omits_unset_fields() {
        let request = SearchRequest {
            query: "rust".into(),
            limit: Some(5),
            ..Default::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, serde_json::json!({"query": "rust", "limit": 5}));
    }
}
