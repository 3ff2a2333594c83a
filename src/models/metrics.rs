use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::{lenient, null_as_default};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    #[serde(rename = "type")]
    pub category: String,
    pub count: u64,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    #[serde(default)]
    pub total_emails_processed: u64,
    #[serde(default)]
    pub total_items_extracted: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<CategoryCount>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub top_tags: HashMap<String, u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub precision: Option<f64>,
    #[serde(default)]
    pub mrr: Option<f64>,
    #[serde(default)]
    pub avg_latency_ms: Option<f64>,
    #[serde(default)]
    pub dedup_rate: Option<f64>,
}

impl MetricsResponse {
    /// Tags by descending count, name as tie-break.
    pub fn top_tags_sorted(&self, limit: usize) -> Vec<(&str, u64)> {
        let mut tags: Vec<(&str, u64)> = self
            .top_tags
            .iter()
            .map(|(tag, count)| (tag.as_str(), *count))
            .collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        tags.truncate(limit);
        tags
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub precision: f64,
    #[serde(default)]
    pub mrr: f64,
    #[serde(default)]
    pub latency: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub qdrant: String,
    #[serde(default)]
    pub timestamp: String,
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_tags_are_ranked() {
        let metrics = MetricsResponse {
            top_tags: HashMap::from([
                ("rust".to_string(), 4),
                ("ai".to_string(), 9),
                ("async".to_string(), 4),
            ]),
            ..Default::default()
        };
        assert_eq!(
            metrics.top_tags_sorted(2),
            vec![("ai", 9), ("async", 4)]
        );
    }

    #[test]
    fn metrics_tolerate_missing_quality_fields() {
        let json = r#"{
            "total_emails_processed": 12,
            "total_items_extracted": 30,
            "categories": [{"type": "event", "count": 10, "icon": "E"}],
            "top_tags": null
        }"#;
        let metrics: MetricsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(metrics.categories[0].category, "event");
        assert!(metrics.precision.is_none());
        assert!(metrics.top_tags.is_empty());
    }
}
