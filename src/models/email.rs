use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::ItemType;
use super::timestamp::{lenient, null_as_default};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender_email: String,
    #[serde(default, deserialize_with = "lenient")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub extracted_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailDetail {
    #[serde(flatten)]
    pub summary: EmailSummary,
    #[serde(default)]
    pub body_preview: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub extracted_items: Vec<ExtractedItem>,
}

impl EmailDetail {
    /// Plain-text rendering of the body preview, which may be HTML.
    pub fn body_text(&self, width: usize) -> Option<String> {
        let body = self.body_preview.as_deref()?.trim();
        if body.is_empty() {
            return None;
        }
        if body.contains('<') {
            html2text::from_read(body.as_bytes(), width.max(20)).ok()
        } else {
            Some(textwrap::fill(body, width.max(20)))
        }
    }
}

/// Emails the backend has not yet run through extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnprocessedEmails {
    #[serde(default, deserialize_with = "null_as_default")]
    pub emails: Vec<EmailSummary>,
    #[serde(default)]
    pub unprocessed_count: u32,
    #[serde(default)]
    pub hours_back: Option<u32>,
}

impl UnprocessedEmails {
    pub fn email_ids(&self) -> Vec<String> {
        self.emails.iter().map(|e| e.id.clone()).collect()
    }
}
