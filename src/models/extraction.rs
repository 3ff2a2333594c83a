use std::fmt;

use serde::{Deserialize, Serialize};

use super::timestamp::null_as_default;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionEventKind {
    Start,
    Fetch,
    Parse,
    Skip,
    Extract,
    Ingest,
    Progress,
    Complete,
    Error,
}

impl ExtractionEventKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim() {
            "start" => Self::Start,
            "fetch" => Self::Fetch,
            "parse" => Self::Parse,
            "skip" => Self::Skip,
            "extract" => Self::Extract,
            "ingest" => Self::Ingest,
            "progress" => Self::Progress,
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ExtractionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Skip => "skip",
            Self::Extract => "extract",
            Self::Ingest => "ingest",
            Self::Progress => "progress",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Payload of a pipeline event. Every field is optional: each event kind
/// carries its own subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionEventData {
    #[serde(default)]
    pub current: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub total_emails: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub events: Option<u32>,
    #[serde(default)]
    pub courses: Option<u32>,
    #[serde(default)]
    pub blogs: Option<u32>,
    #[serde(default)]
    pub events_total: Option<u32>,
    #[serde(default)]
    pub courses_total: Option<u32>,
    #[serde(default)]
    pub blogs_total: Option<u32>,
    #[serde(default)]
    pub emails_processed: Option<u32>,
    #[serde(default)]
    pub total_extracted: Option<u32>,
    #[serde(default)]
    pub errors: Option<u32>,
    #[serde(default)]
    pub email_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionEvent {
    pub kind: ExtractionEventKind,
    pub data: ExtractionEventData,
}

impl ExtractionEvent {
    pub fn new(kind: ExtractionEventKind, data: ExtractionEventData) -> Self {
        Self { kind, data }
    }
}

/// What a progress source delivers: live stream events, polled status
/// snapshots, a failure, or the end of the source.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    Event(ExtractionEvent),
    Status(ExtractionStatus),
    Failed(String),
    Ended,
}

/// Server-side snapshot of a running extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusProgress {
    #[serde(default)]
    pub current: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub events: u32,
    #[serde(default)]
    pub courses: u32,
    #[serde(default)]
    pub blogs: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub emails_processed: u32,
    #[serde(default)]
    pub errors: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStatus {
    pub is_extracting: bool,
    #[serde(default)]
    pub progress: Option<StatusProgress>,
    #[serde(default)]
    pub started_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip_through_display() {
        for name in ["start", "fetch", "parse", "skip", "extract", "ingest", "progress", "complete", "error"] {
            let kind = ExtractionEventKind::from_name(name).unwrap();
            assert_eq!(kind.to_string(), name);
        }
        assert_eq!(ExtractionEventKind::from_name("heartbeat"), None);
    }

    #[test]
    fn idle_status_has_no_progress() {
        let status: ExtractionStatus =
            serde_json::from_str(r#"{"is_extracting": false, "progress": null, "started_at": null}"#)
                .unwrap();
        assert!(!status.is_extracting);
        assert!(status.progress.is_none());
    }
}
