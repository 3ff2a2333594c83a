use std::collections::VecDeque;

use crate::error::{AppError, Result};
use crate::models::{
    ExtractionEvent, ExtractionEventData, ExtractionEventKind, ExtractionStatus, ProgressUpdate,
    StatusProgress, UnprocessedEmails,
};

const NOTE_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PanelState {
    #[default]
    Empty,
    Ready,
    Extracting,
    Complete,
    Error,
}

impl PanelState {
    pub fn name(self) -> &'static str {
        match self {
            PanelState::Empty => "empty",
            PanelState::Ready => "ready",
            PanelState::Extracting => "extracting",
            PanelState::Complete => "complete",
            PanelState::Error => "error",
        }
    }
}

/// Latest known counters of a running extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub current: u32,
    pub total: u32,
    pub message: String,
    pub events: u32,
    pub courses: u32,
    pub blogs: u32,
    pub emails_processed: u32,
    pub errors: u32,
}

impl ProgressSnapshot {
    pub fn starting(total: usize) -> Self {
        Self {
            total: u32::try_from(total).unwrap_or(u32::MAX),
            message: "Starting extraction...".to_string(),
            ..Default::default()
        }
    }

    pub fn from_status(progress: &StatusProgress) -> Self {
        Self {
            current: progress.current,
            total: progress.total,
            message: progress.message.clone(),
            events: progress.events,
            courses: progress.courses,
            blogs: progress.blogs,
            emails_processed: progress.emails_processed,
            errors: progress.errors,
        }
    }

    /// Merge an event payload. Fields the event leaves out keep their
    /// previous value; cumulative `*_total` counters win over per-email ones.
    pub fn apply(&mut self, data: &ExtractionEventData) {
        self.current = data.current.unwrap_or(self.current);
        self.total = data.total.or(data.total_emails).unwrap_or(self.total);
        self.events = data.events_total.or(data.events).unwrap_or(self.events);
        self.courses = data.courses_total.or(data.courses).unwrap_or(self.courses);
        self.blogs = data.blogs_total.or(data.blogs).unwrap_or(self.blogs);
        self.emails_processed = data.emails_processed.unwrap_or(self.emails_processed);
        self.errors = data.errors.unwrap_or(self.errors);
        if let Some(message) = &data.message {
            self.message.clone_from(message);
        }
    }

    pub fn percent(&self) -> u16 {
        if self.total == 0 {
            return 0;
        }
        let pct = u64::from(self.current.min(self.total)) * 100 / u64::from(self.total);
        pct as u16
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub events: u32,
    pub courses: u32,
    pub blogs: u32,
    pub emails_processed: u32,
    pub errors: u32,
}

impl ExtractionSummary {
    fn from_complete(data: &ExtractionEventData, last: &ProgressSnapshot) -> Self {
        Self {
            events: data.events.or(data.events_total).unwrap_or(last.events),
            courses: data.courses.or(data.courses_total).unwrap_or(last.courses),
            blogs: data.blogs.or(data.blogs_total).unwrap_or(last.blogs),
            emails_processed: data.emails_processed.unwrap_or(last.emails_processed),
            errors: data.errors.unwrap_or(last.errors),
        }
    }

    pub fn total_extracted(&self) -> u32 {
        self.events + self.courses + self.blogs
    }
}

/// The extraction panel on the home view.
///
/// `empty -> ready -> extracting -> complete | error`, with `error -> extracting`
/// as retry. A refresh (`begin_refresh` followed by `unprocessed_loaded` or
/// `unprocessed_failed`) resets any state.
#[derive(Debug, Default)]
pub struct ExtractionPanel {
    state: PanelState,
    loading: bool,
    unprocessed: Option<UnprocessedEmails>,
    progress: Option<ProgressSnapshot>,
    summary: Option<ExtractionSummary>,
    error: Option<String>,
    notes: VecDeque<String>,
}

impl ExtractionPanel {
    pub fn new() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_extracting(&self) -> bool {
        self.state == PanelState::Extracting
    }

    pub fn unprocessed(&self) -> Option<&UnprocessedEmails> {
        self.unprocessed.as_ref()
    }

    pub fn unprocessed_count(&self) -> u32 {
        self.unprocessed.as_ref().map_or(0, |u| u.unprocessed_count)
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref()
    }

    pub fn summary(&self) -> Option<&ExtractionSummary> {
        self.summary.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Skip and per-email error messages from the current run, newest last.
    pub fn notes(&self) -> impl Iterator<Item = &str> {
        self.notes.iter().map(String::as_str)
    }

    pub fn begin_refresh(&mut self) {
        self.loading = true;
        self.progress = None;
        self.summary = None;
        self.error = None;
        self.notes.clear();
    }

    pub fn unprocessed_loaded(&mut self, emails: UnprocessedEmails) {
        self.loading = false;
        self.error = None;
        self.state = if emails.unprocessed_count == 0 && emails.emails.is_empty() {
            PanelState::Empty
        } else {
            PanelState::Ready
        };
        self.unprocessed = Some(emails);
    }

    pub fn unprocessed_failed(&mut self, message: String) {
        self.loading = false;
        self.state = PanelState::Error;
        self.error = Some(message);
    }

    /// Enter `extracting` and hand back the ids to extract.
    pub fn begin_extraction(&mut self) -> Result<Vec<String>> {
        let ids = self
            .unprocessed
            .as_ref()
            .map(UnprocessedEmails::email_ids)
            .unwrap_or_default();

        let allowed = matches!(self.state, PanelState::Ready | PanelState::Error);
        if !allowed || ids.is_empty() {
            return Err(AppError::InvalidTransition {
                action: "start extraction",
                state: self.state.name(),
            });
        }

        self.state = PanelState::Extracting;
        self.progress = Some(ProgressSnapshot::starting(ids.len()));
        self.summary = None;
        self.error = None;
        self.notes.clear();
        Ok(ids)
    }

    pub fn apply(&mut self, update: &ProgressUpdate) {
        match update {
            ProgressUpdate::Event(event) => self.apply_event(event),
            ProgressUpdate::Status(status) => self.apply_status(status),
            ProgressUpdate::Failed(message) => {
                if self.state == PanelState::Extracting {
                    self.state = PanelState::Error;
                    self.error = Some(message.clone());
                }
            }
            ProgressUpdate::Ended => {}
        }
    }

    fn apply_event(&mut self, event: &ExtractionEvent) {
        if self.state != PanelState::Extracting {
            tracing::debug!("Ignoring {} event while {}", event.kind, self.state.name());
            return;
        }
        let progress = self.progress.get_or_insert_with(ProgressSnapshot::default);

        match event.kind {
            ExtractionEventKind::Complete => {
                self.summary = Some(ExtractionSummary::from_complete(&event.data, progress));
                progress.apply(&event.data);
                self.state = PanelState::Complete;
            }
            ExtractionEventKind::Skip => {
                progress.apply(&event.data);
                let subject = event.data.subject.as_deref().unwrap_or("email");
                let reason = event.data.reason.as_deref().unwrap_or("skipped");
                self.push_note(format!("Skipped {subject}: {reason}"));
            }
            ExtractionEventKind::Error => {
                progress.apply(&event.data);
                if let Some(error) = event.data.error.as_ref().or(event.data.message.as_ref()) {
                    tracing::warn!("Extraction error: {}", error);
                    self.push_note(error.clone());
                }
            }
            _ => progress.apply(&event.data),
        }
    }

    fn apply_status(&mut self, status: &ExtractionStatus) {
        if !status.is_extracting {
            return;
        }
        self.state = PanelState::Extracting;
        self.loading = false;
        if let Some(progress) = &status.progress {
            self.progress = Some(ProgressSnapshot::from_status(progress));
        }
    }

    fn push_note(&mut self, note: String) {
        if self.notes.len() == NOTE_LIMIT {
            self.notes.pop_front();
        }
        self.notes.push_back(note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailSummary;

    fn unprocessed(ids: &[&str]) -> UnprocessedEmails {
        UnprocessedEmails {
            emails: ids
                .iter()
                .map(|id| EmailSummary {
                    id: id.to_string(),
                    ..Default::default()
                })
                .collect(),
            unprocessed_count: ids.len() as u32,
            hours_back: Some(8),
        }
    }

    fn event(kind: ExtractionEventKind, data: ExtractionEventData) -> ProgressUpdate {
        ProgressUpdate::Event(ExtractionEvent::new(kind, data))
    }

    fn ready_panel() -> ExtractionPanel {
        let mut panel = ExtractionPanel::new();
        panel.unprocessed_loaded(unprocessed(&["E1", "E2", "E3"]));
        panel
    }

    #[test]
    fn loaded_count_picks_empty_or_ready() {
        let mut panel = ExtractionPanel::new();
        assert!(panel.is_loading());
        panel.unprocessed_loaded(unprocessed(&[]));
        assert_eq!(panel.state(), PanelState::Empty);
        assert!(!panel.is_loading());

        assert_eq!(ready_panel().state(), PanelState::Ready);
    }

    #[test]
    fn extract_is_rejected_outside_ready_or_error() {
        let mut panel = ExtractionPanel::new();
        panel.unprocessed_loaded(unprocessed(&[]));
        let err = panel.begin_extraction().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot start extraction while extraction panel is empty"
        );

        let mut panel = ready_panel();
        assert_eq!(panel.begin_extraction().unwrap(), vec!["E1", "E2", "E3"]);
        assert!(panel.begin_extraction().is_err());
    }

    #[test]
    fn partial_events_keep_previous_counters() {
        let mut panel = ready_panel();
        panel.begin_extraction().unwrap();

        panel.apply(&event(
            ExtractionEventKind::Progress,
            ExtractionEventData {
                events_total: Some(3),
                ..Default::default()
            },
        ));
        panel.apply(&event(
            ExtractionEventKind::Ingest,
            ExtractionEventData {
                courses_total: Some(2),
                ..Default::default()
            },
        ));

        let progress = panel.progress().unwrap();
        assert_eq!(progress.events, 3);
        assert_eq!(progress.courses, 2);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.message, "Starting extraction...");
    }

    #[test]
    fn complete_event_finishes_with_summary() {
        let mut panel = ready_panel();
        panel.begin_extraction().unwrap();
        panel.apply(&event(
            ExtractionEventKind::Progress,
            ExtractionEventData {
                current: Some(3),
                events_total: Some(4),
                blogs_total: Some(1),
                ..Default::default()
            },
        ));
        panel.apply(&event(
            ExtractionEventKind::Complete,
            ExtractionEventData {
                events: Some(4),
                emails_processed: Some(3),
                ..Default::default()
            },
        ));

        assert_eq!(panel.state(), PanelState::Complete);
        let summary = panel.summary().unwrap();
        assert_eq!(summary.events, 4);
        assert_eq!(summary.blogs, 1);
        assert_eq!(summary.total_extracted(), 5);
        assert_eq!(panel.progress().unwrap().percent(), 100);

        // Terminal: late events change nothing
        panel.apply(&event(ExtractionEventKind::Progress, ExtractionEventData::default()));
        assert_eq!(panel.state(), PanelState::Complete);
    }

    #[test]
    fn stream_failure_then_retry() {
        let mut panel = ready_panel();
        panel.begin_extraction().unwrap();
        panel.apply(&ProgressUpdate::Failed("connection reset".into()));
        assert_eq!(panel.state(), PanelState::Error);
        assert_eq!(panel.error(), Some("connection reset"));

        assert_eq!(panel.begin_extraction().unwrap().len(), 3);
        assert_eq!(panel.state(), PanelState::Extracting);
        assert!(panel.error().is_none());
    }

    #[test]
    fn per_email_errors_are_notes_not_failures() {
        let mut panel = ready_panel();
        panel.begin_extraction().unwrap();
        panel.apply(&event(
            ExtractionEventKind::Error,
            ExtractionEventData {
                error: Some("LLM timeout".into()),
                ..Default::default()
            },
        ));
        panel.apply(&event(
            ExtractionEventKind::Skip,
            ExtractionEventData {
                subject: Some("Weekly digest".into()),
                reason: Some("no content".into()),
                ..Default::default()
            },
        ));
        assert_eq!(panel.state(), PanelState::Extracting);
        let notes: Vec<&str> = panel.notes().collect();
        assert_eq!(notes, vec!["LLM timeout", "Skipped Weekly digest: no content"]);
    }

    #[test]
    fn running_status_resumes_extracting() {
        let mut panel = ExtractionPanel::new();
        panel.apply(&ProgressUpdate::Status(ExtractionStatus {
            is_extracting: true,
            progress: Some(StatusProgress {
                current: 2,
                total: 8,
                events: 5,
                ..Default::default()
            }),
            started_at: None,
        }));
        assert_eq!(panel.state(), PanelState::Extracting);
        assert_eq!(panel.progress().unwrap().percent(), 25);

        panel.apply(&ProgressUpdate::Status(ExtractionStatus::default()));
        assert_eq!(panel.state(), PanelState::Extracting);
    }

    #[test]
    fn refresh_resets_terminal_states() {
        let mut panel = ready_panel();
        panel.begin_extraction().unwrap();
        panel.apply(&ProgressUpdate::Failed("boom".into()));

        panel.begin_refresh();
        panel.unprocessed_loaded(unprocessed(&[]));
        assert_eq!(panel.state(), PanelState::Empty);
        assert!(panel.error().is_none());
        assert!(panel.progress().is_none());
    }
}
