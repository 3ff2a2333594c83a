//! Server-sent events for the extraction pipeline.

use futures::StreamExt;
use reqwest::RequestBuilder;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::{ExtractionEvent, ExtractionEventData, ExtractionEventKind, ProgressUpdate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder. Chunks may split lines (or UTF-8
/// sequences) anywhere; only complete lines are interpreted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(frame) = self.process_line(line.trim_end_matches(&['\n', '\r'][..])) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is pending once the body has ended.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            return self
                .process_line(line.trim_end_matches('\r'))
                .or_else(|| self.dispatch());
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let frame = SseFrame {
            event: self.event.take(),
            data: self.data.join("\n"),
        };
        self.data.clear();
        Some(frame)
    }
}

/// Interpret a frame as a pipeline event. The kind comes from the `event:`
/// field, or from a `type` key in the payload when the field is absent.
pub fn frame_to_event(frame: &SseFrame) -> Option<ExtractionEvent> {
    let payload: Value = match serde_json::from_str(&frame.data) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Ignoring malformed extraction event: {}", e);
            return None;
        }
    };

    let name = frame
        .event
        .as_deref()
        .or_else(|| payload.get("type").and_then(Value::as_str))?;
    let Some(kind) = ExtractionEventKind::from_name(name) else {
        tracing::debug!("Ignoring unknown extraction event: {}", name);
        return None;
    };

    let body = match payload.get("data") {
        Some(nested) if nested.is_object() => nested.clone(),
        _ => payload,
    };
    match serde_json::from_value::<ExtractionEventData>(body) {
        Ok(data) => Some(ExtractionEvent::new(kind, data)),
        Err(e) => {
            tracing::warn!("Ignoring {} event with unexpected shape: {}", kind, e);
            None
        }
    }
}

/// Running extraction stream. Cancelling (or dropping) it closes the connection.
#[derive(Debug)]
pub struct ExtractionHandle {
    task: JoinHandle<()>,
}

impl ExtractionHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for ExtractionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(crate) fn spawn_stream(
    request: RequestBuilder,
    updates: UnboundedSender<ProgressUpdate>,
) -> ExtractionHandle {
    let task = tokio::spawn(async move {
        if let Err(e) = pump(request, &updates).await {
            tracing::warn!("Extraction stream failed: {}", e);
            let _ = updates.send(ProgressUpdate::Failed(e.to_string()));
        }
        let _ = updates.send(ProgressUpdate::Ended);
    });
    ExtractionHandle { task }
}

async fn pump(request: RequestBuilder, updates: &UnboundedSender<ProgressUpdate>) -> Result<()> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let mut decoder = SseDecoder::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| AppError::Stream(e.to_string()))?;
        for frame in decoder.push(&chunk) {
            if !forward(&frame, updates) {
                return Ok(());
            }
        }
    }
    if let Some(frame) = decoder.finish() {
        forward(&frame, updates);
    }
    Ok(())
}

// false once nobody is listening
fn forward(frame: &SseFrame, updates: &UnboundedSender<ProgressUpdate>) -> bool {
    match frame_to_event(frame) {
        Some(event) => {
            tracing::debug!("Extraction event: {}", event.kind);
            updates.send(ProgressUpdate::Event(event)).is_ok()
        }
        None => !updates.is_closed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::{header, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tokio::sync::mpsc;

    use crate::api::ApiClient;

    #[test]
    fn decodes_frames_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: progress\nda").is_empty());
        let frames = decoder.push(b"ta: {\"current\": 1}\r\n\r\n: keep-alive\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("progress".into()),
                data: "{\"current\": 1}".into(),
            }]
        );
    }

    #[test]
    fn multi_line_data_is_joined_and_tail_is_flushed() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: line one\ndata: line two").is_empty());
        let frame = decoder.finish().unwrap();
        assert_eq!(frame.event, None);
        assert_eq!(frame.data, "line one\nline two");
    }

    #[test]
    fn blank_tail_line_dispatches_pending_frame() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: complete\ndata: tail\n\r").is_empty());
        let frame = decoder.finish().unwrap();
        assert_eq!(frame.event.as_deref(), Some("complete"));
        assert_eq!(frame.data, "tail");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn split_utf8_sequence_survives() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let (head, tail) = bytes.split_at(10);
        assert!(decoder.push(head).is_empty());
        let frames = decoder.push(tail);
        assert_eq!(frames[0].data, "caf\u{e9}");
    }

    #[test]
    fn event_kind_falls_back_to_payload_type() {
        let frame = SseFrame {
            event: None,
            data: r#"{"type": "ingest", "data": {"courses_total": 2}}"#.into(),
        };
        let event = frame_to_event(&frame).unwrap();
        assert_eq!(event.kind, ExtractionEventKind::Ingest);
        assert_eq!(event.data.courses_total, Some(2));
    }

    #[test]
    fn unknown_or_malformed_frames_are_skipped() {
        let unknown = SseFrame {
            event: Some("heartbeat".into()),
            data: "{}".into(),
        };
        let broken = SseFrame {
            event: Some("progress".into()),
            data: "{not json".into(),
        };
        assert!(frame_to_event(&unknown).is_none());
        assert!(frame_to_event(&broken).is_none());
    }

    async fn serve(app: Router) -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ApiClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap()
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            let done = update == ProgressUpdate::Ended;
            updates.push(update);
            if done {
                break;
            }
        }
        updates
    }

    #[tokio::test]
    async fn streams_events_then_ends() {
        let body = concat!(
            "event: start\ndata: {\"total_emails\": 2, \"message\": \"Starting\"}\n\n",
            "event: progress\ndata: {\"current\": 1, \"total\": 2, \"events_total\": 3}\n\n",
            "event: ingest\ndata: {\"courses_total\": 2}\n\n",
            "event: complete\ndata: {\"events\": 3, \"courses\": 2, \"blogs\": 0, \"emails_processed\": 2, \"errors\": 0}\n\n",
        );
        let app = Router::new().route(
            "/api/pipeline/extract",
            post(move || async move { ([(header::CONTENT_TYPE, "text/event-stream")], body) }),
        );
        let api = serve(app).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let _handle = api
            .start_extraction(vec!["E1".into(), "E2".into()], tx)
            .unwrap();
        let updates = collect(rx).await;

        let kinds: Vec<String> = updates
            .iter()
            .map(|u| match u {
                ProgressUpdate::Event(e) => e.kind.to_string(),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["start", "progress", "ingest", "complete", "Ended"]);
    }

    #[tokio::test]
    async fn rejected_stream_reports_failure() {
        let app = Router::new().route(
            "/api/pipeline/extract",
            post(|| async { (StatusCode::BAD_REQUEST, "No email IDs provided") }),
        );
        let api = serve(app).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let _handle = api.start_extraction(Vec::new(), tx).unwrap();
        let updates = collect(rx).await;

        assert_eq!(updates.len(), 2);
        match &updates[0] {
            ProgressUpdate::Failed(message) => assert!(message.contains("No email IDs provided")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_the_handle_closes_the_channel() {
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = api.start_extraction(vec!["E1".into()], tx).unwrap();
        drop(handle);
        assert_eq!(rx.recv().await, None);
    }
}
