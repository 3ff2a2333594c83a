//! Live extraction stream and status polling behind one interface.
//!
//! A source owns its receiver, so replacing the active source drops any
//! updates the old one had queued.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{ApiClient, ExtractionHandle};
use crate::error::Result;
use crate::models::ProgressUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Stream,
    Poll,
}

pub trait ProgressSource: Send {
    fn kind(&self) -> SourceKind;

    fn updates(&mut self) -> &mut UnboundedReceiver<ProgressUpdate>;

    /// Stop producing updates. Already queued updates stay readable.
    fn stop(&mut self);

    fn try_next(&mut self) -> Option<ProgressUpdate> {
        self.updates().try_recv().ok()
    }
}

/// Progress pushed by the server over the extraction event stream.
pub struct StreamSource {
    handle: ExtractionHandle,
    rx: UnboundedReceiver<ProgressUpdate>,
}

impl StreamSource {
    pub fn start(api: &ApiClient, email_ids: Vec<String>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = api.start_extraction(email_ids, tx)?;
        Ok(Self { handle, rx })
    }
}

impl ProgressSource for StreamSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Stream
    }

    fn updates(&mut self) -> &mut UnboundedReceiver<ProgressUpdate> {
        &mut self.rx
    }

    fn stop(&mut self) {
        self.handle.cancel();
    }
}

/// Fixed-period status checks. The first check runs immediately; the source
/// ends itself once the server reports no extraction running.
pub struct PollSource {
    task: JoinHandle<()>,
    rx: UnboundedReceiver<ProgressUpdate>,
}

impl PollSource {
    pub fn start(api: ApiClient, period: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match api.get_extraction_status().await {
                    Ok(status) => {
                        let running = status.is_extracting;
                        if tx.send(ProgressUpdate::Status(status)).is_err() || !running {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Extraction status check failed: {}", e);
                        break;
                    }
                }
            }
            let _ = tx.send(ProgressUpdate::Ended);
        });
        Self { task, rx }
    }
}

impl ProgressSource for PollSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Poll
    }

    fn updates(&mut self) -> &mut UnboundedReceiver<ProgressUpdate> {
        &mut self.rx
    }

    fn stop(&mut self) {
        self.task.abort();
    }
}

impl Drop for PollSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ApiClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap()
    }

    async fn drain(source: &mut dyn ProgressSource) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = source.updates().recv().await {
            let done = update == ProgressUpdate::Ended;
            updates.push(update);
            if done {
                break;
            }
        }
        updates
    }

    // Reports a running extraction for the first `running` calls.
    async fn status(State((calls, running)): State<(Arc<AtomicUsize>, usize)>) -> Json<Value> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < running {
            Json(json!({
                "is_extracting": true,
                "progress": {"current": n + 1, "total": 4, "events": n, "courses": 0, "blogs": 0, "message": "Working"},
                "started_at": "2025-02-10T08:00:00"
            }))
        } else {
            Json(json!({"is_extracting": false, "progress": null, "started_at": null}))
        }
    }

    #[tokio::test]
    async fn poll_source_ends_when_extraction_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/api/pipeline/extraction-status", get(status))
            .with_state((calls.clone(), 2));
        let api = serve(app).await;

        let mut source = PollSource::start(api, Duration::from_millis(10));
        assert_eq!(source.kind(), SourceKind::Poll);
        let updates = drain(&mut source).await;

        assert_eq!(updates.len(), 4);
        let running: Vec<bool> = updates
            .iter()
            .filter_map(|u| match u {
                ProgressUpdate::Status(s) => Some(s.is_extracting),
                _ => None,
            })
            .collect();
        assert_eq!(running, vec![true, true, false]);
        assert_eq!(updates.last(), Some(&ProgressUpdate::Ended));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poll_source_ends_on_backend_error() {
        let app = Router::new().route(
            "/api/pipeline/extraction-status",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let api = serve(app).await;

        let mut source = PollSource::start(api, Duration::from_millis(10));
        assert_eq!(drain(&mut source).await, vec![ProgressUpdate::Ended]);
    }

    #[tokio::test]
    async fn stopped_poll_source_goes_quiet() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/api/pipeline/extraction-status", get(status))
            .with_state((calls.clone(), usize::MAX));
        let api = serve(app).await;

        let mut source = PollSource::start(api, Duration::from_millis(10));
        // Wait for the first status, then stop
        assert!(matches!(source.updates().recv().await, Some(ProgressUpdate::Status(_))));
        source.stop();
        let seen = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(calls.load(Ordering::SeqCst) <= seen + 1);
        while let Some(update) = source.try_next() {
            assert_ne!(update, ProgressUpdate::Ended);
        }
    }
}
