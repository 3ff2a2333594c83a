use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{
    DemoConfig, DemoStatus, DemoUser, EmailDetail, EmailSummary, ExtractionStatus, FeedItem,
    FeedResponse, Health, HistoryPoint, ItemType, MetricsResponse, PipelineSettings,
    ProgressUpdate, SearchRequest, SearchResponse, SettingsUpdate, UnprocessedEmails,
};

use super::sse::{self, ExtractionHandle};

fn join_csv<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Deserialize)]
pub struct DemoMarkResult {
    #[serde(default)]
    pub marked_count: u32,
    #[serde(default)]
    pub remaining_unprocessed: u32,
}

/// Thin client over the FeedPrism REST/SSE API. Cheap to clone.
///
/// Failures surface as [`AppError`] with a readable message; nothing is retried.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // No client-wide timeout: the extraction stream stays open for minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("feedprism-tui/0.1")
            .build()?;

        // Validate once so endpoint construction can only fail on bad paths
        Url::parse(base_url)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    fn endpoint_with<'a>(
        &self,
        path: &str,
        params: impl IntoIterator<Item = (&'a str, String)>,
    ) -> Result<Url> {
        let mut url = self.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, &value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.timeout(self.timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("API request failed: HTTP {}: {}", status, body);
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url)).await
    }

    // Feed

    pub async fn get_feed(
        &self,
        page: u32,
        page_size: u32,
        types: &[ItemType],
        senders: &[String],
        tags: &[String],
    ) -> Result<FeedResponse> {
        let mut params = vec![("page", page.to_string()), ("page_size", page_size.to_string())];
        if !types.is_empty() {
            params.push(("types", join_csv(types)));
        }
        if !senders.is_empty() {
            params.push(("senders", senders.join(",")));
        }
        if !tags.is_empty() {
            params.push(("tags", tags.join(",")));
        }
        self.get(self.endpoint_with("/api/feed", params)?).await
    }

    pub async fn get_feed_by_type(
        &self,
        item_type: ItemType,
        page: u32,
        page_size: u32,
    ) -> Result<FeedResponse> {
        let url = self.endpoint_with(
            &format!("/api/feed/by-type/{item_type}"),
            [("page", page.to_string()), ("page_size", page_size.to_string())],
        )?;
        self.get(url).await
    }

    pub async fn get_feed_item(&self, item_id: &str, item_type: ItemType) -> Result<FeedItem> {
        let url = self.endpoint_with(
            &format!("/api/feed/{item_id}"),
            [("item_type", item_type.to_string())],
        )?;
        self.get(url).await
    }

    // Search

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let url = self.endpoint("/api/search")?;
        self.send(self.client.post(url).json(request)).await
    }

    pub async fn quick_search(&self, query: &str, limit: u32) -> Result<SearchResponse> {
        let url = self.endpoint_with(
            "/api/search/quick",
            [("q", query.to_string()), ("limit", limit.to_string())],
        )?;
        self.get(url).await
    }

    // Metrics

    pub async fn get_metrics(&self, days: u32) -> Result<MetricsResponse> {
        self.get(self.endpoint_with("/api/metrics", [("days", days.to_string())])?)
            .await
    }

    pub async fn get_metrics_history(&self) -> Result<Vec<HistoryPoint>> {
        self.get(self.endpoint("/api/metrics/history")?).await
    }

    pub async fn get_health(&self) -> Result<Health> {
        self.get(self.endpoint("/api/metrics/health")?).await
    }

    // Emails

    pub async fn get_recent_emails(&self, limit: u32) -> Result<Vec<EmailSummary>> {
        self.get(self.endpoint_with("/api/emails/recent", [("limit", limit.to_string())])?)
            .await
    }

    pub async fn get_email_detail(&self, email_id: &str, include_body: bool) -> Result<EmailDetail> {
        let params = include_body.then(|| ("include_body", "true".to_string()));
        self.get(self.endpoint_with(&format!("/api/emails/{email_id}"), params)?)
            .await
    }

    // Extraction pipeline

    pub async fn get_unprocessed_emails(&self) -> Result<UnprocessedEmails> {
        self.get(self.endpoint("/api/pipeline/unprocessed-emails")?)
            .await
    }

    pub async fn get_extraction_status(&self) -> Result<ExtractionStatus> {
        self.get(self.endpoint("/api/pipeline/extraction-status")?)
            .await
    }

    /// Open the extraction event stream for `email_ids`. Events, a failure, and
    /// finally `ProgressUpdate::Ended` are delivered on `updates`. Dropping or
    /// cancelling the handle closes the stream.
    pub fn start_extraction(
        &self,
        email_ids: Vec<String>,
        updates: UnboundedSender<ProgressUpdate>,
    ) -> Result<ExtractionHandle> {
        let url = self.endpoint("/api/pipeline/extract")?;
        tracing::info!("Starting extraction for {} emails", email_ids.len());
        let request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&email_ids);
        Ok(sse::spawn_stream(request, updates))
    }

    pub async fn get_pipeline_settings(&self) -> Result<PipelineSettings> {
        self.get(self.endpoint("/api/pipeline/settings")?).await
    }

    /// Save the per-batch email limit, clamped to what the backend accepts.
    pub async fn update_pipeline_settings(&self, email_max_limit: i64) -> Result<SettingsUpdate> {
        let limit = PipelineSettings::clamp_email_limit(email_max_limit);
        let url = self.endpoint_with(
            "/api/pipeline/settings",
            [("email_max_limit", limit.to_string())],
        )?;
        self.send(self.client.post(url)).await
    }

    // Demo mode

    pub async fn get_demo_config(&self) -> Result<DemoConfig> {
        self.get(self.endpoint("/api/demo/config")?).await
    }

    pub async fn get_demo_user(&self) -> Result<DemoUser> {
        self.get(self.endpoint("/api/demo/user")?).await
    }

    pub async fn toggle_demo(&self, enabled: bool) -> Result<DemoStatus> {
        let url = self.endpoint("/api/demo/toggle")?;
        self.send(
            self.client
                .post(url)
                .json(&serde_json::json!({ "enabled": enabled })),
        )
        .await
    }

    pub async fn reset_demo(&self) -> Result<serde_json::Value> {
        let url = self.endpoint("/api/demo/reset")?;
        self.send(self.client.post(url)).await
    }

    pub async fn get_demo_unprocessed_emails(&self) -> Result<UnprocessedEmails> {
        self.get(self.endpoint("/api/demo/emails/unprocessed")?)
            .await
    }

    pub async fn mark_demo_extracted(&self, email_ids: &[String]) -> Result<DemoMarkResult> {
        let url = self.endpoint("/api/demo/emails/mark-extracted")?;
        self.send(self.client.post(url).json(email_ids)).await
    }

    pub async fn get_demo_feed(
        &self,
        page: u32,
        page_size: u32,
        types: &[ItemType],
    ) -> Result<FeedResponse> {
        let mut params = vec![("page", page.to_string()), ("page_size", page_size.to_string())];
        if !types.is_empty() {
            params.push(("types", join_csv(types)));
        }
        self.get(self.endpoint_with("/api/demo/feed", params)?).await
    }
}
