mod email;
mod extraction;
mod item;
mod metrics;
mod settings;
mod timestamp;

pub use email::{EmailDetail, EmailSummary, UnprocessedEmails};
pub use extraction::{
    ExtractionEvent, ExtractionEventData, ExtractionEventKind, ExtractionStatus, ProgressUpdate,
    StatusProgress,
};
pub use item::{FeedItem, FeedResponse, ItemType, SearchRequest, SearchResponse};
pub use metrics::{Health, HistoryPoint, MetricsResponse};
pub use settings::{
    DemoConfig, DemoStatus, DemoUser, PipelineSettings, SettingsUpdate, EMAIL_LIMIT_MAX, EMAIL_LIMIT_MIN,
};
