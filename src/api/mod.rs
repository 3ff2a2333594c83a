mod client;
pub mod sse;

pub use client::{ApiClient, DemoMarkResult};
pub use sse::ExtractionHandle;
