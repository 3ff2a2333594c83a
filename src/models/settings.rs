use serde::{Deserialize, Serialize};

use super::timestamp::null_as_default;

pub const EMAIL_LIMIT_MIN: u32 = 1;
pub const EMAIL_LIMIT_MAX: u32 = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub email_max_limit: u32,
    #[serde(default)]
    pub email_fetch_hours_back: Option<u32>,
    #[serde(default)]
    pub llm_model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
}

impl PipelineSettings {
    /// Bound an email limit to what the backend accepts.
    pub fn clamp_email_limit(limit: i64) -> u32 {
        limit.clamp(EMAIL_LIMIT_MIN as i64, EMAIL_LIMIT_MAX as i64) as u32
    }
}

/// Echo of `POST /api/pipeline/settings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    pub email_max_limit: u32,
    #[serde(default)]
    pub email_fetch_hours_back: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    pub demo_mode: bool,
    #[serde(default)]
    pub banner: Option<DemoBanner>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoBanner {
    #[serde(default)]
    pub show: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
}

impl DemoConfig {
    pub fn banner_text(&self) -> Option<&str> {
        self.banner
            .as_ref()
            .filter(|b| b.show && !b.text.is_empty())
            .map(|b| b.text.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoUser {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_demo: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoStatus {
    pub enabled: bool,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}
