use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub page_size: u32,
    pub quick_search_limit: u32,
    pub search_debounce_ms: u64,
    pub settings_debounce_ms: u64,
    pub status_poll_secs: u64,
    pub request_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            page_size: 50,
            quick_search_limit: 8,
            search_debounce_ms: 300,
            settings_debounce_ms: 500,
            status_poll_secs: 2,
            request_timeout_secs: 30,
            data_dir: None,
        }
    }
}

impl Config {
    /// Load `config.toml` from the platform config dir, falling back to defaults
    /// when the file is missing. `FEEDPRISM_API_URL` wins over the file.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                tracing::debug!("Loaded config from {:?}", path);
                Self::from_toml(&content)?
            }
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var("FEEDPRISM_API_URL") {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("feedprism").join("config.toml"))
    }

    /// Directory holding persisted preferences.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("feedprism")
        })
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn settings_debounce(&self) -> Duration {
        Duration::from_millis(self.settings_debounce_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.search_debounce(), Duration::from_millis(300));
        assert_eq!(config.status_poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config = Config::from_toml(
            r#"
            api_base_url = "http://feedprism.local:9000"
            status_poll_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.api_base_url, "http://feedprism.local:9000");
        assert_eq!(config.status_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.quick_search_limit, 8);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(Config::from_toml("page_size = \"many\"").is_err());
    }
}
