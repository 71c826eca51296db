//! Console configuration.
//!
//! Values come from command-line flags (with environment fallbacks) and are
//! collected here so the rest of the console does not depend on `clap`.

use std::path::PathBuf;
use std::time::Duration;

use model_console_core::ExchangeMode;
use serde::Deserialize;

/// Largest preview the backend will return.
pub const MAX_PREVIEW_ROWS: u32 = 100;

/// Configuration for the console.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Backend base URL (e.g., "http://localhost:5000").
    #[serde(default = "ConsoleConfig::default_api_url")]
    pub api_url: String,

    /// Request timeout in seconds. Also bounds a whole chat exchange.
    #[serde(default = "ConsoleConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// How chat replies are delivered.
    #[serde(default)]
    pub chat_mode: ExchangeMode,

    /// Directory downloads are written to.
    #[serde(default = "ConsoleConfig::default_download_dir")]
    pub download_dir: PathBuf,

    /// Rows requested when previewing a data file.
    #[serde(default = "ConsoleConfig::default_preview_rows")]
    pub preview_rows: u32,

    /// Seconds between background refreshes of the resource lists.
    #[serde(default = "ConsoleConfig::default_refresh_interval")]
    pub refresh_interval_seconds: u64,
}

impl ConsoleConfig {
    fn default_api_url() -> String {
        "http://localhost:5000".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    fn default_download_dir() -> PathBuf {
        PathBuf::from(".")
    }

    const fn default_preview_rows() -> u32 {
        10
    }

    const fn default_refresh_interval() -> u64 {
        5
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the refresh interval as a `Duration`.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }

    /// Preview row count, capped at what the backend serves.
    #[must_use]
    pub fn preview_rows(&self) -> u32 {
        self.preview_rows.clamp(1, MAX_PREVIEW_ROWS)
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: Self::default_api_url(),
            request_timeout_seconds: Self::default_request_timeout(),
            chat_mode: ExchangeMode::default(),
            download_dir: Self::default_download_dir(),
            preview_rows: Self::default_preview_rows(),
            refresh_interval_seconds: Self::default_refresh_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ConsoleConfig::default();
        assert_eq!(config.api_url, "http://localhost:5000");
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.chat_mode, ExchangeMode::Stream);
        assert_eq!(config.download_dir, PathBuf::from("."));
        assert_eq!(config.preview_rows(), 10);
    }

    #[test]
    fn timeout_duration() {
        let config = ConsoleConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
    }

    #[test]
    fn preview_rows_are_capped() {
        let config = ConsoleConfig {
            preview_rows: 500,
            ..ConsoleConfig::default()
        };
        assert_eq!(config.preview_rows(), MAX_PREVIEW_ROWS);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ConsoleConfig =
            serde_json::from_str(r#"{"api_url":"http://backend:5000","chat_mode":"normal"}"#)
                .unwrap();
        assert_eq!(config.api_url, "http://backend:5000");
        assert_eq!(config.chat_mode, ExchangeMode::Normal);
        assert_eq!(config.request_timeout_seconds, 30);
    }
}
