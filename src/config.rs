//! Configuration and settings management
//!
//! Loads settings from environment variables and defines retry/timeout
//! constants. All values are read once at startup; `Settings` is passed
//! around as an immutable `Arc`, never consulted as global state.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token; startup aborts when missing
    pub telegram_token: String,

    /// Ceiling for the selected video track, in bytes
    #[serde(default = "default_max_video_size")]
    pub max_video_size: u64,
    /// Ceiling for the selected audio track, in bytes
    #[serde(default = "default_max_audio_size")]
    pub max_audio_size: u64,
    /// Ceiling for the merged upload, in bytes (Telegram bot upload limit)
    #[serde(default = "default_max_tg_file_size")]
    pub max_tg_file_size: u64,

    /// User exempt from rate limiting
    #[serde(default = "default_vip_user_id")]
    pub vip_user_id: u64,
    /// Rate limit window, in minutes
    #[serde(default = "default_rate_limit_window_minutes")]
    pub rate_limit_window_minutes: u64,

    /// Chat the bot uploads media to in order to obtain durable file ids
    #[serde(default = "default_media_chat_id")]
    pub media_chat_id: i64,

    /// Placeholder "loading" video shown while a download is in flight
    #[serde(default = "default_ph_loading_video_url")]
    pub ph_loading_video_url: String,
    /// Thumbnail for the placeholder result
    #[serde(default = "default_ph_thumbnail_url")]
    pub ph_thumbnail_url: String,
    /// Placeholder video width, px
    #[serde(default = "default_ph_video_width")]
    pub ph_video_width: u32,
    /// Placeholder video height, px
    #[serde(default = "default_ph_video_height")]
    pub ph_video_height: u32,
    /// Placeholder video duration, seconds
    #[serde(default = "default_ph_video_duration")]
    pub ph_video_duration: u32,

    /// Error video shown when a download cannot be delivered
    #[serde(default = "default_err_loading_video_url")]
    pub err_loading_video_url: String,
    /// Error video width, px
    #[serde(default = "default_err_video_width")]
    pub err_video_width: u32,
    /// Error video height, px
    #[serde(default = "default_err_video_height")]
    pub err_video_height: u32,
    /// Error video duration, seconds
    #[serde(default = "default_err_video_duration")]
    pub err_video_duration: u32,

    /// Comma-separated audio language preference order
    #[serde(rename = "preferred_audio_languages")]
    pub preferred_audio_languages_str: Option<String>,

    /// Base64-encoded cookies.txt handed to yt-dlp (optional)
    pub ytdlp_cookies_b64: Option<String>,
    /// User agent handed to yt-dlp (optional)
    pub ytdlp_user_agent: Option<String>,
}

const fn default_max_video_size() -> u64 {
    15 * 1024 * 1024
}

const fn default_max_audio_size() -> u64 {
    8 * 1024 * 1024
}

const fn default_max_tg_file_size() -> u64 {
    50 * 1024 * 1024
}

const fn default_vip_user_id() -> u64 {
    282_614_687
}

const fn default_rate_limit_window_minutes() -> u64 {
    1
}

const fn default_media_chat_id() -> i64 {
    -1_002_389_753_204
}

fn default_ph_loading_video_url() -> String {
    "https://magicxor.github.io/static/ytdl-inline-bot/loading_v2.mp4".to_string()
}

fn default_ph_thumbnail_url() -> String {
    "https://magicxor.github.io/static/ytdl-inline-bot/loading_v1.jpg".to_string()
}

const fn default_ph_video_width() -> u32 {
    1024
}

const fn default_ph_video_height() -> u32 {
    576
}

const fn default_ph_video_duration() -> u32 {
    10
}

fn default_err_loading_video_url() -> String {
    "https://magicxor.github.io/static/ytdl-inline-bot/error_v1.mp4".to_string()
}

const fn default_err_video_width() -> u32 {
    640
}

const fn default_err_video_height() -> u32 {
    480
}

const fn default_err_video_duration() -> u32 {
    5
}

/// Fallback audio language preference when none is configured
const DEFAULT_AUDIO_LANGUAGES: &[&str] = &["en-US", "en", "ru-RU", "ru"];

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or `TELEGRAM_TOKEN` is
    /// missing.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Optional file-based configuration, lowest priority
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Environment variables win; UPPER_SNAKE_CASE maps to field
            // names automatically, empty values count as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Rate limit window as a duration
    #[must_use]
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_minutes * 60)
    }

    /// Audio language preference order, most preferred first
    #[must_use]
    pub fn preferred_audio_languages(&self) -> Vec<String> {
        self.preferred_audio_languages_str
            .as_ref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|lang| !lang.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .filter(|langs: &Vec<String>| !langs.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_AUDIO_LANGUAGES
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect()
            })
    }
}

// Network retry configuration. The retry policy is deliberately flat: a
// fixed number of extra attempts with a fixed pause, every failure treated
// the same.
/// Extra attempts after the first failure
pub const NETWORK_MAX_RETRIES: usize = 2;
/// Pause between attempts, milliseconds
pub const NETWORK_RETRY_DELAY_MS: u64 = 1000;

// yt-dlp subprocess configuration
/// Binary name resolved via PATH; the supervisor upgrades it out of band
pub const YTDLP_BIN: &str = "yt-dlp";
/// Timeout for a metadata probe, seconds
pub const YTDLP_PROBE_TIMEOUT_SECS: u64 = 60;
/// Timeout for a download-and-merge run, seconds
pub const YTDLP_DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Timeout for the best-effort page title fetch on the error path, seconds
pub const PAGE_TITLE_TIMEOUT_SECS: u64 = 10;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn bare_settings() -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            max_video_size: default_max_video_size(),
            max_audio_size: default_max_audio_size(),
            max_tg_file_size: default_max_tg_file_size(),
            vip_user_id: default_vip_user_id(),
            rate_limit_window_minutes: 1,
            media_chat_id: default_media_chat_id(),
            ph_loading_video_url: String::new(),
            ph_thumbnail_url: String::new(),
            ph_video_width: 0,
            ph_video_height: 0,
            ph_video_duration: 0,
            err_loading_video_url: String::new(),
            err_video_width: 0,
            err_video_height: 0,
            err_video_duration: 0,
            preferred_audio_languages_str: None,
            ytdlp_cookies_b64: None,
            ytdlp_user_agent: None,
        }
    }

    // Runs in the same process as other env-touching tests; keep the
    // variable names unique to this test to avoid races.
    #[test]
    fn test_defaults_applied() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "dummy_token");

        let settings = Settings::new()?;
        assert_eq!(settings.max_video_size, 15 * 1024 * 1024);
        assert_eq!(settings.max_audio_size, 8 * 1024 * 1024);
        assert_eq!(settings.max_tg_file_size, 50 * 1024 * 1024);
        assert_eq!(settings.rate_limit_window_minutes, 1);
        assert_eq!(settings.ph_video_width, 1024);
        assert_eq!(settings.err_video_duration, 5);
        assert!(settings.ytdlp_cookies_b64.is_none());

        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }

    #[test]
    fn test_rate_limit_window_conversion() {
        let settings = Settings {
            rate_limit_window_minutes: 3,
            ..bare_settings()
        };

        assert_eq!(settings.rate_limit_window(), Duration::from_secs(180));
    }

    #[test]
    fn test_language_list_parsing() {
        let mut settings = bare_settings();

        // Default order when unset
        assert_eq!(
            settings.preferred_audio_languages(),
            vec!["en-US", "en", "ru-RU", "ru"]
        );

        // Explicit list with whitespace and empty tokens
        settings.preferred_audio_languages_str = Some("de, fr, ,es".to_string());
        assert_eq!(settings.preferred_audio_languages(), vec!["de", "fr", "es"]);

        // All-empty falls back to the defaults
        settings.preferred_audio_languages_str = Some(" , ".to_string());
        assert_eq!(
            settings.preferred_audio_languages(),
            vec!["en-US", "en", "ru-RU", "ru"]
        );
    }
}
