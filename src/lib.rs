//! Telegram inline bot that turns YouTube links into playable video results.
//!
//! A user types a YouTube URL into an inline query; the bot answers
//! immediately with a placeholder "loading" clip, and once the result is
//! chosen it extracts formats via `yt-dlp`, downloads a video/audio pair
//! that fits the configured size ceilings, uploads the merged file to a
//! media chat and swaps the placeholder for the real video.

/// Telegram-facing handlers, throttling and resilient API wrappers
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Media extraction: yt-dlp driver, format models and selection
pub mod extractor;
/// URL parsing, retry helper and small text utilities
pub mod utils;
