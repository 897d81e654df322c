//! Media extraction: format models, selection and the yt-dlp driver
//!
//! Everything site-specific is delegated to the external `yt-dlp` binary;
//! this module only shapes its JSON output into candidates and picks the
//! pair to download.

pub mod select;
/// yt-dlp subprocess driver
pub mod ytdlp;

use crate::config::{NETWORK_MAX_RETRIES, NETWORK_RETRY_DELAY_MS};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use url::Url;

/// Errors that can occur while talking to the extraction backend
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The yt-dlp process could not be launched
    #[error("failed to launch yt-dlp: {0}")]
    Spawn(#[from] std::io::Error),
    /// The yt-dlp process exceeded its deadline
    #[error("yt-dlp timed out after {0}s")]
    Timeout(u64),
    /// Unrecoverable failure (removed/private video, geo-block, bad URL)
    #[error("extraction failed permanently: {0}")]
    Fatal(String),
    /// Any other extraction failure, worth a retry
    #[error("extraction failed: {0}")]
    Failed(String),
    /// The metadata dump was not the JSON shape we expect
    #[error("invalid yt-dlp metadata: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtractError {
    /// `true` for failures that retrying cannot fix
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Which track a format carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Format with a video stream (possibly muxed with audio)
    Video,
    /// Audio-only format
    Audio,
}

/// One downloadable stream representation offered by the source site
#[derive(Debug, Clone)]
pub struct FormatCandidate {
    /// Identifier understood by yt-dlp's `-f` selector
    pub id: String,
    /// Codec string (`avc1.64001f`, `vp9`, `opus`, ...)
    pub codec: String,
    /// Size in bytes when the site reports one
    pub filesize: Option<u64>,
    /// Video or audio track
    pub kind: TrackKind,
    /// Frame width, video tracks only
    pub width: Option<u32>,
    /// Frame height, video tracks only
    pub height: Option<u32>,
    /// Audio bitrate in kbit/s, audio tracks only
    pub abr: Option<f64>,
    /// Audio language tag as reported by the site
    pub language: Option<String>,
}

/// Metadata and format candidates produced by a probe
#[derive(Debug, Clone)]
pub struct MediaProbe {
    /// Video title
    pub title: String,
    /// Duration in seconds (0 when unknown)
    pub duration: u32,
    /// Width of the default stream, when reported
    pub width: Option<u32>,
    /// Height of the default stream, when reported
    pub height: Option<u32>,
    /// Video format candidates, in site order
    pub video: Vec<FormatCandidate>,
    /// Audio-only format candidates, in site order
    pub audio: Vec<FormatCandidate>,
}

/// The video/audio pair chosen for download
#[derive(Debug, Clone)]
pub struct FormatSelection {
    /// yt-dlp format id of the video track
    pub video_id: String,
    /// yt-dlp format id of the audio track
    pub audio_id: String,
}

/// Interface to the media extraction backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Fetch metadata and the available formats without downloading
    async fn probe(&self, url: &Url) -> Result<MediaProbe, ExtractError>;

    /// Download the selected pair and merge it into `output` as mp4
    async fn download(
        &self,
        url: &Url,
        selection: &FormatSelection,
        output: &Path,
    ) -> Result<(), ExtractError>;
}

fn retry_strategy() -> impl Iterator<Item = Duration> {
    FixedInterval::new(Duration::from_millis(NETWORK_RETRY_DELAY_MS)).take(NETWORK_MAX_RETRIES)
}

/// Probe under the flat retry policy; fatal errors short-circuit.
///
/// # Errors
///
/// Returns the last extraction error once retries are exhausted, or the
/// first fatal error immediately.
pub async fn probe_with_retry(
    extractor: &dyn MediaExtractor,
    url: &Url,
) -> Result<MediaProbe, ExtractError> {
    RetryIf::spawn(
        retry_strategy(),
        || extractor.probe(url),
        |e: &ExtractError| !e.is_fatal(),
    )
    .await
}

/// Download under the flat retry policy; fatal errors short-circuit.
///
/// # Errors
///
/// Returns the last extraction error once retries are exhausted, or the
/// first fatal error immediately.
pub async fn download_with_retry(
    extractor: &dyn MediaExtractor,
    url: &Url,
    selection: &FormatSelection,
    output: &Path,
) -> Result<(), ExtractError> {
    RetryIf::spawn(
        retry_strategy(),
        || extractor.download(url, selection, output),
        |e: &ExtractError| !e.is_fatal(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_url() -> Url {
        Url::parse("https://youtu.be/dQw4w9WgXcQ").expect("static url")
    }

    fn empty_probe() -> MediaProbe {
        MediaProbe {
            title: "t".to_string(),
            duration: 0,
            width: None,
            height: None,
            video: Vec::new(),
            audio: Vec::new(),
        }
    }

    #[tokio::test]
    async fn probe_retries_transient_failures_then_gives_up() {
        let mut mock = MockMediaExtractor::new();
        mock.expect_probe()
            .times(NETWORK_MAX_RETRIES + 1)
            .returning(|_| Err(ExtractError::Failed("site hiccup".to_string())));

        let err = probe_with_retry(&mock, &test_url())
            .await
            .expect_err("all attempts fail");
        assert!(matches!(err, ExtractError::Failed(_)));
    }

    #[tokio::test]
    async fn probe_does_not_retry_fatal_errors() {
        let mut mock = MockMediaExtractor::new();
        mock.expect_probe()
            .times(1)
            .returning(|_| Err(ExtractError::Fatal("Video unavailable".to_string())));

        let err = probe_with_retry(&mock, &test_url())
            .await
            .expect_err("fatal error propagates");
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn probe_recovers_on_a_later_attempt() {
        let mut mock = MockMediaExtractor::new();
        let mut attempts = 0;
        mock.expect_probe().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(ExtractError::Failed("transient".to_string()))
            } else {
                Ok(empty_probe())
            }
        });

        let probe = probe_with_retry(&mock, &test_url())
            .await
            .expect("second attempt succeeds");
        assert_eq!(probe.title, "t");
    }
}

