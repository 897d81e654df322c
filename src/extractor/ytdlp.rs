//! yt-dlp subprocess driver
//!
//! Probes metadata with `-J` and downloads the selected format pair with
//! `-f <video>+<audio>`, merging into mp4. Cookies arrive base64-encoded in
//! configuration and are materialised to a temp file that lives as long as
//! the extractor.

use super::{
    ExtractError, FormatCandidate, FormatSelection, MediaExtractor, MediaProbe, TrackKind,
};
use crate::config::{
    Settings, YTDLP_BIN, YTDLP_DOWNLOAD_TIMEOUT_SECS, YTDLP_PROBE_TIMEOUT_SECS,
};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::io::Write as _;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

/// Patterns in yt-dlp output that no amount of retrying will fix
const FATAL_ERROR_PATTERNS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is private",
    "This video has been removed",
    "removed by the uploader",
    "no longer available",
    "blocked it in your country",
    "geo-restricted",
    "Sign in to confirm your age",
    "age-restricted",
    "members-only",
    "Join this channel to get access",
    "terminated account",
    "Unsupported URL",
    "is not a valid URL",
    "Unable to extract video data",
    "HTTP Error 403",
    "HTTP Error 404",
];

/// Error text of a failed run; yt-dlp writes errors to stderr, but fall
/// back to stdout when it is empty
fn failure_text(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    }
}

/// Classify a failed yt-dlp run into fatal vs retryable
fn classify_failure(output: &str) -> ExtractError {
    let line = output.trim();
    if FATAL_ERROR_PATTERNS
        .iter()
        .any(|pattern| line.contains(pattern))
    {
        ExtractError::Fatal(line.to_string())
    } else {
        ExtractError::Failed(line.to_string())
    }
}

/// Extractor backed by the `yt-dlp` binary on PATH
pub struct YtdlpExtractor {
    user_agent: Option<String>,
    // Keeps the temp file alive; dropped (and deleted) with the extractor
    cookies: Option<NamedTempFile>,
}

impl YtdlpExtractor {
    /// Build an extractor from settings, materialising the cookies file
    ///
    /// # Errors
    ///
    /// Returns an error when `YTDLP_COOKIES_B64` is set but not valid
    /// base64, or the temp file cannot be written.
    pub fn from_settings(settings: &Settings) -> Result<Self, ExtractError> {
        let cookies = settings
            .ytdlp_cookies_b64
            .as_deref()
            .map(write_cookies_file)
            .transpose()?;

        Ok(Self {
            user_agent: settings.ytdlp_user_agent.clone(),
            cookies,
        })
    }

    /// Arguments shared by every yt-dlp invocation
    fn common_args(&self, cmd: &mut Command) {
        cmd.arg("--no-warnings");
        if let Some(file) = &self.cookies {
            cmd.arg("--cookies").arg(file.path());
        }
        if let Some(agent) = &self.user_agent {
            cmd.arg("--user-agent").arg(agent);
        }
    }

    /// Run yt-dlp with a deadline; the child is killed on timeout
    async fn run(
        &self,
        configure: impl FnOnce(&mut Command),
        timeout_secs: u64,
    ) -> Result<std::process::Output, ExtractError> {
        let mut cmd = Command::new(YTDLP_BIN);
        self.common_args(&mut cmd);
        configure(&mut cmd);
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ExtractError::Spawn(e)),
            Err(_) => {
                warn!(timeout_secs, "yt-dlp run exceeded its deadline");
                Err(ExtractError::Timeout(timeout_secs))
            }
        }
    }
}

fn write_cookies_file(encoded: &str) -> Result<NamedTempFile, ExtractError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ExtractError::Fatal(format!("YTDLP_COOKIES_B64 is not valid base64: {e}")))?;

    let mut file = NamedTempFile::new()
        .map_err(|e| ExtractError::Fatal(format!("cannot create cookies temp file: {e}")))?;
    file.write_all(&bytes)
        .and_then(|()| file.flush())
        .map_err(|e| ExtractError::Fatal(format!("cannot write cookies temp file: {e}")))?;
    debug!(path = %file.path().display(), "Materialised yt-dlp cookies file");
    Ok(file)
}

#[async_trait]
impl MediaExtractor for YtdlpExtractor {
    async fn probe(&self, url: &Url) -> Result<MediaProbe, ExtractError> {
        debug!(%url, "Probing formats");
        let output = self
            .run(
                |cmd| {
                    cmd.arg("-J").arg("--no-download").arg(url.as_str());
                },
                YTDLP_PROBE_TIMEOUT_SECS,
            )
            .await?;

        if !output.status.success() {
            return Err(classify_failure(&failure_text(&output)));
        }

        parse_probe(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(
        &self,
        url: &Url,
        selection: &FormatSelection,
        output_path: &Path,
    ) -> Result<(), ExtractError> {
        let format = format!("{}+{}", selection.video_id, selection.audio_id);
        debug!(%url, %format, output = %output_path.display(), "Downloading");

        let output = self
            .run(
                |cmd| {
                    cmd.arg("-f")
                        .arg(&format)
                        .arg("--merge-output-format")
                        .arg("mp4")
                        .arg("--quiet")
                        .arg("-o")
                        .arg(output_path)
                        .arg(url.as_str());
                },
                YTDLP_DOWNLOAD_TIMEOUT_SECS,
            )
            .await?;

        if !output.status.success() {
            return Err(classify_failure(&failure_text(&output)));
        }

        if !output_path.exists() {
            return Err(ExtractError::Failed(
                "yt-dlp reported success but produced no output file".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    language: Option<String>,
}

impl RawFormat {
    fn has_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|c| c != "none")
    }

    fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|c| c != "none")
    }

    // Only plain https formats are downloadable without a streaming
    // pipeline; HLS/DASH manifests are skipped.
    fn is_direct(&self) -> bool {
        self.protocol.as_deref() == Some("https")
    }
}

#[derive(Debug, Deserialize)]
struct RawProbe {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    fulltitle: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

/// Parse a `yt-dlp -J` dump into metadata plus partitioned candidates.
///
/// Muxed formats count as video; audio candidates are audio-only streams.
/// Anything without a direct https download, or with neither track, is
/// dropped.
///
/// # Errors
///
/// Returns `ExtractError::Json` when the dump does not deserialize.
pub fn parse_probe(json: &str) -> Result<MediaProbe, ExtractError> {
    let raw: RawProbe = serde_json::from_str(json)?;

    let mut video = Vec::new();
    let mut audio = Vec::new();
    for f in raw.formats {
        if !f.is_direct() {
            continue;
        }
        if f.has_video() {
            video.push(FormatCandidate {
                id: f.format_id,
                codec: f.vcodec.unwrap_or_default(),
                filesize: f.filesize,
                kind: TrackKind::Video,
                width: f.width,
                height: f.height,
                abr: None,
                language: None,
            });
        } else if f.has_audio() {
            audio.push(FormatCandidate {
                id: f.format_id,
                codec: f.acodec.unwrap_or_default(),
                filesize: f.filesize,
                kind: TrackKind::Audio,
                width: None,
                height: None,
                abr: f.abr,
                language: f.language,
            });
        }
    }

    Ok(MediaProbe {
        title: raw
            .title
            .or(raw.fulltitle)
            .unwrap_or_else(|| "Unknown Title".to_string()),
        duration: raw.duration.map_or(0, |d| d as u32),
        width: raw.width,
        height: raw.height,
        video,
        audio,
    })
}
