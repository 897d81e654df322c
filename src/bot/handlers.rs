//! Inline query and command handlers
//!
//! The per-request pipeline: answer the inline query with a placeholder
//! clip right away, then once the user picks the result run
//! rate-check → probe → select → download → upload → swap the placeholder
//! for the uploaded video. Every failure is terminal for the request and
//! degrades the inline message to a thumbnail photo or the configured
//! error video; rate-limit denials get a distinct "please wait" caption
//! instead.

use crate::bot::resilient::{
    edit_inline_caption_resilient, edit_inline_media_resilient, send_video_resilient, VideoInfo,
};
use crate::bot::throttle::DownloadThrottle;
use crate::config::{Settings, PAGE_TITLE_TIMEOUT_SECS};
use crate::extractor::{
    download_with_retry, probe_with_retry, select, ExtractError, FormatCandidate, FormatSelection,
    MediaExtractor, MediaProbe,
};
use crate::utils::{bytes_to_mb, extract_youtube_video_id, page_title, parse_supported_url};
use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{
    ChosenInlineResult, InlineKeyboardButton, InlineKeyboardMarkup, InlineQuery,
    InlineQueryResult, InlineQueryResultVideo, InputFile, InputMedia, InputMediaPhoto,
    InputMediaVideo, ParseMode, Seconds,
};
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

/// Bot commands
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Usage hint
    #[command(description = "show how to use the bot.")]
    Start,
}

/// Why a download request ended without delivering a video
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Requester is still inside their rate limit window
    #[error("rate limit exceeded for user {0}")]
    RateLimited(u64),
    /// No video candidate at all, or none worth downloading
    #[error("no suitable video format found under {0} MB")]
    NoVideoFormat(u64),
    /// No audio candidate at all
    #[error("no suitable audio format found under {0} MB")]
    NoAudioFormat(u64),
    /// Selected pair would exceed the upload ceiling
    #[error("combined filesize {total_mb} MB exceeds the {limit_mb} MB upload limit")]
    TooLarge {
        /// Combined size of the selected pair, MB
        total_mb: u64,
        /// Upload ceiling, MB
        limit_mb: u64,
    },
    /// Extraction or download failure after retries
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// Upload or inline edit failure after retries
    #[error("telegram delivery failed: {0}")]
    Delivery(String),
}

/// Reply to `/start` with a short usage hint
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    if let Some(user) = msg.from.as_ref() {
        let mention = teloxide::utils::html::user_mention(user.id, &user.first_name);
        bot.send_message(
            msg.chat.id,
            format!("Hi {mention}! Paste a YouTube link using an inline query!"),
        )
        .parse_mode(ParseMode::Html)
        .await?;
    }
    Ok(())
}

/// Answer an inline query with the placeholder result.
///
/// Rate-limited users and unsupported queries get no answer at all, which
/// saves both API quota and a pointless placeholder.
pub async fn handle_inline_query(
    bot: Bot,
    query: InlineQuery,
    settings: Arc<Settings>,
    throttle: Arc<DownloadThrottle>,
) -> Result<()> {
    let user_id = query.from.id.0;

    if !throttle.allow(user_id, Utc::now()).await {
        info!(user_id, "Inline query ignored: rate limit window open");
        return Ok(());
    }

    if query.query.is_empty() {
        return Ok(());
    }
    let Some(url) = parse_supported_url(&query.query) else {
        return Ok(());
    };

    let placeholder = placeholder_result(&settings, url.as_str())?;
    bot.answer_inline_query(query.id, vec![InlineQueryResult::Video(placeholder)])
        .await?;
    Ok(())
}

fn placeholder_result(settings: &Settings, url: &str) -> Result<InlineQueryResultVideo> {
    let video_url = Url::parse(&settings.ph_loading_video_url)?;
    let thumbnail_url = Url::parse(&settings.ph_thumbnail_url)?;
    let mime_type: mime::Mime = "video/mp4".parse()?;

    let mut result = InlineQueryResultVideo::new(
        Uuid::new_v4().to_string(),
        video_url,
        mime_type,
        thumbnail_url,
        "Downloading...".to_string(),
    );
    result.caption = Some(format!(
        "Please wait while the video is being processed. URL: {url}"
    ));
    result.video_width = Some(settings.ph_video_width);
    result.video_height = Some(settings.ph_video_height);
    result.video_duration = Some(Seconds::from_seconds(settings.ph_video_duration));
    result.reply_markup = Some(InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
        "Please wait...",
        Uuid::new_v4().to_string(),
    )]]));
    Ok(result)
}

/// Run the download pipeline for a chosen inline result
pub async fn handle_chosen_result(
    bot: Bot,
    chosen: ChosenInlineResult,
    settings: Arc<Settings>,
    throttle: Arc<DownloadThrottle>,
    extractor: Arc<dyn MediaExtractor>,
) -> Result<()> {
    let Some(inline_message_id) = chosen.inline_message_id else {
        // Without an inline message id there is nothing to edit later
        return Ok(());
    };
    let Some(url) = parse_supported_url(&chosen.query) else {
        return Ok(());
    };
    let user_id = chosen.from.id.0;
    info!(user_id, %url, "Inline result chosen, starting download");

    if let Err(err) = run_download(
        &bot,
        &settings,
        &throttle,
        extractor.as_ref(),
        &url,
        &inline_message_id,
        user_id,
    )
    .await
    {
        error!(user_id, %url, "Download request failed: {err}");
        // Rate-limit denials already carry their own caption
        if !matches!(err, DownloadError::RateLimited(_)) {
            report_failure(&bot, &settings, &url, &inline_message_id).await;
        }
    }
    Ok(())
}

/// Everything needed to fetch and deliver one selected pair
struct PreparedDownload {
    selection: FormatSelection,
    info: VideoInfo,
    output: PathBuf,
}

async fn run_download(
    bot: &Bot,
    settings: &Settings,
    throttle: &DownloadThrottle,
    extractor: &dyn MediaExtractor,
    url: &Url,
    inline_message_id: &str,
    user_id: u64,
) -> Result<(), DownloadError> {
    if !throttle.allow(user_id, Utc::now()).await {
        let minutes = throttle.window_minutes();
        edit_inline_caption_resilient(
            bot,
            inline_message_id,
            &format!(
                "Rate limit exceeded. Please wait {minutes} minute(s) before requesting another download."
            ),
        )
        .await;
        return Err(DownloadError::RateLimited(user_id));
    }

    let probe = probe_with_retry(extractor, url).await?;
    let (video, audio) = choose_formats(bot, settings, inline_message_id, &probe).await?;

    let total = video.filesize.unwrap_or(0) + audio.filesize.unwrap_or(0);
    if total > settings.max_tg_file_size {
        return Err(DownloadError::TooLarge {
            total_mb: bytes_to_mb(total),
            limit_mb: bytes_to_mb(settings.max_tg_file_size),
        });
    }

    let prepared = PreparedDownload {
        selection: FormatSelection {
            video_id: video.id.clone(),
            audio_id: audio.id.clone(),
        },
        info: VideoInfo {
            caption: format!("{} {}", probe.title, url),
            width: video.width.or(probe.width),
            height: video.height.or(probe.height),
            duration: probe.duration,
        },
        output: std::env::temp_dir().join(format!("download_{}.mp4", Uuid::new_v4().simple())),
    };

    let delivered = fetch_and_deliver(bot, settings, extractor, url, inline_message_id, &prepared).await;
    remove_output(&prepared.output).await;
    delivered?;

    throttle.record(user_id, Utc::now()).await;
    Ok(())
}

/// Pick the video/audio pair, reporting "no format" conditions as captions
async fn choose_formats<'a>(
    bot: &Bot,
    settings: &Settings,
    inline_message_id: &str,
    probe: &'a MediaProbe,
) -> Result<(&'a FormatCandidate, &'a FormatCandidate), DownloadError> {
    let Some(video) = select::best_video(&probe.video, settings.max_video_size) else {
        let limit_mb = bytes_to_mb(settings.max_video_size);
        edit_inline_caption_resilient(
            bot,
            inline_message_id,
            &format!("No suitable video format found under {limit_mb} MB."),
        )
        .await;
        return Err(DownloadError::NoVideoFormat(limit_mb));
    };

    let preferred_languages = settings.preferred_audio_languages();
    let Some(audio) = select::best_audio(&probe.audio, settings.max_audio_size, &preferred_languages)
    else {
        let limit_mb = bytes_to_mb(settings.max_audio_size);
        edit_inline_caption_resilient(
            bot,
            inline_message_id,
            &format!("No suitable audio format found under {limit_mb} MB."),
        )
        .await;
        return Err(DownloadError::NoAudioFormat(limit_mb));
    };

    Ok((video, audio))
}

/// Download the pair, upload it to the media chat and swap the placeholder
async fn fetch_and_deliver(
    bot: &Bot,
    settings: &Settings,
    extractor: &dyn MediaExtractor,
    url: &Url,
    inline_message_id: &str,
    prepared: &PreparedDownload,
) -> Result<(), DownloadError> {
    download_with_retry(extractor, url, &prepared.selection, &prepared.output).await?;

    let message = send_video_resilient(
        bot,
        ChatId(settings.media_chat_id),
        &prepared.output,
        &prepared.info,
    )
    .await
    .map_err(|e| DownloadError::Delivery(e.to_string()))?;

    let Some(video) = message.video() else {
        return Err(DownloadError::Delivery(
            "uploaded message carries no video".to_string(),
        ));
    };
    info!(file_id = %video.file.id, "Video uploaded, swapping the placeholder");

    let media = InputMedia::Video(input_media_video(
        InputFile::file_id(video.file.id.clone()),
        &prepared.info,
    ));
    edit_inline_media_resilient(bot, inline_message_id, media)
        .await
        .map_err(|e| DownloadError::Delivery(e.to_string()))
}

fn input_media_video(file: InputFile, info: &VideoInfo) -> InputMediaVideo {
    let mut media = InputMediaVideo::new(file)
        .caption(info.caption.clone())
        .duration(info.duration as u16)
        .supports_streaming(true);
    if let Some(width) = info.width {
        media = media.width(width as u16);
    }
    if let Some(height) = info.height {
        media = media.height(height as u16);
    }
    media
}

async fn remove_output(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove download artifact: {e}");
        }
    }
}

/// Degrade the inline message after a failed request.
///
/// Best effort: fetch the page title for a readable caption, show the
/// YouTube thumbnail when the video id is recoverable, and fall back to
/// the configured error video otherwise.
async fn report_failure(bot: &Bot, settings: &Settings, url: &Url, inline_message_id: &str) {
    let video_name = fetch_page_title(url)
        .await
        .unwrap_or_else(|| "Failed to download video.".to_string());
    let caption = format!("{video_name}\n{url}");

    if let Some(video_id) = extract_youtube_video_id(url.as_str()) {
        let thumbnail = format!("https://img.youtube.com/vi/{video_id}/0.jpg");
        if let Ok(thumbnail_url) = Url::parse(&thumbnail) {
            let media = InputMedia::Photo(
                InputMediaPhoto::new(InputFile::url(thumbnail_url)).caption(caption.clone()),
            );
            if edit_inline_media_resilient(bot, inline_message_id, media)
                .await
                .is_ok()
            {
                return;
            }
            warn!(%url, "Thumbnail fallback failed, showing the error video");
        }
    }

    let Ok(err_url) = Url::parse(&settings.err_loading_video_url) else {
        error!(
            url = %settings.err_loading_video_url,
            "Configured error video URL does not parse"
        );
        return;
    };
    let media = InputMedia::Video(
        InputMediaVideo::new(InputFile::url(err_url))
            .caption(caption)
            .width(settings.err_video_width as u16)
            .height(settings.err_video_height as u16)
            .duration(settings.err_video_duration as u16)
            .supports_streaming(false),
    );
    if let Err(e) = edit_inline_media_resilient(bot, inline_message_id, media).await {
        error!("Failed to show the error video: {e}");
    }
}

async fn fetch_page_title(url: &Url) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(PAGE_TITLE_TIMEOUT_SECS))
        .build()
        .ok()?;
    let body = client.get(url.clone()).send().await.ok()?.text().await.ok()?;
    page_title(&body)
}
