//! Resilient Telegram operations
//!
//! Thin wrappers around the three Telegram calls the download pipeline
//! makes, each run under the flat retry policy from
//! [`crate::utils::retry_network_operation`].

use crate::utils::retry_network_operation;
use anyhow::Result;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, InputMedia};
use tracing::{debug, warn};

/// Metadata attached to video uploads and media edits
#[derive(Debug, Clone)]
pub struct VideoInfo {
    /// Caption shown under the video
    pub caption: String,
    /// Frame width, when known
    pub width: Option<u32>,
    /// Frame height, when known
    pub height: Option<u32>,
    /// Duration in seconds
    pub duration: u32,
}

/// Upload a video file to a chat, retrying transient failures.
///
/// # Errors
///
/// Returns the last Telegram error once retries are exhausted.
pub async fn send_video_resilient(
    bot: &Bot,
    chat_id: ChatId,
    path: &Path,
    info: &VideoInfo,
) -> Result<Message> {
    retry_network_operation(|| async {
        let mut req = bot
            .send_video(chat_id, InputFile::file(path.to_path_buf()))
            .caption(info.caption.clone())
            .duration(info.duration)
            .supports_streaming(true);
        if let Some(width) = info.width {
            req = req.width(width);
        }
        if let Some(height) = info.height {
            req = req.height(height);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram upload error: {e}"))
    })
    .await
}

/// Replace the media of an inline message, retrying transient failures.
///
/// # Errors
///
/// Returns the last Telegram error once retries are exhausted.
pub async fn edit_inline_media_resilient(
    bot: &Bot,
    inline_message_id: &str,
    media: InputMedia,
) -> Result<()> {
    retry_network_operation(|| async {
        bot.edit_message_media_inline(inline_message_id, media.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Telegram media edit error: {e}"))
    })
    .await?;
    Ok(())
}

/// Edit the caption of an inline message with graceful degradation.
///
/// Used for status text (rate-limit and no-format notices), where a failed
/// edit should never abort the pipeline. Returns `true` when the caption
/// was updated; "message is not modified" counts as success.
pub async fn edit_inline_caption_resilient(
    bot: &Bot,
    inline_message_id: &str,
    caption: &str,
) -> bool {
    const ERROR_NOT_MODIFIED: &str = "message is not modified";

    let result = retry_network_operation(|| async {
        bot.edit_message_caption_inline(inline_message_id)
            .caption(caption.to_string())
            .await
            .map_err(|e| anyhow::anyhow!("Telegram caption edit error: {e}"))
    })
    .await;

    match result {
        Ok(_) => true,
        Err(e) if e.to_string().contains(ERROR_NOT_MODIFIED) => {
            debug!("Caption update skipped: {e}");
            true
        }
        Err(e) => {
            warn!("Failed to edit caption after retries: {e}");
            false
        }
    }
}
