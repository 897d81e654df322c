//! URL parsing, retry helper and small text utilities.
//!
//! Regex patterns use the `lazy-regex` crate: compile-time validated,
//! lazily initialised statics.

use anyhow::Result;
use lazy_regex::lazy_regex;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::warn;
use url::Url;

use crate::config::{NETWORK_MAX_RETRIES, NETWORK_RETRY_DELAY_MS};

/// 11-character YouTube video id after `v=` or a path separator
static RE_VIDEO_ID: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?:v=|/)([0-9A-Za-z_-]{11})");

/// `<title>` tag contents, case-insensitive, spanning newlines
static RE_TITLE_TAG: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?is)<title[^>]*>(.*?)</title>");

/// Hosts whose `/watch`, `/shorts/` and `/embed/` paths we accept
const WATCH_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com"];

/// Parse an inline query as a supported YouTube URL.
///
/// Returns the parsed URL for `youtu.be/<id>` short links and for
/// watch/shorts/embed paths on the YouTube hosts; anything else is `None`
/// and the query is ignored.
#[must_use]
pub fn parse_supported_url(query: &str) -> Option<Url> {
    let url = Url::parse(query.trim()).ok()?;
    if url.scheme() != "https" {
        return None;
    }

    let host = url.host_str()?;
    if host == "youtu.be" {
        let id = url.path().trim_start_matches('/');
        return (!id.is_empty()).then_some(url);
    }

    if WATCH_HOSTS.contains(&host) {
        let path = url.path();
        if path == "/watch"
            || path.starts_with("/watch/")
            || path.starts_with("/shorts/")
            || path.starts_with("/embed/")
        {
            return Some(url);
        }
    }

    None
}

/// Extract the YouTube video id from the URL shapes the site uses.
///
/// Handles `?v=`, `youtu.be/<id>`, `/embed/<id>`, `/shorts/<id>`,
/// `/watch/<id>`, and falls back to scanning for an 11-character id.
#[must_use]
pub fn extract_youtube_video_id(url: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(url) {
        if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
            return Some(id.into_owned());
        }

        let path = parsed.path();
        if parsed.host_str() == Some("youtu.be") {
            let id = path.trim_start_matches('/').split('/').next()?;
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }

        for prefix in ["/embed/", "/shorts/", "/watch/"] {
            if let Some(rest) = path.strip_prefix(prefix) {
                let id = rest.split('/').next()?;
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }
    }

    RE_VIDEO_ID
        .captures(url)
        .map(|caps| caps[1].to_string())
}

/// Pull the `<title>` text out of an HTML page, if any
#[must_use]
pub fn page_title(html: &str) -> Option<String> {
    RE_TITLE_TAG
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Bytes to whole mebibytes, for user-facing captions
#[must_use]
pub const fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}

/// Retry a network operation a fixed number of times with a fixed pause.
///
/// Every failure is treated the same: no backoff growth, no jitter, no
/// per-error policy. After `NETWORK_MAX_RETRIES` extra attempts the last
/// error propagates to the caller.
///
/// # Errors
///
/// Returns the last error once all attempts are exhausted.
pub async fn retry_network_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let strategy = FixedInterval::new(Duration::from_millis(NETWORK_RETRY_DELAY_MS))
        .take(NETWORK_MAX_RETRIES);

    Retry::spawn(strategy, operation).await.map_err(|e| {
        warn!(
            "Network operation failed after {} attempts: {}",
            NETWORK_MAX_RETRIES + 1,
            e
        );
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn supported_urls_accepted() {
        for query in [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "  https://youtu.be/dQw4w9WgXcQ  ",
        ] {
            assert!(parse_supported_url(query).is_some(), "rejected: {query}");
        }
    }

    #[test]
    fn unsupported_urls_rejected() {
        for query in [
            "",
            "not a url",
            "http://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/",
            "https://vimeo.com/12345",
            "https://www.youtube.com/feed/subscriptions",
            "https://evil.example/watch?v=dQw4w9WgXcQ",
        ] {
            assert!(parse_supported_url(query).is_none(), "accepted: {query}");
        }
    }

    #[test]
    fn video_id_extraction_covers_url_shapes() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ?t=42", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/embed/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtube.com/shorts/dQw4w9WgXcQ/extra", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/watch/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            // regex fallback for shapes the parser misses
            ("youtube.com/watch?list=x&v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
        ];
        for (url, expected) in cases {
            assert_eq!(
                extract_youtube_video_id(url).as_deref(),
                Some(expected),
                "failed on {url}"
            );
        }

        assert_eq!(extract_youtube_video_id("https://example.com/"), None);
    }

    #[test]
    fn title_tag_scraping() {
        let html = "<html><head>\n<title  lang=\"en\">\n  Some Video \n</title></head></html>";
        assert_eq!(page_title(html).as_deref(), Some("Some Video"));

        assert_eq!(page_title("<html><title></title></html>"), None);
        assert_eq!(page_title("no title here"), None);
    }

    #[test]
    fn mb_conversion_truncates() {
        assert_eq!(bytes_to_mb(15 * 1024 * 1024), 15);
        assert_eq!(bytes_to_mb(15 * 1024 * 1024 - 1), 14);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32> = retry_network_operation(|| async {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                Err(anyhow::anyhow!("transient"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_exhausts_and_propagates_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32> = retry_network_operation(|| async {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("failure {attempt}"))
        })
        .await;

        let err = result.expect_err("all attempts fail");
        assert_eq!(err.to_string(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), NETWORK_MAX_RETRIES + 1);
    }
}
