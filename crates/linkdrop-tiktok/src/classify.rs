//! Maps extraction-backend diagnostics onto the fetch failure taxonomy.

use linkdrop_core::media::{ErrorKind, FetchResult};

use crate::ytdlp::BackendError;

pub const VIDEO_UNAVAILABLE: &str =
    "❌ Video is unavailable. It may have been deleted or is not accessible.";
pub const TIKTOK_FORBIDDEN: &str =
    "❌ Access forbidden. TikTok may be blocking requests. Please try again later.";

const CONNECTION_DIAG_CHARS: usize = 100;
const FAILURE_DIAG_CHARS: usize = 150;

/// First-match-wins substring table over the backend's error text.
pub fn classify_diagnostic(diag: &str) -> FetchResult {
    let lower = diag.to_lowercase();

    if diag.contains("Private video") || diag.contains("This video is not available") {
        return FetchResult::failed(ErrorKind::PrivateAccount);
    }
    if diag.contains("Sign in to confirm your age") || lower.contains("age-restricted") {
        return FetchResult::failed(ErrorKind::PrivateAccount);
    }
    if lower.contains("unavailable") {
        return FetchResult::failed_with(ErrorKind::PrivateAccount, VIDEO_UNAVAILABLE);
    }
    if diag.contains("403") {
        return FetchResult::failed_with(ErrorKind::Forbidden, TIKTOK_FORBIDDEN);
    }
    if diag.contains("429") || lower.contains("rate limit") {
        return FetchResult::failed(ErrorKind::RateLimited);
    }
    if diag.contains("HTTP Error") {
        return FetchResult::failed_with(
            ErrorKind::ConnectionError,
            format!("❌ Connection error: {}", prefix(diag, CONNECTION_DIAG_CHARS)),
        );
    }
    FetchResult::failed_with(
        ErrorKind::DownloadFailed,
        format!("❌ Download failed: {}", prefix(diag, FAILURE_DIAG_CHARS)),
    )
}

/// Extractor-reported failures go through the table; local failures (spawn, parse) do not.
pub fn classify(err: &BackendError) -> FetchResult {
    match err {
        BackendError::Extraction(diag) => classify_diagnostic(diag),
        other => FetchResult::failed_with(
            ErrorKind::DownloadFailed,
            format!("❌ Error: {}", prefix(&other.to_string(), FAILURE_DIAG_CHARS)),
        ),
    }
}

fn prefix(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
