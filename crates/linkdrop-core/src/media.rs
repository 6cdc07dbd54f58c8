//! Fetch outcome model: media items, failure taxonomy, and cleanup.

use std::{
    fmt,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
        }
    }
}

/// One downloaded file waiting to be delivered.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mime_type: String,
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
}

impl MediaItem {
    pub fn new(kind: MediaKind, path: PathBuf, size_bytes: u64) -> Self {
        Self {
            kind,
            path,
            size_bytes,
            mime_type: kind.mime_type().to_string(),
            title: None,
            duration_secs: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_duration(mut self, duration_secs: Option<f64>) -> Self {
        self.duration_secs = duration_secs.filter(|d| *d > 0.0);
        self
    }
}

/// Closed failure taxonomy for the fetch path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidLink,
    DownloadFailed,
    FileTooLarge,
    UnsupportedType,
    RateLimited,
    PrivateAccount,
    ConnectionError,
    Forbidden,
    PlatformUnavailable,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidLink => "invalid_link",
            ErrorKind::DownloadFailed => "download_failed",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::PrivateAccount => "private_account",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::PlatformUnavailable => "platform_unavailable",
        }
    }

    /// Default user-facing text.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::InvalidLink => "❌ Invalid link. Please send a valid post or video URL.",
            ErrorKind::DownloadFailed => {
                "❌ Failed to download media. The post might be private or unavailable."
            }
            ErrorKind::FileTooLarge => "❌ File is too large to send via Telegram (max 50MB).",
            ErrorKind::UnsupportedType => "❌ This type of content is not supported.",
            ErrorKind::RateLimited => "⚠️ Rate limit reached. Please try again later.",
            ErrorKind::PrivateAccount => {
                "❌ Cannot access private content. The post might be private or age-restricted."
            }
            ErrorKind::ConnectionError => {
                "❌ Connection error. Please check your internet and try again."
            }
            ErrorKind::Forbidden => {
                "❌ Access forbidden. This post might be private or require authentication."
            }
            ErrorKind::PlatformUnavailable => {
                "❌ The platform is currently unavailable. Please try again later."
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of one fetch call. Items are non-empty exactly when the fetch succeeded.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchResult {
    message: String,
    items: Vec<MediaItem>,
    reason: Option<ErrorKind>,
}

impl FetchResult {
    /// A successful fetch. An empty item list is recorded as `download_failed`.
    pub fn ok(message: impl Into<String>, items: Vec<MediaItem>) -> Self {
        if items.is_empty() {
            return Self::failed(ErrorKind::DownloadFailed);
        }
        Self {
            message: message.into(),
            items,
            reason: None,
        }
    }

    pub fn failed(kind: ErrorKind) -> Self {
        Self::failed_with(kind, kind.message())
    }

    pub fn failed_with(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            items: Vec::new(),
            reason: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.reason.is_none()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn reason(&self) -> Option<ErrorKind> {
        self.reason
    }

    pub fn into_items(self) -> Vec<MediaItem> {
        self.items
    }
}

static FETCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// File stem for one fetch: `base` plus a token no other fetch in this process shares.
///
/// Two chats fetching the same post at once must not write to, or clean up, each
/// other's files.
pub fn unique_stem(base: &str) -> String {
    let seq = FETCH_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{base}_{}_{seq}", std::process::id())
}

/// Delete every referenced file that still exists. Safe to call repeatedly.
///
/// Returns the number of files actually removed.
pub async fn cleanup(items: &[MediaItem]) -> usize {
    let mut removed = 0;
    for item in items {
        match tokio::fs::remove_file(&item.path).await {
            Ok(()) => {
                removed += 1;
                tracing::info!("cleaned up {}", item.path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!("error cleaning up {}: {e}", item.path.display()),
        }
    }
    removed
}
