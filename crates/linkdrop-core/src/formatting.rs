//! Human-readable text for captions and notices.

use crate::{
    domain::Platform,
    media::{MediaItem, MediaKind},
};

const TITLE_MAX_CHARS: usize = 200;

/// `1.5MB`-style size with one decimal.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / 1024.0 / 1024.0)
}

/// `m:ss` or `h:mm:ss`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        return format!("{hours}:{mins:02}:{secs:02}");
    }
    format!("{mins}:{secs:02}")
}

/// Char-boundary-safe truncation with a trailing ellipsis when shortened.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

/// Escape the three characters Telegram's HTML parse mode treats specially.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn caption_for(platform: Platform, item: &MediaItem) -> String {
    let mut lines = Vec::new();
    match item.kind {
        MediaKind::Image => lines.push(format!("📸 {platform} Image")),
        MediaKind::Video => lines.push(format!("🎥 {platform} Video")),
    }
    if let Some(title) = item.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        lines.push(truncate_chars(title, TITLE_MAX_CHARS));
    }
    lines.push(format!("Size: {}", format_size_mb(item.size_bytes)));
    if item.kind == MediaKind::Video {
        if let Some(d) = item.duration_secs {
            lines.push(format!("Duration: {}", format_duration(d)));
        }
    }
    lines.join("\n")
}
