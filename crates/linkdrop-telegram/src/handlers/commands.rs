use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use teloxide::{prelude::*, types::ParseMode};

use linkdrop_core::formatting::{escape_html, format_size_mb};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn format_remaining(d: Duration) -> String {
    let seconds = d.as_secs();
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

fn start_text() -> String {
    "🤖 <b>Link Download Bot</b>\n\n\
I can download media from Instagram posts and reels, and from TikTok videos!\n\n\
<b>How to use:</b>\n\
1. Paste an Instagram or TikTok link in the chat\n\
2. I'll detect it and download the media\n\
3. The media is sent back to you\n\n\
<b>Supported content:</b>\n\
• Single images\n\
• Single videos\n\
• Carousel posts (multiple images/videos)\n\
• TikTok videos\n\n\
<b>Commands:</b>\n\
/help - Show usage and limitations\n\
/status - Check bot status\n\n\
<b>Note:</b> I work in both private chats and groups!"
        .to_string()
}

fn help_text() -> String {
    "📖 <b>Help &amp; Instructions</b>\n\n\
<b>Basic usage:</b>\n\
• Paste any Instagram post/reel link or TikTok video link\n\
• I'll download and send the media back\n\n\
<b>What I can download:</b>\n\
✅ Public Instagram posts and reels\n\
✅ Carousel posts (every item, in order)\n\
✅ Public TikTok videos\n\n\
<b>Limitations:</b>\n\
❌ Private accounts (unless I'm logged in)\n\
❌ Stories (not supported)\n\
❌ Files larger than 50MB\n\
❌ Rate limits imposed by the platforms\n\n\
<b>Troubleshooting:</b>\n\
• Make sure the link is from a public post\n\
• Try again later if you get rate-limited\n\n\
<b>Example links:</b>\n\
• https://www.instagram.com/p/ABC123/\n\
• https://instagram.com/reel/XYZ789/\n\
• https://www.tiktok.com/@user/video/1234567890"
        .to_string()
}

/// Everything `/status` reports, captured at request time.
#[derive(Clone, Debug)]
struct StatusView {
    instagram_logged_in: bool,
    instagram_cooldown: Option<Duration>,
    tiktok_cooldown: Option<Duration>,
    download_dir: String,
    max_file_size: u64,
    started_at: DateTime<Utc>,
}

impl StatusView {
    fn capture(state: &AppState) -> Self {
        Self {
            instagram_logged_in: state.instagram.is_logged_in(),
            instagram_cooldown: state.instagram.rate().status().cooldown_remaining,
            tiktok_cooldown: state.tiktok_rate.status().cooldown_remaining,
            download_dir: state.cfg.download_dir.display().to_string(),
            max_file_size: state.cfg.max_file_size,
            started_at: state.started_at,
        }
    }
}

fn cooldown_line(label: &str, remaining: Option<Duration>) -> String {
    match remaining {
        Some(d) => format!("<b>{label} cooldown:</b> ⏳ {} remaining", format_remaining(d)),
        None => format!("<b>{label} cooldown:</b> none"),
    }
}

fn status_text(view: &StatusView, now: DateTime<Utc>) -> String {
    let login = if view.instagram_logged_in {
        "✅ Logged in"
    } else {
        "❌ Not logged in"
    };
    let uptime = now
        .signed_duration_since(view.started_at)
        .to_std()
        .unwrap_or_default();

    let mut lines = vec![
        "📊 <b>Bot Status</b>".to_string(),
        String::new(),
        "<b>Status:</b> ✅ Online".to_string(),
        format!("<b>Uptime:</b> {}", format_remaining(uptime)),
        format!("<b>Instagram login:</b> {login}"),
        cooldown_line("Instagram", view.instagram_cooldown),
        cooldown_line("TikTok", view.tiktok_cooldown),
        format!(
            "<b>Download path:</b> <code>{}</code>",
            escape_html(&view.download_dir)
        ),
        format!(
            "<b>Max file size:</b> {}",
            format_size_mb(view.max_file_size)
        ),
    ];
    if view.instagram_cooldown.is_none() && view.tiktok_cooldown.is_none() {
        lines.push(String::new());
        lines.push("All systems operational".to_string());
    }
    lines.join("\n")
}

async fn reply_html(bot: &Bot, msg: &Message, html: String) -> ResponseResult<()> {
    if let Err(e) = bot
        .send_message(msg.chat.id, html)
        .parse_mode(ParseMode::Html)
        .disable_web_page_preview(true)
        .await
    {
        tracing::error!("failed to answer command in chat {}: {e}", msg.chat.id.0);
    }
    Ok(())
}

pub async fn handle_command(bot: Bot, msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let (cmd, _arg) = parse_command(text);
    match cmd.as_str() {
        "start" => reply_html(&bot, msg, start_text()).await,
        "help" => reply_html(&bot, msg, help_text()).await,
        "status" => {
            let view = StatusView::capture(&state);
            reply_html(&bot, msg, status_text(&view, Utc::now())).await
        }
        other => {
            tracing::debug!("ignoring unknown command /{other}");
            Ok(())
        }
    }
}
