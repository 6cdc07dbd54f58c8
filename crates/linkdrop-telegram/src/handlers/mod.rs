//! Telegram update handlers.
//!
//! Commands get canned replies; every other text message goes to the link pipeline.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod commands;
mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Captions carry links too (a forwarded post with a preview image, for instance).
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };

    if msg.text().is_some() && text.starts_with('/') {
        return commands::handle_command(bot, &msg, state).await;
    }

    text::handle_text(&msg, text, state).await
}
