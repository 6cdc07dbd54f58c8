use std::sync::Arc;

use teloxide::prelude::*;

use linkdrop_core::{domain::ChatId, pipeline::LinkOutcome};

use crate::router::AppState;

pub async fn handle_text(msg: &Message, text: &str, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let outcomes = state.pipeline.handle_text(chat_id, text).await;
    if outcomes.is_empty() {
        return Ok(());
    }

    let delivered = outcomes
        .iter()
        .filter(|o| matches!(o, LinkOutcome::Delivered(_)))
        .count();
    tracing::info!(
        "chat {}: {delivered}/{} link(s) delivered",
        chat_id.0,
        outcomes.len()
    );
    Ok(())
}
