//! Telegram adapter (teloxide).
//!
//! This crate implements the `linkdrop-core` MessagingPort over the Telegram Bot API and
//! routes incoming updates to the link pipeline.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{prelude::*, types::InputFile};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use linkdrop_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    /// Run `op`, retrying once when Telegram asks us to back off.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::warn!("telegram asked to retry after {d:?}");
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
        })
        .await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: ChatId, path: &Path, caption: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_photo(Self::tg_chat(chat_id), InputFile::file(path.to_path_buf()))
                .caption(caption.to_string())
        })
        .await?;
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
        duration_secs: Option<u32>,
    ) -> Result<()> {
        self.with_retry(|| {
            let mut req = self
                .bot
                .send_video(Self::tg_chat(chat_id), InputFile::file(path.to_path_buf()))
                .caption(caption.to_string())
                .supports_streaming(true);
            if let Some(d) = duration_secs {
                req = req.duration(d);
            }
            req
        })
        .await?;
        Ok(())
    }
}
