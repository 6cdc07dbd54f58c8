use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Outbound chat port used by the pipeline and the delivery loop.
///
/// All text is plain (no parse mode); captions are built by [`crate::formatting`].
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;

    async fn send_photo(&self, chat_id: ChatId, path: &Path, caption: &str) -> Result<()>;
    async fn send_video(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
        duration_secs: Option<u32>,
    ) -> Result<()>;
}
