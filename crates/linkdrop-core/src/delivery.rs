//! Delivery loop: upload a batch in order, pace the uploads, always clean up.

use tokio::time::sleep;

use crate::{
    config::DeliveryConfig,
    domain::{ChatId, Platform},
    formatting::caption_for,
    media::{cleanup, MediaItem, MediaKind},
    messaging::port::MessagingPort,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Upload every item in order. A failed upload is reported to the chat and skipped;
/// it never aborts the rest of the batch.
pub async fn deliver(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    platform: Platform,
    items: &[MediaItem],
    cfg: DeliveryConfig,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for (idx, item) in items.iter().enumerate() {
        if idx > 0 && !cfg.pacing.is_zero() {
            sleep(cfg.pacing).await;
        }

        let caption = caption_for(platform, item);
        let sent = match item.kind {
            MediaKind::Image => messenger.send_photo(chat_id, &item.path, &caption).await,
            MediaKind::Video => {
                let duration = item.duration_secs.map(|d| d.round() as u32);
                messenger
                    .send_video(chat_id, &item.path, &caption, duration)
                    .await
            }
        };

        match sent {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!("error sending {}: {e}", item.path.display());
                let name = item
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| format!("item {}", idx + 1));
                let notice = format!("❌ Failed to send media file: {name}");
                if let Err(e) = messenger.send_text(chat_id, &notice).await {
                    tracing::error!("failed to report delivery failure: {e}");
                }
            }
        }
    }

    report
}

/// [`deliver`] followed by [`cleanup`], which runs regardless of the delivery outcome.
pub async fn deliver_and_cleanup(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    platform: Platform,
    items: Vec<MediaItem>,
    cfg: DeliveryConfig,
) -> DeliveryReport {
    let report = deliver(messenger, chat_id, platform, &items, cfg).await;
    cleanup(&items).await;
    report
}
