//! Per-message driver: extract links, then fetch → deliver → clean up each one in turn.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::DeliveryConfig,
    delivery::{deliver_and_cleanup, DeliveryReport},
    domain::{ChatId, MessageRef, Platform},
    fetch::MediaFetcher,
    links::{extract_links, Link},
    media::ErrorKind,
    messaging::port::MessagingPort,
};

pub const GENERIC_FAILURE: &str =
    "❌ An error occurred while processing the link. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    Delivered(DeliveryReport),
    Failed(ErrorKind),
    /// The fetch task died unexpectedly; the chat got a generic notice.
    Crashed,
    /// No fetcher is registered for the link's platform.
    Skipped,
}

#[derive(Clone)]
pub struct LinkPipeline {
    messenger: Arc<dyn MessagingPort>,
    fetchers: HashMap<Platform, Arc<dyn MediaFetcher>>,
    delivery: DeliveryConfig,
}

impl LinkPipeline {
    pub fn new(messenger: Arc<dyn MessagingPort>, delivery: DeliveryConfig) -> Self {
        Self {
            messenger,
            fetchers: HashMap::new(),
            delivery,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetchers.insert(fetcher.platform(), fetcher);
        self
    }

    /// Process every supported link in `text`, strictly one after another.
    pub async fn handle_text(&self, chat_id: ChatId, text: &str) -> Vec<LinkOutcome> {
        let mut outcomes = Vec::new();
        for link in extract_links(text) {
            outcomes.push(self.process_link(chat_id, &link).await);
        }
        outcomes
    }

    /// One full fetch → deliver → cleanup cycle. Never fails: every error ends as a chat notice.
    pub async fn process_link(&self, chat_id: ChatId, link: &Link) -> LinkOutcome {
        let Some(fetcher) = self.fetchers.get(&link.platform).cloned() else {
            tracing::debug!("no fetcher registered for {}", link.platform);
            return LinkOutcome::Skipped;
        };

        tracing::info!("processing {} link {}", link.platform, link.url);
        let notice = format!("🔄 Processing {} link...\n{}", link.platform, link.url);
        let progress = match self.messenger.send_text(chat_id, &notice).await {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!("failed to send progress notice: {e}");
                None
            }
        };

        // A panic inside the fetcher surfaces here as a JoinError instead of unwinding the handler.
        let url = link.url.clone();
        let result = match tokio::spawn(async move { fetcher.fetch(&url).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("fetch task for {} failed: {e}", link.url);
                self.report(chat_id, progress, GENERIC_FAILURE).await;
                return LinkOutcome::Crashed;
            }
        };

        if let Some(kind) = result.reason() {
            tracing::warn!("{} fetch failed ({kind}): {}", link.platform, result.message());
            self.report(chat_id, progress, result.message()).await;
            return LinkOutcome::Failed(kind);
        }

        self.report(chat_id, progress, result.message()).await;
        let report = deliver_and_cleanup(
            self.messenger.as_ref(),
            chat_id,
            link.platform,
            result.into_items(),
            self.delivery,
        )
        .await;
        LinkOutcome::Delivered(report)
    }

    /// Replace the progress notice, falling back to a fresh message.
    async fn report(&self, chat_id: ChatId, progress: Option<MessageRef>, text: &str) {
        if let Some(msg) = progress {
            match self.messenger.edit_text(msg, text).await {
                Ok(()) => return,
                Err(e) => tracing::warn!("failed to edit progress notice: {e}"),
            }
        }
        if let Err(e) = self.messenger.send_text(chat_id, text).await {
            tracing::error!("failed to send notice: {e}");
        }
    }
}
