use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use linkdrop_core::{config::Config, pipeline::LinkPipeline, rate::RateGovernor};
use linkdrop_instagram::InstagramFetcher;

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub pipeline: LinkPipeline,
    pub instagram: Arc<InstagramFetcher>,
    pub tiktok_rate: Arc<RateGovernor>,
    pub started_at: DateTime<Utc>,
}

/// Long-poll until the dispatcher stops. Callers decide whether to restart.
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    let me = bot.get_me().await?;
    tracing::info!("linkdrop started: @{}", me.username());
    tracing::info!(
        "download directory: {}",
        state.cfg.download_dir.display()
    );

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .build()
        .dispatch()
        .await;

    tracing::warn!("dispatcher stopped");
    Ok(())
}
