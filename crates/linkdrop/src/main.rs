use std::sync::Arc;
use std::time::Duration;

use teloxide::Bot;
use tokio_util::sync::CancellationToken;

use linkdrop_core::{
    config::Config, download::HttpDownloader, pipeline::LinkPipeline, rate::RateGovernor,
};
use linkdrop_instagram::{web::WebClient, InstagramFetcher};
use linkdrop_telegram::{
    router::{self, AppState},
    TelegramMessenger,
};
use linkdrop_tiktok::{ytdlp::YtDlp, TikTokFetcher};

mod health;

const RESTART_DELAY: Duration = Duration::from_secs(5);

fn build_state(cfg: Arc<Config>, bot: Bot) -> anyhow::Result<AppState> {
    let messenger = Arc::new(TelegramMessenger::new(bot));
    let downloader = Arc::new(HttpDownloader::new()?);

    let instagram_rate = Arc::new(RateGovernor::new(cfg.instagram_rate));
    let instagram = Arc::new(InstagramFetcher::new(
        cfg.instagram(),
        Arc::new(WebClient::new()?),
        downloader,
        instagram_rate,
    ));

    let tiktok_rate = Arc::new(RateGovernor::new(cfg.tiktok_rate));
    let tiktok = Arc::new(TikTokFetcher::new(
        cfg.tiktok(),
        Arc::new(YtDlp::new(cfg.ytdlp_path.clone())),
        tiktok_rate.clone(),
    ));

    let pipeline = LinkPipeline::new(messenger, cfg.delivery)
        .with_fetcher(instagram.clone())
        .with_fetcher(tiktok);

    Ok(AppState {
        cfg,
        pipeline,
        instagram,
        tiktok_rate,
        started_at: chrono::Utc::now(),
    })
}

/// Poll until Ctrl-C. A stopped or failed dispatcher is restarted when configured to.
async fn supervise(bot: Bot, state: Arc<AppState>, restart_on_stop: bool) {
    loop {
        tokio::select! {
            res = router::run_polling(bot.clone(), state.clone()) => {
                match res {
                    Ok(()) => tracing::warn!("polling stopped"),
                    Err(e) => tracing::error!("polling failed: {e:#}"),
                }
                if !restart_on_stop {
                    return;
                }
                tracing::info!("restarting in {}s", RESTART_DELAY.as_secs());
                tokio::select! {
                    _ = tokio::time::sleep(RESTART_DELAY) => {}
                    _ = tokio::signal::ctrl_c() => return,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    linkdrop_core::logging::init("linkdrop")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        "instagram login: {}",
        if cfg.instagram().can_login() {
            "available"
        } else {
            "anonymous only"
        }
    );
    tracing::info!("extraction backend: {}", cfg.ytdlp_path.display());

    let shutdown = CancellationToken::new();
    let health = tokio::spawn(health::serve(cfg.health_port, shutdown.clone()));

    let bot = Bot::new(cfg.bot_token.clone());
    let state = Arc::new(build_state(cfg.clone(), bot.clone())?);

    supervise(bot, state, cfg.restart_on_stop).await;

    shutdown.cancel();
    match health.await {
        Ok(Err(e)) => tracing::error!("health endpoint failed: {e:#}"),
        Err(e) => tracing::error!("health task panicked: {e}"),
        Ok(Ok(())) => {}
    }
    Ok(())
}
