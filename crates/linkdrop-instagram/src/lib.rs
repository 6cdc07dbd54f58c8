//! Instagram fetcher.
//!
//! Resolves a post by shortcode through [`api::InstagramApi`], logs in lazily when the
//! anonymous request is refused, and downloads every media slot under the size ceiling.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use url::Url;

use linkdrop_core::{
    config::{InstagramConfig, LoginPolicy},
    domain::Platform,
    download::{DownloadOutcome, MediaDownloader},
    fetch::MediaFetcher,
    media::{unique_stem, ErrorKind, FetchResult, MediaItem, MediaKind},
    rate::RateGovernor,
};

pub mod api;
pub mod web;

use api::{ApiError, InstagramApi, Layout, Post, PostNode};

/// Host + `/p/` or `/reel/` path check.
pub fn is_valid_instagram_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    if !matches!(
        parsed.host_str(),
        Some("www.instagram.com") | Some("instagram.com")
    ) {
        return false;
    }
    let path = parsed.path();
    path.contains("/p/") || path.contains("/reel/")
}

/// The token after `/p/` or `/reel/`.
pub fn extract_shortcode(url: &str) -> Option<String> {
    if !is_valid_instagram_url(url) {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.collect();
    segments
        .windows(2)
        .find(|w| matches!(w[0], "p" | "reel") && !w[1].is_empty())
        .map(|w| w[1].to_string())
}

pub struct InstagramFetcher {
    cfg: InstagramConfig,
    api: Arc<dyn InstagramApi>,
    downloader: Arc<dyn MediaDownloader>,
    rate: Arc<RateGovernor>,
    login_lock: Mutex<()>,
}

impl InstagramFetcher {
    pub fn new(
        cfg: InstagramConfig,
        api: Arc<dyn InstagramApi>,
        downloader: Arc<dyn MediaDownloader>,
        rate: Arc<RateGovernor>,
    ) -> Self {
        Self {
            cfg,
            api,
            downloader,
            rate,
            login_lock: Mutex::new(()),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.api.is_logged_in()
    }

    pub fn rate(&self) -> &RateGovernor {
        &self.rate
    }

    pub async fn fetch_post(&self, url: &str) -> FetchResult {
        let Some(shortcode) = extract_shortcode(url) else {
            return FetchResult::failed(ErrorKind::InvalidLink);
        };

        let post = match self.resolve(&shortcode).await {
            Ok(post) => post,
            Err(e) => return self.fail(&shortcode, e).await,
        };

        let items = self.download_post(&post).await;
        if items.is_empty() {
            return FetchResult::failed(ErrorKind::DownloadFailed);
        }
        let message = format!("✅ Successfully downloaded {} media file(s)", items.len());
        FetchResult::ok(message, items)
    }

    async fn fail(&self, shortcode: &str, e: ApiError) -> FetchResult {
        if e == ApiError::RateLimited {
            self.rate.trigger_default_cooldown();
        }
        tracing::error!("instagram post {shortcode} failed: {e}");
        FetchResult::failed(e.kind())
    }

    /// Resolve with at most one login-and-retry, each attempt gated by the rate governor.
    async fn resolve(&self, shortcode: &str) -> Result<Post, ApiError> {
        self.rate.acquire().await;

        if self.cfg.login_policy == LoginPolicy::Always && self.cfg.can_login() {
            match self.ensure_login().await {
                Ok(true) => self.rate.acquire().await,
                Ok(false) => {}
                Err(ApiError::RateLimited) => return Err(ApiError::RateLimited),
                Err(e) => tracing::warn!("instagram login failed, continuing anonymously: {e}"),
            }
        }

        let first = match self.api.resolve_post(shortcode).await {
            Ok(post) => return Ok(post),
            Err(e) => e,
        };

        if !first.is_auth_related() || !self.cfg.can_login() {
            return Err(first);
        }

        tracing::info!("instagram refused {shortcode} ({first}); logging in and retrying once");
        match self.ensure_login().await {
            Ok(_) => {}
            Err(ApiError::RateLimited) => return Err(ApiError::RateLimited),
            Err(e) => {
                tracing::warn!("instagram login failed: {e}");
                return Err(first);
            }
        }

        self.rate.acquire().await;
        self.api.resolve_post(shortcode).await
    }

    /// Log in unless a session already exists. Returns whether a login request was made.
    async fn ensure_login(&self) -> Result<bool, ApiError> {
        let _guard = self.login_lock.lock().await;
        if self.api.is_logged_in() {
            return Ok(false);
        }
        let Some(creds) = self.cfg.credentials.as_ref() else {
            return Err(ApiError::LoginFailed("no credentials configured".to_string()));
        };
        self.api.login(&creds.username, &creds.password).await?;
        tracing::info!("logged into instagram as {}", creds.username);
        Ok(true)
    }

    async fn download_post(&self, post: &Post) -> Vec<MediaItem> {
        let stem = unique_stem(&post.shortcode);
        match post.layout() {
            Layout::Video(node) => self
                .download_node(node, MediaKind::Video, &stem)
                .await
                .into_iter()
                .collect(),
            Layout::Image(node) => self
                .download_node(node, MediaKind::Image, &stem)
                .await
                .into_iter()
                .collect(),
            Layout::Carousel(nodes) => {
                let mut items = Vec::new();
                for (idx, node) in nodes.iter().enumerate() {
                    let kind = if node.is_video {
                        MediaKind::Video
                    } else {
                        MediaKind::Image
                    };
                    let name = format!("{stem}_{idx}");
                    if let Some(item) = self.download_node(node, kind, &name).await {
                        items.push(item);
                    }
                }
                items
            }
        }
    }

    /// Download one slot; any problem drops the slot rather than failing the post.
    async fn download_node(&self, node: &PostNode, kind: MediaKind, name: &str) -> Option<MediaItem> {
        let url = match kind {
            MediaKind::Video => match node.video_url.as_deref() {
                Some(url) => url,
                None => {
                    tracing::warn!("video {name} has no video url");
                    return None;
                }
            },
            MediaKind::Image => node.display_url.as_str(),
        };
        if url.is_empty() {
            tracing::warn!("{name} has no media url");
            return None;
        }

        let dest = self
            .cfg
            .download_dir
            .join(format!("{name}.{}", kind.extension()));

        match self
            .downloader
            .download(url, &dest, self.cfg.max_file_size)
            .await
        {
            Ok(DownloadOutcome::Saved { path, size_bytes }) => {
                let item = MediaItem::new(kind, path, size_bytes);
                Some(match kind {
                    MediaKind::Video => item.with_duration(node.video_duration),
                    MediaKind::Image => item,
                })
            }
            Ok(DownloadOutcome::TooLarge { declared }) => {
                tracing::warn!(
                    "{name} exceeds the {} byte ceiling (declared: {declared:?})",
                    self.cfg.max_file_size
                );
                None
            }
            Err(e) => {
                tracing::error!("error downloading {name}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl MediaFetcher for InstagramFetcher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn is_valid_url(&self, url: &str) -> bool {
        is_valid_instagram_url(url)
    }

    async fn fetch(&self, url: &str) -> FetchResult {
        self.fetch_post(url).await
    }
}
