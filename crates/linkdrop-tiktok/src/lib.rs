//! TikTok fetcher backed by an external extractor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use url::Url;

use linkdrop_core::{
    config::TikTokConfig,
    domain::Platform,
    fetch::MediaFetcher,
    media::{unique_stem, ErrorKind, FetchResult, MediaItem, MediaKind},
    rate::RateGovernor,
};

pub mod classify;
pub mod ytdlp;

use ytdlp::{ExtractionBackend, VideoInfo};

pub const DEFAULT_TITLE: &str = "TikTok Video";
pub const FILE_NOT_FOUND: &str = "❌ Downloaded file not found. The download may have failed.";

/// Files modified longer ago than this are never picked up by the last-resort lookup.
const RECENT_FILE_WINDOW: Duration = Duration::from_secs(60);

const TIKTOK_HOSTS: &[&str] = &[
    "www.tiktok.com",
    "tiktok.com",
    "vm.tiktok.com",
    "vt.tiktok.com",
    "m.tiktok.com",
];

pub fn is_valid_tiktok_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    if !parsed.host_str().is_some_and(|h| TIKTOK_HOSTS.contains(&h)) {
        return false;
    }
    parsed
        .path_segments()
        .is_some_and(|mut segs| segs.any(|s| s.chars().any(|c| c.is_ascii_alphanumeric())))
}

/// Numeric id from `/video/<id>`, otherwise the trailing short code.
pub fn extract_video_id(url: &str) -> Option<String> {
    if !is_valid_tiktok_url(url) {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();

    if let Some(id) = segments
        .windows(2)
        .find(|w| w[0] == "video" && !w[1].is_empty() && w[1].chars().all(|c| c.is_ascii_digit()))
        .map(|w| w[1].to_string())
    {
        return Some(id);
    }

    segments
        .last()
        .filter(|s| s.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|s| s.to_string())
}

pub struct TikTokFetcher {
    cfg: TikTokConfig,
    backend: Arc<dyn ExtractionBackend>,
    rate: Arc<RateGovernor>,
}

impl TikTokFetcher {
    pub fn new(cfg: TikTokConfig, backend: Arc<dyn ExtractionBackend>, rate: Arc<RateGovernor>) -> Self {
        Self { cfg, backend, rate }
    }

    pub fn rate(&self) -> &RateGovernor {
        &self.rate
    }

    pub async fn fetch_video(&self, url: &str) -> FetchResult {
        if !is_valid_tiktok_url(url) {
            return FetchResult::failed(ErrorKind::InvalidLink);
        }

        self.rate.acquire().await;
        let info = match self.backend.probe(url).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!("tiktok info extraction failed for {url}: {e}");
                return self.failed(&e).await;
            }
        };

        if let Some(declared) = info.declared_size() {
            if declared > self.cfg.max_file_size {
                tracing::warn!("tiktok video declares {declared} bytes, above the ceiling");
                return FetchResult::failed(ErrorKind::FileTooLarge);
            }
        }

        log_orientation(&info);

        let base = info
            .id
            .clone()
            .or_else(|| extract_video_id(url))
            .unwrap_or_else(|| "tiktok_video".to_string());
        let stem = unique_stem(&base);
        let reported = match self
            .backend
            .download(url, &self.cfg.download_dir, &stem)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("tiktok download failed for {url}: {e}");
                return self.failed(&e).await;
            }
        };

        let Some(path) = locate_download(&self.cfg.download_dir, reported, &info, &stem).await else {
            tracing::error!(
                "downloaded file not found in {}",
                self.cfg.download_dir.display()
            );
            return FetchResult::failed_with(ErrorKind::DownloadFailed, FILE_NOT_FOUND);
        };

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::error!("cannot stat {}: {e}", path.display());
                return FetchResult::failed_with(ErrorKind::DownloadFailed, FILE_NOT_FOUND);
            }
        };
        if size > self.cfg.max_file_size {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::error!("failed to remove oversized {}: {e}", path.display());
            }
            return FetchResult::failed(ErrorKind::FileTooLarge);
        }

        let title = info
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let item = MediaItem::new(MediaKind::Video, path, size)
            .with_title(Some(title))
            .with_duration(info.duration);

        FetchResult::ok("✅ Successfully downloaded TikTok video", vec![item])
    }

    async fn failed(&self, err: &ytdlp::BackendError) -> FetchResult {
        let result = classify::classify(err);
        if result.reason() == Some(ErrorKind::RateLimited) {
            self.rate.trigger_default_cooldown();
        }
        result
    }
}

fn log_orientation(info: &VideoInfo) {
    let (Some(width), Some(height)) = (info.width, info.height) else {
        return;
    };
    if width == 0 || height == 0 {
        return;
    }
    let orientation = if height > width {
        "vertical"
    } else if width > height {
        "horizontal"
    } else {
        "square"
    };
    tracing::info!(
        "video dimensions: {width}x{height} ({orientation}, ratio: {:.2})",
        height as f64 / width as f64
    );
}

/// Find the file the extractor wrote.
///
/// Order: the path the extractor reported, then `<stem>.<ext>`, then the newest file in
/// `dir` named after `stem` and modified within the last minute.
pub async fn locate_download(
    dir: &Path,
    reported: Option<PathBuf>,
    info: &VideoInfo,
    stem: &str,
) -> Option<PathBuf> {
    if let Some(path) = reported {
        if is_file(&path).await {
            return Some(path);
        }
        tracing::warn!("extractor reported {} but it does not exist", path.display());
    }

    let ext = info.ext.as_deref().unwrap_or("mp4");
    let candidates = [
        dir.join(format!("{stem}.{ext}")),
        dir.join(format!("{stem}.mp4")),
    ];
    for candidate in candidates {
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }

    match most_recent_file(dir, stem, RECENT_FILE_WINDOW).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("error scanning {}: {e}", dir.display());
            None
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn most_recent_file(
    dir: &Path,
    stem: &str,
    window: Duration,
) -> std::io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name
            .strip_prefix(stem)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }

    Ok(newest.and_then(|(modified, path)| {
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        (age < window).then_some(path)
    }))
}

#[async_trait]
impl MediaFetcher for TikTokFetcher {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn is_valid_url(&self, url: &str) -> bool {
        is_valid_tiktok_url(url)
    }

    async fn fetch(&self, url: &str) -> FetchResult {
        self.fetch_video(url).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use linkdrop_core::config::RateConfig;

    use super::*;
    use crate::ytdlp::BackendError;

    /// Where the fake extractor writes, and what it tells the caller.
    enum Writes {
        /// Write `<stem>.mp4` with `size` bytes and report its path.
        Reported { size: usize },
        /// Write `<stem><suffix>` but report nothing.
        Silent { suffix: &'static str, size: usize },
        /// Report a path that was never written.
        Phantom,
    }

    struct FakeBackend {
        probe: Mutex<Option<std::result::Result<VideoInfo, BackendError>>>,
        writes: Writes,
        download_error: Option<&'static str>,
        downloads: AtomicUsize,
    }

    impl FakeBackend {
        fn new(info: VideoInfo, writes: Writes) -> Arc<Self> {
            Arc::new(Self {
                probe: Mutex::new(Some(Ok(info))),
                writes,
                download_error: None,
                downloads: AtomicUsize::new(0),
            })
        }

        fn probe_error(diag: &str) -> Arc<Self> {
            Arc::new(Self {
                probe: Mutex::new(Some(Err(BackendError::Extraction(diag.to_string())))),
                writes: Writes::Phantom,
                download_error: None,
                downloads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExtractionBackend for FakeBackend {
        async fn probe(&self, _url: &str) -> std::result::Result<VideoInfo, BackendError> {
            self.probe
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(BackendError::Parse("probed twice".to_string())))
        }

        async fn download(
            &self,
            _url: &str,
            dir: &Path,
            stem: &str,
        ) -> std::result::Result<Option<PathBuf>, BackendError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if let Some(diag) = self.download_error {
                return Err(BackendError::Extraction(diag.to_string()));
            }
            match self.writes {
                Writes::Reported { size } => {
                    let path = dir.join(format!("{stem}.mp4"));
                    std::fs::write(&path, vec![0u8; size]).unwrap();
                    Ok(Some(path))
                }
                Writes::Silent { suffix, size } => {
                    std::fs::write(dir.join(format!("{stem}{suffix}")), vec![0u8; size]).unwrap();
                    Ok(None)
                }
                Writes::Phantom => Ok(Some(dir.join("ghost.mp4"))),
            }
        }
    }

    fn info() -> VideoInfo {
        VideoInfo {
            id: Some("7301".to_string()),
            ext: Some("mp4".to_string()),
            title: Some("dance clip".to_string()),
            duration: Some(14.0),
            width: Some(576),
            height: Some(1024),
            filesize: None,
            filesize_approx: None,
        }
    }

    fn fetcher(dir: &Path, backend: Arc<FakeBackend>) -> TikTokFetcher {
        let cfg = TikTokConfig {
            download_dir: dir.to_path_buf(),
            max_file_size: 1024,
            ytdlp_path: PathBuf::from("yt-dlp"),
            rate: RateConfig {
                min_interval: Duration::ZERO,
                cooldown: Duration::from_secs(600),
            },
        };
        let rate = Arc::new(RateGovernor::new(cfg.rate));
        TikTokFetcher::new(cfg, backend, rate)
    }

    const URL: &str = "https://www.tiktok.com/@someone/video/7301";

    fn file_name(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn url_validation_and_id_extraction() {
        assert!(is_valid_tiktok_url(URL));
        assert!(is_valid_tiktok_url("https://vm.tiktok.com/ZMabc123/"));
        assert!(!is_valid_tiktok_url("https://www.tiktok.com/"));
        assert!(!is_valid_tiktok_url("https://tiktok.example.com/@a/video/1"));
        assert!(!is_valid_tiktok_url("ftp://www.tiktok.com/@a/video/1"));
        assert!(!is_valid_tiktok_url(""));

        assert_eq!(extract_video_id(URL), Some("7301".to_string()));
        assert_eq!(
            extract_video_id("https://vm.tiktok.com/ZMabc123/"),
            Some("ZMabc123".to_string())
        );
        assert_eq!(extract_video_id("https://example.com/video/1"), None);
    }

    #[tokio::test]
    async fn invalid_link_never_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new(info(), Writes::Phantom);
        let f = fetcher(dir.path(), backend.clone());

        let res = f.fetch_video("https://example.com/not-a-video").await;
        assert_eq!(res.reason(), Some(ErrorKind::InvalidLink));
        assert!(backend.probe.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn success_uses_reported_path() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new(info(), Writes::Reported { size: 100 });
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert!(res.is_success());
        assert_eq!(res.message(), "✅ Successfully downloaded TikTok video");
        let item = &res.items()[0];
        assert_eq!(item.kind, MediaKind::Video);
        assert_eq!(item.path.parent(), Some(dir.path()));
        let name = file_name(&item.path);
        assert!(name.starts_with("7301_") && name.ends_with(".mp4"));
        assert_eq!(item.size_bytes, 100);
        assert_eq!(item.title.as_deref(), Some("dance clip"));
        assert_eq!(item.duration_secs, Some(14.0));
    }

    #[tokio::test]
    async fn missing_title_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = info();
        meta.title = None;
        let backend = FakeBackend::new(meta, Writes::Reported { size: 10 });
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert_eq!(res.items()[0].title.as_deref(), Some(DEFAULT_TITLE));
    }

    #[tokio::test]
    async fn falls_back_to_mp4_name_when_ext_differs() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = info();
        meta.ext = Some("webm".to_string());
        let backend = FakeBackend::new(meta, Writes::Silent { suffix: ".mp4", size: 10 });
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert!(res.is_success());
        let name = file_name(&res.items()[0].path);
        assert!(name.starts_with("7301_") && name.ends_with(".mp4"));
    }

    #[tokio::test]
    async fn falls_back_to_most_recent_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new(info(), Writes::Silent { suffix: ".f299.mkv", size: 10 });
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert!(res.is_success());
        assert!(file_name(&res.items()[0].path).ends_with(".f299.mkv"));
    }

    #[tokio::test]
    async fn files_from_other_fetches_are_never_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("7301.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("7301_other.mp4"), b"x").unwrap();
        let backend = FakeBackend::new(info(), Writes::Phantom);
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert_eq!(res.reason(), Some(ErrorKind::DownloadFailed));
        assert_eq!(res.message(), FILE_NOT_FOUND);
    }

    #[tokio::test]
    async fn nothing_on_disk_is_download_failed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new(info(), Writes::Phantom);
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert_eq!(res.reason(), Some(ErrorKind::DownloadFailed));
        assert_eq!(res.message(), FILE_NOT_FOUND);
    }

    #[tokio::test]
    async fn declared_oversize_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = info();
        meta.filesize_approx = Some(4096.0);
        let backend = FakeBackend::new(meta, Writes::Reported { size: 10 });
        let f = fetcher(dir.path(), backend.clone());

        let res = f.fetch_video(URL).await;
        assert_eq!(res.reason(), Some(ErrorKind::FileTooLarge));
        assert_eq!(backend.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_file_on_disk_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new(info(), Writes::Reported { size: 2048 });
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert_eq!(res.reason(), Some(ErrorKind::FileTooLarge));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn probe_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::probe_error("ERROR: [TikTok] 7301: Private video");
        let f = fetcher(dir.path(), backend.clone());

        let res = f.fetch_video(URL).await;
        assert_eq!(res.reason(), Some(ErrorKind::PrivateAccount));
        assert_eq!(backend.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            probe: Mutex::new(Some(Ok(info()))),
            writes: Writes::Phantom,
            download_error: Some("ERROR: HTTP Error 403: Forbidden"),
            downloads: AtomicUsize::new(0),
        });
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert_eq!(res.reason(), Some(ErrorKind::Forbidden));
        assert_eq!(res.message(), classify::TIKTOK_FORBIDDEN);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_arms_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::probe_error("ERROR: HTTP Error 429: Too Many Requests");
        let f = fetcher(dir.path(), backend);

        let res = f.fetch_video(URL).await;
        assert_eq!(res.reason(), Some(ErrorKind::RateLimited));
        assert!(f.rate().status().cooldown_remaining.is_some());
    }

    #[tokio::test]
    async fn stale_files_are_not_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("old.mp4");
        std::fs::write(&stale, b"x").unwrap();

        let found = most_recent_file(dir.path(), "old", Duration::ZERO).await.unwrap();
        assert_eq!(found, None);
        let found = most_recent_file(dir.path(), "old", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(found, Some(stale));
        let found = most_recent_file(dir.path(), "ol", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(found, None);
    }
}
