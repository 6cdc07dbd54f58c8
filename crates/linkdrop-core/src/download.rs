//! Streaming media download under a size ceiling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::Result;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved { path: PathBuf, size_bytes: u64 },
    /// Rejected for size. `declared` is set when the server announced the length up front.
    TooLarge { declared: Option<u64> },
}

/// Fetch a direct media URL into a local file.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<DownloadOutcome>;
}

#[derive(Clone, Debug)]
pub struct HttpDownloader {
    http: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self { http })
    }

    async fn stream_to_file(
        &self,
        mut resp: reqwest::Response,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<DownloadOutcome> {
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            written += chunk.len() as u64;
            if written > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Ok(DownloadOutcome::TooLarge { declared: None });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(DownloadOutcome::Saved {
            path: dest.to_path_buf(),
            size_bytes: written,
        })
    }
}

#[async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<DownloadOutcome> {
        let resp = self.http.get(url).send().await?.error_for_status()?;

        if let Some(len) = resp.content_length() {
            if len > max_bytes {
                tracing::warn!("{} is too large: {len} bytes", dest.display());
                return Ok(DownloadOutcome::TooLarge {
                    declared: Some(len),
                });
            }
        }

        match self.stream_to_file(resp, dest, max_bytes).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }
}
