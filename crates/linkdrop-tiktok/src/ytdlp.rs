//! `yt-dlp` extraction backend.
//!
//! Two invocations per video: a metadata probe (`--dump-single-json`) and the download
//! itself, which prints the final file path so the caller does not have to guess it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use linkdrop_core::download::DEFAULT_USER_AGENT;

pub const FORMAT_SELECTOR: &str = "best[ext=mp4]/best";
const REFERER: &str = "https://www.tiktok.com/";
const STDERR_TAIL_MAX_LINES: usize = 20;

/// The subset of yt-dlp's info dict this crate reads.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub ext: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<f64>,
}

impl VideoInfo {
    /// Exact size when known, otherwise the estimate.
    pub fn declared_size(&self) -> Option<u64> {
        self.filesize
            .filter(|s| *s > 0)
            .or_else(|| self.filesize_approx.filter(|s| *s > 0.0).map(|s| s as u64))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The extractor ran and reported a failure; the payload is its diagnostic text.
    #[error("{0}")]
    Extraction(String),
    #[error("failed to run extractor: {0}")]
    Spawn(String),
    #[error("unreadable extractor output: {0}")]
    Parse(String),
}

#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Metadata only, nothing is written to disk.
    async fn probe(&self, url: &str) -> Result<VideoInfo, BackendError>;

    /// Download into `dir` as `<stem>.<ext>`; returns the final path when the extractor
    /// reported one.
    async fn download(
        &self,
        url: &str,
        dir: &Path,
        stem: &str,
    ) -> Result<Option<PathBuf>, BackendError>;
}

#[derive(Clone, Debug)]
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn common_args() -> Vec<String> {
        [
            "--no-playlist",
            "--no-progress",
            "--retries",
            "3",
            "--fragment-retries",
            "3",
            "--user-agent",
            DEFAULT_USER_AGENT,
            "--referer",
            REFERER,
            "--add-header",
            "Accept-Language:en-us,en;q=0.5",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn probe_args(url: &str) -> Vec<String> {
        let mut args = Self::common_args();
        args.extend(["--dump-single-json", "--skip-download", "--", url].map(String::from));
        args
    }

    fn download_args(url: &str, dir: &Path, stem: &str) -> Vec<String> {
        let template = dir
            .join(format!("{stem}.%(ext)s"))
            .to_string_lossy()
            .into_owned();
        let mut args = Self::common_args();
        args.extend(
            [
                "--format",
                FORMAT_SELECTOR,
                "--output",
                template.as_str(),
                "--no-simulate",
                "--print",
                "after_move:filepath",
                "--",
                url,
            ]
            .map(String::from),
        );
        args
    }

    async fn run(&self, args: &[String]) -> Result<String, BackendError> {
        tracing::debug!("running {} {}", self.program.display(), args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::Spawn(format!("{}: {e}", self.program.display())))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(BackendError::Extraction(diagnostic_from_stderr(
                &stderr,
                output.status.code(),
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ExtractionBackend for YtDlp {
    async fn probe(&self, url: &str) -> Result<VideoInfo, BackendError> {
        let stdout = self.run(&Self::probe_args(url)).await?;
        parse_info(&stdout)
    }

    async fn download(
        &self,
        url: &str,
        dir: &Path,
        stem: &str,
    ) -> Result<Option<PathBuf>, BackendError> {
        let stdout = self.run(&Self::download_args(url, dir, stem)).await?;
        Ok(reported_path(&stdout))
    }
}

pub fn parse_info(stdout: &str) -> Result<VideoInfo, BackendError> {
    serde_json::from_str(stdout.trim()).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Last non-empty stdout line, which `--print after_move:filepath` emits.
pub fn reported_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(PathBuf::from)
}

/// Prefer `ERROR:` lines; otherwise the tail of stderr, otherwise the exit code.
pub fn diagnostic_from_stderr(stderr: &str, code: Option<i32>) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return errors.join("\n");
    }

    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return match code {
            Some(c) => format!("extractor exited with status {c}"),
            None => "extractor terminated by signal".to_string(),
        };
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_MAX_LINES);
    lines[start..].join("\n")
}
