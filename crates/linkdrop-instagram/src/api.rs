//! Upstream port for Instagram: post resolution and session login.

use async_trait::async_trait;

use linkdrop_core::media::ErrorKind;

/// One media slot of a post (the post itself, or a carousel child).
#[derive(Clone, Debug, PartialEq)]
pub struct PostNode {
    pub is_video: bool,
    pub display_url: String,
    pub video_url: Option<String>,
    pub video_duration: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    pub shortcode: String,
    pub typename: String,
    pub root: PostNode,
    pub children: Vec<PostNode>,
}

/// How a post should be downloaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Layout<'a> {
    Video(&'a PostNode),
    Carousel(&'a [PostNode]),
    Image(&'a PostNode),
}

impl Post {
    pub fn layout(&self) -> Layout<'_> {
        if self.root.is_video {
            return Layout::Video(&self.root);
        }
        if self.typename == "GraphSidecar" || self.typename == "XDTGraphSidecar" || !self.children.is_empty() {
            return Layout::Carousel(&self.children);
        }
        Layout::Image(&self.root)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("post not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    /// Instagram bounced the request to its login wall.
    #[error("login required")]
    LoginRequired,
    #[error("rate limited")]
    RateLimited,
    #[error("instagram unavailable: {0}")]
    Unavailable(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// Failures that an authenticated session might get past.
    pub fn is_auth_related(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound
                | ApiError::Unauthorized
                | ApiError::Forbidden
                | ApiError::LoginRequired
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound => ErrorKind::PrivateAccount,
            ApiError::Unauthorized
            | ApiError::Forbidden
            | ApiError::LoginRequired
            | ApiError::LoginFailed(_) => ErrorKind::Forbidden,
            ApiError::RateLimited => ErrorKind::RateLimited,
            ApiError::Unavailable(_) => ErrorKind::PlatformUnavailable,
            ApiError::Connection(_) => ErrorKind::ConnectionError,
            ApiError::Unexpected(_) => ErrorKind::DownloadFailed,
        }
    }
}

#[async_trait]
pub trait InstagramApi: Send + Sync {
    async fn resolve_post(&self, shortcode: &str) -> Result<Post, ApiError>;
    async fn login(&self, username: &str, password: &str) -> Result<(), ApiError>;
    fn is_logged_in(&self) -> bool;
}
