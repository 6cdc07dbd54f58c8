/// Core error type.
///
/// Adapter crates map their specific errors into this type so the pipeline can treat
/// transport failures uniformly. Fetch-path failures never use it: they are classified
/// into [`crate::media::ErrorKind`] at the fetcher boundary instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
