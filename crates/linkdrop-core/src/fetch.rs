use async_trait::async_trait;

use crate::{domain::Platform, media::FetchResult};

/// Per-platform fetch port.
///
/// Implementations convert every failure into a [`FetchResult`]; nothing library-specific
/// escapes past this boundary.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Shape check only: host and path. Deeper validation happens during `fetch`.
    fn is_valid_url(&self, url: &str) -> bool;

    async fn fetch(&self, url: &str) -> FetchResult;
}
