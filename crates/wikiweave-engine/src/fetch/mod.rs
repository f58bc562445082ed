//! # Content fetching
//!
//! Template sources come from a [`ContentFetcher`]. The engine never talks
//! to a transport directly; hosts plug in whatever they have:
//!
//! - [`MemoryFetcher`]: pages held in memory (tests, embedding)
//! - [`DirectoryFetcher`]: one `.wiki` file per canonical name
//! - [`RetryingFetcher`]: wraps another fetcher with timeouts, retries and
//!   exponential backoff
//!
//! [`decode_api_response`] turns a MediaWiki-style JSON query response into a
//! [`PageSource`] for hosts that fetch over HTTP themselves.
//!
//! Fetches run on the parse's single-threaded runtime, so futures are not
//! required to be `Send`.

mod api;
mod directory;
mod memory;
mod retry;

pub use api::decode_api_response;
pub use directory::DirectoryFetcher;
pub use memory::MemoryFetcher;
pub use retry::RetryingFetcher;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// A boxed future that may borrow from its creator and need not be `Send`.
pub type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// The source of one page revision.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSource {
    pub title: String,
    pub revision: Option<u64>,
    pub source: String,
}

impl PageSource {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            revision: None,
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Page not found: {0}")]
    NotFound(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Fetch timed out")]
    Timeout,
    #[error("HTTP status {status}")]
    Http { status: u16 },
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Worth another attempt? Missing and forbidden pages are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NotFound(_) | FetchError::AccessDenied(_) => false,
            FetchError::Http { status } => *status >= 500 || *status == 429,
            FetchError::Timeout | FetchError::Malformed(_) | FetchError::Transport(_) => true,
        }
    }
}

/// Fetches page sources by canonical name.
pub trait ContentFetcher {
    fn fetch<'a>(
        &'a self,
        name: &'a str,
        revision: Option<u64>,
    ) -> LocalFuture<'a, Result<PageSource, FetchError>>;
}

impl<T: ContentFetcher + ?Sized> ContentFetcher for Rc<T> {
    fn fetch<'a>(
        &'a self,
        name: &'a str,
        revision: Option<u64>,
    ) -> LocalFuture<'a, Result<PageSource, FetchError>> {
        (**self).fetch(name, revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FetchError::NotFound("x".into()), false)]
    #[case(FetchError::AccessDenied("x".into()), false)]
    #[case(FetchError::Timeout, true)]
    #[case(FetchError::Http { status: 503 }, true)]
    #[case(FetchError::Http { status: 429 }, true)]
    #[case(FetchError::Http { status: 404 }, false)]
    #[case(FetchError::Malformed("bad".into()), true)]
    fn retry_policy(#[case] err: FetchError, #[case] retryable: bool) {
        assert_eq!(err.is_retryable(), retryable);
    }
}
