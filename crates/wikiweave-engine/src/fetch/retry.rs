use std::time::Duration;

use super::{ContentFetcher, FetchError, LocalFuture, PageSource};

/// Retries a fetcher with a growing timeout and exponential backoff.
///
/// Every attempt runs under a timeout that doubles per retry, and the pause
/// between attempts doubles as well. Failures that cannot improve
/// ([`FetchError::is_retryable`]) are returned at once.
#[derive(Debug, Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    max_retries: u32,
    timeout: Duration,
    backoff: Duration,
}

impl<F> RetryingFetcher<F> {
    pub fn new(inner: F, max_retries: u32, timeout: Duration, backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            timeout,
            backoff,
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: ContentFetcher> ContentFetcher for RetryingFetcher<F> {
    fn fetch<'a>(
        &'a self,
        name: &'a str,
        revision: Option<u64>,
    ) -> LocalFuture<'a, Result<PageSource, FetchError>> {
        Box::pin(async move {
            let mut timeout = self.timeout;
            let mut backoff = self.backoff;
            let mut attempt = 0;
            loop {
                let result = tokio::time::timeout(timeout, self.inner.fetch(name, revision))
                    .await
                    .unwrap_or(Err(FetchError::Timeout));
                match result {
                    Err(err) if err.is_retryable() && attempt < self.max_retries => {
                        attempt += 1;
                        log::warn!(
                            "Fetching {name} failed ({err}); retry {attempt}/{} in {backoff:?}",
                            self.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                        timeout = timeout.saturating_mul(2);
                        backoff = backoff.saturating_mul(2);
                    }
                    other => return other,
                }
            }
        })
    }
}
