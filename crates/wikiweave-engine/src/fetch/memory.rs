use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use super::{ContentFetcher, FetchError, LocalFuture, PageSource};

/// In-memory pages keyed by canonical name.
///
/// Counts calls per name and can simulate latency and failures, which makes
/// it the fetcher of choice for tests.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    pages: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    failures: RefCell<HashMap<String, (u32, FetchError)>>,
    calls: RefCell<HashMap<String, usize>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page(mut self, name: &str, source: &str) -> Self {
        self.pages.insert(name.to_string(), source.to_string());
        self
    }

    /// Delay every fetch of `name` by `delay`.
    #[must_use]
    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// Fail the next `times` fetches of `name` with `error`.
    #[must_use]
    pub fn with_failures(self, name: &str, times: u32, error: FetchError) -> Self {
        self.failures
            .borrow_mut()
            .insert(name.to_string(), (times, error));
        self
    }

    /// Number of fetches issued for `name`.
    pub fn calls(&self, name: &str) -> usize {
        self.calls.borrow().get(name).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().values().sum()
    }

    fn next_failure(&self, name: &str) -> Option<FetchError> {
        let mut failures = self.failures.borrow_mut();
        let (remaining, error) = failures.get_mut(name)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(error.clone())
    }
}

impl ContentFetcher for MemoryFetcher {
    fn fetch<'a>(
        &'a self,
        name: &'a str,
        revision: Option<u64>,
    ) -> LocalFuture<'a, Result<PageSource, FetchError>> {
        Box::pin(async move {
            *self.calls.borrow_mut().entry(name.to_string()).or_default() += 1;
            if let Some(delay) = self.delays.get(name) {
                tokio::time::sleep(*delay).await;
            }
            if let Some(error) = self.next_failure(name) {
                return Err(error);
            }
            match self.pages.get(name) {
                Some(source) => Ok(PageSource {
                    title: name.to_string(),
                    revision,
                    source: source.clone(),
                }),
                None => Err(FetchError::NotFound(name.to_string())),
            }
        })
    }
}
