use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    api::{ApiError, ClassificationBackend},
    cache::ResultCache,
    config::FetchConfig,
    domain::{ResultPage, ResultQuery},
};

pub type SharedCache = Arc<Mutex<ResultCache>>;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Reads result pages through the shared cache with bounded retry.
pub struct ResultFetcher {
    backend: Arc<dyn ClassificationBackend>,
    cache: SharedCache,
    config: FetchConfig,
}

impl ResultFetcher {
    pub fn new(
        backend: Arc<dyn ClassificationBackend>,
        cache: SharedCache,
        config: FetchConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            config,
        }
    }

    /// Returns the cached page while it is fresh, otherwise reads through.
    pub async fn fetch(&self, query: &ResultQuery) -> Result<ResultPage, ApiError> {
        let cached = self.cache.lock().get_fresh(query, Instant::now()).cloned();
        if let Some(page) = cached {
            tracing::trace!(target: "fetch", skip = query.skip, limit = query.limit, "cache hit");
            return Ok(page);
        }
        self.refresh(query).await
    }

    pub async fn refresh(&self, query: &ResultQuery) -> Result<ResultPage, ApiError> {
        let generation = self.cache.lock().generation();
        let page = self.fetch_with_retry(query).await?;
        tracing::debug!(
            target: "fetch",
            skip = query.skip,
            limit = query.limit,
            category = query.category.as_deref().unwrap_or("-"),
            results = page.results.len(),
            total = ?page.total,
            "results page stored"
        );
        let mut cache = self.cache.lock();
        cache.insert(query.clone(), page.clone(), Instant::now(), generation);
        tracing::trace!(target: "fetch", cached_pages = cache.len(), "cache updated");
        Ok(page)
    }

    /// Last stored page for `query`, fresh or not.
    pub fn cached(&self, query: &ResultQuery) -> Option<ResultPage> {
        self.cache.lock().get(query).cloned()
    }

    pub fn is_stale(&self, query: &ResultQuery) -> bool {
        self.cache.lock().is_stale(query, Instant::now())
    }

    async fn fetch_with_retry(&self, query: &ResultQuery) -> Result<ResultPage, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            match self.backend.list_results(query).await {
                Ok(page) => return Ok(page),
                Err(err) if attempt < self.config.retries => {
                    let delay = retry_delay(self.config.retry_delay, attempt);
                    attempt += 1;
                    tracing::warn!(
                        target: "fetch",
                        error = %err,
                        attempt,
                        retries = self.config.retries,
                        delay_ms = delay.as_millis() as u64,
                        "fetching classification results failed; retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(target: "fetch", error = %err, "error fetching classification results");
                    return Err(err);
                }
            }
        }
    }
}

fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY)
}
