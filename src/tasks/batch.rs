use std::sync::Arc;

use crate::{
    api::{ApiError, ClassificationBackend},
    domain::{BatchRequest, BatchResponse, ClassificationResult},
};

use super::fetcher::SharedCache;

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub task_ids: Vec<String>,
    pub results: Vec<ClassificationResult>,
    pub next_skip: u64,
}

impl BatchOutcome {
    fn from_response(request: &BatchRequest, response: BatchResponse) -> Self {
        // A zero offset is treated like a missing one.
        let next_skip = response
            .next_skip
            .filter(|skip| *skip > 0)
            .unwrap_or(request.skip + request.batch_size);
        Self {
            task_ids: response.task_ids.unwrap_or_default(),
            results: response.results.unwrap_or_default(),
            next_skip,
        }
    }
}

/// Submits "process next batch" commands and invalidates cached pages on success.
pub struct BatchSubmitter {
    backend: Arc<dyn ClassificationBackend>,
    cache: SharedCache,
}

impl BatchSubmitter {
    pub fn new(backend: Arc<dyn ClassificationBackend>, cache: SharedCache) -> Self {
        Self { backend, cache }
    }

    pub async fn submit(&self, request: BatchRequest) -> Result<BatchOutcome, ApiError> {
        tracing::info!(
            target: "batch",
            total_emails = request.total_emails,
            batch_size = request.batch_size,
            skip = request.skip,
            "processing batch"
        );

        let response = match self.backend.submit_batch(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(target: "batch", error = %err, "error processing email batch");
                return Err(err);
            }
        };

        let outcome = BatchOutcome::from_response(&request, response);
        self.cache.lock().invalidate_all();
        tracing::info!(
            target: "batch",
            tasks = outcome.task_ids.len(),
            immediate_results = outcome.results.len(),
            next_skip = outcome.next_skip,
            "batch accepted; cached result pages invalidated"
        );
        Ok(outcome)
    }
}
