use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    api::ClassificationBackend,
    domain::{ClassificationResult, ProcessEmailsChunk, ProcessEmailsRequest},
    infrastructure::shutdown::ShutdownListener,
};

#[derive(Debug, Clone)]
pub enum BulkEvent {
    Progress {
        results: Vec<ClassificationResult>,
        processed: u64,
    },
    ServiceError(String),
    Finished {
        processed: u64,
        exhausted: bool,
    },
    Failed(String),
}

/// Drives the streaming `/process-emails` endpoint until the mailbox is exhausted.
pub struct BulkClassifier {
    backend: Arc<dyn ClassificationBackend>,
    batch_size: u64,
}

impl BulkClassifier {
    pub fn new(backend: Arc<dyn ClassificationBackend>, batch_size: u64) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
        }
    }

    pub fn spawn(
        self,
        events: mpsc::UnboundedSender<BulkEvent>,
        mut shutdown: ShutdownListener,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = self.run(&events) => {}
                _ = shutdown.notified() => {
                    tracing::info!(target: "bulk", "shutdown requested; bulk classification stopped");
                }
            }
        })
    }

    pub async fn run(&self, events: &mpsc::UnboundedSender<BulkEvent>) {
        let mut skip = 0;
        let mut processed = 0;

        loop {
            let request = ProcessEmailsRequest {
                skip,
                batch_size: self.batch_size,
            };
            let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
            let stream = self.backend.process_emails(request, chunk_tx);
            let consume = async {
                let mut round = Round::default();
                while let Some(chunk) = chunk_rx.recv().await {
                    round.apply(chunk, events);
                }
                round
            };
            let (outcome, round) = tokio::join!(stream, consume);
            processed += round.processed;

            if let Err(err) = outcome {
                tracing::error!(target: "bulk", error = %err, skip, processed, "bulk classification request failed");
                let _ = events.send(BulkEvent::Failed(err.to_string()));
                return;
            }

            if round.exhausted || round.results == 0 {
                tracing::info!(target: "bulk", processed, exhausted = round.exhausted, "bulk classification finished");
                let _ = events.send(BulkEvent::Finished {
                    processed,
                    exhausted: round.exhausted,
                });
                return;
            }

            skip = round.next_skip.unwrap_or(skip + self.batch_size);
            tracing::debug!(target: "bulk", skip, processed, "advancing bulk cursor");
        }
    }
}

/// Bookkeeping for one `/process-emails` request.
#[derive(Debug, Default)]
struct Round {
    results: usize,
    processed: u64,
    exhausted: bool,
    next_skip: Option<u64>,
}

impl Round {
    fn apply(&mut self, chunk: ProcessEmailsChunk, events: &mpsc::UnboundedSender<BulkEvent>) {
        if self.exhausted {
            return;
        }
        if chunk.is_error() {
            let message = chunk
                .message
                .unwrap_or_else(|| "classification service reported an error".to_string());
            tracing::warn!(target: "bulk", message = %message, "service error in stream");
            let _ = events.send(BulkEvent::ServiceError(message));
            return;
        }
        if chunk.is_exhausted() {
            self.exhausted = true;
            return;
        }
        if let Some(advertised) = chunk.next_skip.filter(|s| *s > 0) {
            self.next_skip = Some(advertised);
        }
        self.processed += chunk.total_processed;
        self.results += chunk.results.len();
        if !chunk.results.is_empty() || chunk.total_processed > 0 {
            let _ = events.send(BulkEvent::Progress {
                results: chunk.results,
                processed: chunk.total_processed,
            });
        }
    }
}
