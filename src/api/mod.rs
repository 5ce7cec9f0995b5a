mod client;
pub mod endpoints;
pub mod ndjson;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{
    BatchRequest, BatchResponse, ProcessEmailsChunk, ProcessEmailsRequest, ResultPage,
    ResultQuery, TaskStatusResponse,
};

pub use client::HttpBackend;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("base URL {0} cannot carry path segments")]
    InvalidBaseUrl(String),
}

/// Remote classification service as seen by the dashboard.
pub trait ClassificationBackend: Send + Sync {
    fn list_results<'a>(
        &'a self,
        query: &'a ResultQuery,
    ) -> BoxFuture<'a, Result<ResultPage, ApiError>>;

    fn submit_batch(&self, request: BatchRequest) -> BoxFuture<'_, Result<BatchResponse, ApiError>>;

    fn task_status<'a>(
        &'a self,
        task_id: &'a str,
    ) -> BoxFuture<'a, Result<TaskStatusResponse, ApiError>>;

    /// Runs one round of the streaming `/process-emails` endpoint.
    ///
    /// Each chunk is sent as soon as its line is decoded. An error ends the
    /// round after the chunks received so far have been sent.
    fn process_emails(
        &self,
        request: ProcessEmailsRequest,
        chunks: mpsc::UnboundedSender<ProcessEmailsChunk>,
    ) -> BoxFuture<'_, Result<(), ApiError>>;
}
