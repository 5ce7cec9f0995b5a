use futures::{future::BoxFuture, FutureExt, StreamExt};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use url::Url;

use crate::{
    config::ApiConfig,
    domain::{
        BatchRequest, BatchResponse, ProcessEmailsChunk, ProcessEmailsRequest, ResultPage,
        ResultQuery, TaskStatusResponse,
    },
};

use super::{endpoints::Endpoints, ndjson::NdjsonDecoder, ApiError, ClassificationBackend};

#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    endpoints: Endpoints,
    config: ApiConfig,
}

impl HttpBackend {
    pub fn new(http: Client, config: ApiConfig) -> Self {
        Self {
            http,
            endpoints: Endpoints::new(config.base_url.clone()),
            config,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        decode_json(check_status(response)?).await
    }

    async fn post_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        decode_json(check_status(response)?).await
    }

    async fn stream_process_emails(
        &self,
        request: ProcessEmailsRequest,
        chunks: mpsc::UnboundedSender<ProcessEmailsChunk>,
    ) -> Result<(), ApiError> {
        let url = self.endpoints.process_emails(&request)?;
        tracing::debug!(target: "bulk", url = %url, "starting process-emails stream");

        // No request timeout: the stream stays open while the service classifies.
        let response = check_status(self.http.post(url).send().await?)?;
        let mut body = response.bytes_stream();
        let mut decoder = NdjsonDecoder::new();
        let mut delivered = 0usize;

        while let Some(bytes) = body.next().await {
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(target: "bulk", delivered, error = %err, "process-emails stream broke off");
                    return Err(err.into());
                }
            };
            for chunk in decoder.push::<ProcessEmailsChunk>(&bytes) {
                tracing::debug!(
                    target: "bulk",
                    status = %chunk.status,
                    processed = chunk.total_processed,
                    "stream chunk received"
                );
                delivered += 1;
                let _ = chunks.send(chunk);
            }
        }
        for chunk in decoder.finish::<ProcessEmailsChunk>() {
            let _ = chunks.send(chunk);
        }
        Ok(())
    }
}

impl ClassificationBackend for HttpBackend {
    fn list_results<'a>(
        &'a self,
        query: &'a ResultQuery,
    ) -> BoxFuture<'a, Result<ResultPage, ApiError>> {
        async move {
            let url = self.endpoints.results(query)?;
            tracing::debug!(target: "fetch", url = %url, "fetching classification results");
            self.get_json(url).await
        }
        .boxed()
    }

    fn submit_batch(&self, request: BatchRequest) -> BoxFuture<'_, Result<BatchResponse, ApiError>> {
        async move {
            let url = self.endpoints.process_batches(&request)?;
            self.post_json(url).await
        }
        .boxed()
    }

    fn task_status<'a>(
        &'a self,
        task_id: &'a str,
    ) -> BoxFuture<'a, Result<TaskStatusResponse, ApiError>> {
        async move {
            let url = self.endpoints.task_status(task_id)?;
            self.get_json(url).await
        }
        .boxed()
    }

    fn process_emails(
        &self,
        request: ProcessEmailsRequest,
        chunks: mpsc::UnboundedSender<ProcessEmailsChunk>,
    ) -> BoxFuture<'_, Result<(), ApiError>> {
        self.stream_process_emails(request, chunks).boxed()
    }
}

fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let url = response.url().to_string();
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|source| ApiError::Decode { url, source })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    async fn serve_once(response: String) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    fn backend(base_url: Url) -> HttpBackend {
        HttpBackend::new(
            Client::new(),
            ApiConfig {
                base_url,
                request_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn chunks_before_a_broken_stream_are_delivered() {
        let line = "{\"status\":\"success\",\"total_processed\":1}\n";
        // Chunked body that is never terminated: the connection closes mid-stream.
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{line}\r\n",
            line.len()
        );
        let backend = backend(serve_once(response).await);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = backend
            .process_emails(ProcessEmailsRequest { skip: 0, batch_size: 5 }, tx)
            .await;

        assert!(matches!(result, Err(ApiError::Request(_))));
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.total_processed, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn complete_stream_sends_every_line() {
        let body = "{\"status\":\"success\",\"total_processed\":2}\n{\"status\":\"no_emails\"}";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let backend = backend(serve_once(response).await);
        let (tx, mut rx) = mpsc::unbounded_channel();

        backend
            .process_emails(ProcessEmailsRequest { skip: 0, batch_size: 5 }, tx)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().total_processed, 2);
        assert!(rx.recv().await.unwrap().is_exhausted());
        assert!(rx.recv().await.is_none());
    }
}
