//! Scripted in-memory backend shared by unit tests.

use std::collections::{HashMap, VecDeque};

use futures::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    api::{ApiError, ClassificationBackend},
    domain::{
        BatchRequest, BatchResponse, ClassificationResult, ProcessEmailsChunk,
        ProcessEmailsRequest, ResultPage, ResultQuery, TaskStatusResponse,
    },
};

/// Scripted behavior of one `/process-emails` round.
pub enum RoundScript {
    /// Sends the chunks, then ends with the given HTTP status as an error if any.
    Finish(Vec<ProcessEmailsChunk>, Option<u16>),
    /// Sends the chunks and never completes.
    Stall(Vec<ProcessEmailsChunk>),
}

#[derive(Default)]
pub struct MockBackend {
    pub pages: Mutex<VecDeque<Result<ResultPage, u16>>>,
    pub batches: Mutex<VecDeque<Result<BatchResponse, u16>>>,
    pub statuses: Mutex<HashMap<String, VecDeque<Result<String, u16>>>>,
    pub process_rounds: Mutex<VecDeque<RoundScript>>,
    pub list_calls: Mutex<Vec<ResultQuery>>,
    pub batch_calls: Mutex<Vec<BatchRequest>>,
    pub status_calls: Mutex<Vec<String>>,
    pub process_calls: Mutex<Vec<ProcessEmailsRequest>>,
}

impl MockBackend {
    pub fn push_page(&self, page: Result<ResultPage, u16>) {
        self.pages.lock().push_back(page);
    }

    pub fn push_batch(&self, response: Result<BatchResponse, u16>) {
        self.batches.lock().push_back(response);
    }

    pub fn script_task(&self, task_id: &str, statuses: &[&str]) {
        self.statuses.lock().insert(
            task_id.to_string(),
            statuses.iter().map(|s| Ok(s.to_string())).collect(),
        );
    }

    pub fn push_round(&self, round: Result<Vec<ProcessEmailsChunk>, u16>) {
        let script = match round {
            Ok(chunks) => RoundScript::Finish(chunks, None),
            Err(status) => RoundScript::Finish(Vec::new(), Some(status)),
        };
        self.process_rounds.lock().push_back(script);
    }

    pub fn push_broken_round(&self, chunks: Vec<ProcessEmailsChunk>, status: u16) {
        self.process_rounds
            .lock()
            .push_back(RoundScript::Finish(chunks, Some(status)));
    }

    pub fn push_stalled_round(&self, chunks: Vec<ProcessEmailsChunk>) {
        self.process_rounds.lock().push_back(RoundScript::Stall(chunks));
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.lock().len()
    }
}

fn status_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        url: "http://mock".to_string(),
    }
}

impl ClassificationBackend for MockBackend {
    fn list_results<'a>(
        &'a self,
        query: &'a ResultQuery,
    ) -> BoxFuture<'a, Result<ResultPage, ApiError>> {
        self.list_calls.lock().push(query.clone());
        let next = self.pages.lock().pop_front().unwrap_or(Err(404));
        async move { next.map_err(status_error) }.boxed()
    }

    fn submit_batch(&self, request: BatchRequest) -> BoxFuture<'_, Result<BatchResponse, ApiError>> {
        self.batch_calls.lock().push(request);
        let next = self.batches.lock().pop_front().unwrap_or(Err(404));
        async move { next.map_err(status_error) }.boxed()
    }

    fn task_status<'a>(
        &'a self,
        task_id: &'a str,
    ) -> BoxFuture<'a, Result<TaskStatusResponse, ApiError>> {
        self.status_calls.lock().push(task_id.to_string());
        let next = {
            let mut statuses = self.statuses.lock();
            match statuses.get_mut(task_id) {
                // The last scripted status repeats once the script runs out.
                Some(script) if script.len() > 1 => script.pop_front(),
                Some(script) => script.front().cloned(),
                None => None,
            }
        }
        .unwrap_or(Err(404));
        async move {
            next.map(|status| TaskStatusResponse {
                status,
                error: None,
            })
            .map_err(status_error)
        }
        .boxed()
    }

    fn process_emails(
        &self,
        request: ProcessEmailsRequest,
        chunks: mpsc::UnboundedSender<ProcessEmailsChunk>,
    ) -> BoxFuture<'_, Result<(), ApiError>> {
        self.process_calls.lock().push(request);
        let next = self
            .process_rounds
            .lock()
            .pop_front()
            .unwrap_or(RoundScript::Finish(Vec::new(), Some(404)));
        async move {
            match next {
                RoundScript::Finish(sent, error) => {
                    for chunk in sent {
                        let _ = chunks.send(chunk);
                    }
                    error.map_or(Ok(()), |status| Err(status_error(status)))
                }
                RoundScript::Stall(sent) => {
                    for chunk in sent {
                        let _ = chunks.send(chunk);
                    }
                    futures::future::pending().await
                }
            }
        }
        .boxed()
    }
}

pub fn result_in(category: &str, subject: &str) -> ClassificationResult {
    serde_json::from_value(serde_json::json!({
        "email_details": { "id": subject, "subject": subject },
        "classification_process": { "final_result": { "category": category, "confidence": 0.9 } }
    }))
    .expect("valid result fixture")
}

pub fn page_of(results: Vec<ClassificationResult>, total: Option<u64>) -> ResultPage {
    ResultPage { results, total }
}
