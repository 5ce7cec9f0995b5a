use url::Url;

use crate::domain::{BatchRequest, ProcessEmailsRequest, ResultQuery};

use super::ApiError;

#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn results(&self, query: &ResultQuery) -> Result<Url, ApiError> {
        let mut url = match &query.category {
            Some(category) => {
                self.with_segments(&["classification-results", "category", category.as_str()])?
            }
            None => self.with_segments(&["classification-results"])?,
        };
        url.query_pairs_mut()
            .append_pair("skip", &query.skip.to_string())
            .append_pair("limit", &query.limit.to_string());
        Ok(url)
    }

    pub fn process_batches(&self, request: &BatchRequest) -> Result<Url, ApiError> {
        let mut url = self.with_segments(&["process-email-batches"])?;
        url.query_pairs_mut()
            .append_pair("total_emails", &request.total_emails.to_string())
            .append_pair("batch_size", &request.batch_size.to_string())
            .append_pair("skip", &request.skip.to_string());
        Ok(url)
    }

    pub fn task_status(&self, task_id: &str) -> Result<Url, ApiError> {
        self.with_segments(&["task-status", task_id])
    }

    pub fn process_emails(&self, request: &ProcessEmailsRequest) -> Result<Url, ApiError> {
        let mut url = self.with_segments(&["process-emails"])?;
        url.query_pairs_mut()
            .append_pair("skip", &request.skip.to_string())
            .append_pair("batch_size", &request.batch_size.to_string());
        Ok(url)
    }

    fn with_segments(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
