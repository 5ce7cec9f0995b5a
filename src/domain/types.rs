use serde::{Deserialize, Serialize};

use super::result::{skip_invalid_results, skip_invalid_results_opt, ClassificationResult};

/// One page from the results listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
    #[serde(default, deserialize_with = "skip_invalid_results")]
    pub results: Vec<ClassificationResult>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Parameters of a results read. Also the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultQuery {
    pub category: Option<String>,
    pub skip: u64,
    pub limit: u64,
}

impl ResultQuery {
    pub fn new(skip: u64, limit: u64, category: Option<String>) -> Self {
        Self {
            category: category.filter(|c| !c.is_empty()),
            skip,
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRequest {
    pub total_emails: u64,
    pub batch_size: u64,
    pub skip: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub task_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "skip_invalid_results_opt")]
    pub results: Option<Vec<ClassificationResult>>,
    #[serde(default)]
    pub next_skip: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEmailsRequest {
    pub skip: u64,
    pub batch_size: u64,
}

/// One NDJSON line of the `/process-emails` stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessEmailsChunk {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "skip_invalid_results")]
    pub results: Vec<ClassificationResult>,
    #[serde(default)]
    pub total_processed: u64,
    #[serde(default)]
    pub next_skip: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProcessEmailsChunk {
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }

    pub fn is_exhausted(&self) -> bool {
        self.status == "no_emails"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn one_malformed_result_does_not_drop_the_page() {
        let page: ResultPage = serde_json::from_value(json!({
            "results": [
                { "email_details": { "subject": "good" } },
                { "domain_analysis": { "job_related_indicators": { "has_company_sender": "yes" } } },
                { "email_details": { "subject": "also good" } }
            ],
            "total": 3
        }))
        .unwrap();

        let subjects: Vec<_> = page
            .results
            .iter()
            .filter_map(|r| r.email_details.subject.as_deref())
            .collect();
        assert_eq!(subjects, vec!["good", "also good"]);
        assert_eq!(page.total, Some(3));
    }

    #[test]
    fn null_result_lists_are_empty() {
        let chunk: ProcessEmailsChunk =
            serde_json::from_value(json!({ "status": "success", "results": null })).unwrap();
        assert!(chunk.results.is_empty());

        let batch: BatchResponse = serde_json::from_value(json!({ "task_ids": ["t"] })).unwrap();
        assert!(batch.results.is_none());
    }
}
