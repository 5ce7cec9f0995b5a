use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::ClassificationResult;

const RESULT_KEYS: [&str; 5] = [
    "email_details",
    "classification_process",
    "initial_classification",
    "domain_analysis",
    "similar_emails",
];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Error reading file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON file format: {0}")]
    MalformedJson(#[source] serde_json::Error),
    #[error("Unrecognized JSON structure: expected a result list, a results object or a single result")]
    UnrecognizedFormat,
    #[error("Entry {index} is not a classification result: {source}")]
    InvalidEntry {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Which of the accepted layouts a document matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    BareArray,
    Envelope,
    ResultsObject,
    SingleResult,
}

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub shape: DocumentShape,
    pub results: Vec<ClassificationResult>,
}

pub async fn load_file(path: impl AsRef<Path>) -> Result<LoadedFile, IngestError> {
    let path = path.as_ref().to_path_buf();
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| IngestError::Unreadable {
            path: path.clone(),
            source,
        })?;
    let (shape, results) = parse_document(&text)?;
    tracing::info!(
        target: "ingest",
        path = %path.display(),
        ?shape,
        results = results.len(),
        "local result file loaded"
    );
    Ok(LoadedFile {
        path,
        shape,
        results,
    })
}

/// Normalizes one JSON document into a result list.
///
/// Layouts are tried in a fixed order and the first structural match wins.
pub fn parse_document(text: &str) -> Result<(DocumentShape, Vec<ClassificationResult>), IngestError> {
    let value: Value = serde_json::from_str(text).map_err(IngestError::MalformedJson)?;
    let (shape, entries) = classify_shape(value)?;
    let results = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| parse_entry(index, entry))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((shape, results))
}

fn classify_shape(value: Value) -> Result<(DocumentShape, Vec<Value>), IngestError> {
    match value {
        Value::Array(items) => Ok((DocumentShape::BareArray, items)),
        Value::Object(mut object) => {
            if object.contains_key("status") && matches!(object.get("results"), Some(Value::Array(_))) {
                return Ok((DocumentShape::Envelope, take_results(&mut object)));
            }
            if matches!(object.get("results"), Some(Value::Array(_))) {
                return Ok((DocumentShape::ResultsObject, take_results(&mut object)));
            }
            if RESULT_KEYS.iter().any(|key| object.contains_key(*key)) {
                return Ok((DocumentShape::SingleResult, vec![Value::Object(object)]));
            }
            Err(IngestError::UnrecognizedFormat)
        }
        _ => Err(IngestError::UnrecognizedFormat),
    }
}

fn take_results(object: &mut Map<String, Value>) -> Vec<Value> {
    match object.remove("results") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn parse_entry(index: usize, entry: Value) -> Result<ClassificationResult, IngestError> {
    if !entry.is_object() {
        let source = <serde_json::Error as serde::de::Error>::custom(format!(
            "expected an object, found {}",
            json_kind(&entry)
        ));
        return Err(IngestError::InvalidEntry { index, source });
    }
    serde_json::from_value(entry).map_err(|source| IngestError::InvalidEntry { index, source })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn sample_result() -> Value {
        json!({
            "email_details": { "id": "m-1", "subject": "Interview invite", "sender": "hr@acme.com" },
            "initial_classification": { "category": "Job", "confidence": 0.8 },
            "classification_process": {
                "iterations": [],
                "total_iterations": 1,
                "final_result": { "category": "Job", "confidence": 0.93 }
            },
            "similar_emails": [],
            "status": "success"
        })
    }

    #[test]
    fn envelope_and_bare_array_normalize_identically() {
        let envelope = json!({ "status": "ok", "results": [sample_result()] }).to_string();
        let array = json!([sample_result()]).to_string();

        let (envelope_shape, from_envelope) = parse_document(&envelope).unwrap();
        let (array_shape, from_array) = parse_document(&array).unwrap();

        assert_eq!(envelope_shape, DocumentShape::Envelope);
        assert_eq!(array_shape, DocumentShape::BareArray);
        assert_eq!(from_envelope, from_array);
        assert_eq!(from_array.len(), 1);
        assert_eq!(from_array[0].final_category(), "Job");
    }

    #[test]
    fn results_object_without_status_is_accepted() {
        let doc = json!({ "results": [sample_result(), sample_result()], "total": 2 }).to_string();
        let (shape, results) = parse_document(&doc).unwrap();
        assert_eq!(shape, DocumentShape::ResultsObject);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn single_result_object_becomes_one_element_list() {
        let (shape, results) = parse_document(&sample_result().to_string()).unwrap();
        assert_eq!(shape, DocumentShape::SingleResult);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].email_details.id.as_deref(), Some("m-1"));
    }

    #[test]
    fn other_shapes_are_unrecognized() {
        for doc in [
            r#"{"items": []}"#,
            r#"{"status": "ok", "results": "none"}"#,
            r#""just a string""#,
            "42",
            "null",
        ] {
            let err = parse_document(doc).unwrap_err();
            assert!(matches!(err, IngestError::UnrecognizedFormat), "{doc}: {err}");
        }
    }

    #[test]
    fn malformed_json_is_distinct_from_shape_errors() {
        let err = parse_document("{ not json").unwrap_err();
        assert!(matches!(err, IngestError::MalformedJson(_)));
        assert!(err.to_string().starts_with("Invalid JSON file format"));
    }

    #[test]
    fn non_object_entries_are_rejected_with_their_index() {
        let doc = json!([sample_result(), "oops"]).to_string();
        let err = parse_document(&doc).unwrap_err();
        assert!(matches!(err, IngestError::InvalidEntry { index: 1, .. }));
    }

    #[tokio::test]
    async fn load_file_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!({ "status": "ok", "results": [sample_result()] })).unwrap();

        let loaded = load_file(file.path()).await.unwrap();
        assert_eq!(loaded.shape, DocumentShape::Envelope);
        assert_eq!(loaded.results.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, IngestError::Unreadable { .. }));
    }
}
