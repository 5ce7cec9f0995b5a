use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// One classified email as produced by the remote pipeline.
///
/// Every field is optional on the wire; rendering substitutes placeholders
/// for anything missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationResult {
    #[serde(deserialize_with = "null_default")]
    pub email_details: EmailDetails,
    #[serde(deserialize_with = "null_default")]
    pub domain_analysis: DomainAnalysis,
    #[serde(deserialize_with = "null_default")]
    pub initial_classification: Classification,
    #[serde(deserialize_with = "null_default")]
    pub similar_emails: Vec<SimilarEmail>,
    #[serde(deserialize_with = "null_default")]
    pub classification_process: ClassificationProcess,
    pub status: Option<String>,
}

impl ClassificationResult {
    /// Category of the final verdict, or `"Unknown"` when the service omitted it.
    pub fn final_category(&self) -> &str {
        self.classification_process
            .final_result
            .category
            .as_deref()
            .filter(|category| !category.is_empty())
            .unwrap_or(UNKNOWN_CATEGORY)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailDetails {
    pub id: Option<String>,
    pub subject: Option<String>,
    pub sender: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub recipients: Vec<Recipient>,
    pub sent_date: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipient {
    #[serde(rename = "emailAddress", deserialize_with = "null_default")]
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailAddress {
    pub address: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainAnalysis {
    pub sender_is_company: Option<bool>,
    pub sender_is_generic: Option<bool>,
    pub sender_domain: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub recipient_domains: Vec<Value>,
    #[serde(deserialize_with = "null_default")]
    pub recipient_analysis: RecipientAnalysis,
    pub is_likely_candidate_email: Option<bool>,
    pub confidence: Option<f64>,
    #[serde(deserialize_with = "null_default")]
    pub reasoning: Vec<Value>,
    #[serde(deserialize_with = "null_default")]
    pub job_related_indicators: JobRelatedIndicators,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientAnalysis {
    pub company_domains: Option<u32>,
    pub generic_domains: Option<u32>,
    pub other_domains: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRelatedIndicators {
    pub has_company_sender: Option<bool>,
    pub has_generic_recipients: Option<bool>,
    pub is_internal_communication: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    pub category: Option<String>,
    pub confidence: Option<f64>,
    pub rationale: Option<String>,
    pub uncertainty_points: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationProcess {
    #[serde(deserialize_with = "null_default")]
    pub iterations: Vec<IterationResult>,
    pub total_iterations: Option<u32>,
    #[serde(deserialize_with = "null_default")]
    pub final_result: Classification,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationResult {
    pub iteration: Option<u32>,
    #[serde(deserialize_with = "null_default")]
    pub classification: Classification,
    pub questions: Option<IterationQuestions>,
    pub additional_context: Option<Vec<Value>>,
}

/// Follow-up questions raised during one iteration, either flat or grouped by stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IterationQuestions {
    List(Vec<QuestionItem>),
    Staged(Map<String, Value>),
}

impl IterationQuestions {
    /// Stage groups in service order. Stages whose value is not a list are skipped.
    pub fn stages(&self) -> Vec<(String, Vec<QuestionItem>)> {
        match self {
            IterationQuestions::List(_) => Vec::new(),
            IterationQuestions::Staged(map) => map
                .iter()
                .filter_map(|(stage, value)| match value {
                    Value::Array(items) => Some((
                        stage.clone(),
                        items.iter().cloned().map(QuestionItem::from_value).collect(),
                    )),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionItem {
    Structured {
        question: String,
        #[serde(default)]
        purpose: Option<String>,
    },
    Other(Value),
}

impl QuestionItem {
    fn from_value(value: Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(QuestionItem::Other(value))
    }

    pub fn text(&self) -> String {
        match self {
            QuestionItem::Structured { question, .. } => question.clone(),
            QuestionItem::Other(value) => value_text(value),
        }
    }
}

/// Display text for a free-form list entry. Strings are shown unquoted.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarEmail {
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Score")]
    pub score: Option<Score>,
}

/// Similarity score; the service sends it as a string but numbers are accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Number(f64),
    Text(String),
}

impl Score {
    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Number(value) => Some(*value),
            Score::Text(text) => text.trim().parse::<f64>().ok(),
        }
        .filter(|value| value.is_finite())
    }
}

fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decodes a result list entry by entry, dropping entries that are not
/// classification results instead of failing the whole list.
pub(crate) fn skip_invalid_results<'de, D>(
    deserializer: D,
) -> Result<Vec<ClassificationResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Vec<Value> = null_default(deserializer)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::warn!(target: "fetch", index, error = %err, "skipping malformed classification result");
                None
            }
        })
        .collect())
}

pub(crate) fn skip_invalid_results_opt<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<ClassificationResult>>, D::Error>
where
    D: Deserializer<'de>,
{
    skip_invalid_results(deserializer).map(Some)
}
