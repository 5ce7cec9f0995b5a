use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::domain::{
    result::{value_text, Classification, IterationQuestions, SimilarEmail},
    ClassificationResult, TaskState,
};

use super::state::{DashboardState, DataSource};

const NOT_AVAILABLE: &str = "N/A";
const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceLevel::High
        } else if confidence >= 0.7 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

/// Plain-text renderer for the dashboard.
pub struct Renderer {
    tz: Tz,
}

impl Renderer {
    pub fn new(timezone: &str) -> Self {
        let tz = timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(target: "app", timezone, "unknown timezone; falling back to UTC");
            chrono_tz::UTC
        });
        Self { tz }
    }

    pub fn render_dashboard(
        &self,
        state: &DashboardState,
        tasks: &[(String, TaskState, Duration)],
    ) -> String {
        let mut out = String::new();
        out.push_str("=== Email Classification Dashboard ===\n");
        out.push_str(&self.render_status_line(state));

        if state.is_loading() && state.active_source() == DataSource::Remote {
            out.push_str("Loading...\n");
        }
        if let Some(error) = state.error() {
            out.push_str(&format!("!! {error}\n"));
        }
        if !tasks.is_empty() {
            let listed: Vec<String> = tasks
                .iter()
                .map(|(id, task_state, age)| format!("{id} ({task_state}, {}s)", age.as_secs()))
                .collect();
            out.push_str(&format!("Active tasks: {}\n", listed.join(", ")));
        }
        if state.bulk_running() {
            out.push_str(&format!("Processed: {} emails\n", state.bulk_processed()));
        }

        let source_results = state.source_results();
        if source_results.is_empty() {
            out.push_str("\nNo classification results to show.\n");
            return out;
        }

        out.push_str("\n--- Category Summary ---\n");
        for entry in state.category_summary() {
            let marker = if state.filter() == Some(entry.category.as_str()) {
                "*"
            } else {
                " "
            };
            out.push_str(&format!("{marker} {:<24} {}\n", entry.category, entry.count));
        }

        let visible = state.visible_results();
        let mut totals = format!("Total Emails Processed: {}", source_results.len());
        if let Some(category) = state.filter() {
            totals.push_str(&format!(" | Showing {} {category} emails", visible.len()));
        }
        out.push_str(&totals);
        out.push('\n');

        for (index, result) in visible.iter().enumerate() {
            out.push_str(&format!("\n##### Result {} #####\n", index + 1));
            out.push_str(&self.render_result(result));
        }

        out.push_str(&render_pagination(state));
        out
    }

    fn render_status_line(&self, state: &DashboardState) -> String {
        let cursor = state.cursor();
        let shown = state.source_results().len() as u64;
        let range = if shown == 0 {
            "-".to_string()
        } else {
            format!("{}-{}", cursor.skip + 1, cursor.skip + shown)
        };
        let total = state
            .source_total()
            .map(|total| total.to_string())
            .unwrap_or_else(|| "?".to_string());
        let mut line = format!(
            "Source: {} | Showing {range} of {total}",
            state.active_source()
        );
        if let Some(path) = state.local_path() {
            line.push_str(&format!(" | File: {}", path.display()));
        }
        if let Some(category) = state.filter() {
            line.push_str(&format!(" | Filter: {category}"));
        }
        line.push('\n');
        line
    }

    pub fn render_result(&self, result: &ClassificationResult) -> String {
        let mut out = String::new();
        out.push_str(&render_email_details(result));
        out.push_str(&render_domain_analysis(result));
        out.push_str(&render_initial_classification(&result.initial_classification));
        out.push_str(&render_process(result));
        out.push_str(&self.render_similar_emails(&result.similar_emails));
        out
    }

    fn render_similar_emails(&self, emails: &[SimilarEmail]) -> String {
        let mut out = String::from("[Similar Emails]\n");
        if emails.is_empty() {
            out.push_str("  (none)\n");
            return out;
        }
        out.push_str("  Subject | From | Date | Score\n");
        for email in emails {
            out.push_str(&format!(
                "  {} | {} | {} | {}\n",
                or_placeholder(email.subject.as_deref(), NOT_AVAILABLE),
                or_placeholder(email.from.as_deref(), NOT_AVAILABLE),
                email
                    .date
                    .as_deref()
                    .map(|raw| self.format_date(raw))
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                format_score(email),
            ));
        }
        out
    }

    /// Shows a service timestamp in the configured zone, or verbatim if it cannot be parsed.
    pub fn format_date(&self, raw: &str) -> String {
        match parse_timestamp(raw) {
            Some(utc) => utc
                .with_timezone(&self.tz)
                .format("%Y-%m-%d %H:%M:%S %Z")
                .to_string(),
            None => raw.to_string(),
        }
    }
}

fn render_email_details(result: &ClassificationResult) -> String {
    let details = &result.email_details;
    let recipients: Vec<&str> = details
        .recipients
        .iter()
        .filter_map(|r| r.email_address.address.as_deref())
        .collect();
    let to = if recipients.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        recipients.join(", ")
    };

    let mut out = String::from("[Email Details]\n");
    out.push_str(&format!(
        "  Subject: {}\n",
        or_placeholder(details.subject.as_deref(), NOT_AVAILABLE)
    ));
    out.push_str(&format!(
        "  From: {}\n",
        or_placeholder(details.sender.as_deref(), NOT_AVAILABLE)
    ));
    out.push_str(&format!("  To: {to}\n"));
    out.push_str("  Body:\n");
    for line in or_placeholder(details.body.as_deref(), NOT_AVAILABLE).lines() {
        out.push_str(&format!("    {line}\n"));
    }
    out
}

fn render_domain_analysis(result: &ClassificationResult) -> String {
    let analysis = &result.domain_analysis;
    let company = match analysis.sender_is_company {
        Some(true) => "Yes",
        Some(false) => "No",
        None => UNKNOWN,
    };

    let mut out = String::from("[Domain Analysis]\n");
    out.push_str(&format!(
        "  Sender Domain: {}\n",
        or_placeholder(analysis.sender_domain.as_deref(), NOT_AVAILABLE)
    ));
    out.push_str(&format!("  Is Company Sender: {company}\n"));
    out.push_str("  Analysis Reasoning:\n");
    push_bullets(&mut out, &analysis.reasoning, "    ");
    out
}

fn render_initial_classification(classification: &Classification) -> String {
    let mut out = String::from("[Initial Classification]\n");
    out.push_str(&format!(
        "  Category: {}\n",
        or_placeholder(classification.category.as_deref(), UNKNOWN)
    ));
    out.push_str(&format!(
        "  Confidence: {}\n",
        confidence_badge(classification.confidence)
    ));
    out.push_str("  Uncertainty Points:\n");
    push_bullets(
        &mut out,
        classification.uncertainty_points.as_deref().unwrap_or_default(),
        "    ",
    );
    out
}

fn render_process(result: &ClassificationResult) -> String {
    let process = &result.classification_process;
    let mut out = String::from("[Classification Process]\n");

    for (index, iteration) in process.iterations.iter().enumerate() {
        let number = iteration.iteration.unwrap_or(index as u32 + 1);
        let classification = &iteration.classification;
        out.push_str(&format!("  Iteration {number}\n"));
        out.push_str(&format!(
            "    Category: {}\n",
            or_placeholder(classification.category.as_deref(), UNKNOWN)
        ));
        out.push_str(&format!(
            "    Confidence: {}\n",
            confidence_badge(classification.confidence)
        ));
        out.push_str(&format!(
            "    Rationale: {}\n",
            or_placeholder(classification.rationale.as_deref(), NOT_AVAILABLE)
        ));

        if let Some(questions) = &iteration.questions {
            out.push_str("    Questions Generated:\n");
            match questions {
                IterationQuestions::List(items) => {
                    for item in items {
                        out.push_str(&format!("      - {}\n", item.text()));
                    }
                }
                IterationQuestions::Staged(_) => {
                    for (stage, items) in questions.stages() {
                        out.push_str(&format!("      {}:\n", stage.replace('_', " ")));
                        for item in items {
                            out.push_str(&format!("        - {}\n", item.text()));
                        }
                    }
                }
            }
        }

        if let Some(context) = &iteration.additional_context {
            out.push_str("    Additional Context:\n");
            push_bullets(&mut out, context, "      ");
        }
    }

    let final_result = &process.final_result;
    out.push_str(&format!(
        "  Final Result: {} | Confidence: {}\n",
        result.final_category(),
        confidence_badge(final_result.confidence)
    ));
    out
}

fn render_pagination(state: &DashboardState) -> String {
    let prev = if state.can_prev() { "[prev]" } else { " prev " };
    let next = if state.can_next() { "[next]" } else { " next " };
    format!("\n{prev} {next}\n")
}

fn push_bullets(out: &mut String, items: &[Value], indent: &str) {
    for item in items {
        out.push_str(&format!("{indent}- {}\n", value_text(item)));
    }
}

fn or_placeholder<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(placeholder)
}

/// `"87%"`, rounding half away from zero; a missing confidence counts as zero.
pub fn confidence_percent(confidence: Option<f64>) -> String {
    let value = confidence.filter(|c| c.is_finite()).unwrap_or(0.0);
    format!("{}%", (value * 100.0).round() as i64)
}

fn confidence_badge(confidence: Option<f64>) -> String {
    let level = ConfidenceLevel::from_confidence(confidence.unwrap_or(0.0));
    format!("{} ({})", confidence_percent(confidence), level.label())
}

fn format_score(email: &SimilarEmail) -> String {
    email
        .score
        .as_ref()
        .and_then(|score| score.value())
        .map(|value| confidence_percent(Some(value)))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
