use std::fmt;

/// Lifecycle of one remote batch-processing task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Completed,
    Failed(Option<String>),
    Unknown(String),
    TimedOut,
    Cancelled,
}

impl TaskState {
    pub fn from_status(status: &str, detail: Option<&str>) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "completed" => TaskState::Completed,
            "failed" | "error" => TaskState::Failed(detail.map(str::to_string)),
            "pending" | "queued" | "started" | "processing" | "running" | "in_progress" => {
                TaskState::Pending
            }
            _ => TaskState::Unknown(status.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed(_) | TaskState::TimedOut | TaskState::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed(Some(reason)) => write!(f, "failed: {reason}"),
            TaskState::Failed(None) => write!(f, "failed"),
            TaskState::Unknown(raw) if raw.is_empty() => write!(f, "unknown"),
            TaskState::Unknown(raw) => write!(f, "unknown ({raw})"),
            TaskState::TimedOut => write!(f, "timed out"),
            TaskState::Cancelled => write!(f, "cancelled"),
        }
    }
}
