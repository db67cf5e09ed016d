use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by a task group while submitting or joining.
#[derive(Error, Debug)]
pub enum GroupError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Duplicate task label: {0}")]
    DuplicateLabel(String),

    #[error("Task {label} failed: {source}")]
    TaskFailure {
        label: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Task {label} was cancelled")]
    Cancelled {
        label: String,
    },

    #[error("Failed to spawn worker for task {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout error: join exceeded {elapsed_ms} ms")]
    Timeout {
        elapsed_ms: u64,
    },
}

impl GroupError {
    /// Label of the task this error belongs to, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            GroupError::TaskFailure { label, .. }
            | GroupError::Cancelled { label }
            | GroupError::Spawn { label, .. } => Some(label),
            GroupError::DuplicateLabel(label) => Some(label),
            GroupError::InvalidState(_) | GroupError::Timeout { .. } => None,
        }
    }

    /// Classify the error returned by a task operation.
    ///
    /// An operation that bailed out through [`crate::engine::Cancelled`] is reported
    /// as `Cancelled`; anything else is a `TaskFailure`.
    pub(crate) fn from_task(label: &str, error: anyhow::Error) -> Self {
        if error.chain().any(|cause| cause.is::<crate::engine::Cancelled>()) {
            GroupError::Cancelled { label: label.to_string() }
        } else {
            GroupError::TaskFailure {
                label: label.to_string(),
                source: error,
            }
        }
    }
}

pub type GroupResult<T> = std::result::Result<T, GroupError>;

/// Application level errors for the embedding program.
#[derive(Error, Debug)]
pub enum TaskScopeError {
    #[error(transparent)]
    Group(#[from] GroupError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File error: {path:?} - {message}")]
    FileError {
        path: PathBuf,
        message: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type TaskScopeResult<T> = std::result::Result<T, TaskScopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failure_carries_label_and_cause() {
        let err = GroupError::from_task("Service B", anyhow::anyhow!("boom"));

        assert_eq!(err.label(), Some("Service B"));
        assert_eq!(err.to_string(), "Task Service B failed: boom");
        assert!(matches!(err, GroupError::TaskFailure { .. }));
    }

    #[test]
    fn test_cancelled_marker_is_classified() {
        let err = GroupError::from_task("Service A", crate::engine::Cancelled.into());

        assert!(matches!(err, GroupError::Cancelled { ref label } if label == "Service A"));
    }

    #[test]
    fn test_group_error_converts_into_app_error() {
        let err: TaskScopeError = GroupError::InvalidState("already joined".to_string()).into();

        assert_eq!(err.to_string(), "Invalid state: already joined");
    }
}
