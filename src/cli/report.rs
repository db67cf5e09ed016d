// src/cli/report.rs
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::engine::{Outcome, Settled};
use crate::error::{TaskScopeError, TaskScopeResult};

/// Overall status of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

/// Per-task line of a run report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskReport {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// What a group produced, depending on how it was joined
#[derive(Debug)]
pub enum RunBody {
    Joined(Outcome),
    Settled(Vec<Settled>),
}

/// Serializable summary of one group run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub group_id: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub results: Vec<TaskReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(group_id: Uuid, mode: &str, started_at: DateTime<Utc>, body: RunBody) -> Self {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        let (status, results, error) = match body {
            RunBody::Joined(Ok(results)) => {
                let results = results
                    .into_iter()
                    .map(|entry| TaskReport {
                        label: entry.label,
                        value: Some(entry.value),
                        error: None,
                        elapsed_ms: None,
                    })
                    .collect();
                (RunStatus::Success, results, None)
            }
            RunBody::Joined(Err(e)) => (RunStatus::Failed, Vec::new(), Some(e.to_string())),
            RunBody::Settled(settled) => {
                let failed = settled.iter().filter(|s| !s.is_ok()).count();
                let status = match failed {
                    0 => RunStatus::Success,
                    n if n == settled.len() => RunStatus::Failed,
                    _ => RunStatus::Partial,
                };
                let results = settled
                    .into_iter()
                    .map(|s| {
                        let (value, error) = match s.result {
                            Ok(value) => (Some(value), None),
                            Err(e) => (None, Some(e.to_string())),
                        };
                        TaskReport {
                            label: s.label,
                            value,
                            error,
                            elapsed_ms: Some(s.elapsed.as_millis() as u64),
                        }
                    })
                    .collect();
                (status, results, None)
            }
        };

        Self {
            group_id: group_id.to_string(),
            mode: mode.to_string(),
            started_at,
            finished_at,
            duration_ms,
            status,
            results,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Save the report as pretty JSON
    pub fn save(&self, path: &Path) -> TaskScopeResult<()> {
        info!("Saving run report to {}", path.display());

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TaskScopeError::SerializationError(format!("Failed to serialize report: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| TaskScopeError::FileError {
                path: path.to_path_buf(),
                message: format!("Failed to write file: {}", e),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::engine::TaskResults;
    use crate::error::GroupError;

    #[test]
    fn test_failed_join_has_no_results() {
        let body = RunBody::Joined(Err(GroupError::TaskFailure {
            label: "Service B".to_string(),
            source: anyhow::anyhow!("boom"),
        }));

        let report = RunReport::new(Uuid::new_v4(), "threads", Utc::now(), body);

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.results.is_empty());
        assert_eq!(report.error.as_deref(), Some("Task Service B failed: boom"));
    }

    #[test]
    fn test_empty_join_is_success() {
        let report = RunReport::new(Uuid::new_v4(), "async", Utc::now(), RunBody::Joined(Ok(TaskResults::new())));

        assert!(report.is_success());
        assert!(report.results.is_empty());
    }

    #[test]
    fn test_settled_with_some_failures_is_partial() {
        let settled = vec![
            Settled {
                index: 0,
                label: "a".to_string(),
                result: Ok("a response".to_string()),
                elapsed: Duration::from_millis(12),
            },
            Settled {
                index: 1,
                label: "b".to_string(),
                result: Err(GroupError::Cancelled { label: "b".to_string() }),
                elapsed: Duration::ZERO,
            },
        ];

        let report = RunReport::new(Uuid::new_v4(), "threads", Utc::now(), RunBody::Settled(settled));

        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.results[0].value.as_deref(), Some("a response"));
        assert_eq!(report.results[0].elapsed_ms, Some(12));
        assert_eq!(report.results[1].error.as_deref(), Some("Task b was cancelled"));
    }
}
