// src/engine/task.rs
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{info, debug};
use serde::{Serialize, Deserialize};

use crate::error::{TaskScopeResult, TaskScopeError};
use super::cancel::CancellationToken;

/// Blocking operation run on a worker thread.
pub type BlockingOperation<'a> =
    Box<dyn FnOnce(&CancellationToken) -> anyhow::Result<String> + Send + 'a>;

/// Boxed future produced by an async operation.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'static>>;

/// Deferred async operation; it is only called once the task is scheduled.
pub type AsyncOperation = Box<dyn FnOnce(CancellationToken) -> TaskFuture + Send + 'static>;

/// A labelled unit of work owned by a group until it is joined.
pub struct Task<Op> {
    pub label: String,
    pub(crate) operation: Op,
}

impl<Op> Task<Op> {
    pub fn new(label: impl Into<String>, operation: Op) -> Self {
        Self {
            label: label.into(),
            operation,
        }
    }
}

impl<Op> std::fmt::Debug for Task<Op> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Serializable description of a simulated task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
}

impl TaskSpec {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            delay_ms: None,
            fail: None,
        }
    }

    /// Load task specs from a JSON file
    pub fn load_all(path: &Path) -> TaskScopeResult<Vec<TaskSpec>> {
        info!("Loading tasks from {}", path.display());

        let json = std::fs::read_to_string(path)
            .map_err(|e| TaskScopeError::FileError {
                path: path.to_path_buf(),
                message: format!("Failed to read file: {}", e),
            })?;

        let specs: Vec<TaskSpec> = serde_json::from_str(&json)
            .map_err(|e| TaskScopeError::SerializationError(format!("Failed to parse JSON: {}", e)))?;

        if let Some(spec) = specs.iter().find(|spec| spec.label.trim().is_empty()) {
            return Err(TaskScopeError::InvalidInput(format!("Task with empty label: {:?}", spec)));
        }

        debug!("Loaded {} task specs", specs.len());
        Ok(specs)
    }

    /// Save task specs to a JSON file
    pub fn save_all(specs: &[TaskSpec], path: &Path) -> TaskScopeResult<()> {
        info!("Saving {} tasks to {}", specs.len(), path.display());

        let json = serde_json::to_string_pretty(specs)
            .map_err(|e| TaskScopeError::SerializationError(format!("Failed to serialize tasks: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| TaskScopeError::FileError {
                path: path.to_path_buf(),
                message: format!("Failed to write file: {}", e),
            })?;

        Ok(())
    }
}
