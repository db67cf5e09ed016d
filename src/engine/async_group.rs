// src/engine/async_group.rs
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{info, debug, warn};
use uuid::Uuid;

use crate::error::{GroupError, GroupResult};
use super::cancel::{Cancelled, CancellationToken};
use super::group::panic_message;
use super::outcome::{Collector, Outcome, Settled, TaskResults};
use super::task::{AsyncOperation, Task, TaskFuture};

/// Submission index, operation result and run time of one spawned task
type TaskOutput = (usize, anyhow::Result<String>, Duration);

/// Fork/join group on the tokio runtime.
///
/// Same contract as [`TaskGroup`](super::TaskGroup), with two extras: on the
/// first failure every outstanding task is aborted, not just signalled, and
/// `join` can be bounded by a deadline.
pub struct AsyncTaskGroup {
    id: Uuid,
    tasks: Vec<Task<AsyncOperation>>,
    token: CancellationToken,
    max_concurrency: Option<usize>,
    unique_labels: bool,
    timeout: Option<Duration>,
    joined: bool,
}

impl Default for AsyncTaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncTaskGroup {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            tasks: Vec::new(),
            token: CancellationToken::new(),
            max_concurrency: None,
            unique_labels: false,
            timeout: None,
            joined: false,
        }
    }

    /// Limit how many operations run at once. Zero means unbounded.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = (limit > 0).then_some(limit);
        self
    }

    pub fn with_unique_labels(mut self, unique: bool) -> Self {
        self.unique_labels = unique;
        self
    }

    /// Fail `join` with `Timeout` if the group has not settled within `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a future factory; it is called once the task is scheduled
    pub fn submit<F, Fut>(&mut self, label: impl Into<String>, operation: F) -> GroupResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.push(label.into(), Box::new(move |_: CancellationToken| -> TaskFuture { Box::pin(operation()) }))
    }

    /// Register a future factory that receives the group's cancellation token
    pub fn submit_cancellable<F, Fut>(&mut self, label: impl Into<String>, operation: F) -> GroupResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.push(label.into(), Box::new(move |token: CancellationToken| -> TaskFuture { Box::pin(operation(token)) }))
    }

    fn push(&mut self, label: String, operation: AsyncOperation) -> GroupResult<()> {
        if self.joined {
            return Err(GroupError::InvalidState(format!(
                "cannot submit {} to group {}: already joined",
                label, self.id
            )));
        }
        if self.unique_labels && self.tasks.iter().any(|task| task.label == label) {
            return Err(GroupError::DuplicateLabel(label));
        }

        debug!("Group {}: submitted task {}", self.id, label);
        self.tasks.push(Task::new(label, operation));
        Ok(())
    }

    fn seal(&mut self) -> GroupResult<Vec<Task<AsyncOperation>>> {
        if self.joined {
            return Err(GroupError::InvalidState(format!("group {} has already been joined", self.id)));
        }
        self.joined = true;
        Ok(std::mem::take(&mut self.tasks))
    }

    /// Spawn every task and wait for all values or the first failure.
    ///
    /// Every spawned task is reaped before this returns. Dropping the future
    /// early aborts whatever is still running.
    pub async fn join(&mut self) -> Outcome {
        let tasks = self.seal()?;
        if tasks.is_empty() {
            info!("Group {}: no tasks to join", self.id);
            return Ok(TaskResults::new());
        }

        info!("Group {}: joining {} tasks", self.id, tasks.len());
        let started = Instant::now();
        let labels: Vec<String> = tasks.iter().map(|task| task.label.clone()).collect();
        let mut collector = Collector::new(self.id, labels.clone());
        let mut set = JoinSet::new();
        let indices = self.spawn_all(&mut set, tasks);

        let deadline = self.timeout.map(|timeout| tokio::time::Instant::now() + timeout);
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(deadline) if !timed_out => match tokio::time::timeout_at(deadline, set.join_next_with_id()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        collector.fail(GroupError::Timeout { elapsed_ms });
                        self.abort_outstanding(&mut set);
                        timed_out = true;
                        continue;
                    }
                },
                _ => set.join_next_with_id().await,
            };

            let Some(joined) = next else { break };
            let Some((index, result, _elapsed)) = self.settle(&indices, &labels, joined, started) else { continue };
            if collector.record(index, result) {
                self.abort_outstanding(&mut set);
            }
        }

        let outcome = collector.finish();
        match &outcome {
            Ok(results) => info!("Group {}: {} tasks completed in {:?}", self.id, results.len(), started.elapsed()),
            Err(e) => info!("Group {}: failed after {:?}: {}", self.id, started.elapsed(), e),
        }
        outcome
    }

    /// Run every task to completion and report each one in submission order.
    /// A configured timeout is ignored here.
    pub async fn join_settled(&mut self) -> GroupResult<Vec<Settled>> {
        let tasks = self.seal()?;
        info!("Group {}: settling {} tasks", self.id, tasks.len());

        let started = Instant::now();
        let labels: Vec<String> = tasks.iter().map(|task| task.label.clone()).collect();
        let mut settled: Vec<Option<Settled>> = labels.iter().map(|_| None).collect();
        let mut set = JoinSet::new();
        let indices = self.spawn_all(&mut set, tasks);

        while let Some(joined) = set.join_next_with_id().await {
            if let Some((index, result, elapsed)) = self.settle(&indices, &labels, joined, started) {
                let label = labels[index].clone();
                settled[index] = Some(Settled { index, label, result, elapsed });
            }
        }

        let settled: Vec<Settled> = settled.into_iter().flatten().collect();
        let failed = settled.iter().filter(|s| !s.is_ok()).count();
        info!("Group {}: settled {} tasks, {} failed", self.id, settled.len(), failed);
        Ok(settled)
    }

    /// Spawn every task into `set`. Returns the submission index of each tokio task id,
    /// so panics and aborts can be attributed.
    fn spawn_all(&self, set: &mut JoinSet<TaskOutput>, tasks: Vec<Task<AsyncOperation>>) -> HashMap<Id, usize> {
        let semaphore = self.max_concurrency.map(|limit| Arc::new(Semaphore::new(limit)));
        let mut indices = HashMap::with_capacity(tasks.len());

        for (index, task) in tasks.into_iter().enumerate() {
            let Task { label, operation } = task;
            let token = self.token.clone();
            let semaphore = semaphore.clone();
            let group_id = self.id;

            let handle = set.spawn(async move {
                let started = Instant::now();
                let result = run_operation(group_id, label, operation, token, semaphore).await;
                (index, result, started.elapsed())
            });
            indices.insert(handle.id(), index);
        }

        indices
    }

    /// Cancel the token and abort every task still in `set`. The set keeps the
    /// aborted tasks until they are joined.
    fn abort_outstanding(&self, set: &mut JoinSet<TaskOutput>) {
        if !self.token.is_cancelled() {
            debug!("Group {}: cancelling {} outstanding tasks", self.id, set.len());
        }
        self.token.cancel();
        set.abort_all();
    }

    fn settle(
        &self,
        indices: &HashMap<Id, usize>,
        labels: &[String],
        joined: Result<(Id, TaskOutput), JoinError>,
        since: Instant,
    ) -> Option<(usize, GroupResult<String>, Duration)> {
        match joined {
            Ok((_, (index, result, elapsed))) => {
                let result = result.map_err(|e| GroupError::from_task(&labels[index], e));
                Some((index, result, elapsed))
            }
            Err(e) => {
                let Some(&index) = indices.get(&e.id()) else {
                    warn!("Group {}: unknown task {} finished: {}", self.id, e.id(), e);
                    return None;
                };
                Some((index, Err(Self::join_failure(&labels[index], e)), since.elapsed()))
            }
        }
    }

    fn join_failure(label: &str, error: JoinError) -> GroupError {
        if error.is_cancelled() {
            return GroupError::Cancelled { label: label.to_string() };
        }
        let message = error.try_into_panic()
            .map(|payload| panic_message(payload.as_ref()))
            .unwrap_or_else(|e| e.to_string());
        warn!("Task {} panicked: {}", label, message);
        GroupError::TaskFailure {
            label: label.to_string(),
            source: anyhow::anyhow!("task panicked: {}", message),
        }
    }
}

async fn run_operation(
    group_id: Uuid,
    label: String,
    operation: AsyncOperation,
    token: CancellationToken,
    semaphore: Option<Arc<Semaphore>>,
) -> anyhow::Result<String> {
    let _permit = match semaphore {
        Some(semaphore) => Some(semaphore.acquire_owned().await?),
        None => None,
    };
    if token.is_cancelled() {
        debug!("Group {}: skipping {} after cancellation", group_id, label);
        return Err(Cancelled.into());
    }
    operation(token).await
}
