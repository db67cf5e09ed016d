// src/engine/group.rs
use std::any::Any;
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use tracing::{info, debug, warn};
use uuid::Uuid;

use crate::error::{GroupError, GroupResult};
use super::cancel::CancellationToken;
use super::outcome::{Collector, Outcome, Settled, TaskResults};
use super::task::{BlockingOperation, Task};

type Queue<'a> = Mutex<VecDeque<(usize, Task<BlockingOperation<'a>>)>>;

/// A finished (or skipped) task as seen by the joining thread
struct Completion {
    index: usize,
    label: String,
    result: GroupResult<String>,
    elapsed: Duration,
}

/// Fork/join group backed by scoped worker threads.
///
/// Tasks are registered with [`submit`](Self::submit) and run when the group is
/// joined. By default every task gets its own thread. The first failure, in
/// completion order, cancels the group's token and becomes the outcome; tasks
/// that have not started yet are skipped. All worker threads are joined before
/// `join` returns, so operations may borrow from the caller's stack.
pub struct TaskGroup<'a> {
    id: Uuid,
    tasks: Vec<Task<BlockingOperation<'a>>>,
    token: CancellationToken,
    max_concurrency: Option<usize>,
    unique_labels: bool,
    joined: bool,
}

impl<'a> Default for TaskGroup<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> TaskGroup<'a> {
    /// Create an empty, unbounded group
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            tasks: Vec::new(),
            token: CancellationToken::new(),
            max_concurrency: None,
            unique_labels: false,
            joined: false,
        }
    }

    /// Cap the number of worker threads. Zero means unbounded.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = (limit > 0).then_some(limit);
        self
    }

    /// Reject repeated labels at submit time
    pub fn with_unique_labels(mut self, unique: bool) -> Self {
        self.unique_labels = unique;
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

    /// Token shared with every task of this group; cancelling it from outside
    /// makes unstarted tasks report `Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register an operation that does not look at cancellation
    pub fn submit<F>(&mut self, label: impl Into<String>, operation: F) -> GroupResult<()>
    where
        F: FnOnce() -> anyhow::Result<String> + Send + 'a,
    {
        self.push(label.into(), Box::new(move |_: &CancellationToken| operation()))
    }

    /// Register an operation that polls the group's cancellation token
    pub fn submit_cancellable<F>(&mut self, label: impl Into<String>, operation: F) -> GroupResult<()>
    where
        F: FnOnce(&CancellationToken) -> anyhow::Result<String> + Send + 'a,
    {
        self.push(label.into(), Box::new(operation))
    }

    fn push(&mut self, label: String, operation: BlockingOperation<'a>) -> GroupResult<()> {
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

    fn seal(&mut self) -> GroupResult<Vec<Task<BlockingOperation<'a>>>> {
        if self.joined {
            return Err(GroupError::InvalidState(format!("group {} has already been joined", self.id)));
        }
        self.joined = true;
        Ok(std::mem::take(&mut self.tasks))
    }

    /// Run every task and wait. Returns all values in submission order, or the
    /// first failure observed.
    pub fn join(&mut self) -> Outcome {
        let tasks = self.seal()?;
        if tasks.is_empty() {
            info!("Group {}: no tasks to join", self.id);
            return Ok(TaskResults::new());
        }

        info!("Group {}: joining {} tasks", self.id, tasks.len());
        let started = Instant::now();

        let labels = tasks.iter().map(|task| task.label.clone()).collect();
        let mut collector = Collector::new(self.id, labels);
        self.execute(tasks, true, |completion| {
            collector.record(completion.index, completion.result);
        })?;

        let outcome = collector.finish();
        match &outcome {
            Ok(results) => info!("Group {}: {} tasks completed in {:?}", self.id, results.len(), started.elapsed()),
            Err(e) => info!("Group {}: failed after {:?}: {}", self.id, started.elapsed(), e),
        }
        outcome
    }

    /// Run every task to completion, without cancelling on failure, and report
    /// each one in submission order.
    pub fn join_settled(&mut self) -> GroupResult<Vec<Settled>> {
        let tasks = self.seal()?;
        info!("Group {}: settling {} tasks", self.id, tasks.len());

        let mut settled: Vec<Option<Settled>> = tasks.iter().map(|_| None).collect();
        self.execute(tasks, false, |completion| {
            settled[completion.index] = Some(Settled {
                index: completion.index,
                label: completion.label,
                result: completion.result,
                elapsed: completion.elapsed,
            });
        })?;

        let settled: Vec<Settled> = settled.into_iter().flatten().collect();
        let failed = settled.iter().filter(|s| !s.is_ok()).count();
        info!("Group {}: settled {} tasks, {} failed", self.id, settled.len(), failed);
        Ok(settled)
    }

    fn execute<F>(&self, tasks: Vec<Task<BlockingOperation<'a>>>, fail_fast: bool, mut on_complete: F) -> GroupResult<()>
    where
        F: FnMut(Completion),
    {
        let total = tasks.len();
        let workers = self.max_concurrency.map_or(total, |limit| limit.min(total));
        let queue: Queue<'a> = Mutex::new(tasks.into_iter().enumerate().collect());
        let token = &self.token;
        let group_id = self.id;

        debug!("Group {}: starting {} workers for {} tasks", group_id, workers, total);

        let spawned = thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Completion>();
            let mut spawned = 0;
            let mut spawn_error = None;

            for worker in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let result = thread::Builder::new()
                    .name(format!("taskscope-{}-{}", group_id.simple(), worker))
                    .spawn_scoped(scope, move || Self::work(group_id, queue, token, fail_fast, tx));
                match result {
                    Ok(_) => spawned += 1,
                    Err(e) => {
                        spawn_error = Some(e);
                        break;
                    }
                }
            }
            drop(tx);

            if let Some(e) = &spawn_error {
                warn!("Group {}: could only start {} of {} workers: {}", group_id, spawned, workers, e);
            }

            for completion in rx {
                on_complete(completion);
            }

            (spawned, spawn_error)
        });

        match spawned {
            (0, Some(source)) => Err(Self::spawn_failure(queue, source)),
            _ => Ok(()),
        }
    }

    /// Blame the first task that never left the queue
    fn spawn_failure(queue: Queue<'a>, source: io::Error) -> GroupError {
        let label = queue.into_inner().front().map(|(_, task)| task.label.clone()).unwrap_or_default();
        GroupError::Spawn { label, source }
    }

    fn work(
        group_id: Uuid,
        queue: &Queue<'a>,
        token: &CancellationToken,
        fail_fast: bool,
        tx: mpsc::Sender<Completion>,
    ) {
        loop {
            let next = queue.lock().pop_front();
            let Some((index, task)) = next else { break };
            let Task { label, operation } = task;

            if token.is_cancelled() {
                debug!("Group {}: skipping {} after cancellation", group_id, label);
                let result = Err(GroupError::Cancelled { label: label.clone() });
                if tx.send(Completion { index, label, result, elapsed: Duration::ZERO }).is_err() {
                    break;
                }
                continue;
            }

            let started = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| operation(token)))
                .unwrap_or_else(|payload| Err(anyhow::anyhow!("task panicked: {}", panic_message(payload.as_ref()))))
                .map_err(|e| GroupError::from_task(&label, e));
            let elapsed = started.elapsed();

            debug!("Group {}: task {} finished in {:?} (ok: {})", group_id, label, elapsed, result.is_ok());

            if fail_fast && result.is_err() {
                // The failure must be on the channel before the token flips, and
                // no worker may dequeue in between: hold the queue lock for both.
                let _queue = queue.lock();
                let requested_by = label.clone();
                let sent = tx.send(Completion { index, label, result, elapsed }).is_ok();
                if !token.is_cancelled() {
                    token.cancel();
                    debug!("Group {}: cancellation requested by {}", group_id, requested_by);
                }
                if !sent {
                    break;
                }
                continue;
            }

            if tx.send(Completion { index, label, result, elapsed }).is_err() {
                break;
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn service(label: &'static str, delay: Duration) -> impl FnOnce() -> anyhow::Result<String> + Send {
        move || {
            thread::sleep(delay);
            Ok(format!("{} response", label))
        }
    }

    #[test]
    fn test_two_services_succeed() {
        let mut group = TaskGroup::new();
        group.submit("Service A", service("Service A", Duration::from_millis(50))).unwrap();
        group.submit("Service B", service("Service B", Duration::from_millis(50))).unwrap();

        let results = group.join().unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.get("Service A"), Some("Service A response"));
        assert_eq!(results.get("Service B"), Some("Service B response"));
    }

    #[test]
    fn test_tasks_run_in_parallel() {
        let mut group = TaskGroup::new();
        for label in ["one", "two", "three"] {
            group.submit(label, service(label, Duration::from_millis(300))).unwrap();
        }

        let started = Instant::now();
        group.join().unwrap();

        assert!(started.elapsed() < Duration::from_millis(800), "took {:?}", started.elapsed());
    }

    #[test]
    fn test_results_follow_submission_order() {
        let mut group = TaskGroup::new();
        for (i, delay) in [120u64, 60, 0].into_iter().enumerate() {
            group
                .submit(format!("task-{}", i), move || {
                    thread::sleep(Duration::from_millis(delay));
                    Ok(i.to_string())
                })
                .unwrap();
        }

        let results = group.join().unwrap();

        assert_eq!(
            results.iter().collect::<Vec<_>>(),
            vec![("task-0", "0"), ("task-1", "1"), ("task-2", "2")]
        );
    }

    #[test]
    fn test_empty_group_joins_immediately() {
        let mut group = TaskGroup::new();

        let results = group.join().unwrap();

        assert!(results.is_empty());
        assert!(group.is_joined());
    }

    #[test]
    fn test_failure_reports_label_and_cause() {
        let mut group = TaskGroup::new();
        group.submit("Service A", service("Service A", Duration::from_millis(50))).unwrap();
        group.submit("Service B", || anyhow::bail!("boom")).unwrap();

        let err = group.join().unwrap_err();

        assert_eq!(err.label(), Some("Service B"));
        match err {
            GroupError::TaskFailure { source, .. } => assert_eq!(source.to_string(), "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_first_failure_is_by_completion_order() {
        let mut group = TaskGroup::new();
        group
            .submit("slow", || {
                thread::sleep(Duration::from_millis(200));
                anyhow::bail!("slow failure")
            })
            .unwrap();
        group.submit("fast", || anyhow::bail!("fast failure")).unwrap();

        let err = group.join().unwrap_err();

        assert_eq!(err.label(), Some("fast"));
    }

    #[test]
    fn test_cooperative_task_stops_after_failure() {
        let observed = AtomicBool::new(false);
        let mut group = TaskGroup::new();
        group
            .submit_cancellable("watcher", |token| {
                let deadline = Instant::now() + Duration::from_secs(5);
                while Instant::now() < deadline {
                    if token.is_cancelled() {
                        observed.store(true, Ordering::SeqCst);
                        return Err(crate::engine::Cancelled.into());
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Ok("finished".to_string())
            })
            .unwrap();
        group
            .submit("failing", || {
                thread::sleep(Duration::from_millis(20));
                anyhow::bail!("boom")
            })
            .unwrap();

        let started = Instant::now();
        let err = group.join().unwrap_err();

        assert_eq!(err.label(), Some("failing"));
        assert!(observed.load(Ordering::SeqCst));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_failure_is_reported_ahead_of_the_cancellations_it_causes() {
        use crate::engine::CancellationExt;

        for _ in 0..100 {
            let mut group = TaskGroup::new();
            for i in 0..4 {
                group
                    .submit_cancellable(format!("spinner-{}", i), |token| loop {
                        token.check()?;
                        thread::yield_now();
                    })
                    .unwrap();
            }
            group.submit("failing", || anyhow::bail!("boom")).unwrap();

            let err = group.join().unwrap_err();

            assert!(matches!(err, GroupError::TaskFailure { ref label, .. } if label == "failing"), "{:?}", err);
        }
    }

    #[test]
    fn test_worker_threads_are_named_after_the_group() {
        let mut group = TaskGroup::new().with_max_concurrency(2);
        for i in 0..3 {
            group
                .submit(format!("task-{}", i), || {
                    Ok(thread::current().name().unwrap_or_default().to_string())
                })
                .unwrap();
        }
        let prefix = format!("taskscope-{}-", group.id().simple());

        let results = group.join().unwrap();

        for (_, name) in results.iter() {
            let worker = name.strip_prefix(&prefix).unwrap_or_else(|| panic!("unexpected thread name {}", name));
            assert!(["0", "1"].contains(&worker), "{}", name);
        }
    }

    #[test]
    fn test_spawn_failure_names_an_unstarted_task() {
        let tasks: Vec<Task<BlockingOperation<'_>>> = ["started", "waiting"]
            .into_iter()
            .map(|label| Task::new(label.to_string(), Box::new(|_: &CancellationToken| Ok::<_, anyhow::Error>(String::new())) as BlockingOperation<'_>))
            .collect();
        let queue: Queue<'_> = Mutex::new(tasks.into_iter().enumerate().collect());
        queue.lock().pop_front();

        let err = TaskGroup::spawn_failure(queue, io::Error::new(io::ErrorKind::Other, "no threads"));

        assert!(matches!(err, GroupError::Spawn { ref label, .. } if label == "waiting"));
    }

    #[test]
    fn test_queued_tasks_are_skipped_after_failure() {
        let ran = AtomicBool::new(false);
        let mut group = TaskGroup::new().with_max_concurrency(1);
        group.submit("first", || anyhow::bail!("boom")).unwrap();
        group
            .submit("second", || {
                ran.store(true, Ordering::SeqCst);
                Ok("ran".to_string())
            })
            .unwrap();

        let err = group.join().unwrap_err();

        assert_eq!(err.label(), Some("first"));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_max_concurrency_bounds_workers() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new().with_max_concurrency(2);

        for i in 0..6 {
            let current = current.clone();
            let peak = peak.clone();
            group
                .submit(format!("task-{}", i), move || {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(30));
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(i.to_string())
                })
                .unwrap();
        }

        let results = group.join().unwrap();

        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_external_cancel_skips_everything() {
        let mut group = TaskGroup::new();
        group.submit("a", || Ok("a".to_string())).unwrap();
        group.submit("b", || Ok("b".to_string())).unwrap();
        group.cancellation_token().cancel();

        let err = group.join().unwrap_err();

        assert!(matches!(err, GroupError::Cancelled { .. }));
    }

    #[test]
    fn test_second_join_is_invalid_and_does_not_rerun() {
        let runs = AtomicUsize::new(0);
        let mut group = TaskGroup::new();
        group
            .submit("counted", || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok("done".to_string())
            })
            .unwrap();

        group.join().unwrap();
        let err = group.join().unwrap_err();

        assert!(matches!(err, GroupError::InvalidState(_)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_submit_after_join_is_invalid() {
        let mut group = TaskGroup::new();
        group.join().unwrap();

        let err = group.submit("late", || Ok("late".to_string())).unwrap_err();

        assert!(matches!(err, GroupError::InvalidState(_)));
    }

    #[test]
    fn test_duplicate_labels() {
        let mut lenient = TaskGroup::new().with_max_concurrency(1);
        lenient.submit("dup", || Ok("first".to_string())).unwrap();
        lenient.submit("dup", || Ok("second".to_string())).unwrap();
        let results = lenient.join().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.get("dup"), Some("second"));

        let mut strict = TaskGroup::new().with_unique_labels(true);
        strict.submit("dup", || Ok("first".to_string())).unwrap();
        let err = strict.submit("dup", || Ok("second".to_string())).unwrap_err();
        assert!(matches!(err, GroupError::DuplicateLabel(ref label) if label == "dup"));
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn test_panic_becomes_task_failure() {
        let mut group = TaskGroup::new();
        group.submit("fine", || Ok("fine".to_string())).unwrap();
        group.submit("explodes", || panic!("kaboom")).unwrap();

        let err = group.join().unwrap_err();

        assert_eq!(err.label(), Some("explodes"));
        assert!(err.to_string().contains("kaboom"));
    }

    #[test]
    fn test_operations_may_borrow_caller_data() {
        let names = vec!["Ada".to_string(), "Grace".to_string()];
        let mut group = TaskGroup::new();
        group.submit("count", || Ok(names.len().to_string())).unwrap();
        group.submit("first", || Ok(names[0].clone())).unwrap();

        let results = group.join().unwrap();

        assert_eq!(results.get("count"), Some("2"));
        assert_eq!(results.get("first"), Some("Ada"));
    }

    #[test]
    fn test_join_settled_reports_every_task() {
        let mut group = TaskGroup::new();
        group.submit("Service A", service("Service A", Duration::from_millis(30))).unwrap();
        group.submit("Service B", || anyhow::bail!("boom")).unwrap();
        group.submit("Service C", service("Service C", Duration::from_millis(10))).unwrap();

        let settled = group.join_settled().unwrap();

        assert_eq!(settled.len(), 3);
        assert_eq!(settled.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(), vec!["Service A", "Service B", "Service C"]);
        assert_eq!(settled[0].result.as_deref().unwrap(), "Service A response");
        assert!(!settled[1].is_ok());
        assert_eq!(settled[2].result.as_deref().unwrap(), "Service C response");
        assert!(group.join_settled().is_err());
    }
}
