// src/engine/outcome.rs
use std::collections::HashMap;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GroupError, GroupResult};

/// Result of joining a group: every value, or the first failure.
pub type Outcome = GroupResult<TaskResults>;

/// One label/value pair in [`TaskResults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub label: String,
    pub value: String,
}

/// Label to value mapping in submission order.
///
/// A repeated label keeps the slot of its first submission and takes the
/// value of its last one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TaskResults {
    entries: Vec<ResultEntry>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl TaskResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, label: String, value: String) {
        match self.positions.get(&label) {
            Some(&position) => self.entries[position].value = value,
            None => {
                self.positions.insert(label.clone(), self.entries.len());
                self.entries.push(ResultEntry { label, value });
            }
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.positions
            .get(label)
            .map(|&position| self.entries[position].value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|entry| (entry.label.as_str(), entry.value.as_str()))
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.entries
            .into_iter()
            .map(|entry| (entry.label, entry.value))
            .collect()
    }
}

impl IntoIterator for TaskResults {
    type Item = ResultEntry;
    type IntoIter = std::vec::IntoIter<ResultEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Outcome of a single task when the group is joined with `join_settled`.
#[derive(Debug)]
pub struct Settled {
    pub index: usize,
    pub label: String,
    pub result: GroupResult<String>,
    pub elapsed: Duration,
}

impl Settled {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Gathers completions, in the order they arrive, into an [`Outcome`].
pub(crate) struct Collector {
    group_id: Uuid,
    labels: Vec<String>,
    slots: Vec<Option<String>>,
    failure: Option<GroupError>,
}

impl Collector {
    pub(crate) fn new(group_id: Uuid, labels: Vec<String>) -> Self {
        let slots = vec![None; labels.len()];
        Self {
            group_id,
            labels,
            slots,
            failure: None,
        }
    }

    pub(crate) fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Record a task completion. Returns `true` when this is the first failure,
    /// which is the caller's cue to cancel the rest of the group.
    pub(crate) fn record(&mut self, index: usize, result: GroupResult<String>) -> bool {
        match result {
            Ok(value) => {
                if self.failure.is_none() {
                    self.slots[index] = Some(value);
                } else {
                    debug!("Group {}: discarding result of {}", self.group_id, self.labels[index]);
                }
                false
            }
            Err(error) => self.fail(error),
        }
    }

    /// Record a group level failure (timeout, spawn error). Same return contract as `record`.
    pub(crate) fn fail(&mut self, error: GroupError) -> bool {
        if self.failure.is_some() {
            debug!("Group {}: suppressing later failure: {}", self.group_id, error);
            return false;
        }
        warn!("Group {}: first failure: {}", self.group_id, error);
        self.failure = Some(error);
        true
    }

    pub(crate) fn finish(self) -> Outcome {
        if let Some(error) = self.failure {
            return Err(error);
        }

        let mut results = TaskResults::new();
        for (index, (label, slot)) in self.labels.into_iter().zip(self.slots).enumerate() {
            let value = slot.ok_or_else(|| {
                GroupError::InvalidState(format!("task {} ({}) never reported a result", index, label))
            })?;
            results.insert(label, value);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_keep_submission_order() {
        let mut results = TaskResults::new();
        results.insert("b".to_string(), "2".to_string());
        results.insert("a".to_string(), "1".to_string());

        assert_eq!(results.labels().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(results.get("a"), Some("1"));
        assert_eq!(results.get("missing"), None);
    }

    #[test]
    fn test_duplicate_label_last_writer_wins() {
        let mut results = TaskResults::new();
        results.insert("dup".to_string(), "first".to_string());
        results.insert("other".to_string(), "x".to_string());
        results.insert("dup".to_string(), "second".to_string());

        assert_eq!(results.len(), 2);
        assert_eq!(results.get("dup"), Some("second"));
        assert_eq!(results.labels().collect::<Vec<_>>(), vec!["dup", "other"]);
    }

    #[test]
    fn test_results_serialize_as_entry_list() {
        let mut results = TaskResults::new();
        results.insert("Service A".to_string(), "Service A response".to_string());

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "label": "Service A", "value": "Service A response" }])
        );
    }

    #[test]
    fn test_collector_reorders_completions() {
        let mut collector = Collector::new(Uuid::new_v4(), vec!["a".into(), "b".into(), "c".into()]);

        assert!(!collector.record(2, Ok("C".into())));
        assert!(!collector.record(0, Ok("A".into())));
        assert!(!collector.record(1, Ok("B".into())));

        let results = collector.finish().unwrap();
        assert_eq!(
            results.iter().collect::<Vec<_>>(),
            vec![("a", "A"), ("b", "B"), ("c", "C")]
        );
    }

    #[test]
    fn test_collector_keeps_only_first_failure() {
        let mut collector = Collector::new(Uuid::new_v4(), vec!["a".into(), "b".into()]);

        assert!(collector.record(1, Err(GroupError::from_task("b", anyhow::anyhow!("first")))));
        assert!(!collector.record(0, Err(GroupError::from_task("a", anyhow::anyhow!("second")))));
        assert!(collector.has_failed());

        let err = collector.finish().unwrap_err();
        assert_eq!(err.label(), Some("b"));
        assert!(err.to_string().contains("first"));
    }
}
