use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// Per-task wall clock accounting. Purely observational; never drives
/// control flow.
#[derive(Debug, Default)]
pub struct Profiler {
    metrics: HashMap<String, HashMap<String, Duration>>,
    starts: HashMap<String, HashMap<String, Instant>>,
}

impl Profiler {
    pub fn set_start_task(&mut self, task_name: &str) {
        self.set_start(task_name, task_name);
    }

    /// Can be used to profile sub operations within a task
    pub fn set_start(&mut self, task_name: &str, label: &str) {
        self.starts
            .entry(task_name.to_owned())
            .or_default()
            .insert(label.to_owned(), Instant::now());
    }

    pub fn mark_done_task(&mut self, task_name: &str) {
        self.mark_done(task_name, task_name);
    }

    /// Needs a matching set_start, otherwise nothing is recorded
    pub fn mark_done(&mut self, task_name: &str, label: &str) {
        let Some(start) = self
            .starts
            .get(task_name)
            .and_then(|starts| starts.get(label))
        else {
            return;
        };

        self.metrics
            .entry(task_name.to_owned())
            .or_default()
            .insert(label.to_owned(), start.elapsed());
    }

    pub fn metrics(&self) -> &HashMap<String, HashMap<String, Duration>> {
        &self.metrics
    }

    pub(crate) fn log_summary(&self, task_name: &str) {
        let Some(durations) = self.metrics.get(task_name) else {
            return;
        };

        for (label, duration) in durations {
            if label != task_name {
                debug!(task_name, sub_task = %label, ?duration, "Subtask finished");
            }
        }
        if let Some(total) = durations.get(task_name) {
            debug!(task_name, duration = ?total, "Task finished");
        }
    }
}
