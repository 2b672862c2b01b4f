use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.yaml";

/// Opaque checkpoint payload recorded by a task. Round-tripped through yaml
/// with no schema validation.
pub type TaskCheckpoint = serde_yaml::Value;

/// Which tasks of a run already completed, and with what outcome.
///
/// Persisted only for failed runs; a successful run has nothing to resume.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointInfo {
    completed_tasks: BTreeMap<String, TaskCheckpoint>,
}

impl CheckpointInfo {
    /// Records a completed task. Task names must be unique within a run;
    /// returns true when the name was already present (the new payload wins).
    pub fn task_completed(&mut self, name: &str, checkpoint: Option<TaskCheckpoint>) -> bool {
        self.completed_tasks
            .insert(name.to_owned(), checkpoint.unwrap_or(TaskCheckpoint::Null))
            .is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.completed_tasks.contains_key(name)
    }

    pub fn saved(&self, name: &str) -> Option<SavedCheckpoint> {
        self.completed_tasks
            .get(name)
            .map(|payload| SavedCheckpoint(payload.clone()))
    }

    /// Reads a checkpoint file from a previous run. Resuming is a best
    /// effort optimization: a missing or unparseable file degrades to
    /// "no checkpoint" and the run starts over.
    pub fn read_from(dir: &Path) -> Option<CheckpointInfo> {
        let file = dir.join(CHECKPOINT_FILE_NAME);
        info!(file = %file.display(), "Reading checkpoint");

        let content = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(err) => {
                warn!("failed reading checkpoint file: {err}");
                return None;
            }
        };

        match serde_yaml::from_str(&content) {
            Ok(info) => Some(info),
            Err(err) => {
                warn!("failed unmarshalling checkpoint: {err}");
                None
            }
        }
    }
}

/// The recorded payload for one completed task, handed to
/// [`super::Task::restore`] in place of re-running it.
#[derive(Clone, Debug)]
pub struct SavedCheckpoint(TaskCheckpoint);

impl SavedCheckpoint {
    /// Deserializes the recorded payload. Tasks that checkpointed nothing
    /// get the type's default back, which restores to zero state.
    pub fn parse<T>(&self) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        if matches!(self.0, TaskCheckpoint::Null) {
            return Ok(T::default());
        }

        Ok(serde_yaml::from_value(self.0.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct CreatedCluster {
        name: String,
    }

    #[test]
    fn saved_checkpoint_round_trips_payloads() {
        let mut info = CheckpointInfo::default();
        let payload = serde_yaml::to_value(CreatedCluster { name: "c1".into() }).unwrap();
        assert!(!info.task_completed("create", Some(payload)));

        let restored: CreatedCluster = info.saved("create").unwrap().parse().unwrap();
        assert_eq!(restored, CreatedCluster { name: "c1".into() });
    }

    #[test]
    fn null_payload_parses_to_default() {
        let mut info = CheckpointInfo::default();
        info.task_completed("no-state", None);

        let restored: CreatedCluster = info.saved("no-state").unwrap().parse().unwrap();
        assert_eq!(restored, CreatedCluster::default());
    }

    #[test]
    fn recording_a_duplicate_name_is_reported() {
        let mut info = CheckpointInfo::default();
        assert!(!info.task_completed("t1", None));
        assert!(info.task_completed("t1", None));
    }

    #[test]
    fn file_round_trip_uses_completed_tasks_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = CheckpointInfo::default();
        info.task_completed(
            "create",
            Some(serde_yaml::to_value(CreatedCluster { name: "c1".into() }).unwrap()),
        );

        let content = serde_yaml::to_string(&info).unwrap();
        assert!(content.contains("completedTasks"));
        std::fs::write(dir.path().join(CHECKPOINT_FILE_NAME), content).unwrap();

        let read = CheckpointInfo::read_from(dir.path()).unwrap();
        assert!(read.contains("create"));
    }

    #[test]
    fn unreadable_or_invalid_files_degrade_to_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointInfo::read_from(dir.path()).is_none());

        std::fs::write(dir.path().join(CHECKPOINT_FILE_NAME), "{not yaml: [").unwrap();
        assert!(CheckpointInfo::read_from(dir.path()).is_none());
    }
}
