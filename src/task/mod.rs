use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cluster;
use crate::workflows::{Bootstrapper, ClusterHandle, ClusterManager, Provider};

mod checkpoint;
mod profiler;

pub use checkpoint::{CheckpointInfo, SavedCheckpoint, TaskCheckpoint, CHECKPOINT_FILE_NAME};
pub use profiler::Profiler;

/// What runs after a task: its successor, or nothing to end the chain.
///
/// Successors are decided at runtime, which is why chains are linked lists
/// of behavior rather than a static pipeline.
pub type NextTask = Option<Box<dyn Task>>;

/// A named unit of work in a command's task chain.
#[async_trait]
pub trait Task: Send + Sync {
    /// Unique within one run; doubles as the checkpoint key.
    fn name(&self) -> &str;

    /// Executes side effects against the shared context and picks the next
    /// task. Failures are recorded with [`CommandContext::set_error`], not
    /// returned.
    async fn run(&self, ctx: &mut CommandContext) -> NextTask;

    /// Snapshot of this task's completion state worth persisting, if any.
    fn checkpoint(&self) -> Option<TaskCheckpoint> {
        None
    }

    /// Invoked instead of [`Task::run`] when this task already completed in
    /// a previous run. Must rebuild enough context state to hand over to the
    /// same successor `run` would have produced, without repeating side
    /// effects. Tasks that checkpoint nothing are simply re-executed.
    async fn restore(
        &self,
        _saved: SavedCheckpoint,
        ctx: &mut CommandContext,
    ) -> anyhow::Result<NextTask> {
        Ok(self.run(ctx).await)
    }
}

/// Writes command artifacts into a per-run directory
#[derive(Clone, Debug)]
pub struct FileWriter {
    dir: PathBuf,
}

impl FileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> FileWriter {
        FileWriter { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, file_name: &str, content: &[u8]) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, content)?;
        Ok(path)
    }
}

/// Mutable state shared by every task in one run.
///
/// Owned by exactly one in-flight run; tasks mutate it in place as the
/// chain advances.
pub struct CommandContext {
    pub bootstrapper: Box<dyn Bootstrapper>,
    pub provider: Box<dyn Provider>,
    pub cluster_manager: Box<dyn ClusterManager>,
    pub writer: FileWriter,
    pub cluster_spec: cluster::Spec,
    pub bootstrap_cluster: Option<ClusterHandle>,
    pub workload_cluster: Option<ClusterHandle>,
    pub management_cluster: Option<ClusterHandle>,
    pub profiler: Profiler,
    original_error: Option<anyhow::Error>,
}

impl CommandContext {
    pub fn new(
        bootstrapper: Box<dyn Bootstrapper>,
        provider: Box<dyn Provider>,
        cluster_manager: Box<dyn ClusterManager>,
        writer: FileWriter,
        cluster_spec: cluster::Spec,
    ) -> CommandContext {
        CommandContext {
            bootstrapper,
            provider,
            cluster_manager,
            writer,
            cluster_spec,
            bootstrap_cluster: None,
            workload_cluster: None,
            management_cluster: None,
            profiler: Profiler::default(),
            original_error: None,
        }
    }

    /// Records a task failure. First error wins: later failures are usually
    /// downstream symptoms of the root cause and must not mask it.
    pub fn set_error(&mut self, err: anyhow::Error) {
        if self.original_error.is_none() {
            self.original_error = Some(err);
        } else {
            warn!("ignoring subsequent error, root cause already recorded: {err:#}");
        }
    }

    pub fn original_error(&self) -> Option<&anyhow::Error> {
        self.original_error.as_ref()
    }

    fn take_error(&mut self) -> Option<anyhow::Error> {
        self.original_error.take()
    }
}

/// Drives a task chain to completion, profiling each task and persisting a
/// checkpoint when the run fails so the next invocation can resume.
///
/// Strictly sequential. The runner owns sequencing, profiling and
/// checkpointing only; it never looks into the domain semantics of a task.
pub struct TaskRunner {
    first_task: Box<dyn Task>,
    writer: FileWriter,
    resume_from: Option<CheckpointInfo>,
}

impl TaskRunner {
    pub fn new(first_task: Box<dyn Task>, writer: FileWriter) -> TaskRunner {
        TaskRunner {
            first_task,
            writer,
            resume_from: None,
        }
    }

    /// Resume from a checkpoint file in `dir` if one is readable there.
    pub fn with_checkpoint_file(mut self, dir: &Path) -> TaskRunner {
        self.resume_from = CheckpointInfo::read_from(dir);
        self
    }

    pub async fn run_task(self, ctx: &mut CommandContext) -> anyhow::Result<()> {
        let TaskRunner {
            first_task,
            writer,
            resume_from,
        } = self;

        ctx.profiler = Profiler::default();
        let start = Instant::now();
        let mut checkpoint_info = CheckpointInfo::default();

        let mut task = Some(first_task);
        while let Some(current) = task.take() {
            debug!(task_name = current.name(), "Task start");
            ctx.profiler.set_start_task(current.name());
            let next = run_single(resume_from.as_ref(), current.as_ref(), ctx).await;
            ctx.profiler.mark_done_task(current.name());
            ctx.profiler.log_summary(current.name());

            // Tasks that ran after the failure started are not trustworthy;
            // they must re-run on resume instead of being skipped.
            if ctx.original_error().is_none()
                && checkpoint_info.task_completed(current.name(), current.checkpoint())
            {
                warn!(
                    task_name = current.name(),
                    "duplicate task name within one run, previous checkpoint overwritten"
                );
            }

            task = next;
        }

        if ctx.original_error().is_some() {
            save_checkpoint(&writer, &checkpoint_info);
        }
        debug!(duration = ?start.elapsed(), "Tasks completed");

        match ctx.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn run_single(
    resume_from: Option<&CheckpointInfo>,
    task: &dyn Task,
    ctx: &mut CommandContext,
) -> NextTask {
    let saved = resume_from.and_then(|info| info.saved(task.name()));

    let Some(saved) = saved else {
        return task.run(ctx).await;
    };

    match task.restore(saved, ctx).await {
        Ok(next) => {
            debug!(task_name = task.name(), "Task restored from checkpoint");
            next
        }
        Err(err) => {
            ctx.set_error(err);
            None
        }
    }
}

/// Best effort: losing a checkpoint degrades to starting over, which is
/// always safe, so write failures are logged and swallowed.
fn save_checkpoint(writer: &FileWriter, checkpoint_info: &CheckpointInfo) {
    debug!("Saving checkpoint");
    let content = match serde_yaml::to_string(checkpoint_info) {
        Ok(content) => content,
        Err(err) => {
            warn!("failed saving task runner checkpoint: {err}");
            return;
        }
    };

    if let Err(err) = writer.write(CHECKPOINT_FILE_NAME, content.as_bytes()) {
        warn!("failed saving task runner checkpoint: {err}");
    }
}
