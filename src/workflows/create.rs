use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::task::{
    CommandContext, FileWriter, NextTask, SavedCheckpoint, Task, TaskCheckpoint, TaskRunner,
};

use super::ClusterHandle;

/// The create-cluster workflow.
///
/// Wires the task chain and hands it to a [`TaskRunner`], resuming from a
/// previous failed run's checkpoint when asked to.
pub struct CreateClusterWorkflow {
    writer: FileWriter,
    resume_from: Option<PathBuf>,
}

impl CreateClusterWorkflow {
    pub fn new(writer: FileWriter) -> CreateClusterWorkflow {
        CreateClusterWorkflow {
            writer,
            resume_from: None,
        }
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> CreateClusterWorkflow {
        self.resume_from = Some(dir.into());
        self
    }

    pub async fn run(self, ctx: &mut CommandContext) -> anyhow::Result<()> {
        let mut runner = TaskRunner::new(Box::new(SetupAndValidateTask), self.writer);
        if let Some(dir) = &self.resume_from {
            runner = runner.with_checkpoint_file(dir);
        }
        runner.run_task(ctx).await
    }
}

struct SetupAndValidateTask;

#[async_trait]
impl Task for SetupAndValidateTask {
    fn name(&self) -> &str {
        "setup-and-validate"
    }

    async fn run(&self, ctx: &mut CommandContext) -> NextTask {
        info!(provider = ctx.provider.name(), "Performing setup and validations");
        if let Err(err) = ctx.provider.setup_and_validate_create(&ctx.cluster_spec).await {
            ctx.set_error(err);
            return None;
        }

        Some(Box::new(CreateBootstrapClusterTask::default()))
    }
}

#[derive(Default)]
struct CreateBootstrapClusterTask {
    created: Mutex<Option<ClusterHandle>>,
}

#[async_trait]
impl Task for CreateBootstrapClusterTask {
    fn name(&self) -> &str {
        "bootstrap-cluster-init"
    }

    async fn run(&self, ctx: &mut CommandContext) -> NextTask {
        info!("Creating new bootstrap cluster");
        let handle = match ctx.bootstrapper.create_bootstrap_cluster(&ctx.cluster_spec).await {
            Ok(handle) => handle,
            Err(err) => {
                ctx.set_error(err);
                return None;
            }
        };

        *self.created.lock().unwrap() = Some(handle.clone());
        ctx.management_cluster = Some(handle.clone());
        ctx.bootstrap_cluster = Some(handle);

        Some(Box::new(CreateWorkloadClusterTask::default()))
    }

    fn checkpoint(&self) -> Option<TaskCheckpoint> {
        self.created
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|handle| serde_yaml::to_value(handle).ok())
    }

    async fn restore(
        &self,
        saved: SavedCheckpoint,
        ctx: &mut CommandContext,
    ) -> anyhow::Result<NextTask> {
        let handle: ClusterHandle = saved.parse()?;
        ctx.management_cluster = Some(handle.clone());
        ctx.bootstrap_cluster = Some(handle);

        Ok(Some(Box::new(CreateWorkloadClusterTask::default())))
    }
}

#[derive(Default)]
struct CreateWorkloadClusterTask {
    created: Mutex<Option<ClusterHandle>>,
}

#[async_trait]
impl Task for CreateWorkloadClusterTask {
    fn name(&self) -> &str {
        "workload-cluster-init"
    }

    async fn run(&self, ctx: &mut CommandContext) -> NextTask {
        info!("Creating new workload cluster");
        let Some(management) = ctx.management_cluster.clone() else {
            ctx.set_error(anyhow::anyhow!(
                "no management cluster in context, cannot create workload cluster"
            ));
            return None;
        };

        let handle = match ctx
            .cluster_manager
            .create_workload_cluster(&management, &ctx.cluster_spec)
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                ctx.set_error(err);
                return None;
            }
        };

        *self.created.lock().unwrap() = Some(handle.clone());
        ctx.workload_cluster = Some(handle);

        Some(Box::new(InstallNetworkingTask))
    }

    fn checkpoint(&self) -> Option<TaskCheckpoint> {
        self.created
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|handle| serde_yaml::to_value(handle).ok())
    }

    async fn restore(
        &self,
        saved: SavedCheckpoint,
        ctx: &mut CommandContext,
    ) -> anyhow::Result<NextTask> {
        let handle: ClusterHandle = saved.parse()?;
        ctx.workload_cluster = Some(handle);

        Ok(Some(Box::new(InstallNetworkingTask)))
    }
}

struct InstallNetworkingTask;

#[async_trait]
impl Task for InstallNetworkingTask {
    fn name(&self) -> &str {
        "install-networking"
    }

    async fn run(&self, ctx: &mut CommandContext) -> NextTask {
        let Some(workload) = ctx.workload_cluster.clone() else {
            ctx.set_error(anyhow::anyhow!(
                "no workload cluster in context, cannot install networking"
            ));
            return None;
        };

        // The addon may already be present, e.g. when retrying a run that
        // failed further down the chain.
        match ctx.cluster_manager.networking_installed(&workload).await {
            Ok(true) => {
                info!("Networking already installed, skipping");
            }
            Ok(false) => {
                info!("Installing networking on workload cluster");
                if let Err(err) = ctx
                    .cluster_manager
                    .install_networking(&workload, &ctx.cluster_spec)
                    .await
                {
                    ctx.set_error(err);
                    return None;
                }
            }
            Err(err) => {
                ctx.set_error(err);
                return None;
            }
        }

        Some(Box::new(MoveClusterManagementTask))
    }
}

struct MoveClusterManagementTask;

#[async_trait]
impl Task for MoveClusterManagementTask {
    fn name(&self) -> &str {
        "capi-management-move"
    }

    async fn run(&self, ctx: &mut CommandContext) -> NextTask {
        info!("Moving cluster management from bootstrap to workload cluster");
        let (Some(bootstrap), Some(workload)) =
            (ctx.bootstrap_cluster.clone(), ctx.workload_cluster.clone())
        else {
            ctx.set_error(anyhow::anyhow!(
                "bootstrap and workload clusters are required to move management"
            ));
            return None;
        };

        if let Err(err) = ctx
            .cluster_manager
            .move_cluster_management(&bootstrap, &workload)
            .await
        {
            ctx.set_error(err);
            return None;
        }
        ctx.management_cluster = Some(workload);

        Some(Box::new(WriteClusterConfigTask))
    }
}

struct WriteClusterConfigTask;

#[async_trait]
impl Task for WriteClusterConfigTask {
    fn name(&self) -> &str {
        "write-cluster-config"
    }

    async fn run(&self, ctx: &mut CommandContext) -> NextTask {
        info!("Writing cluster config file");
        let cluster = ctx.cluster_spec.cluster();
        let file_name = format!(
            "{}-anywhere-cluster.yaml",
            cluster.metadata.name.as_deref().unwrap_or("cluster")
        );

        let content = match serde_yaml::to_string(cluster) {
            Ok(content) => content,
            Err(err) => {
                ctx.set_error(err.into());
                return None;
            }
        };
        if let Err(err) = ctx.writer.write(&file_name, content.as_bytes()) {
            ctx.set_error(err.into());
            return None;
        }

        Some(Box::new(DeleteBootstrapClusterTask))
    }
}

struct DeleteBootstrapClusterTask;

#[async_trait]
impl Task for DeleteBootstrapClusterTask {
    fn name(&self) -> &str {
        "delete-kind-cluster"
    }

    async fn run(&self, ctx: &mut CommandContext) -> NextTask {
        let Some(bootstrap) = ctx.bootstrap_cluster.clone() else {
            return None;
        };

        info!("Deleting bootstrap cluster");
        if let Err(err) = ctx.bootstrapper.delete_bootstrap_cluster(&bootstrap).await {
            ctx.set_error(err);
        }
        ctx.bootstrap_cluster = None;

        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;

    use crate::cluster;
    use crate::task::CheckpointInfo;
    use crate::workflows::{Bootstrapper, ClusterManager, Provider};

    use super::*;

    #[derive(Default)]
    struct Collaborators {
        calls: Mutex<Vec<String>>,
        fail_create_workload: AtomicBool,
        networking_installed: AtomicBool,
    }

    impl Collaborators {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_owned());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct MockBootstrapper(Arc<Collaborators>);

    #[async_trait]
    impl Bootstrapper for MockBootstrapper {
        async fn create_bootstrap_cluster(
            &self,
            _spec: &cluster::Spec,
        ) -> anyhow::Result<ClusterHandle> {
            self.0.record("create_bootstrap_cluster");
            Ok(ClusterHandle {
                name: "bootstrap".into(),
                kubeconfig_path: Some("bootstrap.kubeconfig".into()),
            })
        }

        async fn delete_bootstrap_cluster(&self, _cluster: &ClusterHandle) -> anyhow::Result<()> {
            self.0.record("delete_bootstrap_cluster");
            Ok(())
        }
    }

    struct MockProvider(Arc<Collaborators>);

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn setup_and_validate_create(&self, _spec: &cluster::Spec) -> anyhow::Result<()> {
            self.0.record("setup_and_validate_create");
            Ok(())
        }
    }

    struct MockClusterManager(Arc<Collaborators>);

    #[async_trait]
    impl ClusterManager for MockClusterManager {
        async fn create_workload_cluster(
            &self,
            management: &ClusterHandle,
            _spec: &cluster::Spec,
        ) -> anyhow::Result<ClusterHandle> {
            self.0
                .record(&format!("create_workload_cluster:{}", management.name));
            if self.0.fail_create_workload.load(Ordering::SeqCst) {
                return Err(anyhow!("substrate unavailable"));
            }
            Ok(ClusterHandle {
                name: "workload".into(),
                kubeconfig_path: Some("workload.kubeconfig".into()),
            })
        }

        async fn networking_installed(&self, _cluster: &ClusterHandle) -> anyhow::Result<bool> {
            self.0.record("networking_installed");
            Ok(self.0.networking_installed.load(Ordering::SeqCst))
        }

        async fn install_networking(
            &self,
            _cluster: &ClusterHandle,
            _spec: &cluster::Spec,
        ) -> anyhow::Result<()> {
            self.0.record("install_networking");
            Ok(())
        }

        async fn move_cluster_management(
            &self,
            from: &ClusterHandle,
            to: &ClusterHandle,
        ) -> anyhow::Result<()> {
            self.0
                .record(&format!("move_cluster_management:{}->{}", from.name, to.name));
            Ok(())
        }
    }

    fn test_context(dir: &std::path::Path, collaborators: &Arc<Collaborators>) -> CommandContext {
        let mut spec = cluster::Spec::default();
        spec.config = cluster::Config::new({
            let mut c = crate::resources::anywhereclusters::AnywhereCluster::default();
            c.metadata.name = Some("prod".into());
            c
        });
        CommandContext::new(
            Box::new(MockBootstrapper(collaborators.clone())),
            Box::new(MockProvider(collaborators.clone())),
            Box::new(MockClusterManager(collaborators.clone())),
            FileWriter::new(dir),
            spec,
        )
    }

    #[tokio::test]
    async fn create_runs_the_full_chain_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = Arc::new(Collaborators::default());
        let mut ctx = test_context(dir.path(), &collaborators);

        CreateClusterWorkflow::new(FileWriter::new(dir.path()))
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(
            collaborators.calls(),
            vec![
                "setup_and_validate_create",
                "create_bootstrap_cluster",
                "create_workload_cluster:bootstrap",
                "networking_installed",
                "install_networking",
                "move_cluster_management:bootstrap->workload",
                "delete_bootstrap_cluster",
            ]
        );
        assert_eq!(
            ctx.management_cluster.as_ref().map(|c| c.name.as_str()),
            Some("workload")
        );
        assert!(dir.path().join("prod-anywhere-cluster.yaml").exists());
    }

    #[tokio::test]
    async fn networking_install_is_skipped_when_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = Arc::new(Collaborators::default());
        collaborators.networking_installed.store(true, Ordering::SeqCst);
        let mut ctx = test_context(dir.path(), &collaborators);

        CreateClusterWorkflow::new(FileWriter::new(dir.path()))
            .run(&mut ctx)
            .await
            .unwrap();

        assert!(!collaborators
            .calls()
            .contains(&"install_networking".to_owned()));
    }

    #[tokio::test]
    async fn failed_create_resumes_without_rebootstrapping() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = Arc::new(Collaborators::default());
        collaborators.fail_create_workload.store(true, Ordering::SeqCst);

        let mut ctx = test_context(dir.path(), &collaborators);
        let err = CreateClusterWorkflow::new(FileWriter::new(dir.path()))
            .run(&mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("substrate unavailable"));

        let info = CheckpointInfo::read_from(dir.path()).unwrap();
        assert!(info.contains("setup-and-validate"));
        assert!(info.contains("bootstrap-cluster-init"));
        assert!(!info.contains("workload-cluster-init"));

        // substrate is back, resume from the checkpoint
        collaborators.fail_create_workload.store(false, Ordering::SeqCst);
        let mut resumed = test_context(dir.path(), &collaborators);
        CreateClusterWorkflow::new(FileWriter::new(dir.path()))
            .with_checkpoint_dir(dir.path())
            .run(&mut resumed)
            .await
            .unwrap();

        // bootstrapping happened exactly once across both runs, while the
        // failed workload creation re-ran
        let creates = collaborators
            .calls()
            .iter()
            .filter(|c| *c == "create_bootstrap_cluster")
            .count();
        assert_eq!(creates, 1);
        assert_eq!(
            resumed.bootstrap_cluster.as_ref().map(|c| c.name.as_str()),
            None
        );
        assert_eq!(
            resumed.management_cluster.as_ref().map(|c| c.name.as_str()),
            Some("workload")
        );
    }
}
