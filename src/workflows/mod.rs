use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cluster;

pub mod create;

/// Handle to a running cluster a command operates on
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHandle {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig_path: Option<String>,
}

/// Manages the temporary local cluster used to bootstrap the substrate
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn create_bootstrap_cluster(
        &self,
        spec: &cluster::Spec,
    ) -> anyhow::Result<ClusterHandle>;

    async fn delete_bootstrap_cluster(&self, cluster: &ClusterHandle) -> anyhow::Result<()>;
}

/// Infrastructure provider hooks a workflow needs
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Preflight validations for a create command
    async fn setup_and_validate_create(&self, spec: &cluster::Spec) -> anyhow::Result<()>;
}

/// Drives the substrate to create clusters and install components on them
#[async_trait]
pub trait ClusterManager: Send + Sync {
    async fn create_workload_cluster(
        &self,
        management: &ClusterHandle,
        spec: &cluster::Spec,
    ) -> anyhow::Result<ClusterHandle>;

    async fn networking_installed(&self, cluster: &ClusterHandle) -> anyhow::Result<bool>;

    async fn install_networking(
        &self,
        cluster: &ClusterHandle,
        spec: &cluster::Spec,
    ) -> anyhow::Result<()>;

    /// Moves substrate management of the workload cluster's objects from one
    /// cluster to another
    async fn move_cluster_management(
        &self,
        from: &ClusterHandle,
        to: &ClusterHandle,
    ) -> anyhow::Result<()>;
}
