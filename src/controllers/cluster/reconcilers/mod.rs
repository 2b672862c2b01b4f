use std::sync::Arc;

use kube::{Api, Client, ResourceExt};
use tokio::time::Duration;
use tracing::info;

use crate::cluster;
use crate::clusterapi::{self, SYSTEM_NAMESPACE};
use crate::networking::cilium::CiliumReconciler;
use crate::reconcile::ReconcileResult;
use crate::resources::anywhereclusters::AnywhereCluster;
use crate::resources::capi::{Cluster as CapiCluster, CONTROL_PLANE_READY_CONDITION};
use crate::Result;

use super::remote::RemoteClientTracker;

pub mod snow;
pub mod vsphere;

/// How long to wait for the substrate to create objects no watch covers
pub const SUBSTRATE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long to wait before retrying a remote cluster client acquisition
pub const REMOTE_CLIENT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Pieces every provider cluster reconciler is assembled from: the
/// management cluster client, the remote cluster client tracker and the
/// networking addon reconciler. Also carries the phases shared across
/// providers.
pub struct ProviderReconcilerBase {
    pub(super) client: Client,
    pub(super) tracker: Arc<RemoteClientTracker>,
    pub(super) cilium: CiliumReconciler,
}

impl ProviderReconcilerBase {
    pub fn new(
        client: Client,
        tracker: Arc<RemoteClientTracker>,
        cilium: CiliumReconciler,
    ) -> ProviderReconcilerBase {
        ProviderReconcilerBase {
            client,
            tracker,
            cilium,
        }
    }

    pub(super) async fn get_capi_cluster(
        &self,
        cluster: &AnywhereCluster,
    ) -> Result<Option<CapiCluster>> {
        let api: Api<CapiCluster> = Api::namespaced(self.client.clone(), SYSTEM_NAMESPACE);
        Ok(api.get_opt(&clusterapi::cluster_name(cluster)).await?)
    }

    /// Readiness gate between object creation and anything that talks to the
    /// provisioned cluster.
    ///
    /// An absent substrate cluster is polled for, since nothing will wake us
    /// up for it. A present but not-ready control plane only returns: the
    /// substrate's own controllers update the condition we watch, so polling
    /// on top of that would be a duplicate loop.
    pub(super) async fn check_control_plane_ready(
        &self,
        spec: &mut cluster::Spec,
    ) -> Result<ReconcileResult> {
        let Some(capi_cluster) = self.get_capi_cluster(spec.cluster()).await? else {
            info!("Substrate cluster does not exist yet, requeueing");
            return Ok(ReconcileResult::with_requeue(SUBSTRATE_POLL_INTERVAL));
        };

        if !capi_cluster.is_condition_true(CONTROL_PLANE_READY_CONDITION) {
            info!("Control plane is not ready yet");
            return Ok(ReconcileResult::with_return());
        }

        Ok(ReconcileResult::default())
    }

    /// Runs the networking addon reconciler against the provisioned cluster.
    /// The remote client can lag behind control plane readiness; that is a
    /// retryable condition, not an error.
    pub(super) async fn reconcile_cilium(
        &self,
        spec: &mut cluster::Spec,
    ) -> Result<ReconcileResult> {
        let Some(capi_cluster) = self.get_capi_cluster(spec.cluster()).await? else {
            info!("Substrate cluster does not exist yet, requeueing");
            return Ok(ReconcileResult::with_requeue(SUBSTRATE_POLL_INTERVAL));
        };

        let namespace = capi_cluster
            .namespace()
            .unwrap_or_else(|| SYSTEM_NAMESPACE.into());
        let name = capi_cluster.name_any();
        info!(cluster = %name, "Getting remote cluster client");

        let Some(remote_client) = self.tracker.get_client(&namespace, &name).await? else {
            info!("Remote cluster client not available yet, requeueing");
            return Ok(ReconcileResult::with_requeue(REMOTE_CLIENT_RETRY_INTERVAL));
        };

        self.cilium.reconcile(remote_client, spec).await
    }
}
