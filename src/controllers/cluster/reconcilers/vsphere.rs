use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use kube::Client;
use tracing::{info, instrument};

use crate::cluster;
use crate::clusterapi::{self, ControlPlane, Workers};
use crate::networking::cilium::CiliumReconciler;
use crate::reconcile::{Phase, PhaseRunner, ReconcileResult};
use crate::resources::anywhereclusters::AnywhereCluster;
use crate::resources::capi::{
    VSphereCluster, VSphereClusterSpec, VSphereMachineSpec, VSphereMachineTemplate,
    VSphereMachineTemplateResource, VSphereMachineTemplateSpec,
};
use crate::resources::datacenters::VSphereDatacenterConfig;
use crate::resources::machineconfigs::VSphereMachineConfig;
use crate::{Error, Result};

use super::super::registry::ProviderClusterReconciler;
use super::super::remote::RemoteClientTracker;
use super::{ProviderReconcilerBase, SUBSTRATE_POLL_INTERVAL};

pub struct VSphereClusterReconciler {
    base: ProviderReconcilerBase,
}

impl VSphereClusterReconciler {
    pub fn new(
        client: Client,
        tracker: Arc<RemoteClientTracker>,
        cilium: CiliumReconciler,
    ) -> VSphereClusterReconciler {
        VSphereClusterReconciler {
            base: ProviderReconcilerBase::new(client, tracker, cilium),
        }
    }

    fn phases() -> PhaseRunner<VSphereClusterReconciler> {
        PhaseRunner::new().register([
            control_plane_phase as Phase<VSphereClusterReconciler>,
            control_plane_ready_phase,
            cilium_phase,
            workers_phase,
        ])
    }

    async fn reconcile_control_plane(&self, spec: &mut cluster::Spec) -> Result<ReconcileResult> {
        info!("Generating control plane substrate objects");
        let mut control_plane = control_plane_objects(spec)?;
        control_plane
            .update_immutable_object_names(&self.base.client, machine_template_equal)
            .await?;

        info!("Applying control plane objects");
        control_plane.apply(&self.base.client).await?;

        Ok(ReconcileResult::default())
    }

    async fn reconcile_workers(&self, spec: &mut cluster::Spec) -> Result<ReconcileResult> {
        info!("Generating worker substrate objects");
        let workers = workers_objects(spec)?;

        info!("Applying worker objects");
        workers.apply(&self.base.client).await?;

        Ok(ReconcileResult::default())
    }
}

#[async_trait]
impl ProviderClusterReconciler for VSphereClusterReconciler {
    #[instrument(skip(self, cluster), fields(provider = "vsphere"))]
    async fn reconcile(&self, cluster: &AnywhereCluster) -> Result<ReconcileResult> {
        let Some(mut spec) = cluster::build_spec(&self.base.client, cluster).await? else {
            info!("Referenced objects are not all present yet, requeueing");
            return Ok(ReconcileResult::with_requeue(SUBSTRATE_POLL_INTERVAL));
        };

        Self::phases().run(self, &mut spec).await
    }
}

fn control_plane_phase<'a>(
    r: &'a VSphereClusterReconciler,
    spec: &'a mut cluster::Spec,
) -> BoxFuture<'a, Result<ReconcileResult>> {
    Box::pin(r.reconcile_control_plane(spec))
}

fn control_plane_ready_phase<'a>(
    r: &'a VSphereClusterReconciler,
    spec: &'a mut cluster::Spec,
) -> BoxFuture<'a, Result<ReconcileResult>> {
    Box::pin(r.base.check_control_plane_ready(spec))
}

fn cilium_phase<'a>(
    r: &'a VSphereClusterReconciler,
    spec: &'a mut cluster::Spec,
) -> BoxFuture<'a, Result<ReconcileResult>> {
    Box::pin(r.base.reconcile_cilium(spec))
}

fn workers_phase<'a>(
    r: &'a VSphereClusterReconciler,
    spec: &'a mut cluster::Spec,
) -> BoxFuture<'a, Result<ReconcileResult>> {
    Box::pin(r.reconcile_workers(spec))
}

/// Semantic comparison on the template's own spec; metadata and
/// server-populated fields never participate.
fn machine_template_equal(new: &VSphereMachineTemplate, old: &VSphereMachineTemplate) -> bool {
    new.spec.template == old.spec.template
}

fn vsphere_machine_template(
    cluster: &AnywhereCluster,
    name: &str,
    config: &VSphereMachineConfig,
) -> VSphereMachineTemplate {
    VSphereMachineTemplate {
        metadata: clusterapi::object_meta(cluster, name),
        spec: VSphereMachineTemplateSpec {
            template: VSphereMachineTemplateResource {
                spec: VSphereMachineSpec {
                    template: config.spec.template.clone(),
                    datastore: config.spec.datastore.clone(),
                    folder: config.spec.folder.clone(),
                    resource_pool: config.spec.resource_pool.clone(),
                    num_cpus: config.spec.num_cpus,
                    memory_mi_b: config.spec.memory_mi_b,
                    disk_gi_b: config.spec.disk_gi_b,
                },
            },
        },
    }
}

fn machine_config<'a>(
    spec: &'a cluster::Spec,
    machine_group_ref: Option<&crate::resources::anywhereclusters::Ref>,
) -> Result<&'a VSphereMachineConfig> {
    let machine_group = machine_group_ref.ok_or_else(|| {
        Error::InvalidManifest("node group has no machine group reference".into())
    })?;

    spec.config
        .vsphere_machine_config(&machine_group.name)
        .ok_or_else(|| {
            Error::InvalidManifest(format!(
                "vsphere machine config {} not present in cluster spec",
                machine_group.name
            ))
        })
}

fn datacenter(spec: &cluster::Spec) -> Result<&VSphereDatacenterConfig> {
    spec.config.vsphere_datacenter().ok_or_else(|| {
        Error::InvalidManifest("vsphere datacenter config not present in cluster spec".into())
    })
}

fn control_plane_objects(
    spec: &cluster::Spec,
) -> Result<ControlPlane<VSphereCluster, VSphereMachineTemplate>> {
    let cluster = spec.cluster();
    let datacenter = datacenter(spec)?;
    let config = machine_config(
        spec,
        cluster.spec.control_plane_configuration.machine_group_ref.as_ref(),
    )?;

    let provider_cluster = VSphereCluster {
        metadata: clusterapi::object_meta(cluster, &clusterapi::cluster_name(cluster)),
        spec: VSphereClusterSpec {
            server: datacenter.spec.server.clone(),
            thumbprint: datacenter.spec.thumbprint.clone(),
            control_plane_endpoint: None,
        },
    };
    let machine_template = vsphere_machine_template(
        cluster,
        &clusterapi::control_plane_machine_template_name(cluster),
        config,
    );
    let control_plane = clusterapi::kubeadm_control_plane(
        cluster,
        clusterapi::object_reference(&machine_template),
    );
    let capi_cluster = clusterapi::capi_cluster(
        cluster,
        clusterapi::object_reference(&provider_cluster),
        clusterapi::object_reference(&control_plane),
    );

    Ok(ControlPlane {
        cluster: capi_cluster,
        provider_cluster,
        control_plane,
        machine_template,
    })
}

fn workers_objects(spec: &cluster::Spec) -> Result<Workers<VSphereMachineTemplate>> {
    let cluster = spec.cluster();
    let mut deployments = Vec::new();
    let mut machine_templates = Vec::new();

    for group in &cluster.spec.worker_node_group_configurations {
        let config = machine_config(spec, group.machine_group_ref.as_ref())?;
        let template = vsphere_machine_template(
            cluster,
            &clusterapi::worker_machine_template_name(cluster, &group.name),
            config,
        );
        deployments.push(clusterapi::machine_deployment(
            cluster,
            &group.name,
            group.count,
            clusterapi::object_reference(&template),
        ));
        machine_templates.push(template);
    }

    Ok(Workers {
        deployments,
        machine_templates,
    })
}

#[cfg(test)]
mod tests {
    use crate::resources::bundles::VersionsBundle;

    use super::*;

    const MANIFEST: &str = r#"
apiVersion: anywhere.dev/v1alpha1
kind: AnywhereCluster
metadata:
  name: prod
  namespace: default
spec:
  kubernetesVersion: "1.27"
  controlPlaneConfiguration:
    count: 3
    machineGroupRef:
      kind: VSphereMachineConfig
      name: prod-cp
  workerNodeGroupConfigurations:
    - name: md-0
      count: 5
      machineGroupRef:
        kind: VSphereMachineConfig
        name: prod-workers
  datacenterRef:
    kind: VSphereDatacenterConfig
    name: prod
---
apiVersion: anywhere.dev/v1alpha1
kind: VSphereDatacenterConfig
metadata:
  name: prod
spec:
  server: vcenter.internal
  datacenter: dc-1
  network: net-1
  thumbprint: "AA:BB"
---
apiVersion: anywhere.dev/v1alpha1
kind: VSphereMachineConfig
metadata:
  name: prod-cp
spec:
  template: ubuntu-2204
  datastore: ds-1
  numCPUs: 4
  memoryMiB: 8192
  diskGiB: 40
---
apiVersion: anywhere.dev/v1alpha1
kind: VSphereMachineConfig
metadata:
  name: prod-workers
spec:
  template: ubuntu-2204
  datastore: ds-1
  numCPUs: 8
  memoryMiB: 16384
  diskGiB: 80
"#;

    fn test_spec() -> cluster::Spec {
        let config = cluster::parse_config(MANIFEST).unwrap();
        cluster::Spec::new(config, VersionsBundle::default())
    }

    #[test]
    fn provider_cluster_carries_datacenter_connection_details() {
        let spec = test_spec();
        let control_plane = control_plane_objects(&spec).unwrap();

        assert_eq!(control_plane.provider_cluster.spec.server, "vcenter.internal");
        assert_eq!(
            control_plane.provider_cluster.spec.thumbprint.as_deref(),
            Some("AA:BB")
        );
    }

    #[test]
    fn control_plane_references_the_initial_template_name() {
        let spec = test_spec();
        let control_plane = control_plane_objects(&spec).unwrap();

        assert_eq!(
            control_plane.machine_template.metadata.name.as_deref(),
            Some("prod-control-plane-1")
        );
        assert_eq!(
            control_plane
                .control_plane
                .spec
                .machine_template
                .infrastructure_ref
                .name
                .as_deref(),
            Some("prod-control-plane-1")
        );
        assert_eq!(
            control_plane.machine_template.spec.template.spec.num_cpus,
            4
        );
    }

    #[test]
    fn template_equality_ignores_metadata() {
        let spec = test_spec();
        let control_plane = control_plane_objects(&spec).unwrap();

        let mut renamed = control_plane.machine_template.clone();
        renamed.metadata.name = Some("prod-control-plane-7".into());
        assert!(machine_template_equal(
            &control_plane.machine_template,
            &renamed
        ));

        let mut resized = control_plane.machine_template.clone();
        resized.spec.template.spec.memory_mi_b = 32768;
        assert!(!machine_template_equal(
            &control_plane.machine_template,
            &resized
        ));
    }

    #[test]
    fn worker_deployments_reference_their_templates() {
        let spec = test_spec();
        let workers = workers_objects(&spec).unwrap();

        assert_eq!(workers.deployments.len(), 1);
        assert_eq!(workers.deployments[0].spec.replicas, Some(5));
        assert_eq!(
            workers.deployments[0]
                .spec
                .template
                .spec
                .infrastructure_ref
                .as_ref()
                .and_then(|r| r.name.as_deref()),
            Some("prod-md-0-1")
        );
    }
}
