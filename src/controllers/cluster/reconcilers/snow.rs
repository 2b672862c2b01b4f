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
    SnowCluster, SnowMachineSpec, SnowMachineTemplate, SnowMachineTemplateResource,
    SnowMachineTemplateSpec,
};
use crate::resources::machineconfigs::SnowMachineConfig;
use crate::{Error, Result};

use super::super::registry::ProviderClusterReconciler;
use super::super::remote::RemoteClientTracker;
use super::{ProviderReconcilerBase, SUBSTRATE_POLL_INTERVAL};

pub struct SnowClusterReconciler {
    base: ProviderReconcilerBase,
}

impl SnowClusterReconciler {
    pub fn new(
        client: Client,
        tracker: Arc<RemoteClientTracker>,
        cilium: CiliumReconciler,
    ) -> SnowClusterReconciler {
        SnowClusterReconciler {
            base: ProviderReconcilerBase::new(client, tracker, cilium),
        }
    }

    fn phases() -> PhaseRunner<SnowClusterReconciler> {
        PhaseRunner::new().register([
            control_plane_phase as Phase<SnowClusterReconciler>,
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
impl ProviderClusterReconciler for SnowClusterReconciler {
    #[instrument(skip(self, cluster), fields(provider = "snow"))]
    async fn reconcile(&self, cluster: &AnywhereCluster) -> Result<ReconcileResult> {
        let Some(mut spec) = cluster::build_spec(&self.base.client, cluster).await? else {
            info!("Referenced objects are not all present yet, requeueing");
            return Ok(ReconcileResult::with_requeue(SUBSTRATE_POLL_INTERVAL));
        };

        Self::phases().run(self, &mut spec).await
    }
}

fn control_plane_phase<'a>(
    r: &'a SnowClusterReconciler,
    spec: &'a mut cluster::Spec,
) -> BoxFuture<'a, Result<ReconcileResult>> {
    Box::pin(r.reconcile_control_plane(spec))
}

fn control_plane_ready_phase<'a>(
    r: &'a SnowClusterReconciler,
    spec: &'a mut cluster::Spec,
) -> BoxFuture<'a, Result<ReconcileResult>> {
    Box::pin(r.base.check_control_plane_ready(spec))
}

fn cilium_phase<'a>(
    r: &'a SnowClusterReconciler,
    spec: &'a mut cluster::Spec,
) -> BoxFuture<'a, Result<ReconcileResult>> {
    Box::pin(r.base.reconcile_cilium(spec))
}

fn workers_phase<'a>(
    r: &'a SnowClusterReconciler,
    spec: &'a mut cluster::Spec,
) -> BoxFuture<'a, Result<ReconcileResult>> {
    Box::pin(r.reconcile_workers(spec))
}

fn machine_template_equal(new: &SnowMachineTemplate, old: &SnowMachineTemplate) -> bool {
    new.spec.template == old.spec.template
}

fn snow_machine_template(
    cluster: &AnywhereCluster,
    name: &str,
    config: &SnowMachineConfig,
) -> SnowMachineTemplate {
    SnowMachineTemplate {
        metadata: clusterapi::object_meta(cluster, name),
        spec: SnowMachineTemplateSpec {
            template: SnowMachineTemplateResource {
                spec: SnowMachineSpec {
                    instance_type: config.spec.instance_type.clone(),
                    ssh_key_name: config.spec.ssh_key_name.clone(),
                    devices: config.spec.devices.clone(),
                },
            },
        },
    }
}

fn machine_config<'a>(
    spec: &'a cluster::Spec,
    machine_group_ref: Option<&crate::resources::anywhereclusters::Ref>,
) -> Result<&'a SnowMachineConfig> {
    let machine_group = machine_group_ref.ok_or_else(|| {
        Error::InvalidManifest("node group has no machine group reference".into())
    })?;

    spec.config
        .snow_machine_config(&machine_group.name)
        .ok_or_else(|| {
            Error::InvalidManifest(format!(
                "snow machine config {} not present in cluster spec",
                machine_group.name
            ))
        })
}

fn control_plane_objects(
    spec: &cluster::Spec,
) -> Result<ControlPlane<SnowCluster, SnowMachineTemplate>> {
    let cluster = spec.cluster();
    let config = machine_config(
        spec,
        cluster.spec.control_plane_configuration.machine_group_ref.as_ref(),
    )?;

    let provider_cluster = SnowCluster {
        metadata: clusterapi::object_meta(cluster, &clusterapi::cluster_name(cluster)),
        spec: Default::default(),
    };
    let machine_template = snow_machine_template(
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

fn workers_objects(spec: &cluster::Spec) -> Result<Workers<SnowMachineTemplate>> {
    let cluster = spec.cluster();
    let mut deployments = Vec::new();
    let mut machine_templates = Vec::new();

    for group in &cluster.spec.worker_node_group_configurations {
        let config = machine_config(spec, group.machine_group_ref.as_ref())?;
        let template = snow_machine_template(
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
  name: edge
  namespace: default
spec:
  kubernetesVersion: "1.27"
  controlPlaneConfiguration:
    count: 3
    machineGroupRef:
      kind: SnowMachineConfig
      name: edge-cp
  workerNodeGroupConfigurations:
    - name: md-0
      count: 4
      machineGroupRef:
        kind: SnowMachineConfig
        name: edge-workers
  datacenterRef:
    kind: SnowDatacenterConfig
    name: edge
---
apiVersion: anywhere.dev/v1alpha1
kind: SnowDatacenterConfig
metadata:
  name: edge
spec: {}
---
apiVersion: anywhere.dev/v1alpha1
kind: SnowMachineConfig
metadata:
  name: edge-cp
spec:
  instanceType: sbe-c.xlarge
  sshKeyName: edge-key
  devices: ["10.1.1.1", "10.1.1.2"]
---
apiVersion: anywhere.dev/v1alpha1
kind: SnowMachineConfig
metadata:
  name: edge-workers
spec:
  instanceType: sbe-c.large
  devices: ["10.1.1.3"]
"#;

    fn test_spec() -> cluster::Spec {
        let config = cluster::parse_config(MANIFEST).unwrap();
        cluster::Spec::new(config, VersionsBundle::default())
    }

    #[test]
    fn control_plane_objects_are_wired_together() {
        let spec = test_spec();
        let control_plane = control_plane_objects(&spec).unwrap();

        assert_eq!(
            control_plane.cluster.metadata.name.as_deref(),
            Some("edge")
        );
        assert_eq!(
            control_plane
                .cluster
                .spec
                .infrastructure_ref
                .as_ref()
                .and_then(|r| r.kind.as_deref()),
            Some("SnowCluster")
        );
        assert_eq!(
            control_plane
                .cluster
                .spec
                .control_plane_ref
                .as_ref()
                .and_then(|r| r.kind.as_deref()),
            Some("KubeadmControlPlane")
        );
        assert_eq!(control_plane.control_plane.spec.replicas, Some(3));
        assert_eq!(
            control_plane
                .control_plane
                .spec
                .machine_template
                .infrastructure_ref
                .name
                .as_deref(),
            Some("edge-control-plane-1")
        );
        assert_eq!(
            control_plane.machine_template.spec.template.spec.instance_type,
            "sbe-c.xlarge"
        );
    }

    #[test]
    fn worker_objects_cover_every_node_group() {
        let spec = test_spec();
        let workers = workers_objects(&spec).unwrap();

        assert_eq!(workers.deployments.len(), 1);
        assert_eq!(workers.machine_templates.len(), 1);

        let deployment = &workers.deployments[0];
        assert_eq!(deployment.metadata.name.as_deref(), Some("edge-md-0"));
        assert_eq!(deployment.spec.replicas, Some(4));
        assert_eq!(deployment.spec.cluster_name, "edge");
        assert_eq!(
            deployment
                .spec
                .template
                .spec
                .infrastructure_ref
                .as_ref()
                .and_then(|r| r.name.as_deref()),
            Some("edge-md-0-1")
        );
        assert_eq!(
            workers.machine_templates[0].spec.template.spec.instance_type,
            "sbe-c.large"
        );
    }

    #[test]
    fn missing_machine_config_is_a_terminal_error() {
        let mut spec = test_spec();
        let bare_cluster = spec.cluster().clone();
        spec.config = cluster::Config::new(bare_cluster);

        let err = control_plane_objects(&spec).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest(_)));
    }

    #[test]
    fn changed_template_specs_are_not_equal() {
        let spec = test_spec();
        let control_plane = control_plane_objects(&spec).unwrap();

        let same = control_plane.machine_template.clone();
        assert!(machine_template_equal(&control_plane.machine_template, &same));

        let mut changed = control_plane.machine_template.clone();
        changed.spec.template.spec.instance_type = "sbe-g.4xlarge".into();
        assert!(!machine_template_equal(
            &control_plane.machine_template,
            &changed
        ));
    }
}
