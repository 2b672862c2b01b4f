use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set by the substrate once a cluster's control plane is usable
pub const CONTROL_PLANE_READY_CONDITION: &str = "ControlPlaneReady";

/// The substrate's own cluster object.
/// We create it, the substrate's controllers reconcile it.
/// API: cluster.x-k8s.io/v1beta1
#[derive(CustomResource, Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced
)]
#[kube(status = "ClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ObjectReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ObjectReference>,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<CapiCondition>>,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapiCondition {
    pub r#type: String,
    /// True, False or Unknown
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Cluster {
    pub fn is_condition_true(&self, condition_type: &str) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.r#type == condition_type && c.status == "True")
            })
            .unwrap_or(false)
    }
}

/// Control plane object reconciled by the substrate's kubeadm provider.
/// API: controlplane.cluster.x-k8s.io/v1beta1
#[derive(CustomResource, Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    group = "controlplane.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "KubeadmControlPlane",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    pub version: String,
    pub machine_template: KubeadmControlPlaneMachineTemplate,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneMachineTemplate {
    /// Reference to the provider machine template backing control plane nodes.
    /// The referenced object is immutable; rolling a new template means
    /// pointing this at a newly named object.
    pub infrastructure_ref: ObjectReference,
}

/// Worker node group object reconciled by the substrate.
/// API: cluster.x-k8s.io/v1beta1
#[derive(CustomResource, Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "MachineDeployment",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentSpec {
    pub cluster_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    pub template: MachineTemplateSpec,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineTemplateSpec {
    pub spec: MachineSpec,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    pub cluster_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ObjectReference>,
}

/// Provider cluster object for a fleet of snow devices.
/// API: infrastructure.cluster.x-k8s.io/v1beta1
#[derive(CustomResource, Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "SnowCluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SnowClusterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ControlPlaneEndpoint>,
}

/// Provider cluster object for a vSphere datacenter.
/// API: infrastructure.cluster.x-k8s.io/v1beta1
#[derive(CustomResource, Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "VSphereCluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereClusterSpec {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ControlPlaneEndpoint>,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneEndpoint {
    pub host: String,
    pub port: i32,
}

/// Immutable machine template for snow devices.
/// API: infrastructure.cluster.x-k8s.io/v1beta1
#[derive(CustomResource, Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "SnowMachineTemplate",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SnowMachineTemplateSpec {
    pub template: SnowMachineTemplateResource,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnowMachineTemplateResource {
    pub spec: SnowMachineSpec,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnowMachineSpec {
    pub instance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
}

/// Immutable machine template for vSphere VMs.
/// API: infrastructure.cluster.x-k8s.io/v1beta1
#[derive(CustomResource, Serialize, Deserialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "VSphereMachineTemplate",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineTemplateSpec {
    pub template: VSphereMachineTemplateResource,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineTemplateResource {
    pub spec: VSphereMachineSpec,
}

#[derive(Serialize, Deserialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineSpec {
    pub template: String,
    pub datastore: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_pool: Option<String>,
    #[serde(rename = "numCPUs")]
    pub num_cpus: i32,
    pub memory_mi_b: i64,
    pub disk_gi_b: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_lookup_requires_true_status() {
        let mut cluster = Cluster::default();
        assert!(!cluster.is_condition_true(CONTROL_PLANE_READY_CONDITION));

        cluster.status = Some(ClusterStatus {
            phase: None,
            conditions: Some(vec![CapiCondition {
                r#type: CONTROL_PLANE_READY_CONDITION.into(),
                status: "False".into(),
                ..Default::default()
            }]),
        });
        assert!(!cluster.is_condition_true(CONTROL_PLANE_READY_CONDITION));

        cluster.status = Some(ClusterStatus {
            phase: None,
            conditions: Some(vec![CapiCondition {
                r#type: CONTROL_PLANE_READY_CONDITION.into(),
                status: "True".into(),
                ..Default::default()
            }]),
        });
        assert!(cluster.is_condition_true(CONTROL_PLANE_READY_CONDITION));
    }

    #[test]
    fn machine_template_specs_compare_semantically() {
        let a = SnowMachineTemplateResource {
            spec: SnowMachineSpec {
                instance_type: "sbe-c.large".into(),
                ssh_key_name: None,
                devices: vec!["1.2.3.4".into()],
            },
        };
        let b = a.clone();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.spec.instance_type = "sbe-c.xlarge".into();
        assert_ne!(a, c);
    }
}
