use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub static CLUSTER_FINALIZER: &str = "clusters.anywhere.dev/finalizer";

/// Annotation that pauses reconciliation of a cluster while set to "true"
pub const PAUSED_ANNOTATION: &str = "anywhere.dev/paused";

pub const CLUSTER_KIND: &str = "AnywhereCluster";

/// Reference to an object of a known kind in the same namespace
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub struct Ref {
    pub kind: String,
    pub name: String,
}

impl Ref {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Ref {
        Ref {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Represents the desired state of a cluster managed on any supported infrastructure provider
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "AnywhereCluster",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"KubernetesVersion", "type":"string", "jsonPath":".spec.kubernetesVersion"}"#,
    printcolumn = r#"{"name":"Provider", "type":"string", "jsonPath":".spec.datacenterRef.kind"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "AnywhereClusterStatus", shortname = "awc")]
#[serde(rename_all = "camelCase")]
pub struct AnywhereClusterSpec {
    /// Kubernetes version for both control plane and worker nodes, e.g. "1.27"
    pub kubernetes_version: String,
    pub control_plane_configuration: ControlPlaneConfiguration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worker_node_group_configurations: Vec<WorkerNodeGroupConfiguration>,
    /// Reference to the provider-specific datacenter configuration
    pub datacenter_ref: Ref,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identity_provider_refs: Vec<Ref>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ops_ref: Option<Ref>,
    /// Reference to the version bundle manifest. Defaults to a Bundles object named after the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundles_ref: Option<Ref>,
    /// Set on workload clusters to point at their management cluster.
    /// Unset means the cluster manages itself and is not reconciled here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_cluster: Option<ManagementCluster>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfiguration {
    /// count is the number of control plane nodes
    pub count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerNodeGroupConfiguration {
    pub name: String,
    pub count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
pub struct ManagementCluster {
    pub name: String,
}

/// Status of the AnywhereCluster.
/// This is set and managed automatically.
/// Read-only.
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnywhereClusterStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<ClusterCondition>>,
    /// Set when the last reconciliation of this cluster failed; cleared on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Last time the condition transitioned from one status to another.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,

    /// Human-readable message indicating details about last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Unique, one-word, CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Status is the status of the condition. Can be True, False, Unknown.
    pub status: String,

    /// Type of the condition, known values are (`Ready`).
    pub r#type: String,
}

impl AnywhereCluster {
    /// A cluster without a management cluster reference manages itself
    /// and is not driven by this operator.
    pub fn is_self_managed(&self) -> bool {
        match &self.spec.management_cluster {
            None => true,
            Some(m) => m.name == self.name_any(),
        }
    }

    pub fn is_reconcile_paused(&self) -> bool {
        self.annotations()
            .get(PAUSED_ANNOTATION)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// Name of the Bundles object carrying this cluster's version bundle
    pub fn bundles_name(&self) -> String {
        self.spec
            .bundles_ref
            .as_ref()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| self.name_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn ref_serializes_with_plain_field_names() {
        let r = Ref::new("VSphereDatacenterConfig", "prod");
        assert_json_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"kind": "VSphereDatacenterConfig", "name": "prod"})
        );
    }

    #[test]
    fn cluster_without_management_ref_is_self_managed() {
        let mut cluster = AnywhereCluster::default();
        cluster.metadata.name = Some("mgmt".into());
        assert!(cluster.is_self_managed());

        cluster.spec.management_cluster = Some(ManagementCluster { name: "mgmt".into() });
        assert!(cluster.is_self_managed());

        cluster.spec.management_cluster = Some(ManagementCluster {
            name: "other".into(),
        });
        assert!(!cluster.is_self_managed());
    }

    #[test]
    fn paused_annotation_gates_reconciliation() {
        let mut cluster = AnywhereCluster::default();
        assert!(!cluster.is_reconcile_paused());

        cluster
            .annotations_mut()
            .insert(PAUSED_ANNOTATION.into(), "true".into());
        assert!(cluster.is_reconcile_paused());
    }

    #[test]
    fn bundles_name_defaults_to_cluster_name() {
        let mut cluster = AnywhereCluster::default();
        cluster.metadata.name = Some("my-cluster".into());
        assert_eq!(cluster.bundles_name(), "my-cluster");

        cluster.spec.bundles_ref = Some(Ref::new("Bundles", "release-42"));
        assert_eq!(cluster.bundles_name(), "release-42");
    }
}
