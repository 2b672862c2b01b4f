use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const SNOW_DATACENTER_KIND: &str = "SnowDatacenterConfig";
pub const VSPHERE_DATACENTER_KIND: &str = "VSphereDatacenterConfig";
pub const DOCKER_DATACENTER_KIND: &str = "DockerDatacenterConfig";

/// Connection details for a fleet of snowball devices acting as a datacenter
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "SnowDatacenterConfig",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SnowDatacenterConfigSpec {
    /// Name of the secret holding device credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<String>,
}

/// Connection details for a vSphere datacenter
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "VSphereDatacenterConfig",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereDatacenterConfigSpec {
    pub server: String,
    pub datacenter: String,
    pub network: String,
    /// TLS thumbprint of the vCenter server; required when insecure is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,
    #[serde(default)]
    pub insecure: bool,
}

/// Docker datacenter for local development clusters
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "DockerDatacenterConfig",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DockerDatacenterConfigSpec {}
