use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const SNOW_MACHINE_CONFIG_KIND: &str = "SnowMachineConfig";
pub const VSPHERE_MACHINE_CONFIG_KIND: &str = "VSphereMachineConfig";

/// Machine shape for nodes provisioned on snowball devices
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "SnowMachineConfig",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SnowMachineConfigSpec {
    pub instance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key_name: Option<String>,
    /// IPs of the devices this machine group may be scheduled onto
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
}

/// Machine shape for nodes provisioned on vSphere
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "VSphereMachineConfig",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineConfigSpec {
    /// VM template the machine is cloned from
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
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserConfiguration>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserConfiguration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_authorized_keys: Vec<String>,
}
