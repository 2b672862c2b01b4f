use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GITOPS_CONFIG_KIND: &str = "GitOpsConfig";

/// GitOps repository the cluster configuration is synced from
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "GitOpsConfig",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsConfigSpec {
    pub flux: FluxConfiguration,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FluxConfiguration {
    pub github: GithubConfiguration,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GithubConfiguration {
    pub owner: String,
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_config_path: Option<String>,
}
