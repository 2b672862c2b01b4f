use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const OIDC_CONFIG_KIND: &str = "OIDCConfig";
pub const AWS_IAM_CONFIG_KIND: &str = "AWSIamConfig";

/// OIDC identity provider wired into the cluster api server
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "OIDCConfig",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OIDCConfigSpec {
    pub issuer_url: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_claim: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups_claim: Option<String>,
}

/// IAM authenticator identity provider
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "AWSIamConfig",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AWSIamConfigSpec {
    pub aws_region: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_mode: Vec<String>,
}
