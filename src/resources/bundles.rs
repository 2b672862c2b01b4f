use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const BUNDLES_KIND: &str = "Bundles";

/// Release manifest pinning every managed component to concrete image
/// references, one bundle per supported kubernetes version
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[kube(
    derive = "Default",
    kind = "Bundles",
    group = "anywhere.dev",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BundlesSpec {
    /// Monotonically increasing release number
    pub number: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions_bundles: Vec<VersionsBundle>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionsBundle {
    pub kube_version: String,
    pub cilium: CiliumBundle,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CiliumBundle {
    pub cilium: Image,
    pub operator: Image,
}

/// A fully qualified, versioned container image reference
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub uri: String,
}

impl Image {
    /// The pinned reference, compared by strict string equality.
    /// No semantic version parsing happens at this layer.
    pub fn versioned_image(&self) -> &str {
        &self.uri
    }
}

impl Bundles {
    /// Bundle for a given kubernetes version, if this release supports it
    pub fn versions_bundle_for(&self, kube_version: &str) -> Option<&VersionsBundle> {
        self.spec
            .versions_bundles
            .iter()
            .find(|vb| vb.kube_version == kube_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_bundle_lookup_by_kube_version() {
        let mut bundles = Bundles::default();
        bundles.spec.versions_bundles = vec![
            VersionsBundle {
                kube_version: "1.26".into(),
                ..Default::default()
            },
            VersionsBundle {
                kube_version: "1.27".into(),
                ..Default::default()
            },
        ];

        assert_eq!(
            bundles.versions_bundle_for("1.27").map(|b| b.kube_version.as_str()),
            Some("1.27")
        );
        assert!(bundles.versions_bundle_for("1.28").is_none());
    }
}
