use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::Container;
use kube::api::{Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client, ResourceExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cluster;
use crate::clusterapi::{FIELD_MANAGER, SYSTEM_NAMESPACE};
use crate::reconcile::ReconcileResult;
use crate::{Error, Result};

const NAMESPACE: &str = "kube-system";
const DAEMON_SET_NAME: &str = "cilium";
const OPERATOR_NAME: &str = "cilium-operator";

/// What of the addon is currently deployed on a cluster
pub struct Installation {
    pub daemon_set: Option<DaemonSet>,
    pub operator: Option<Deployment>,
}

impl Installation {
    pub async fn fetch(client: &Client) -> Result<Installation> {
        let daemon_sets: Api<DaemonSet> = Api::namespaced(client.clone(), NAMESPACE);
        let deployments: Api<Deployment> = Api::namespaced(client.clone(), NAMESPACE);

        Ok(Installation {
            daemon_set: daemon_sets.get_opt(DAEMON_SET_NAME).await?,
            operator: deployments.get_opt(OPERATOR_NAME).await?,
        })
    }
}

/// Upgrade information for a cilium installation, per component
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstallationUpgradeInfo {
    pub daemon_set: ComponentUpgradeInfo,
    pub operator: ComponentUpgradeInfo,
}

impl InstallationUpgradeInfo {
    /// True if any of the installation components needs an upgrade
    pub fn needed(&self) -> bool {
        self.daemon_set.needed() || self.operator.needed()
    }

    /// Why an upgrade is needed, empty when it is not. Component reasons are
    /// composed in a stable order, daemon set first.
    pub fn reason(&self) -> String {
        if !self.needed() {
            return String::new();
        }

        let mut reasons = Vec::with_capacity(2);
        if !self.daemon_set.reason.is_empty() {
            reasons.push(self.daemon_set.reason.as_str());
        }
        if !self.operator.reason.is_empty() {
            reasons.push(self.operator.reason.as_str());
        }

        reasons.join(" - ")
    }
}

/// Upgrade information for one cilium component
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentUpgradeInfo {
    pub reason: String,
    pub old_image: String,
    pub new_image: String,
}

impl ComponentUpgradeInfo {
    pub fn needed(&self) -> bool {
        !self.reason.is_empty()
    }
}

/// Builds the upgrade information for a cilium installation by comparing it
/// with the images pinned in the cluster spec's version bundle.
///
/// Image comparison is strict string equality on the fully qualified
/// reference.
pub fn analyze_installation_upgrade(
    installation: &Installation,
    spec: &cluster::Spec,
) -> Result<InstallationUpgradeInfo> {
    Ok(InstallationUpgradeInfo {
        daemon_set: daemon_set_upgrade_info(installation.daemon_set.as_ref(), spec),
        operator: operator_upgrade_info(installation.operator.as_ref(), spec)?,
    })
}

fn daemon_set_upgrade_info(
    daemon_set: Option<&DaemonSet>,
    spec: &cluster::Spec,
) -> ComponentUpgradeInfo {
    let ds_image = spec.versions_bundle.cilium.cilium.versioned_image();
    let mut info = ComponentUpgradeInfo {
        new_image: ds_image.to_owned(),
        ..Default::default()
    };

    let Some(daemon_set) = daemon_set else {
        info.reason = "Cilium needs upgrade, DS doesn't exist".into();
        return info;
    };

    let pod_spec = daemon_set
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref());
    let containers: Vec<&Container> = pod_spec
        .map(|s| {
            s.containers
                .iter()
                .chain(s.init_containers.iter().flatten())
                .collect()
        })
        .unwrap_or_default();

    if let Some(first) = containers.first() {
        info.old_image = first.image.clone().unwrap_or_default();
    }

    for container in containers {
        let image = container.image.as_deref().unwrap_or_default();
        if image != ds_image {
            info.old_image = image.to_owned();
            info.reason = format!(
                "Cilium needs upgrade, DS container {} doesn't match image",
                container.name
            );
            return info;
        }
    }

    info
}

fn operator_upgrade_info(
    operator: Option<&Deployment>,
    spec: &cluster::Spec,
) -> Result<ComponentUpgradeInfo> {
    let new_image = spec.versions_bundle.cilium.operator.versioned_image();
    let mut info = ComponentUpgradeInfo {
        new_image: new_image.to_owned(),
        ..Default::default()
    };

    let Some(operator) = operator else {
        info.reason = "Operator deployment doesn't exist".into();
        return Ok(info);
    };

    let first_container = operator
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.containers.first());

    // A deployment with no containers is not "un-upgraded", it is a state we
    // cannot reason about.
    let Some(first_container) = first_container else {
        return Err(Error::MalformedAddonState(
            "cilium-operator deployment doesn't have any containers".into(),
        ));
    };

    let old_image = first_container.image.clone().unwrap_or_default();
    info.old_image = old_image.clone();

    if old_image != new_image {
        info.reason = "Operator container doesn't match image".into();
    }

    Ok(info)
}

/// Renders the addon manifest for a cluster spec
#[async_trait]
pub trait ManifestGenerator: Send + Sync {
    async fn generate_manifest(
        &self,
        spec: &cluster::Spec,
        provider_namespaces: &[String],
    ) -> Result<Vec<u8>>;
}

/// Serves the addon manifest the operator ships with from disk
pub struct FileManifestGenerator {
    path: std::path::PathBuf,
}

impl FileManifestGenerator {
    pub fn new(path: impl Into<std::path::PathBuf>) -> FileManifestGenerator {
        FileManifestGenerator { path: path.into() }
    }
}

#[async_trait]
impl ManifestGenerator for FileManifestGenerator {
    async fn generate_manifest(
        &self,
        _spec: &cluster::Spec,
        _provider_namespaces: &[String],
    ) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}

/// Reconciles the cilium installation on a provisioned cluster.
///
/// Runs against the remote cluster's client, deciding from the deployed
/// images whether the pinned version still matches and reapplying the
/// generated manifest when it does not.
#[derive(Clone)]
pub struct CiliumReconciler {
    generator: Arc<dyn ManifestGenerator>,
}

impl CiliumReconciler {
    pub fn new(generator: Arc<dyn ManifestGenerator>) -> CiliumReconciler {
        CiliumReconciler { generator }
    }

    pub async fn reconcile(
        &self,
        remote_client: Client,
        spec: &cluster::Spec,
    ) -> Result<ReconcileResult> {
        let installation = Installation::fetch(&remote_client).await?;
        let upgrade = analyze_installation_upgrade(&installation, spec)?;

        if !upgrade.needed() {
            debug!("Cilium already up to date");
            return Ok(ReconcileResult::default());
        }

        info!(reason = %upgrade.reason(), "Installing Cilium");
        let manifest = self
            .generator
            .generate_manifest(spec, &[SYSTEM_NAMESPACE.to_owned()])
            .await?;
        apply_manifest(&remote_client, &manifest).await?;

        Ok(ReconcileResult::default())
    }
}

/// Server side applies every document of a multi-doc yaml manifest.
/// Objects without a namespace are treated as cluster scoped.
async fn apply_manifest(client: &Client, manifest: &[u8]) -> Result<()> {
    let content = std::str::from_utf8(manifest)
        .map_err(|err| Error::InvalidManifest(format!("manifest is not valid utf-8: {err}")))?;

    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let obj: DynamicObject = serde_yaml::from_value(value)?;
        let Some(types) = obj.types.clone() else {
            return Err(Error::InvalidManifest(
                "manifest object without apiVersion/kind".into(),
            ));
        };

        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group.to_owned(), version.to_owned()),
            None => (String::new(), types.api_version.clone()),
        };
        let gvk = GroupVersionKind::gvk(&group, &version, &types.kind);
        let resource = ApiResource::from_gvk(&gvk);

        let api: Api<DynamicObject> = match &obj.metadata.namespace {
            Some(namespace) => Api::namespaced_with(client.clone(), namespace, &resource),
            None => Api::all_with(client.clone(), &resource),
        };

        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&obj.name_any(), &params, &Patch::Apply(&obj)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::{DaemonSetSpec, DeploymentSpec};
    use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};

    use crate::resources::bundles::{CiliumBundle, Image, VersionsBundle};

    use super::*;

    fn daemon_set(image: &str) -> DaemonSet {
        DaemonSet {
            spec: Some(DaemonSetSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "agent".into(),
                            image: Some(image.into()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn daemon_set_with_init(image: &str, init_image: &str) -> DaemonSet {
        let mut ds = daemon_set(image);
        ds.spec
            .as_mut()
            .unwrap()
            .template
            .spec
            .as_mut()
            .unwrap()
            .init_containers = Some(vec![Container {
            name: "init".into(),
            image: Some(init_image.into()),
            ..Default::default()
        }]);
        ds
    }

    fn deployment(images: &[&str]) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: images
                            .iter()
                            .map(|image| Container {
                                name: "operator".into(),
                                image: Some((*image).into()),
                                ..Default::default()
                            })
                            .collect(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn spec(cilium_image: &str, operator_image: &str) -> cluster::Spec {
        cluster::Spec::new(
            cluster::Config::default(),
            VersionsBundle {
                kube_version: "1.27".into(),
                cilium: CiliumBundle {
                    cilium: Image {
                        uri: cilium_image.into(),
                    },
                    operator: Image {
                        uri: operator_image.into(),
                    },
                },
            },
        )
    }

    #[test]
    fn up_to_date_installation_needs_no_upgrade() {
        let installation = Installation {
            daemon_set: Some(daemon_set("cilium:v1.0.0")),
            operator: Some(deployment(&["cilium-operator:v1.0.0"])),
        };

        let info = analyze_installation_upgrade(
            &installation,
            &spec("cilium:v1.0.0", "cilium-operator:v1.0.0"),
        )
        .unwrap();

        assert!(!info.daemon_set.needed());
        assert!(!info.operator.needed());
        assert!(!info.needed());
        assert_eq!(info.reason(), "");
        assert_eq!(info.daemon_set.old_image, "cilium:v1.0.0");
        assert_eq!(info.operator.old_image, "cilium-operator:v1.0.0");
    }

    #[test]
    fn missing_daemon_set_needs_upgrade() {
        let installation = Installation {
            daemon_set: None,
            operator: Some(deployment(&["cilium-operator:v1.0.0"])),
        };

        let info = analyze_installation_upgrade(
            &installation,
            &spec("cilium:v1.0.0", "cilium-operator:v1.0.0"),
        )
        .unwrap();

        assert!(info.daemon_set.needed());
        assert!(!info.operator.needed());
        assert_eq!(info.reason(), "Cilium needs upgrade, DS doesn't exist");
    }

    #[test]
    fn outdated_daemon_set_container_needs_upgrade() {
        let installation = Installation {
            daemon_set: Some(daemon_set("cilium:v1.0.0")),
            operator: Some(deployment(&["cilium-operator:v1.0.0"])),
        };

        let info = analyze_installation_upgrade(
            &installation,
            &spec("cilium:v1.0.1", "cilium-operator:v1.0.0"),
        )
        .unwrap();

        assert_eq!(
            info.daemon_set.reason,
            "Cilium needs upgrade, DS container agent doesn't match image"
        );
        assert_eq!(info.daemon_set.old_image, "cilium:v1.0.0");
        assert_eq!(info.daemon_set.new_image, "cilium:v1.0.1");
        assert!(!info.operator.needed());
    }

    #[test]
    fn outdated_init_container_needs_upgrade() {
        let installation = Installation {
            daemon_set: Some(daemon_set_with_init("cilium:v1.0.1", "cilium:v1.0.0")),
            operator: Some(deployment(&["cilium-operator:v1.0.0"])),
        };

        let info = analyze_installation_upgrade(
            &installation,
            &spec("cilium:v1.0.1", "cilium-operator:v1.0.0"),
        )
        .unwrap();

        assert_eq!(
            info.daemon_set.reason,
            "Cilium needs upgrade, DS container init doesn't match image"
        );
        assert_eq!(info.daemon_set.old_image, "cilium:v1.0.0");
    }

    #[test]
    fn missing_operator_needs_upgrade() {
        let installation = Installation {
            daemon_set: Some(daemon_set("cilium:v1.0.0")),
            operator: None,
        };

        let info = analyze_installation_upgrade(
            &installation,
            &spec("cilium:v1.0.0", "cilium-operator:v1.0.0"),
        )
        .unwrap();

        assert!(!info.daemon_set.needed());
        assert_eq!(info.reason(), "Operator deployment doesn't exist");
    }

    #[test]
    fn outdated_operator_container_needs_upgrade() {
        let installation = Installation {
            daemon_set: Some(daemon_set("cilium:v1.0.0")),
            operator: Some(deployment(&["cilium-operator:v1.0.0"])),
        };

        let info = analyze_installation_upgrade(
            &installation,
            &spec("cilium:v1.0.0", "cilium-operator:v1.0.1"),
        )
        .unwrap();

        assert_eq!(info.operator.reason, "Operator container doesn't match image");
        assert_eq!(info.operator.old_image, "cilium-operator:v1.0.0");
        assert_eq!(info.operator.new_image, "cilium-operator:v1.0.1");
    }

    #[test]
    fn operator_without_containers_is_malformed() {
        let installation = Installation {
            daemon_set: Some(daemon_set("cilium:v1.0.0")),
            operator: Some(deployment(&[])),
        };

        let err = analyze_installation_upgrade(
            &installation,
            &spec("cilium:v1.0.0", "cilium-operator:v1.0.0"),
        )
        .unwrap_err();

        assert!(matches!(err, Error::MalformedAddonState(_)));
    }

    #[test]
    fn component_reasons_compose_daemon_set_first() {
        let installation = Installation {
            daemon_set: None,
            operator: None,
        };

        let info = analyze_installation_upgrade(
            &installation,
            &spec("cilium:v1.0.0", "cilium-operator:v1.0.0"),
        )
        .unwrap();

        assert_eq!(
            info.reason(),
            "Cilium needs upgrade, DS doesn't exist - Operator deployment doesn't exist"
        );
    }
}
