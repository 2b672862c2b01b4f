use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::resources::anywhereclusters::AnywhereCluster;
use crate::resources::capi::{
    Cluster as CapiCluster, KubeadmControlPlane, KubeadmControlPlaneMachineTemplate,
    MachineDeployment, MachineDeploymentSpec, MachineSpec, MachineTemplateSpec,
};
use crate::{Error, Result};

/// Namespace all substrate objects created by this operator live in
pub const SYSTEM_NAMESPACE: &str = "anywhere-system";

/// Labels connecting substrate objects back to the owning AnywhereCluster,
/// which usually lives in a different namespace than the objects themselves
pub const CLUSTER_LABEL_NAME: &str = "cluster.anywhere.dev/cluster-name";
pub const CLUSTER_NAMESPACE_LABEL_NAME: &str = "cluster.anywhere.dev/cluster-namespace";

/// Field manager for server side apply
pub const FIELD_MANAGER: &str = "anywhere-operator";

/// Name of the substrate cluster object derived for an AnywhereCluster
pub fn cluster_name(cluster: &AnywhereCluster) -> String {
    cluster.name_any()
}

/// Initial name for the control plane machine template. Rotations increment
/// the numeric suffix.
pub fn control_plane_machine_template_name(cluster: &AnywhereCluster) -> String {
    format!("{}-control-plane-1", cluster.name_any())
}

/// Initial name for a worker node group's machine template
pub fn worker_machine_template_name(cluster: &AnywhereCluster, group: &str) -> String {
    format!("{}-{group}-1", cluster.name_any())
}

/// Computes the successor of a generated object name by bumping its
/// numeric suffix. Names without one cannot be rotated.
pub fn increment_name(name: &str) -> Result<String> {
    let (base, suffix) = name
        .rsplit_once('-')
        .ok_or_else(|| Error::InvalidObjectName(name.into(), "missing -<number> suffix".into()))?;
    let number: u64 = suffix.parse().map_err(|_| {
        Error::InvalidObjectName(name.into(), "suffix is not a number".into())
    })?;

    Ok(format!("{base}-{}", number + 1))
}

/// Metadata shared by every substrate object we generate for a cluster
pub fn object_meta(cluster: &AnywhereCluster, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(SYSTEM_NAMESPACE.into()),
        labels: Some(BTreeMap::from([
            (CLUSTER_LABEL_NAME.into(), cluster.name_any()),
            (
                CLUSTER_NAMESPACE_LABEL_NAME.into(),
                cluster.namespace().unwrap_or_else(|| "default".into()),
            ),
        ])),
        ..Default::default()
    }
}

/// Typed reference to a generated object
pub fn object_reference<K>(obj: &K) -> ObjectReference
where
    K: Resource,
    K::DynamicType: Default,
{
    let dt = K::DynamicType::default();
    ObjectReference {
        api_version: Some(K::api_version(&dt).into_owned()),
        kind: Some(K::kind(&dt).into_owned()),
        name: obj.meta().name.clone(),
        namespace: obj.meta().namespace.clone(),
        ..Default::default()
    }
}

/// Server side applies one namespaced object
pub async fn apply<K>(client: &Client, obj: &K) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
    K::DynamicType: Default,
{
    let dt = K::DynamicType::default();
    let namespace = obj
        .meta()
        .namespace
        .clone()
        .unwrap_or_else(|| SYSTEM_NAMESPACE.into());
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::MissingMetadata(K::kind(&dt).into_owned()))?;

    debug!("Applying {} {namespace}/{name}", K::kind(&dt));
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&name, &params, &Patch::Apply(obj)).await?;

    Ok(())
}

/// The substrate objects forming one functional control plane, generic over
/// the provider cluster and machine template kinds
pub struct ControlPlane<C, M> {
    pub cluster: CapiCluster,
    pub provider_cluster: C,
    pub control_plane: KubeadmControlPlane,
    pub machine_template: M,
}

impl<C, M> ControlPlane<C, M>
where
    C: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
    C::DynamicType: Default,
    M: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
    M::DynamicType: Default,
{
    pub async fn apply(&self, client: &Client) -> Result<()> {
        apply(client, &self.cluster).await?;
        apply(client, &self.provider_cluster).await?;
        apply(client, &self.control_plane).await?;
        apply(client, &self.machine_template).await?;
        Ok(())
    }

    /// Machine templates are immutable post-creation, so a changed desired
    /// template is written under a new incremented name and the control
    /// plane's back-reference repointed at it. The superseded object is left
    /// behind for separate garbage collection. Equality is semantic, on the
    /// provider template's spec, never on server-populated metadata.
    pub async fn update_immutable_object_names<F>(
        &mut self,
        client: &Client,
        template_equal: F,
    ) -> Result<()>
    where
        F: Fn(&M, &M) -> bool,
    {
        let kcp_name = match &self.control_plane.meta().name {
            Some(name) => name.clone(),
            None => return Err(Error::MissingMetadata("KubeadmControlPlane".into())),
        };

        let kcp_api: Api<KubeadmControlPlane> = Api::namespaced(client.clone(), SYSTEM_NAMESPACE);
        let Some(existing_kcp) = kcp_api.get_opt(&kcp_name).await? else {
            // Fresh create, initial names stand
            return Ok(());
        };

        let Some(current_template_name) = existing_kcp
            .spec
            .machine_template
            .infrastructure_ref
            .name
            .clone()
        else {
            return Ok(());
        };

        let template_api: Api<M> = Api::namespaced(client.clone(), SYSTEM_NAMESPACE);
        let Some(current_template) = template_api.get_opt(&current_template_name).await? else {
            return Ok(());
        };

        let name = if template_equal(&self.machine_template, &current_template) {
            current_template_name
        } else {
            increment_name(&current_template_name)?
        };

        self.machine_template.meta_mut().name = Some(name.clone());
        self.control_plane
            .spec
            .machine_template
            .infrastructure_ref
            .name = Some(name);

        Ok(())
    }
}

/// The substrate objects backing the cluster's worker node groups
pub struct Workers<M> {
    pub deployments: Vec<MachineDeployment>,
    pub machine_templates: Vec<M>,
}

impl<M> Workers<M>
where
    M: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
    M::DynamicType: Default,
{
    pub async fn apply(&self, client: &Client) -> Result<()> {
        for template in &self.machine_templates {
            apply(client, template).await?;
        }
        for deployment in &self.deployments {
            apply(client, deployment).await?;
        }
        Ok(())
    }
}

/// Builds the substrate cluster object pointing at its provider cluster and
/// control plane
pub fn capi_cluster(
    cluster: &AnywhereCluster,
    infrastructure_ref: ObjectReference,
    control_plane_ref: ObjectReference,
) -> CapiCluster {
    CapiCluster {
        metadata: object_meta(cluster, &cluster_name(cluster)),
        spec: crate::resources::capi::ClusterSpec {
            paused: None,
            control_plane_ref: Some(control_plane_ref),
            infrastructure_ref: Some(infrastructure_ref),
        },
        status: None,
    }
}

/// Builds the control plane object for a cluster, referencing the provider
/// machine template
pub fn kubeadm_control_plane(
    cluster: &AnywhereCluster,
    infrastructure_ref: ObjectReference,
) -> KubeadmControlPlane {
    KubeadmControlPlane {
        metadata: object_meta(cluster, &cluster_name(cluster)),
        spec: crate::resources::capi::KubeadmControlPlaneSpec {
            replicas: Some(cluster.spec.control_plane_configuration.count),
            version: cluster.spec.kubernetes_version.clone(),
            machine_template: KubeadmControlPlaneMachineTemplate { infrastructure_ref },
        },
    }
}

/// Builds one worker node group deployment referencing its machine template
pub fn machine_deployment(
    cluster: &AnywhereCluster,
    group_name: &str,
    replicas: i32,
    infrastructure_ref: ObjectReference,
) -> MachineDeployment {
    let name = format!("{}-{group_name}", cluster.name_any());
    MachineDeployment {
        metadata: object_meta(cluster, &name),
        spec: MachineDeploymentSpec {
            cluster_name: cluster_name(cluster),
            replicas: Some(replicas),
            template: MachineTemplateSpec {
                spec: MachineSpec {
                    cluster_name: cluster_name(cluster),
                    version: Some(cluster.spec.kubernetes_version.clone()),
                    infrastructure_ref: Some(infrastructure_ref),
                },
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_name_bumps_the_numeric_suffix() {
        assert_eq!(increment_name("prod-control-plane-1").unwrap(), "prod-control-plane-2");
        assert_eq!(increment_name("md-0-9").unwrap(), "md-0-10");
    }

    #[test]
    fn increment_name_rejects_unnumbered_names() {
        assert!(increment_name("control-plane").is_err());
        assert!(increment_name("nodash").is_err());
    }

    #[test]
    fn generated_objects_carry_the_cluster_label() {
        let mut cluster = AnywhereCluster::default();
        cluster.metadata.name = Some("prod".into());

        let meta = object_meta(&cluster, "prod-control-plane-1");
        assert_eq!(meta.namespace.as_deref(), Some(SYSTEM_NAMESPACE));
        assert_eq!(
            meta.labels.unwrap().get(CLUSTER_LABEL_NAME).map(String::as_str),
            Some("prod")
        );
    }

    #[test]
    fn control_plane_references_are_wired() {
        let mut cluster = AnywhereCluster::default();
        cluster.metadata.name = Some("prod".into());
        cluster.spec.control_plane_configuration.count = 3;
        cluster.spec.kubernetes_version = "1.27".into();

        let template = crate::resources::capi::SnowMachineTemplate {
            metadata: object_meta(&cluster, &control_plane_machine_template_name(&cluster)),
            spec: Default::default(),
        };
        let kcp = kubeadm_control_plane(&cluster, object_reference(&template));

        assert_eq!(kcp.spec.replicas, Some(3));
        assert_eq!(
            kcp.spec.machine_template.infrastructure_ref.name.as_deref(),
            Some("prod-control-plane-1")
        );
        assert_eq!(
            kcp.spec.machine_template.infrastructure_ref.kind.as_deref(),
            Some("SnowMachineTemplate")
        );
    }
}
