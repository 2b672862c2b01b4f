use kube::{Api, Client, ResourceExt};
use tracing::debug;

use crate::resources::anywhereclusters::{AnywhereCluster, Ref};
use crate::resources::bundles::Bundles;
use crate::resources::datacenters::{
    DockerDatacenterConfig, SnowDatacenterConfig, VSphereDatacenterConfig,
    DOCKER_DATACENTER_KIND, SNOW_DATACENTER_KIND, VSPHERE_DATACENTER_KIND,
};
use crate::resources::gitops::GitOpsConfig;
use crate::resources::identityproviders::{
    AWSIamConfig, OIDCConfig, AWS_IAM_CONFIG_KIND, OIDC_CONFIG_KIND,
};
use crate::resources::machineconfigs::{
    SnowMachineConfig, VSphereMachineConfig, SNOW_MACHINE_CONFIG_KIND,
    VSPHERE_MACHINE_CONFIG_KIND,
};
use crate::{Error, Result};

use super::{Config, Spec};

/// Builds a [`Spec`] for a cluster out of the objects it references on the
/// api server.
///
/// Returns `Ok(None)` when a referenced object does not exist yet. Other
/// controllers (or the user) may still be creating them, so an incomplete
/// spec means "come back later", not failure. Contrast with
/// [`super::parse_config`], where a dangling reference is terminal.
pub async fn build_spec(client: &Client, cluster: &AnywhereCluster) -> Result<Option<Spec>> {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".into());
    let mut config = Config::new(cluster.clone());

    if !populate_datacenter(client, &namespace, &mut config).await? {
        return Ok(None);
    }

    let mut machine_refs: Vec<&Ref> = Vec::new();
    if let Some(r) = &cluster.spec.control_plane_configuration.machine_group_ref {
        machine_refs.push(r);
    }
    for group in &cluster.spec.worker_node_group_configurations {
        if let Some(r) = &group.machine_group_ref {
            machine_refs.push(r);
        }
    }
    for machine_ref in machine_refs {
        if !populate_machine_config(client, &namespace, machine_ref, &mut config).await? {
            return Ok(None);
        }
    }

    for idp_ref in &cluster.spec.identity_provider_refs {
        if !populate_identity_provider(client, &namespace, idp_ref, &mut config).await? {
            return Ok(None);
        }
    }

    if let Some(git_ops_ref) = &cluster.spec.git_ops_ref {
        let api: Api<GitOpsConfig> = Api::namespaced(client.clone(), &namespace);
        match api.get_opt(&git_ops_ref.name).await? {
            Some(git_ops) => config.git_ops_config = Some(git_ops),
            None => {
                debug!("GitOpsConfig {} not found, spec is incomplete", git_ops_ref.name);
                return Ok(None);
            }
        }
    }

    let bundles_api: Api<Bundles> = Api::namespaced(client.clone(), &namespace);
    let bundles_name = cluster.bundles_name();
    let Some(bundles) = bundles_api.get_opt(&bundles_name).await? else {
        debug!("Bundles {bundles_name} not found, spec is incomplete");
        return Ok(None);
    };

    let kube_version = &cluster.spec.kubernetes_version;
    let versions_bundle = bundles.versions_bundle_for(kube_version).ok_or_else(|| {
        Error::InvalidManifest(format!(
            "bundles {bundles_name} has no bundle for kubernetes version {kube_version}"
        ))
    })?;

    Ok(Some(Spec::new(config, versions_bundle.clone())))
}

async fn populate_datacenter(
    client: &Client,
    namespace: &str,
    config: &mut Config,
) -> Result<bool> {
    let datacenter_ref = config.cluster.spec.datacenter_ref.clone();
    let name = datacenter_ref.name.as_str();

    let found = match datacenter_ref.kind.as_str() {
        SNOW_DATACENTER_KIND => {
            let api: Api<SnowDatacenterConfig> = Api::namespaced(client.clone(), namespace);
            match api.get_opt(name).await? {
                Some(dc) => {
                    config.snow_datacenter = Some(dc);
                    true
                }
                None => false,
            }
        }
        VSPHERE_DATACENTER_KIND => {
            let api: Api<VSphereDatacenterConfig> = Api::namespaced(client.clone(), namespace);
            match api.get_opt(name).await? {
                Some(dc) => {
                    config.vsphere_datacenter = Some(dc);
                    true
                }
                None => false,
            }
        }
        DOCKER_DATACENTER_KIND => {
            let api: Api<DockerDatacenterConfig> = Api::namespaced(client.clone(), namespace);
            match api.get_opt(name).await? {
                Some(dc) => {
                    config.docker_datacenter = Some(dc);
                    true
                }
                None => false,
            }
        }
        kind => {
            return Err(Error::InvalidManifest(format!(
                "reference to unknown datacenter kind {kind}"
            )));
        }
    };

    if !found {
        debug!(
            "{} {name} not found, spec is incomplete",
            datacenter_ref.kind
        );
    }

    Ok(found)
}

async fn populate_machine_config(
    client: &Client,
    namespace: &str,
    machine_ref: &Ref,
    config: &mut Config,
) -> Result<bool> {
    let name = machine_ref.name.as_str();

    let found = match machine_ref.kind.as_str() {
        SNOW_MACHINE_CONFIG_KIND => {
            let api: Api<SnowMachineConfig> = Api::namespaced(client.clone(), namespace);
            match api.get_opt(name).await? {
                Some(machine) => {
                    config.snow_machine_configs.insert(name.into(), machine);
                    true
                }
                None => false,
            }
        }
        VSPHERE_MACHINE_CONFIG_KIND => {
            let api: Api<VSphereMachineConfig> = Api::namespaced(client.clone(), namespace);
            match api.get_opt(name).await? {
                Some(machine) => {
                    config.vsphere_machine_configs.insert(name.into(), machine);
                    true
                }
                None => false,
            }
        }
        kind => {
            return Err(Error::InvalidManifest(format!(
                "reference to unknown machine config kind {kind}"
            )));
        }
    };

    if !found {
        debug!("{} {name} not found, spec is incomplete", machine_ref.kind);
    }

    Ok(found)
}

async fn populate_identity_provider(
    client: &Client,
    namespace: &str,
    idp_ref: &Ref,
    config: &mut Config,
) -> Result<bool> {
    let name = idp_ref.name.as_str();

    let found = match idp_ref.kind.as_str() {
        OIDC_CONFIG_KIND => {
            let api: Api<OIDCConfig> = Api::namespaced(client.clone(), namespace);
            match api.get_opt(name).await? {
                Some(idp) => {
                    config.oidc_configs.insert(name.into(), idp);
                    true
                }
                None => false,
            }
        }
        AWS_IAM_CONFIG_KIND => {
            let api: Api<AWSIamConfig> = Api::namespaced(client.clone(), namespace);
            match api.get_opt(name).await? {
                Some(idp) => {
                    config.aws_iam_configs.insert(name.into(), idp);
                    true
                }
                None => false,
            }
        }
        kind => {
            return Err(Error::InvalidManifest(format!(
                "reference to unknown identity provider kind {kind}"
            )));
        }
    };

    if !found {
        debug!("{} {name} not found, spec is incomplete", idp_ref.kind);
    }

    Ok(found)
}
