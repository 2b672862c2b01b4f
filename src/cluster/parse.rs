use serde::Deserialize;
use serde_yaml::Value;

use crate::resources::anywhereclusters::{Ref, CLUSTER_KIND};
use crate::resources::datacenters::{
    DOCKER_DATACENTER_KIND, SNOW_DATACENTER_KIND, VSPHERE_DATACENTER_KIND,
};
use crate::resources::gitops::GITOPS_CONFIG_KIND;
use crate::resources::identityproviders::{AWS_IAM_CONFIG_KIND, OIDC_CONFIG_KIND};
use crate::resources::machineconfigs::{SNOW_MACHINE_CONFIG_KIND, VSPHERE_MACHINE_CONFIG_KIND};
use crate::{Error, Result};

use super::Config;

/// Parses a multi-document yaml manifest into a [`Config`].
///
/// Exactly one AnywhereCluster is allowed per manifest, every kind must be
/// known and every reference must resolve. These are all terminal errors;
/// a manifest is either complete or rejected.
pub fn parse_config(manifest: &str) -> Result<Config> {
    let mut cluster = None;
    let mut config = Config::default();

    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = Value::deserialize(document)?;

        let kind = match value.get("kind").and_then(Value::as_str) {
            Some(kind) => kind.to_owned(),
            // Empty documents show up when manifests contain stray separators
            None => continue,
        };

        match kind.as_str() {
            CLUSTER_KIND => {
                if cluster.is_some() {
                    return Err(Error::InvalidManifest(
                        "only one Cluster per yaml manifest is allowed".into(),
                    ));
                }
                cluster = Some(serde_yaml::from_value(value)?);
            }
            SNOW_DATACENTER_KIND => {
                config.snow_datacenter = Some(serde_yaml::from_value(value)?);
            }
            VSPHERE_DATACENTER_KIND => {
                config.vsphere_datacenter = Some(serde_yaml::from_value(value)?);
            }
            DOCKER_DATACENTER_KIND => {
                config.docker_datacenter = Some(serde_yaml::from_value(value)?);
            }
            SNOW_MACHINE_CONFIG_KIND => {
                let machine: crate::resources::machineconfigs::SnowMachineConfig =
                    serde_yaml::from_value(value)?;
                config
                    .snow_machine_configs
                    .insert(object_name(&machine.metadata)?, machine);
            }
            VSPHERE_MACHINE_CONFIG_KIND => {
                let machine: crate::resources::machineconfigs::VSphereMachineConfig =
                    serde_yaml::from_value(value)?;
                config
                    .vsphere_machine_configs
                    .insert(object_name(&machine.metadata)?, machine);
            }
            OIDC_CONFIG_KIND => {
                let idp: crate::resources::identityproviders::OIDCConfig =
                    serde_yaml::from_value(value)?;
                config.oidc_configs.insert(object_name(&idp.metadata)?, idp);
            }
            AWS_IAM_CONFIG_KIND => {
                let idp: crate::resources::identityproviders::AWSIamConfig =
                    serde_yaml::from_value(value)?;
                config
                    .aws_iam_configs
                    .insert(object_name(&idp.metadata)?, idp);
            }
            GITOPS_CONFIG_KIND => {
                config.git_ops_config = Some(serde_yaml::from_value(value)?);
            }
            _ => {
                return Err(Error::InvalidManifest(format!(
                    "invalid object with kind {kind} found on manifest"
                )));
            }
        }
    }

    config.cluster = cluster.ok_or_else(|| {
        Error::InvalidManifest("no Cluster found in manifest".into())
    })?;

    resolve_references(&config)?;

    Ok(config)
}

fn object_name(
    metadata: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
) -> Result<String> {
    metadata
        .name
        .clone()
        .ok_or_else(|| Error::InvalidManifest("object in manifest has no name".into()))
}

fn resolve_references(config: &Config) -> Result<()> {
    let spec = &config.cluster.spec;

    resolve(config, Some(&spec.datacenter_ref))?;
    resolve(config, spec.control_plane_configuration.machine_group_ref.as_ref())?;
    for group in &spec.worker_node_group_configurations {
        resolve(config, group.machine_group_ref.as_ref())?;
    }
    for idp in &spec.identity_provider_refs {
        resolve(config, Some(idp))?;
    }
    resolve(config, spec.git_ops_ref.as_ref())?;

    Ok(())
}

fn resolve(config: &Config, reference: Option<&Ref>) -> Result<()> {
    let Some(reference) = reference else {
        return Ok(());
    };

    let found = match reference.kind.as_str() {
        SNOW_DATACENTER_KIND => config.snow_datacenter.is_some(),
        VSPHERE_DATACENTER_KIND => config.vsphere_datacenter.is_some(),
        DOCKER_DATACENTER_KIND => config.docker_datacenter.is_some(),
        SNOW_MACHINE_CONFIG_KIND => config.snow_machine_configs.contains_key(&reference.name),
        VSPHERE_MACHINE_CONFIG_KIND => {
            config.vsphere_machine_configs.contains_key(&reference.name)
        }
        OIDC_CONFIG_KIND => config.oidc_configs.contains_key(&reference.name),
        AWS_IAM_CONFIG_KIND => config.aws_iam_configs.contains_key(&reference.name),
        GITOPS_CONFIG_KIND => config.git_ops_config.is_some(),
        _ => {
            return Err(Error::InvalidManifest(format!(
                "reference to unknown kind {}",
                reference.kind
            )));
        }
    };

    if !found {
        return Err(Error::InvalidManifest(format!(
            "unable to resolve reference to {} {}",
            reference.kind, reference.name
        )));
    }

    Ok(())
}
