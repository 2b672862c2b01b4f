use std::collections::HashMap;

use crate::resources::anywhereclusters::AnywhereCluster;
use crate::resources::bundles::VersionsBundle;
use crate::resources::datacenters::{
    DockerDatacenterConfig, SnowDatacenterConfig, VSphereDatacenterConfig,
};
use crate::resources::gitops::GitOpsConfig;
use crate::resources::identityproviders::{AWSIamConfig, OIDCConfig};
use crate::resources::machineconfigs::{SnowMachineConfig, VSphereMachineConfig};

mod build;
mod parse;

pub use build::build_spec;
pub use parse::parse_config;

/// In-memory aggregate of an AnywhereCluster and every object it references.
///
/// Built either from a yaml manifest ([`parse_config`], strict) or from the
/// api server ([`build_spec`], missing references mean not-ready).
#[derive(Clone, Debug, Default)]
pub struct Config {
    cluster: AnywhereCluster,
    snow_datacenter: Option<SnowDatacenterConfig>,
    vsphere_datacenter: Option<VSphereDatacenterConfig>,
    docker_datacenter: Option<DockerDatacenterConfig>,
    snow_machine_configs: HashMap<String, SnowMachineConfig>,
    vsphere_machine_configs: HashMap<String, VSphereMachineConfig>,
    oidc_configs: HashMap<String, OIDCConfig>,
    aws_iam_configs: HashMap<String, AWSIamConfig>,
    git_ops_config: Option<GitOpsConfig>,
}

impl Config {
    pub fn new(cluster: AnywhereCluster) -> Config {
        Config {
            cluster,
            ..Default::default()
        }
    }

    pub fn cluster(&self) -> &AnywhereCluster {
        &self.cluster
    }

    pub fn snow_datacenter(&self) -> Option<&SnowDatacenterConfig> {
        self.snow_datacenter.as_ref()
    }

    pub fn vsphere_datacenter(&self) -> Option<&VSphereDatacenterConfig> {
        self.vsphere_datacenter.as_ref()
    }

    pub fn docker_datacenter(&self) -> Option<&DockerDatacenterConfig> {
        self.docker_datacenter.as_ref()
    }

    pub fn snow_machine_config(&self, name: &str) -> Option<&SnowMachineConfig> {
        self.snow_machine_configs.get(name)
    }

    pub fn vsphere_machine_config(&self, name: &str) -> Option<&VSphereMachineConfig> {
        self.vsphere_machine_configs.get(name)
    }

    pub fn oidc_config(&self, name: &str) -> Option<&OIDCConfig> {
        self.oidc_configs.get(name)
    }

    pub fn aws_iam_config(&self, name: &str) -> Option<&AWSIamConfig> {
        self.aws_iam_configs.get(name)
    }

    pub fn git_ops_config(&self) -> Option<&GitOpsConfig> {
        self.git_ops_config.as_ref()
    }
}

/// A [`Config`] plus the version bundle resolved for its kubernetes version.
///
/// Owned exclusively by one reconcile invocation or one task runner run;
/// never shared across concurrent runs.
#[derive(Clone, Debug, Default)]
pub struct Spec {
    pub config: Config,
    pub versions_bundle: VersionsBundle,
}

impl Spec {
    pub fn new(config: Config, versions_bundle: VersionsBundle) -> Spec {
        Spec {
            config,
            versions_bundle,
        }
    }

    pub fn cluster(&self) -> &AnywhereCluster {
        self.config.cluster()
    }
}
