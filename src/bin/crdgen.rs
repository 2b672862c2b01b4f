use kube::CustomResourceExt;

fn main() {
    let crds = [
        serde_yaml::to_string(&anywhere_operator::resources::anywhereclusters::AnywhereCluster::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::datacenters::SnowDatacenterConfig::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::datacenters::VSphereDatacenterConfig::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::datacenters::DockerDatacenterConfig::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::machineconfigs::SnowMachineConfig::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::machineconfigs::VSphereMachineConfig::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::identityproviders::OIDCConfig::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::identityproviders::AWSIamConfig::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::gitops::GitOpsConfig::crd()),
        serde_yaml::to_string(&anywhere_operator::resources::bundles::Bundles::crd()),
    ];

    for crd in crds {
        print!("---\n{}", crd.expect("CRD serialization cannot fail"));
    }
}
