/// AnywhereCluster and the configuration objects it references
pub mod anywhereclusters;
pub mod bundles;
pub mod datacenters;
pub mod gitops;
pub mod identityproviders;
pub mod machineconfigs;

/// Substrate CRDs owned by the cluster orchestration system
pub mod capi;
