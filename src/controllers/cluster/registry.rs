use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;

use crate::networking::cilium::{CiliumReconciler, ManifestGenerator};
use crate::reconcile::ReconcileResult;
use crate::resources::anywhereclusters::AnywhereCluster;
use crate::resources::datacenters::{SNOW_DATACENTER_KIND, VSPHERE_DATACENTER_KIND};
use crate::Result;

use super::reconcilers::snow::SnowClusterReconciler;
use super::reconcilers::vsphere::VSphereClusterReconciler;
use super::remote::RemoteClientTracker;

/// One infrastructure provider's cluster reconciliation entrypoint
#[async_trait]
pub trait ProviderClusterReconciler: Send + Sync {
    async fn reconcile(&self, cluster: &AnywhereCluster) -> Result<ReconcileResult>;
}

/// Datacenter kind to reconciler mapping. Built once at startup, read-only
/// afterwards; safe to share across reconcile workers.
#[derive(Default)]
pub struct ClusterReconcilerRegistry {
    reconcilers: HashMap<String, Arc<dyn ProviderClusterReconciler>>,
}

impl ClusterReconcilerRegistry {
    pub fn get(&self, datacenter_kind: &str) -> Option<Arc<dyn ProviderClusterReconciler>> {
        self.reconcilers.get(datacenter_kind).cloned()
    }
}

/// Accumulates registrations while a registry is being built
#[derive(Default)]
pub struct RegistryBuilder {
    registry: ClusterReconcilerRegistry,
}

impl RegistryBuilder {
    pub fn new() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn add(
        &mut self,
        datacenter_kind: &str,
        reconciler: Arc<dyn ProviderClusterReconciler>,
    ) {
        self.registry
            .reconcilers
            .insert(datacenter_kind.to_owned(), reconciler);
    }

    pub fn build(self) -> ClusterReconcilerRegistry {
        self.registry
    }
}

struct BuildState {
    client: Client,
    manifest_generator: Arc<dyn ManifestGenerator>,
    tracker: Option<Arc<RemoteClientTracker>>,
    cilium_reconciler: Option<CiliumReconciler>,
    builder: RegistryBuilder,
}

type BuildStep = Box<dyn FnOnce(&mut BuildState) -> Result<()> + Send>;

/// Builds the reconciler registry for the enabled providers.
///
/// Provider steps register their prerequisite dependency steps themselves;
/// shared dependencies are guarded so that whichever provider asks first
/// constructs them and later requests reuse the same instance. Steps run in
/// registration order and the first failing step aborts the whole build.
pub struct RegistryFactory {
    client: Client,
    manifest_generator: Arc<dyn ManifestGenerator>,
    steps: Vec<BuildStep>,
}

impl RegistryFactory {
    pub fn new(client: Client, manifest_generator: Arc<dyn ManifestGenerator>) -> RegistryFactory {
        RegistryFactory {
            client,
            manifest_generator,
            steps: Vec::new(),
        }
    }

    pub fn with_snow_reconciler(self) -> RegistryFactory {
        let mut factory = self.with_remote_tracker().with_cilium_reconciler();
        factory.steps.push(Box::new(|state| {
            let tracker = state
                .tracker
                .clone()
                .expect("remote tracker step registered ahead of snow");
            let cilium = state
                .cilium_reconciler
                .clone()
                .expect("cilium reconciler step registered ahead of snow");
            state.builder.add(
                SNOW_DATACENTER_KIND,
                Arc::new(SnowClusterReconciler::new(
                    state.client.clone(),
                    tracker,
                    cilium,
                )),
            );
            Ok(())
        }));
        factory
    }

    pub fn with_vsphere_reconciler(self) -> RegistryFactory {
        let mut factory = self.with_remote_tracker().with_cilium_reconciler();
        factory.steps.push(Box::new(|state| {
            let tracker = state
                .tracker
                .clone()
                .expect("remote tracker step registered ahead of vsphere");
            let cilium = state
                .cilium_reconciler
                .clone()
                .expect("cilium reconciler step registered ahead of vsphere");
            state.builder.add(
                VSPHERE_DATACENTER_KIND,
                Arc::new(VSphereClusterReconciler::new(
                    state.client.clone(),
                    tracker,
                    cilium,
                )),
            );
            Ok(())
        }));
        factory
    }

    fn with_remote_tracker(mut self) -> RegistryFactory {
        self.steps.push(Box::new(|state| {
            if state.tracker.is_none() {
                state.tracker = Some(Arc::new(RemoteClientTracker::new(state.client.clone())));
            }
            Ok(())
        }));
        self
    }

    fn with_cilium_reconciler(mut self) -> RegistryFactory {
        self.steps.push(Box::new(|state| {
            if state.cilium_reconciler.is_none() {
                state.cilium_reconciler =
                    Some(CiliumReconciler::new(state.manifest_generator.clone()));
            }
            Ok(())
        }));
        self
    }

    pub fn build(self) -> Result<ClusterReconcilerRegistry> {
        let mut state = BuildState {
            client: self.client,
            manifest_generator: self.manifest_generator,
            tracker: None,
            cilium_reconciler: None,
            builder: RegistryBuilder::new(),
        };

        for step in self.steps {
            step(&mut state)?;
        }

        Ok(state.builder.build())
    }
}
