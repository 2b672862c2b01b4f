use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, ListParams, Patch, PatchParams, ResourceExt};
use kube::client::Client;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::{Event, EventType, Recorder};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config;
use kube::Resource;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::*;

use crate::clusterapi::{
    self, CLUSTER_LABEL_NAME, CLUSTER_NAMESPACE_LABEL_NAME, SYSTEM_NAMESPACE,
};
use crate::controllers::{Diagnostics, State};
use crate::networking::cilium::FileManifestGenerator;
use crate::reconcile::ReconcileResult;
use crate::resources::anywhereclusters::{
    AnywhereCluster, AnywhereClusterStatus, ClusterCondition, CLUSTER_FINALIZER,
};
use crate::resources::capi::Cluster as CapiCluster;
use crate::{telemetry, Error, Metrics, Result};

use super::registry::{ClusterReconcilerRegistry, RegistryFactory};

/// How often to look again while waiting for the substrate cluster to be
/// torn down
const DELETE_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Kubernetes event recorder
    pub recorder: Recorder,
    /// Provider reconcilers, one per enabled datacenter kind
    pub registry: Arc<ClusterReconcilerRegistry>,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
}

impl Context {
    pub fn new(
        client: Client,
        metrics: Metrics,
        state: &State,
        registry: Arc<ClusterReconcilerRegistry>,
    ) -> Arc<Context> {
        Arc::new(Context {
            client: client.clone(),
            recorder: Recorder::new(client, "anywhere-operator".into()),
            registry,
            diagnostics: state.diagnostics.clone(),
            metrics,
        })
    }
}

#[instrument(skip(ctx, cluster), fields(trace_id))]
async fn reconcile(cluster: Arc<AnywhereCluster>, ctx: Arc<Context>) -> Result<Action> {
    if let Some(trace_id) = telemetry::get_trace_id() {
        Span::current().record("trace_id", field::display(&trace_id));
    }
    let _timer = ctx.metrics.count_and_measure::<AnywhereCluster>();
    ctx.diagnostics.write().await.last_event = Utc::now();

    info!("Reconciling AnywhereCluster \"{}\"", cluster.name_any());

    if cluster.meta().deletion_timestamp.is_some() {
        return cluster.cleanup(&ctx).await;
    }

    cluster.ensure_finalizer(&ctx).await?;

    if cluster.is_reconcile_paused() {
        info!("Cluster reconciliation is paused");
        return Ok(Action::await_change());
    }

    if cluster.is_self_managed() {
        info!("Ignoring self managed cluster");
        return Ok(Action::await_change());
    }

    match cluster.reconcile_status(&ctx).await {
        Ok(action) => Ok(action),
        Err(err) => {
            warn!("reconcile failed: {:?}", err);

            ctx.recorder
                .publish(
                    &Event {
                        type_: EventType::Warning,
                        reason: "FailedReconcile".into(),
                        note: Some(err.to_string()),
                        action: "Reconcile".into(),
                        secondary: None,
                    },
                    &cluster.object_ref(&()),
                )
                .await?;

            ctx.metrics.reconcile_failure(cluster.as_ref(), &err);
            Err(err)
        }
    }
}

fn error_policy<K, C>(_cluster: Arc<K>, _error: &Error, _ctx: C) -> Action {
    Action::requeue(Duration::from_secs(30))
}

impl AnywhereCluster {
    fn namespaced_api(&self, client: &Client) -> Api<AnywhereCluster> {
        match self.namespace() {
            Some(namespace) => Api::namespaced(client.clone(), &namespace),
            None => Api::default_namespaced(client.clone()),
        }
    }

    async fn ensure_finalizer(&self, ctx: &Context) -> Result<()> {
        if self.finalizers().iter().any(|f| f.as_str() == CLUSTER_FINALIZER) {
            return Ok(());
        }

        let mut finalizers = self.finalizers().to_vec();
        finalizers.push(CLUSTER_FINALIZER.to_owned());
        let patch = json!({"metadata": {"finalizers": finalizers}});
        self.namespaced_api(&ctx.client)
            .patch(&self.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        Ok(())
    }

    // Reconcile (for non-finalizer related changes) plus status bookkeeping
    async fn reconcile_status(&self, ctx: &Context) -> Result<Action> {
        let (result, message, reason, status) = match self.reconcile(ctx).await {
            Ok(result) if !result.should_return() => (
                Ok(result.to_action()),
                "Cluster reconciled successfully".to_owned(),
                "Reconciled".to_owned(),
                "True".to_owned(),
            ),
            Ok(result) => (
                Ok(result.to_action()),
                "Cluster infrastructure is still converging".to_owned(),
                "Provisioning".to_owned(),
                "False".to_owned(),
            ),
            Err(err) => {
                let message = err.to_string();
                (Err(err), message, "FailedReconcile".to_owned(), "Unknown".to_owned())
            }
        };

        let failure_message = result.is_err().then(|| message.clone());

        let existing_ready = self
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|c| c.iter().find(|cond| cond.r#type == "Ready"));
        let now = k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Utc::now());

        let mut ready = ClusterCondition {
            last_transition_time: Some(
                existing_ready
                    .and_then(|r| r.last_transition_time.clone())
                    .unwrap_or_else(|| now.clone()),
            ),
            message: Some(message),
            reason: Some(reason),
            status,
            r#type: "Ready".into(),
        };

        if existing_ready.map(|r| &r.status) != Some(&ready.status) {
            // update transition time if the status has at all changed
            ready.last_transition_time = Some(now)
        }

        // always overwrite status object with what we saw
        let new_status = Patch::Apply(json!({
            "apiVersion": "anywhere.dev/v1alpha1",
            "kind": "AnywhereCluster",
            "status": AnywhereClusterStatus {
                conditions: Some(vec![ready]),
                failure_message,
            }
        }));
        let ps = PatchParams::apply("anywhere-operator").force();
        self.namespaced_api(&ctx.client)
            .patch_status(&self.name_any(), &ps, &new_status)
            .await?;

        result
    }

    /// Delegates to the provider reconciler registered for the cluster's
    /// datacenter kind
    async fn reconcile(&self, ctx: &Context) -> Result<ReconcileResult> {
        let datacenter_kind = self.spec.datacenter_ref.kind.as_str();
        let Some(provider_reconciler) = ctx.registry.get(datacenter_kind) else {
            return Err(Error::NoReconcilerForKind(datacenter_kind.to_owned()));
        };

        provider_reconciler.reconcile(self).await
    }

    // Finalizer cleanup: the substrate cluster goes first, our finalizer
    // only comes off once it is gone
    async fn cleanup(&self, ctx: &Context) -> Result<Action> {
        let name = clusterapi::cluster_name(self);
        let capi_api: Api<CapiCluster> = Api::namespaced(ctx.client.clone(), SYSTEM_NAMESPACE);

        if capi_api.get_opt(&name).await?.is_some() {
            info!("Deleting substrate cluster {name}");
            let _ = capi_api.delete(&name, &Default::default()).await?;
            return Ok(Action::requeue(DELETE_REQUEUE_INTERVAL));
        }

        if self.finalizers().iter().any(|f| f.as_str() == CLUSTER_FINALIZER) {
            info!("Substrate cluster is gone, removing finalizer");
            let finalizers: Vec<String> = self
                .finalizers()
                .iter()
                .filter(|f| f.as_str() != CLUSTER_FINALIZER)
                .cloned()
                .collect();
            let patch = json!({"metadata": {"finalizers": finalizers}});
            self.namespaced_api(&ctx.client)
                .patch(&self.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        }

        Ok(Action::await_change())
    }
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State) {
    let client = Client::try_default()
        .await
        .expect("failed to create kube Client");

    let clusters = Api::<AnywhereCluster>::all(client.clone());
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("AnywhereCluster is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }

    let generator = Arc::new(FileManifestGenerator::new(state.cilium_manifest_path.clone()));
    let registry = match RegistryFactory::new(client.clone(), generator)
        .with_snow_reconciler()
        .with_vsphere_reconciler()
        .build()
    {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Could not build the provider reconciler registry: {e:?}");
            std::process::exit(1);
        }
    };

    let metrics = Metrics::default()
        .register(&state.registry)
        .expect("metrics registration only happens once");
    let context = Context::new(client.clone(), metrics, &state, registry);

    // Substrate cluster events find their way back to the owning
    // AnywhereCluster through the labels we stamp on generated objects
    let capi_api = Api::<CapiCluster>::all(client.clone());
    let capi_cfg = Config::default().labels(CLUSTER_LABEL_NAME);

    Controller::new(clusters, Config::default())
        .shutdown_on_signal()
        .watches(capi_api, capi_cfg, |capi: CapiCluster| {
            let labels = capi.meta().labels.as_ref()?;
            let name = labels.get(CLUSTER_LABEL_NAME)?;
            let namespace = labels.get(CLUSTER_NAMESPACE_LABEL_NAME)?;
            Some(ObjectRef::<AnywhereCluster>::new(name).within(namespace))
        })
        .run(reconcile, error_policy, context)
        .filter_map(|x| async move { x.ok() })
        .for_each(|_| futures::future::ready(()))
        .await;
}
