use std::collections::HashMap;

use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tokio::sync::RwLock;
use tracing::debug;

use crate::Result;

/// Hands out api clients for provisioned clusters, keyed by the substrate
/// cluster's namespace and name.
///
/// Kubeconfigs come from the secret the substrate publishes once a cluster's
/// control plane is reachable. A missing secret is a normal
/// not-available-yet condition, reported as `None` so callers can requeue.
pub struct RemoteClientTracker {
    client: Client,
    clients: RwLock<HashMap<(String, String), Client>>,
}

impl RemoteClientTracker {
    pub fn new(client: Client) -> RemoteClientTracker {
        RemoteClientTracker {
            client,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_client(&self, namespace: &str, name: &str) -> Result<Option<Client>> {
        let key = (namespace.to_owned(), name.to_owned());
        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(Some(client.clone()));
        }

        let secret_name = format!("{name}-kubeconfig");
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = secrets.get_opt(&secret_name).await? else {
            debug!("Kubeconfig secret {namespace}/{secret_name} does not exist yet");
            return Ok(None);
        };
        let Some(value) = secret.data.as_ref().and_then(|data| data.get("value")) else {
            debug!("Kubeconfig secret {namespace}/{secret_name} has no value key yet");
            return Ok(None);
        };

        let kubeconfig = Kubeconfig::from_yaml(&String::from_utf8_lossy(&value.0))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let remote = Client::try_from(config)?;

        self.clients.write().await.insert(key, remote.clone());

        Ok(Some(remote))
    }
}
