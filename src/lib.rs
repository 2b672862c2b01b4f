use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YamlError: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Kubeconfig Error: {0}")]
    KubeconfigError(#[from] kube::config::KubeconfigError),

    #[error("Invalid cluster manifest: {0}")]
    InvalidManifest(String),

    #[error("no reconciler available for datacenter of type {0}")]
    NoReconcilerForKind(String),

    #[error("Malformed addon state: {0}")]
    MalformedAddonState(String),

    #[error("Invalid object name {0}: {1}")]
    InvalidObjectName(String, String),

    #[error("Object {0} is missing required metadata")]
    MissingMetadata(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::SerializationError(_) => "SerializationError",
            Error::YamlError(_) => "YamlError",
            Error::IoError(_) => "IoError",
            Error::KubeError(_) => "KubeError",
            Error::KubeconfigError(_) => "KubeconfigError",
            Error::InvalidManifest(_) => "InvalidManifest",
            Error::NoReconcilerForKind(_) => "NoReconcilerForKind",
            Error::MalformedAddonState(_) => "MalformedAddonState",
            Error::InvalidObjectName(_, _) => "InvalidObjectName",
            Error::MissingMetadata(_) => "MissingMetadata",
        }
    }
}

/// Cluster configuration aggregate and manifest parsing
pub mod cluster;

/// Substrate object grouping and name derivation
pub mod clusterapi;

pub mod controllers;

/// Networking addon management
pub mod networking;

/// Reconciliation signals and the phase runner
pub mod reconcile;

/// Custom resource definitions, ours and the substrate's
pub mod resources;

/// Task chains with checkpointed resumability
pub mod task;

/// Log and trace integrations
pub mod telemetry;

/// Workflow collaborator contracts and the concrete task chains
pub mod workflows;

/// Metrics
mod metrics;

pub use controllers::cluster::controller::run;
pub use controllers::State;
pub use metrics::Metrics;
