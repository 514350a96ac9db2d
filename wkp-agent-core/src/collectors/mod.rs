//! Collectors building the periodic cluster snapshots.
//!
//! - `ClusterInfoCollector`: cluster identity, provider and nodes
//! - `FluxInfoCollector`: Flux deployments and their recent git syncs

pub mod cluster_info;
pub mod flux_info;

pub use cluster_info::{ClusterInfoCollector, build_cluster_info};
pub use flux_info::{FluxInfoCollector, build_flux_info, parse_sync_logs};

use thiserror::Error;

/// Errors that can occur while collecting a snapshot.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("no nodes found in the cluster")]
    NoNodes,

    #[error("namespace {0} not found")]
    MissingNamespace(String),

    #[error("no flux deployments detected")]
    NoFluxDeployments,

    #[error("no pods found for deployment {0}")]
    NoPods(String),
}
