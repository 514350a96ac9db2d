//! Payloads published by the agent.

pub mod cluster;
pub mod event;
pub mod flux;

pub use cluster::{Cluster, ClusterInfo, Node};
pub use event::{ChangeType, KubernetesEvent};
pub use flux::{FluxDeploymentInfo, FluxInfo, FluxLogInfo};
