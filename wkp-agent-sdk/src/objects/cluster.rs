use crate::envelope::EventPayload;
use serde::{Deserialize, Serialize};

/// Periodic snapshot of the cluster topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub token: String,
    pub cluster: Cluster,
}

impl EventPayload for ClusterInfo {
    const EVENT_TYPE: &'static str = "ClusterInfo";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// UID of the `kube-system` namespace, stable for the cluster lifetime.
    pub id: String,
    /// Infrastructure provider, taken from the nodes' provider id scheme.
    #[serde(rename = "type")]
    pub cluster_type: String,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub machine_id: String,
    pub name: String,
    pub is_control_plane: bool,
    pub kubelet_version: String,
}
