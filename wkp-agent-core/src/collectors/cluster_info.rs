//! ClusterInfo collector.

use crate::collectors::CollectError;
use crate::processors::Collector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node as KubeNode};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;
use wkp_agent_sdk::objects::{Cluster, ClusterInfo, Node};

/// Namespace whose UID identifies the cluster.
pub const CLUSTER_ID_NAMESPACE: &str = "kube-system";

const LABEL_MASTER: &str = "node-role.kubernetes.io/master";
const LABEL_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";

/// Collects the cluster's identity and node inventory.
pub struct ClusterInfoCollector {
    token: String,
    client: Client,
}

impl ClusterInfoCollector {
    pub fn new(token: impl Into<String>, client: Client) -> Self {
        Self {
            token: token.into(),
            client,
        }
    }
}

#[async_trait]
impl Collector for ClusterInfoCollector {
    type Payload = ClusterInfo;
    type Error = CollectError;

    async fn collect(&self) -> Result<ClusterInfo, CollectError> {
        let nodes = Api::<KubeNode>::all(self.client.clone())
            .list(&ListParams::default())
            .await?;
        let namespace = Api::<Namespace>::all(self.client.clone())
            .get_opt(CLUSTER_ID_NAMESPACE)
            .await?;

        debug!(nodes = nodes.items.len(), "Listed cluster nodes");
        build_cluster_info(&self.token, &nodes.items, namespace.as_ref())
    }
}

/// Build the snapshot from already fetched objects.
pub fn build_cluster_info(
    token: &str,
    nodes: &[KubeNode],
    cluster_namespace: Option<&Namespace>,
) -> Result<ClusterInfo, CollectError> {
    if nodes.is_empty() {
        return Err(CollectError::NoNodes);
    }
    let id = cluster_namespace
        .and_then(|namespace| namespace.metadata.uid.clone())
        .ok_or_else(|| CollectError::MissingNamespace(CLUSTER_ID_NAMESPACE.to_string()))?;

    let cluster_type = nodes
        .iter()
        .find_map(provider_scheme)
        .unwrap_or_default()
        .to_string();

    Ok(ClusterInfo {
        token: token.to_string(),
        cluster: Cluster {
            id,
            cluster_type,
            nodes: nodes.iter().map(node_info).collect(),
        },
    })
}

/// `existingInfra://derp-wks-1` -> `existingInfra`
fn provider_scheme(node: &KubeNode) -> Option<&str> {
    let provider_id = node.spec.as_ref()?.provider_id.as_deref()?;
    provider_id
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .filter(|scheme| !scheme.is_empty())
}

fn node_info(node: &KubeNode) -> Node {
    let system_info = node.status.as_ref().and_then(|status| status.node_info.as_ref());
    let is_control_plane = node.metadata.labels.as_ref().is_some_and(|labels| {
        labels.contains_key(LABEL_MASTER) || labels.contains_key(LABEL_CONTROL_PLANE)
    });

    Node {
        machine_id: system_info
            .map(|info| info.machine_id.clone())
            .unwrap_or_default(),
        name: node.metadata.name.clone().unwrap_or_default(),
        is_control_plane,
        kubelet_version: system_info
            .map(|info| info.kubelet_version.clone())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeSpec, NodeStatus, NodeSystemInfo};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn node(name: &str, control_plane: bool, machine_id: &str, kubelet_version: &str) -> KubeNode {
        let labels = control_plane
            .then(|| BTreeMap::from([(LABEL_MASTER.to_string(), String::new())]));
        KubeNode {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels,
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some(format!("existingInfra://{name}")),
                ..Default::default()
            }),
            status: Some(NodeStatus {
                node_info: Some(NodeSystemInfo {
                    machine_id: machine_id.to_string(),
                    kubelet_version: kubelet_version.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    fn kube_system() -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(CLUSTER_ID_NAMESPACE.to_string()),
                uid: Some("f72c7ce4-afd1-4840-bd50-fb4fabc99859".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_no_nodes() {
        let result = build_cluster_info("token", &[], Some(&kube_system()));
        assert!(matches!(result, Err(CollectError::NoNodes)));
    }

    #[test]
    fn test_no_cluster_namespace() {
        let nodes = [KubeNode::default()];
        let result = build_cluster_info("token", &nodes, None);
        assert!(matches!(result, Err(CollectError::MissingNamespace(_))));
    }

    #[test]
    fn test_one_control_plane_one_worker() {
        let nodes = [
            node(
                "derp-wks-1",
                true,
                "e3801e6f-13b6-4e39-a234-435b4f6b0011",
                "v1.19.4",
            ),
            node(
                "derp-wks-2",
                false,
                "9c6708f5-9aa0-4a09-8d41-362b49f62a76",
                "v1.19.3",
            ),
        ];

        let info = build_cluster_info("token", &nodes, Some(&kube_system())).unwrap();

        assert_eq!(
            info,
            ClusterInfo {
                token: "token".to_string(),
                cluster: Cluster {
                    id: "f72c7ce4-afd1-4840-bd50-fb4fabc99859".to_string(),
                    cluster_type: "existingInfra".to_string(),
                    nodes: vec![
                        Node {
                            machine_id: "e3801e6f-13b6-4e39-a234-435b4f6b0011".to_string(),
                            name: "derp-wks-1".to_string(),
                            is_control_plane: true,
                            kubelet_version: "v1.19.4".to_string(),
                        },
                        Node {
                            machine_id: "9c6708f5-9aa0-4a09-8d41-362b49f62a76".to_string(),
                            name: "derp-wks-2".to_string(),
                            is_control_plane: false,
                            kubelet_version: "v1.19.3".to_string(),
                        },
                    ],
                },
            }
        );
    }

    #[test]
    fn test_control_plane_label() {
        let mut cp = node("cp", false, "m", "v1.30.0");
        cp.metadata.labels = Some(BTreeMap::from([(
            LABEL_CONTROL_PLANE.to_string(),
            String::new(),
        )]));

        let info = build_cluster_info("token", &[cp], Some(&kube_system())).unwrap();
        assert!(info.cluster.nodes[0].is_control_plane);
    }
}
