use crate::envelope::EventPayload;
use serde::{Deserialize, Serialize};

/// Periodic snapshot of the Flux deployments running in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxInfo {
    pub token: String,
    pub deployments: Vec<FluxDeploymentInfo>,
}

impl EventPayload for FluxInfo {
    const EVENT_TYPE: &'static str = "FluxInfo";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxDeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub args: Vec<String>,
    pub image: String,
    /// Git refreshes found in the last hour of logs, oldest first.
    #[serde(default)]
    pub syncs: Vec<FluxLogInfo>,
}

/// One `event=refreshed` record from the Flux sync loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxLogInfo {
    pub timestamp: String,
    pub url: String,
    pub branch: String,
    pub head: String,
    pub event: String,
}
