//! Kubernetes event payload and the change types reported by watchers.

use crate::envelope::EventPayload;
use k8s_openapi::api::core::v1::Event;
use serde::{Deserialize, Serialize};

/// Kind of change observed on a watched object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Updated,
    Deleted,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Updated => write!(f, "updated"),
            ChangeType::Deleted => write!(f, "deleted"),
        }
    }
}

/// A core/v1 Event observed in the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesEvent {
    pub token: String,
    pub change_type: ChangeType,
    pub event: Event,
}

impl EventPayload for KubernetesEvent {
    const EVENT_TYPE: &'static str = "Event";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_wire_format() {
        assert_eq!(
            serde_json::to_string(&ChangeType::Updated).unwrap(),
            "\"updated\""
        );
        assert_eq!(ChangeType::Deleted.to_string(), "deleted");
    }
}
