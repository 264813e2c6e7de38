//! Small schema types shared between the hub CRD and the broker resources

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Resource requirements for a provisioned component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Resource limits
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub limits: ResourceList,
    /// Resource requests
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub requests: ResourceList,
}

/// Resource quantities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ResourceList {
    /// CPU quantity (e.g., "500m", "2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory quantity (e.g., "512Mi", "2Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceList {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

/// Toleration for pod scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    /// Taint key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Operator (Exists, Equal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Taint value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Effect (NoSchedule, PreferNoSchedule, NoExecute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    /// Toleration seconds for NoExecute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_list_empty() {
        assert!(ResourceList::default().is_empty());
        let list = ResourceList {
            memory: Some("1Gi".to_string()),
            ..Default::default()
        };
        assert!(!list.is_empty());
    }

    #[test]
    fn test_toleration_parsing() {
        let json = r#"{"key": "dedicated", "operator": "Equal", "value": "kafka", "effect": "NoSchedule"}"#;
        let toleration: Toleration = serde_json::from_str(json).unwrap();
        assert_eq!(toleration.key.as_deref(), Some("dedicated"));
        assert_eq!(toleration.effect.as_deref(), Some("NoSchedule"));
    }
}
