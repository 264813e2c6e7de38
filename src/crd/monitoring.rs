//! PodMonitor resource (monitoring.coreos.com/v1)
//!
//! Minimal subset used to scrape the broker JMX exporter.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PodMonitor declares a metrics scrape target
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "PodMonitor",
    plural = "podmonitors",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PodMonitorSpec {
    pub selector: LabelSelector,
    pub pod_metrics_endpoints: Vec<MetricsEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_monitor_serialization() {
        let mut labels = BTreeMap::new();
        labels.insert("strimzi.io/kind".to_string(), "Kafka".to_string());
        let spec = PodMonitorSpec {
            selector: LabelSelector {
                match_labels: labels,
            },
            pod_metrics_endpoints: vec![MetricsEndpoint {
                port: Some("tcp-prometheus".to_string()),
                path: Some("/metrics".to_string()),
            }],
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["selector"]["matchLabels"]["strimzi.io/kind"], "Kafka");
        assert_eq!(value["podMetricsEndpoints"][0]["port"], "tcp-prometheus");
    }
}
