//! Tenant access policy derivation
//!
//! Pure functions mapping a tenant identifier and the global topic-naming
//! configuration to the tenant's topic pair and its ACL set. Deterministic:
//! the same inputs always produce the same rules in the same order, so a
//! reconcile pass can compare policies structurally.

use crate::config::TransportConfig;
use crate::crd::{
    AclOperation, AclPatternType, AclResource, AclResourceType, AclRule,
};

/// Marker character that turns the status-topic template into a per-tenant
/// prefix pattern.
pub const TOPIC_WILDCARD: char = '*';

/// Global topic naming, extracted from the transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNaming {
    pub spec_topic: String,
    pub status_topic_template: String,
}

impl TopicNaming {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            spec_topic: config.spec_topic.clone(),
            status_topic_template: config.status_topic_template.clone(),
        }
    }

    /// Whether status topics are carved out of a shared prefix.
    pub fn has_wildcard(&self) -> bool {
        self.status_topic_template.contains(TOPIC_WILDCARD)
    }

    /// The tenant's concrete status topic name.
    pub fn status_topic_for(&self, tenant: &str) -> String {
        if self.has_wildcard() {
            self.status_topic_template
                .replace(TOPIC_WILDCARD, tenant)
        } else {
            self.status_topic_template.clone()
        }
    }

    /// The prefix the ACL grants when the template carries the wildcard.
    fn status_topic_prefix(&self) -> String {
        self.status_topic_template
            .replace(TOPIC_WILDCARD, "")
    }
}

/// The two topics a tenant talks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPair {
    /// Shared inbound topic, identical for every tenant
    pub spec_topic: String,
    /// Outbound topic the tenant publishes status to
    pub status_topic: String,
}

/// Derive the topic pair for a tenant.
pub fn topic_pair(naming: &TopicNaming, tenant: &str) -> TopicPair {
    TopicPair {
        spec_topic: naming.spec_topic.clone(),
        status_topic: naming.status_topic_for(tenant),
    }
}

/// Derive the tenant's ACL set: exactly three rules, least privilege.
///
/// Order is fixed for reproducible comparisons: consumer-group read,
/// spec-topic describe+read, status-topic write.
pub fn access_policy(naming: &TopicNaming, tenant: &str) -> Vec<AclRule> {
    let (status_resource, status_pattern) = if naming.has_wildcard() {
        (naming.status_topic_prefix(), AclPatternType::Prefix)
    } else {
        (naming.status_topic_for(tenant), AclPatternType::Literal)
    };

    vec![
        consumer_group_read_acl(),
        read_topic_acl(&naming.spec_topic, AclPatternType::Literal),
        write_topic_acl(&status_resource, status_pattern),
    ]
}

/// Read access to every consumer group.
pub fn consumer_group_read_acl() -> AclRule {
    AclRule {
        host: Some("*".to_string()),
        resource: AclResource {
            r#type: AclResourceType::Group,
            name: "*".to_string(),
            pattern_type: AclPatternType::Literal,
        },
        operations: vec![AclOperation::Read],
    }
}

/// Describe and read access to one topic.
pub fn read_topic_acl(topic: &str, pattern_type: AclPatternType) -> AclRule {
    AclRule {
        host: Some("*".to_string()),
        resource: AclResource {
            r#type: AclResourceType::Topic,
            name: topic.to_string(),
            pattern_type,
        },
        operations: vec![AclOperation::Describe, AclOperation::Read],
    }
}

/// Write access to one topic.
pub fn write_topic_acl(topic: &str, pattern_type: AclPatternType) -> AclRule {
    AclRule {
        host: Some("*".to_string()),
        resource: AclResource {
            r#type: AclResourceType::Topic,
            name: topic.to_string(),
            pattern_type,
        },
        operations: vec![AclOperation::Write],
    }
}

/// Identity (object name) of a tenant's Kafka user.
pub fn tenant_user_name(tenant: &str) -> String {
    format!("{}-kafka-user", tenant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming(spec: &str, template: &str) -> TopicNaming {
        TopicNaming {
            spec_topic: spec.to_string(),
            status_topic_template: template.to_string(),
        }
    }

    #[test]
    fn test_topic_pair_with_wildcard_template() {
        let pair = topic_pair(&naming("spec", "status.*"), "cluster-a");
        assert_eq!(pair.spec_topic, "spec");
        assert_eq!(pair.status_topic, "status.cluster-a");
    }

    #[test]
    fn test_topic_pair_with_literal_template() {
        let pair = topic_pair(&naming("spec", "status"), "cluster-a");
        assert_eq!(pair.status_topic, "status");

        // Shared status topic: two tenants resolve to the same name.
        let other = topic_pair(&naming("spec", "status"), "cluster-b");
        assert_eq!(pair.status_topic, other.status_topic);
    }

    #[test]
    fn test_policy_with_wildcard_is_prefix_scoped() {
        let rules = access_policy(&naming("spec", "status.*"), "cluster-a");
        assert_eq!(rules.len(), 3);

        assert_eq!(rules[0].resource.r#type, AclResourceType::Group);
        assert_eq!(rules[0].resource.name, "*");
        assert_eq!(rules[0].resource.pattern_type, AclPatternType::Literal);
        assert_eq!(rules[0].operations, vec![AclOperation::Read]);

        assert_eq!(rules[1].resource.r#type, AclResourceType::Topic);
        assert_eq!(rules[1].resource.name, "spec");
        assert_eq!(
            rules[1].operations,
            vec![AclOperation::Describe, AclOperation::Read]
        );

        assert_eq!(rules[2].resource.name, "status.");
        assert_eq!(rules[2].resource.pattern_type, AclPatternType::Prefix);
        assert_eq!(rules[2].operations, vec![AclOperation::Write]);
    }

    #[test]
    fn test_policy_without_wildcard_is_literal() {
        let rules = access_policy(&naming("spec", "status"), "cluster-a");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[2].resource.name, "status");
        assert_eq!(rules[2].resource.pattern_type, AclPatternType::Literal);
    }

    #[test]
    fn test_policy_is_deterministic() {
        let naming = naming("spec", "status.*");
        assert_eq!(
            access_policy(&naming, "cluster-a"),
            access_policy(&naming, "cluster-a")
        );
    }

    #[test]
    fn test_no_operation_beyond_least_privilege() {
        let rules = access_policy(&naming("spec", "status.*"), "cluster-a");
        for rule in &rules {
            for op in &rule.operations {
                assert!(matches!(
                    op,
                    AclOperation::Read | AclOperation::Write | AclOperation::Describe
                ));
            }
        }
    }

    #[test]
    fn test_tenant_user_name() {
        assert_eq!(tenant_user_name("cluster-a"), "cluster-a-kafka-user");
    }
}
