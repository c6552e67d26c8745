//! Serialized policy snapshots (JSON or YAML).
//!
//! A snapshot is the document form of a [`PolicyContext`]: endpoints,
//! forwarding subnets, rule groups and the flattened policy relation.

use crate::context::{ForwardingSubnet, PolicyContext};
use crate::endpoint::{AddressEndpoint, AddressEndpointKey};
use crate::error::{PolicyError, Result};
use crate::rule::{Participation, RuleGroup, RuleGroupKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One `(local, peer, rule group, participation)` row of the policy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub local: AddressEndpointKey,
    pub peer: AddressEndpointKey,
    pub rule_group: RuleGroupKey,
    pub participation: Participation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub endpoints: Vec<AddressEndpoint>,
    #[serde(default)]
    pub subnets: Vec<ForwardingSubnet>,
    #[serde(default)]
    pub rule_groups: Vec<RuleGroup>,
    #[serde(default)]
    pub policies: Vec<PolicyEntry>,
}

impl PolicySnapshot {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| PolicyError::parse("json", e.to_string()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| PolicyError::parse("yaml", e.to_string()))
    }

    /// Loads a snapshot file; `.json` files are read as JSON, anything else
    /// as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PolicyError::io(path, e))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let snapshot = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };

        info!(
            "Loaded policy snapshot {} (version {}, {} endpoints, {} policies)",
            path.display(),
            snapshot.version,
            snapshot.endpoints.len(),
            snapshot.policies.len()
        );
        Ok(snapshot)
    }

    /// Builds the read-only context; entries naming unknown rule groups are
    /// dropped with a warning.
    pub fn into_context(self) -> PolicyContext {
        let mut ctx = PolicyContext::new(self.version);
        for endpoint in self.endpoints {
            ctx.add_endpoint(endpoint);
        }
        for subnet in self.subnets {
            ctx.add_subnet(subnet);
        }
        for group in self.rule_groups {
            ctx.add_rule_group(group);
        }

        let total = self.policies.len();
        let accepted = self
            .policies
            .into_iter()
            .filter(|entry| {
                ctx.add_policy(
                    entry.local.clone(),
                    entry.peer.clone(),
                    &entry.rule_group,
                    entry.participation,
                )
            })
            .count();
        debug!("Accepted {}/{} policy entries", accepted, total);

        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SNAPSHOT_YAML: &str = r#"
version: 3
endpoints:
  - key: {address: 10.0.0.1/32, address_type: ip_prefix, context_id: l3, context_type: l3_context}
    location: {mount_point: node-1, node_connector: tap0}
  - key: {address: 10.0.0.2/32, address_type: ip_prefix, context_id: l3, context_type: l3_context}
    location: {mount_point: node-1, node_connector: tap1}
subnets:
  - tenant_id: tenant-a
    prefix: 10.0.0.0/24
    is_tenant: true
rule_groups:
  - contract_id: web
    tenant_id: tenant-a
    subject_name: http
    order: 0
    rules:
      - name: allow-http
        actions: [{name: allow, definition_id: Action-Allow}]
policies:
  - local: {address: 10.0.0.1/32, address_type: ip_prefix, context_id: l3, context_type: l3_context}
    peer: {address: 10.0.0.2/32, address_type: ip_prefix, context_id: l3, context_type: l3_context}
    rule_group: {contract_id: web, tenant_id: tenant-a, subject_name: http}
    participation: provider
  - local: {address: 10.0.0.1/32, address_type: ip_prefix, context_id: l3, context_type: l3_context}
    peer: {address: 10.0.0.2/32, address_type: ip_prefix, context_id: l3, context_type: l3_context}
    rule_group: {contract_id: nope, tenant_id: tenant-a, subject_name: http}
    participation: provider
"#;

    #[test]
    fn test_yaml_snapshot_into_context() {
        let snapshot = PolicySnapshot::from_yaml(SNAPSHOT_YAML).unwrap();
        assert_eq!(snapshot.version, 3);
        assert_eq!(snapshot.policies.len(), 2);

        let ctx = snapshot.into_context();
        assert_eq!(ctx.version(), 3);
        assert_eq!(ctx.endpoints().count(), 2);
        assert_eq!(ctx.subnets().len(), 1);
        // The entry with the unknown rule group is dropped.
        assert_eq!(ctx.policy_table().len(), 1);
    }

    #[test]
    fn test_load_json_file() {
        let snapshot = PolicySnapshot::from_yaml(SNAPSHOT_YAML).unwrap();
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(serde_json::to_string(&snapshot).unwrap().as_bytes())
            .unwrap();

        let loaded = PolicySnapshot::load(file.path()).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_load_errors() {
        let err = PolicySnapshot::load("/nonexistent/snapshot.yaml").unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));

        let err = PolicySnapshot::from_json("{ not json").unwrap_err();
        assert!(err.to_string().contains("json"));
    }
}
