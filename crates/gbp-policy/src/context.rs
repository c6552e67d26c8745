//! Immutable policy snapshot consumed by the ACL compiler.

use crate::endpoint::{AddressEndpoint, AddressEndpointKey};
use crate::rule::{Participation, RendererResolvedPolicy, RuleGroup, RuleGroupKey};
use gbp_types::IpPrefix;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

/// A forwarding subnet known to the domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingSubnet {
    pub tenant_id: String,
    #[serde(default)]
    pub network_domain_id: String,
    pub prefix: IpPrefix,
    /// Only tenant-owned subnets receive default-deny entries.
    #[serde(default)]
    pub is_tenant: bool,
}

impl ForwardingSubnet {
    pub fn tenant(tenant_id: impl Into<String>, prefix: IpPrefix) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            network_domain_id: String::new(),
            prefix,
            is_tenant: true,
        }
    }
}

/// `(local, peer) -> [(rule group, participation)]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTable {
    entries: BTreeMap<AddressEndpointKey, BTreeMap<AddressEndpointKey, Vec<RendererResolvedPolicy>>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a policy entry, keeping each cell sorted by rule-group
    /// precedence and free of duplicates.
    pub fn insert(
        &mut self,
        local: AddressEndpointKey,
        peer: AddressEndpointKey,
        policy: RendererResolvedPolicy,
    ) {
        let cell = self.entries.entry(local).or_default().entry(peer).or_default();
        if cell.contains(&policy) {
            return;
        }
        cell.push(policy);
        cell.sort_by(|a, b| {
            a.rule_group
                .precedence()
                .cmp(&b.rule_group.precedence())
                .then(a.participation.cmp(&b.participation))
        });
    }

    /// Endpoints that have at least one peer.
    pub fn local_endpoints(&self) -> impl Iterator<Item = &AddressEndpointKey> {
        self.entries.keys()
    }

    /// Peers of `local` with their policies, in key order.
    pub fn peers(
        &self,
        local: &AddressEndpointKey,
    ) -> impl Iterator<Item = (&AddressEndpointKey, &[RendererResolvedPolicy])> {
        self.entries
            .get(local)
            .into_iter()
            .flat_map(|peers| peers.iter().map(|(k, v)| (k, v.as_slice())))
    }

    pub fn policies(
        &self,
        local: &AddressEndpointKey,
        peer: &AddressEndpointKey,
    ) -> &[RendererResolvedPolicy] {
        self.entries
            .get(local)
            .and_then(|peers| peers.get(peer))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A versioned, read-only view of endpoints and resolved policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    version: u64,
    policy_table: PolicyTable,
    rule_groups: BTreeMap<RuleGroupKey, Arc<RuleGroup>>,
    endpoints: BTreeMap<AddressEndpointKey, AddressEndpoint>,
    subnets: Vec<ForwardingSubnet>,
    endpoints_by_rule_group: BTreeMap<RuleGroupKey, BTreeSet<AddressEndpointKey>>,
}

impl PolicyContext {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Same content under a new version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn with_endpoint(mut self, endpoint: AddressEndpoint) -> Self {
        self.add_endpoint(endpoint);
        self
    }

    pub fn with_subnet(mut self, subnet: ForwardingSubnet) -> Self {
        self.subnets.push(subnet);
        self
    }

    pub fn with_rule_group(mut self, group: RuleGroup) -> Self {
        self.add_rule_group(group);
        self
    }

    pub fn with_policy(
        mut self,
        local: AddressEndpointKey,
        peer: AddressEndpointKey,
        rule_group: &RuleGroupKey,
        participation: Participation,
    ) -> Self {
        self.add_policy(local, peer, rule_group, participation);
        self
    }

    pub fn add_endpoint(&mut self, endpoint: AddressEndpoint) {
        self.endpoints.insert(endpoint.key.clone(), endpoint);
    }

    pub fn add_subnet(&mut self, subnet: ForwardingSubnet) {
        self.subnets.push(subnet);
    }

    pub fn add_rule_group(&mut self, group: RuleGroup) {
        self.rule_groups.insert(group.key.clone(), Arc::new(group));
    }

    /// Records that `local` reaches `peer` through `rule_group`.
    ///
    /// Returns false (and logs) when the rule group is unknown.
    pub fn add_policy(
        &mut self,
        local: AddressEndpointKey,
        peer: AddressEndpointKey,
        rule_group: &RuleGroupKey,
        participation: Participation,
    ) -> bool {
        let Some(group) = self.rule_groups.get(rule_group) else {
            warn!(
                "Skipping policy {} -> {}: unknown rule group {}",
                local, peer, rule_group
            );
            return false;
        };
        self.endpoints_by_rule_group
            .entry(rule_group.clone())
            .or_default()
            .insert(local.clone());
        self.policy_table.insert(
            local,
            peer,
            RendererResolvedPolicy::new(participation, Arc::clone(group)),
        );
        true
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn policy_table(&self) -> &PolicyTable {
        &self.policy_table
    }

    pub fn endpoint(&self, key: &AddressEndpointKey) -> Option<&AddressEndpoint> {
        self.endpoints.get(key)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &AddressEndpoint> {
        self.endpoints.values()
    }

    pub fn rule_group(&self, key: &RuleGroupKey) -> Option<&Arc<RuleGroup>> {
        self.rule_groups.get(key)
    }

    pub fn subnets(&self) -> &[ForwardingSubnet] {
        &self.subnets
    }

    /// Endpoints for which ACLs are rendered (those with policy).
    pub fn renderer_endpoints(&self) -> impl Iterator<Item = &AddressEndpointKey> {
        self.policy_table.local_endpoints()
    }

    /// Renderer endpoints whose policy references `rule_group`.
    pub fn endpoints_by_rule_group(&self, rule_group: &RuleGroupKey) -> Vec<&AddressEndpointKey> {
        self.endpoints_by_rule_group
            .get(rule_group)
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    /// Rule groups referenced by any policy of `local`.
    pub fn rule_groups_of(&self, local: &AddressEndpointKey) -> BTreeSet<&RuleGroupKey> {
        self.policy_table
            .peers(local)
            .flat_map(|(_, policies)| policies.iter().map(|p| &p.rule_group.key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Action, ResolvedRule};
    use pretty_assertions::assert_eq;

    fn key(addr: &str) -> AddressEndpointKey {
        AddressEndpointKey::l3(addr, "l3-ctx")
    }

    fn group(contract: &str, order: u32) -> RuleGroup {
        RuleGroup::new(RuleGroupKey::new(contract, "tenant", "subject"), order)
            .with_rule(ResolvedRule::new(format!("{}-rule", contract)).with_action(Action::allow()))
    }

    #[test]
    fn test_policy_cell_sorted_by_precedence() {
        let g_late = group("late", 5);
        let g_early = group("early", 1);
        let ctx = PolicyContext::new(1)
            .with_rule_group(g_late.clone())
            .with_rule_group(g_early.clone())
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &g_late.key, Participation::Provider)
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &g_early.key, Participation::Provider)
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &g_early.key, Participation::Provider);

        let names: Vec<_> = ctx
            .policy_table()
            .policies(&key("10.0.0.1"), &key("10.0.0.2"))
            .iter()
            .map(|p| p.rule_group.key.contract_id.as_str())
            .collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn test_unknown_rule_group_skipped() {
        let mut ctx = PolicyContext::new(1);
        let added = ctx.add_policy(
            key("10.0.0.1"),
            key("10.0.0.2"),
            &RuleGroupKey::new("missing", "tenant", "subject"),
            Participation::Consumer,
        );
        assert!(!added);
        assert!(ctx.policy_table().is_empty());
    }

    #[test]
    fn test_rule_group_index() {
        let g = group("web", 0);
        let ctx = PolicyContext::new(7)
            .with_rule_group(g.clone())
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &g.key, Participation::Provider)
            .with_policy(key("10.0.0.2"), key("10.0.0.1"), &g.key, Participation::Consumer);

        assert_eq!(ctx.version(), 7);
        assert_eq!(
            ctx.endpoints_by_rule_group(&g.key),
            vec![&key("10.0.0.1"), &key("10.0.0.2")]
        );
        assert_eq!(ctx.rule_groups_of(&key("10.0.0.1")).len(), 1);
        assert_eq!(ctx.renderer_endpoints().count(), 2);
        assert_eq!(ctx.policy_table().len(), 2);
    }
}
