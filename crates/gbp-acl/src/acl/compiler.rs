//! Per-endpoint rule compilation.
//!
//! For one local endpoint and one ACL direction the compiler emits, in
//! order:
//!
//! 1. pairwise rules for every located peer of the endpoint,
//! 2. pairwise rules of every endpoint sharing its interface,
//! 3. one Deny entry per tenant subnet,
//! 4. at most one Permit entry for an external parent endpoint.
//!
//! The target device evaluates entries first-match, so specific pairwise
//! rules precede the defaults.

use super::ace::AceBuilder;
use super::classifier::specialize;
use super::direction::resolve_classifier_direction;
use super::mapper::{filter_irrelevant_families, is_dhcp_rule, AddressMapper};
use super::multihome::EndpointsByInterface;
use super::types::{Ace, AclAction, AclDirection};
use crate::config::AclPolicyConfig;
use crate::error::ResolveError;
use crate::resolver::resolve_location;
use gbp_policy::{
    AddressEndpoint, AddressEndpointKey, Direction, PolicyContext, RendererResolvedPolicy,
    ResolvedRule,
};
use gbp_types::IpPrefix;
use tracing::{debug, warn};

pub struct RuleCompiler<'a> {
    ctx: &'a PolicyContext,
    grouping: &'a EndpointsByInterface,
    config: &'a AclPolicyConfig,
}

impl<'a> RuleCompiler<'a> {
    pub fn new(
        ctx: &'a PolicyContext,
        grouping: &'a EndpointsByInterface,
        config: &'a AclPolicyConfig,
    ) -> Self {
        Self {
            ctx,
            grouping,
            config,
        }
    }

    /// Full ordered entry list for `local` in `direction`.
    pub fn compile_rules_for_endpoint(
        &self,
        local: &AddressEndpointKey,
        direction: AclDirection,
    ) -> Result<Vec<Ace>, ResolveError> {
        let local_ep = self
            .ctx
            .endpoint(local)
            .ok_or_else(|| ResolveError::unknown_endpoint(local))?;

        let mut entries = self.pairwise_rules(local_ep, direction);

        for other in self.grouping.others_on_same_interface(local) {
            if other == local {
                continue;
            }
            match self.ctx.endpoint(other) {
                Some(other_ep) => entries.extend(self.pairwise_rules(other_ep, direction)),
                None => debug!("Co-located endpoint {} missing from context", other),
            }
        }

        if self.config.deny_tenant_subnets {
            entries.extend(self.deny_tenant_subnets(direction));
        }
        if self.config.allow_external {
            entries.extend(self.allow_external(local_ep, direction));
        }

        debug!(
            "Compiled {} {} entries for {}",
            entries.len(),
            direction,
            local
        );
        Ok(entries)
    }

    /// Rules between `local` and each of its located peers.
    pub fn pairwise_rules(&self, local: &AddressEndpoint, direction: AclDirection) -> Vec<Ace> {
        let mut entries = Vec::new();
        for (peer_key, policies) in self.ctx.policy_table().peers(&local.key) {
            let Some(peer) = self.located_peer(peer_key) else {
                continue;
            };
            for policy in policies {
                entries.extend(self.rules_for_policy(local, peer, policy, direction));
            }
        }
        entries
    }

    /// Peer endpoint, if it is known and attached somewhere.
    pub fn located_peer(&self, peer_key: &AddressEndpointKey) -> Option<&'a AddressEndpoint> {
        let Some(peer) = self.ctx.endpoint(peer_key) else {
            warn!("Peer {} missing from context, skipping", peer_key);
            return None;
        };
        if let Err(e) = resolve_location(peer) {
            warn!("Skipping peer: {}", e);
            return None;
        }
        Some(peer)
    }

    /// ACEs of one rule group between `local` and `peer`.
    pub fn rules_for_policy(
        &self,
        local: &AddressEndpoint,
        peer: &AddressEndpoint,
        policy: &RendererResolvedPolicy,
        direction: AclDirection,
    ) -> Vec<Ace> {
        let classifier_direction = resolve_classifier_direction(policy.participation, direction);

        let batch: Vec<AceBuilder> = policy
            .rule_group
            .rules
            .iter()
            .filter_map(|rule| {
                let name = format!("{}_{}_{}", rule.name, local.key.address, peer.key.address);
                rule_to_builder(rule, classifier_direction, name)
            })
            .collect();

        let batch = filter_irrelevant_families(batch, local, peer);
        let batch = AddressMapper::source(direction).update_rules(batch, local, peer);
        let batch = AddressMapper::destination(direction).update_rules(batch, local, peer);
        batch
            .into_iter()
            .filter(|rule| {
                let constrained = has_address_match(rule) || is_dhcp_rule(rule);
                if !constrained {
                    warn!("Rule {} has no address match after mapping, dropping", rule.name());
                }
                constrained
            })
            .map(AceBuilder::build)
            .collect()
    }

    /// One Deny entry per tenant-owned subnet.
    pub fn deny_tenant_subnets(&self, direction: AclDirection) -> Vec<Ace> {
        let dir = direction.to_string().to_lowercase();
        self.ctx
            .subnets()
            .iter()
            .filter(|subnet| subnet.is_tenant)
            .map(|subnet| {
                let name = format!("deny_{}_{}_{}", dir, subnet.prefix.family(), subnet.prefix);
                let builder = AceBuilder::new(name).with_action(AclAction::Deny);
                let builder = match direction {
                    AclDirection::Ingress => builder.with_destination_prefix(subnet.prefix),
                    AclDirection::Egress => builder.with_source_prefix(subnet.prefix),
                };
                builder.build()
            })
            .collect()
    }

    /// Permit entry for the first parent of `local` that is outside the
    /// managed domain (no resolvable location).
    pub fn allow_external(&self, local: &AddressEndpoint, direction: AclDirection) -> Option<Ace> {
        let prefix = local.parent_endpoints.iter().find_map(|parent| {
            let located = self
                .ctx
                .endpoint(parent)
                .is_some_and(|ep| resolve_location(ep).is_ok());
            if located {
                return None;
            }
            match parent.address.parse::<IpPrefix>() {
                Ok(prefix) => Some(prefix),
                Err(e) => {
                    debug!("External parent {} has no usable address: {}", parent, e);
                    None
                }
            }
        })?;

        let name = format!("permit_external_{}", direction.to_string().to_lowercase());
        let builder = AceBuilder::new(name).permit();
        let builder = match direction {
            AclDirection::Ingress => builder.with_source_prefix(prefix),
            AclDirection::Egress => builder.with_destination_prefix(prefix),
        };
        Some(builder.build())
    }
}

/// True when the entry carries at least one prefix.
fn has_address_match(rule: &AceBuilder) -> bool {
    rule.ip()
        .is_some_and(|ip| ip.source().is_some() || ip.destination().is_some())
}

/// Builder for one resolved rule, or `None` when the rule yields no ACE.
fn rule_to_builder(
    rule: &ResolvedRule,
    classifier_direction: Direction,
    name: String,
) -> Option<AceBuilder> {
    let Some(specialized) = specialize(&rule.classifiers, classifier_direction) else {
        let has_candidates = rule.classifiers.iter().any(|c| {
            c.direction == classifier_direction || c.direction == Direction::Bidirectional
        });
        if has_candidates {
            warn!(
                "Rule {} has no usable classifier for direction {}",
                rule.name, classifier_direction
            );
        } else {
            debug!("Rule {} has no classifier for direction {}", rule.name, classifier_direction);
        }
        return None;
    };
    if !rule.has_allow_action() {
        warn!("Rule {} has no allow action, skipping", rule.name);
        return None;
    }
    match specialized.update_match(AceBuilder::new(name)) {
        Ok(builder) => Some(builder.permit()),
        Err(e) => {
            warn!("Rule {} skipped: {}", rule.name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::types::{AceIpMatch, ProtocolMatch};
    use gbp_policy::{
        AbsoluteLocation, Action, Classifier, ForwardingSubnet, ParameterValue, Participation,
        RuleGroup, RuleGroupKey, ETHER_TYPE_CLASSIFIER_ID, IP_PROTO_CLASSIFIER_ID,
        L4_CLASSIFIER_ID,
    };
    use gbp_types::PortRange;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn logged_warning(lines: &[&str], message: &str) -> Result<(), String> {
        if lines.iter().any(|l| l.contains("WARN") && l.contains(message)) {
            Ok(())
        } else {
            Err(format!("no warning containing '{}'", message))
        }
    }

    fn key(address: &str) -> AddressEndpointKey {
        AddressEndpointKey::l3(address, "l3-ctx")
    }

    fn prefix(s: &str) -> IpPrefix {
        s.parse().unwrap()
    }

    fn located(address: &str, interface: &str) -> AddressEndpoint {
        AddressEndpoint::new(key(address)).with_location(AbsoluteLocation::new("vpp-1", interface))
    }

    fn http_group() -> RuleGroup {
        RuleGroup::new(RuleGroupKey::new("web", "tenant", "http"), 0).with_rule(
            ResolvedRule::new("http")
                .with_classifier(
                    Classifier::new("tcp-80", L4_CLASSIFIER_ID, Direction::Bidirectional)
                        .with_parameter(ParameterValue::int("proto", 6))
                        .with_parameter(ParameterValue::int("destport", 80)),
                )
                .with_action(Action::allow()),
        )
    }

    fn base_context() -> PolicyContext {
        let group = http_group();
        PolicyContext::new(1)
            .with_endpoint(located("10.0.0.1", "tap0"))
            .with_endpoint(located("10.0.0.2", "tap1"))
            .with_rule_group(group.clone())
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &group.key, Participation::Provider)
    }

    fn compile(ctx: &PolicyContext, local: &str, direction: AclDirection) -> Vec<Ace> {
        let grouping = EndpointsByInterface::build(ctx);
        let config = AclPolicyConfig::default();
        RuleCompiler::new(ctx, &grouping, &config)
            .compile_rules_for_endpoint(&key(local), direction)
            .unwrap()
    }

    #[test]
    fn test_pairwise_rule() {
        let entries = compile(&base_context(), "10.0.0.1", AclDirection::Ingress);
        assert_eq!(entries.len(), 1);

        let ace = &entries[0];
        assert_eq!(ace.name, "http_10.0.0.1_10.0.0.2");
        assert_eq!(ace.action, AclAction::Permit);
        assert_eq!(
            ace.matches.protocol,
            ProtocolMatch::Tcp {
                source_ports: None,
                destination_ports: Some(PortRange::single(80)),
            }
        );
    }

    #[test]
    fn test_unknown_local_endpoint() {
        let ctx = base_context();
        let grouping = EndpointsByInterface::build(&ctx);
        let config = AclPolicyConfig::default();
        let result = RuleCompiler::new(&ctx, &grouping, &config)
            .compile_rules_for_endpoint(&key("10.9.9.9"), AclDirection::Ingress);
        assert_eq!(result, Err(ResolveError::unknown_endpoint(&key("10.9.9.9"))));
    }

    #[test]
    fn test_rule_without_allow_is_skipped() {
        let group = RuleGroup::new(RuleGroupKey::new("web", "tenant", "http"), 0).with_rule(
            ResolvedRule::new("blocked").with_classifier(
                Classifier::new("proto", IP_PROTO_CLASSIFIER_ID, Direction::Bidirectional)
                    .with_parameter(ParameterValue::int("proto", 6)),
            ),
        );
        let ctx = PolicyContext::new(1)
            .with_endpoint(located("10.0.0.1", "tap0"))
            .with_endpoint(located("10.0.0.2", "tap1"))
            .with_rule_group(group.clone())
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &group.key, Participation::Consumer);

        assert!(compile(&ctx, "10.0.0.1", AclDirection::Ingress).is_empty());
    }

    #[test]
    fn test_direction_filtered_rule_is_skipped() {
        // Provider on egress resolves to In; an Out-only classifier misses.
        let group = RuleGroup::new(RuleGroupKey::new("web", "tenant", "http"), 0).with_rule(
            ResolvedRule::new("out-only")
                .with_classifier(
                    Classifier::new("proto", IP_PROTO_CLASSIFIER_ID, Direction::Out)
                        .with_parameter(ParameterValue::int("proto", 17)),
                )
                .with_action(Action::allow()),
        );
        let ctx = PolicyContext::new(1)
            .with_endpoint(located("10.0.0.1", "tap0"))
            .with_endpoint(located("10.0.0.2", "tap1"))
            .with_rule_group(group.clone())
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &group.key, Participation::Provider);

        assert!(compile(&ctx, "10.0.0.1", AclDirection::Egress).is_empty());
        assert_eq!(compile(&ctx, "10.0.0.1", AclDirection::Ingress).len(), 1);
    }

    #[test]
    fn test_deny_subnets_follow_direction() {
        let ctx = base_context()
            .with_subnet(ForwardingSubnet::tenant("tenant", prefix("10.0.0.0/24")))
            .with_subnet(ForwardingSubnet::tenant("tenant", prefix("2001:db8::/64")))
            .with_subnet(ForwardingSubnet {
                is_tenant: false,
                ..ForwardingSubnet::tenant("tenant", prefix("192.168.0.0/16"))
            });

        let ingress = compile(&ctx, "10.0.0.1", AclDirection::Ingress);
        let names: Vec<_> = ingress.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "http_10.0.0.1_10.0.0.2",
                "deny_ingress_ipv4_10.0.0.0/24",
                "deny_ingress_ipv6_2001:db8::/64",
            ]
        );
        assert_eq!(ingress[1].action, AclAction::Deny);
        assert_eq!(ingress[1].destination(), Some(&prefix("10.0.0.0/24")));
        assert_eq!(ingress[1].source(), None);

        let egress = compile(&ctx, "10.0.0.1", AclDirection::Egress);
        assert_eq!(egress[1].name, "deny_egress_ipv4_10.0.0.0/24");
        assert_eq!(egress[1].source(), Some(&prefix("10.0.0.0/24")));
    }

    #[test]
    fn test_external_allow_uses_first_unlocated_parent() {
        let gateway = key("192.168.1.1");
        let local = located("10.0.0.1", "tap0")
            .with_parent(key("10.0.0.2"))
            .with_parent(AddressEndpointKey::l2("aa:bb:cc:dd:ee:ff", "bd"))
            .with_parent(gateway.clone())
            .with_parent(key("192.168.1.2"));
        let ctx = base_context().with_endpoint(local);

        let ingress = compile(&ctx, "10.0.0.1", AclDirection::Ingress);
        let last = ingress.last().unwrap();
        assert_eq!(last.name, "permit_external_ingress");
        assert_eq!(last.action, AclAction::Permit);
        assert_eq!(
            last.matches.ip,
            Some(AceIpMatch::Ipv4 {
                source: Some(prefix("192.168.1.1/32")),
                destination: None,
            })
        );
        assert_eq!(
            ingress.iter().filter(|a| a.name.starts_with("permit_external")).count(),
            1
        );

        let egress = compile(&ctx, "10.0.0.1", AclDirection::Egress);
        let last = egress.last().unwrap();
        assert_eq!(last.name, "permit_external_egress");
        assert_eq!(last.destination(), Some(&prefix("192.168.1.1/32")));
    }

    #[test]
    fn test_defaults_can_be_disabled() {
        let ctx = base_context()
            .with_subnet(ForwardingSubnet::tenant("tenant", prefix("10.0.0.0/24")))
            .with_endpoint(located("10.0.0.1", "tap0").with_parent(key("192.168.1.1")));
        let grouping = EndpointsByInterface::build(&ctx);
        let config = AclPolicyConfig {
            deny_tenant_subnets: false,
            allow_external: false,
        };
        let entries = RuleCompiler::new(&ctx, &grouping, &config)
            .compile_rules_for_endpoint(&key("10.0.0.1"), AclDirection::Ingress)
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_unusable_classifiers_skip_rule() {
        let group = RuleGroup::new(RuleGroupKey::new("web", "tenant", "mixed"), 0)
            .with_rule(
                ResolvedRule::new("unknown")
                    .with_classifier(
                        Classifier::new("dscp", "Classifier-Dscp", Direction::Bidirectional)
                            .with_parameter(ParameterValue::int("dscp", 46)),
                    )
                    .with_action(Action::allow()),
            )
            .with_rule(
                ResolvedRule::new("unrelated")
                    .with_classifier(Classifier::new(
                        "ether",
                        ETHER_TYPE_CLASSIFIER_ID,
                        Direction::Bidirectional,
                    ))
                    .with_classifier(
                        Classifier::new("tcp-80", L4_CLASSIFIER_ID, Direction::Bidirectional)
                            .with_parameter(ParameterValue::int("proto", 6))
                            .with_parameter(ParameterValue::int("destport", 80)),
                    )
                    .with_action(Action::allow()),
            );
        let ctx = PolicyContext::new(1)
            .with_endpoint(located("10.0.0.1", "tap0"))
            .with_endpoint(located("10.0.0.2", "tap1"))
            .with_rule_group(group.clone())
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &group.key, Participation::Provider);

        assert!(compile(&ctx, "10.0.0.1", AclDirection::Ingress).is_empty());
        logs_assert(|lines: &[&str]| {
            logged_warning(lines, "Rule unknown has no usable classifier")
        });
        logs_assert(|lines: &[&str]| logged_warning(lines, "Rule unrelated skipped"));
    }

    #[traced_test]
    #[test]
    fn test_unresolvable_peers_warn() {
        let group = http_group();
        let ctx = PolicyContext::new(1)
            .with_endpoint(located("10.0.0.1", "tap0"))
            .with_endpoint(AddressEndpoint::new(key("10.0.0.2")))
            .with_rule_group(group.clone())
            .with_policy(key("10.0.0.1"), key("10.0.0.2"), &group.key, Participation::Provider)
            .with_policy(key("10.0.0.1"), key("10.0.0.3"), &group.key, Participation::Provider);

        assert!(compile(&ctx, "10.0.0.1", AclDirection::Ingress).is_empty());
        logs_assert(|lines: &[&str]| {
            logged_warning(lines, "Peer 10.0.0.3@l3-context:l3-ctx missing from context")
        });
        logs_assert(|lines: &[&str]| {
            logged_warning(lines, "Endpoint 10.0.0.2@l3-context:l3-ctx has no location")
        });
    }
}
