//! ACL manager: drives compilation for endpoints and pushes the result
//! through an [`AclWriter`].

use super::compiler::RuleCompiler;
use super::multihome::{EndpointsByInterface, MultiHomeCache};
use super::types::{acl_name, Ace, Acl, AclDirection};
use crate::config::RendererConfig;
use crate::error::{AclError, ResolveError, Result};
use crate::resolver::{resolve_location, Location};
use crate::writer::AclWriter;
use futures::future::join_all;
use gbp_policy::{AddressEndpointKey, PolicyContext, RuleGroupKey};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Both ACLs of one endpoint and where they go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointAcls {
    pub location: Location,
    pub ingress: Acl,
    pub egress: Acl,
}

impl EndpointAcls {
    pub fn acls(&self) -> [&Acl; 2] {
        [&self.ingress, &self.egress]
    }
}

/// How [`AclManager::sync_rules`] applies a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Write,
    Remove,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => write!(f, "write"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// One ACL on one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AclTarget {
    pub node: String,
    pub acl_name: String,
}

impl AclTarget {
    pub fn new(location: &Location, direction: AclDirection) -> Self {
        Self {
            node: location.node.clone(),
            acl_name: acl_name(&location.interface, direction),
        }
    }
}

/// Entries to write to (or remove from) each ACL.
pub type RulePlan = BTreeMap<AclTarget, Vec<Ace>>;

pub struct AclManager<W: AclWriter> {
    writer: Arc<W>,
    config: RendererConfig,
    multihome: MultiHomeCache,
}

impl<W: AclWriter> AclManager<W> {
    pub fn new(writer: Arc<W>, config: RendererConfig) -> Self {
        Self {
            writer,
            config,
            multihome: MultiHomeCache::new(),
        }
    }

    pub fn writer(&self) -> &Arc<W> {
        &self.writer
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Publishes the multi-home grouping for `ctx`. Called once per policy
    /// version; later calls with the same version are no-ops.
    pub fn rebuild_multihome(&self, ctx: &PolicyContext) -> Arc<EndpointsByInterface> {
        self.multihome.rebuild(ctx)
    }

    /// Compiles the ingress and egress ACLs of `key`.
    pub fn resolve_acls(
        &self,
        key: &AddressEndpointKey,
        ctx: &PolicyContext,
    ) -> std::result::Result<EndpointAcls, ResolveError> {
        let endpoint = ctx
            .endpoint(key)
            .ok_or_else(|| ResolveError::unknown_endpoint(key))?;
        let location = resolve_location(endpoint)?;

        let grouping = self.multihome.rebuild(ctx);
        let compiler = RuleCompiler::new(ctx, &grouping, &self.config.acl);

        let ingress = compiler.compile_rules_for_endpoint(key, AclDirection::Ingress)?;
        let egress = compiler.compile_rules_for_endpoint(key, AclDirection::Egress)?;

        Ok(EndpointAcls {
            ingress: Acl::new(&location.interface, AclDirection::Ingress, ingress),
            egress: Acl::new(&location.interface, AclDirection::Egress, egress),
            location,
        })
    }

    /// Recompiles both ACLs of `key` and writes and binds them on its
    /// interface.
    #[instrument(skip(self, ctx), fields(endpoint = %key))]
    pub async fn update_acls_for_endpoint(
        &self,
        key: &AddressEndpointKey,
        ctx: &PolicyContext,
    ) -> Result<()> {
        let acls = match self.resolve_acls(key, ctx) {
            Ok(acls) => acls,
            Err(e) => {
                warn!("Cannot render ACLs: {}", e);
                return Err(e.into());
            }
        };

        if self.config.is_excluded(&acls.location) {
            debug!("Interface {} is excluded from policy", acls.location);
            return Ok(());
        }

        let node = acls.location.node.as_str();
        for acl in acls.acls() {
            if let Err(e) = self.writer.write_acl(node, acl).await {
                error!("Failed to write {}: {}", acl.name, e);
                return Err(e.into());
            }
            if let Err(e) = self
                .writer
                .bind_acl(node, &acls.location.interface, acl)
                .await
            {
                error!("Failed to bind {} to {}: {}", acl.name, acls.location, e);
                return Err(e.into());
            }
        }

        info!(
            "Updated ACLs on {}: {} ingress, {} egress entries",
            acls.location,
            acls.ingress.entries.len(),
            acls.egress.entries.len()
        );
        Ok(())
    }

    /// Updates every peer of `key` concurrently. Returns the peers whose
    /// update failed.
    #[instrument(skip(self, ctx), fields(endpoint = %key))]
    pub async fn update_acls_for_peers(
        &self,
        key: &AddressEndpointKey,
        ctx: &PolicyContext,
    ) -> Vec<(AddressEndpointKey, AclError)> {
        let peers: Vec<&AddressEndpointKey> =
            ctx.policy_table().peers(key).map(|(peer, _)| peer).collect();
        debug!("Updating {} peers", peers.len());

        let results = join_all(peers.into_iter().map(|peer| async move {
            (peer, self.update_acls_for_endpoint(peer, ctx).await)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(peer, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!("Peer {} not updated: {}", peer, e);
                    Some((peer.clone(), e))
                }
            })
            .collect()
    }

    /// Plans the pairwise entries affected by a change.
    ///
    /// An endpoint is affected when it changed itself (all its rule groups
    /// are regenerated) or when one of its rule groups changed (only that
    /// group is regenerated).
    pub fn resolve_rules_to_configure(
        &self,
        ctx: &PolicyContext,
        changed_endpoints: &BTreeSet<AddressEndpointKey>,
        changed_rule_groups: &BTreeSet<RuleGroupKey>,
    ) -> RulePlan {
        let mut affected: BTreeMap<&AddressEndpointKey, BTreeSet<&RuleGroupKey>> = BTreeMap::new();
        for group in changed_rule_groups {
            for endpoint in ctx.endpoints_by_rule_group(group) {
                affected.entry(endpoint).or_default().insert(group);
            }
        }
        for endpoint in changed_endpoints {
            affected
                .entry(endpoint)
                .or_default()
                .extend(ctx.rule_groups_of(endpoint));
        }

        let grouping = self.multihome.rebuild(ctx);
        let compiler = RuleCompiler::new(ctx, &grouping, &self.config.acl);
        let mut plan = RulePlan::new();

        for (local, groups) in affected {
            let Some(local_ep) = ctx.endpoint(local) else {
                debug!("Changed endpoint {} missing from context", local);
                continue;
            };
            let interfaces = grouping.interfaces_for_endpoint(local);
            if interfaces.is_empty() {
                debug!("Endpoint {} is not attached, nothing to plan", local);
                continue;
            }

            for direction in AclDirection::ALL {
                let mut entries = Vec::new();
                for (peer_key, policies) in ctx.policy_table().peers(local) {
                    let Some(peer) = compiler.located_peer(peer_key) else {
                        continue;
                    };
                    for policy in policies
                        .iter()
                        .filter(|p| groups.contains(&p.rule_group.key))
                    {
                        entries.extend(compiler.rules_for_policy(local_ep, peer, policy, direction));
                    }
                }

                for location in &interfaces {
                    if self.config.is_excluded(location) {
                        continue;
                    }
                    plan.entry(AclTarget::new(location, direction))
                        .or_default()
                        .extend(entries.iter().cloned());
                }
            }
        }

        debug!("Planned entries for {} ACLs", plan.len());
        plan
    }

    /// Pushes `plan` to the devices, one task per node.
    ///
    /// Every node is attempted; the first failure is returned after all
    /// nodes finish.
    #[instrument(skip(self, plan), fields(acls = plan.len()))]
    pub async fn sync_rules(&self, plan: &RulePlan, mode: SyncMode) -> Result<()> {
        let mut by_node: BTreeMap<&str, Vec<(&str, &[Ace])>> = BTreeMap::new();
        for (target, entries) in plan {
            if entries.is_empty() {
                continue;
            }
            by_node
                .entry(target.node.as_str())
                .or_default()
                .push((target.acl_name.as_str(), entries.as_slice()));
        }

        let results = join_all(
            by_node
                .into_iter()
                .map(|(node, acls)| self.sync_node(node, acls, mode)),
        )
        .await;

        results.into_iter().find_map(|r| r.err()).map_or(Ok(()), Err)
    }

    async fn sync_node(&self, node: &str, acls: Vec<(&str, &[Ace])>, mode: SyncMode) -> Result<()> {
        for (name, entries) in acls {
            let result = match mode {
                SyncMode::Write => self.writer.write_entries(node, name, entries).await,
                SyncMode::Remove => {
                    let names: Vec<String> = entries.iter().map(|ace| ace.name.clone()).collect();
                    self.writer.remove_entries(node, name, &names).await
                }
            };
            if let Err(e) = result {
                error!("Failed to {} entries of {} on {}: {}", mode, name, node, e);
                return Err(e.into());
            }
            debug!("{} {} entries of {} on {}", mode, entries.len(), name, node);
        }
        Ok(())
    }
}
