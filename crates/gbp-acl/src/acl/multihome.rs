//! Grouping of endpoints that share one physical interface.
//!
//! Every endpoint attached to an interface contributes its pairwise rules to
//! that interface's ACLs. The grouping is rebuilt once per policy version
//! and published as an immutable snapshot: [`MultiHomeCache::rebuild`]
//! builds outside the lock and swaps the `Arc` under a short write lock, so
//! readers never wait on a rebuild.

use crate::resolver::{resolve_location, Location};
use gbp_policy::{AddressEndpoint, AddressEndpointKey, PolicyContext};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// `(node, interface) -> co-located endpoints` for one policy version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointsByInterface {
    version: Option<u64>,
    groups: BTreeMap<Location, BTreeSet<AddressEndpointKey>>,
    locations: BTreeMap<AddressEndpointKey, Location>,
}

impl EndpointsByInterface {
    pub fn build(ctx: &PolicyContext) -> Self {
        let groups = group_co_located_endpoints(ctx.endpoints());
        let locations = groups
            .iter()
            .flat_map(|(location, keys)| keys.iter().map(move |key| (key.clone(), location.clone())))
            .collect();
        Self {
            version: Some(ctx.version()),
            groups,
            locations,
        }
    }

    /// Policy version this grouping was built from.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Every endpoint on the same interface as `key`, `key` included, when
    /// that interface hosts more than one endpoint.
    pub fn others_on_same_interface(&self, key: &AddressEndpointKey) -> Vec<&AddressEndpointKey> {
        self.locations
            .get(key)
            .and_then(|location| self.groups.get(location))
            .filter(|group| group.len() > 1)
            .map(|group| group.iter().collect())
            .unwrap_or_default()
    }

    /// Interfaces `key` is grouped on.
    pub fn interfaces_for_endpoint(&self, key: &AddressEndpointKey) -> Vec<&Location> {
        self.locations.get(key).into_iter().collect()
    }

    pub fn endpoints_on(&self, location: &Location) -> Option<&BTreeSet<AddressEndpointKey>> {
        self.groups.get(location)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Groups endpoints by identical location; endpoints without a location
/// belong to no group.
pub fn group_co_located_endpoints<'a>(
    endpoints: impl IntoIterator<Item = &'a AddressEndpoint>,
) -> BTreeMap<Location, BTreeSet<AddressEndpointKey>> {
    let mut remaining: Vec<(&AddressEndpointKey, Option<Location>)> = endpoints
        .into_iter()
        .map(|ep| (&ep.key, resolve_location(ep).ok()))
        .collect();

    let mut groups = BTreeMap::new();
    while let Some(reference) = remaining.iter().find_map(|(_, loc)| loc.clone()) {
        let mut group = BTreeSet::new();
        remaining.retain(|(key, loc)| {
            if loc.as_ref() == Some(&reference) {
                group.insert((*key).clone());
                false
            } else {
                true
            }
        });
        groups.insert(reference, group);
    }
    groups
}

/// Single-writer, many-reader holder of the current grouping.
#[derive(Debug, Default)]
pub struct MultiHomeCache {
    current: RwLock<Arc<EndpointsByInterface>>,
}

impl MultiHomeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently published grouping.
    pub fn snapshot(&self) -> Arc<EndpointsByInterface> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publishes the grouping for `ctx`'s version when it is newer than the
    /// published one. A grouping for an older version is returned to the
    /// caller but never published.
    pub fn rebuild(&self, ctx: &PolicyContext) -> Arc<EndpointsByInterface> {
        let current = self.snapshot();
        if current.version() == Some(ctx.version()) {
            debug!("Multi-home grouping for version {} is current", ctx.version());
            return current;
        }

        let rebuilt = Arc::new(EndpointsByInterface::build(ctx));

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.version() {
            Some(published) if published == ctx.version() => return Arc::clone(&guard),
            Some(published) if published > ctx.version() => {
                debug!(
                    "Not publishing multi-home grouping for version {}, {} is current",
                    ctx.version(),
                    published
                );
                return rebuilt;
            }
            _ => {}
        }

        let multi_homed = rebuilt.groups.values().filter(|g| g.len() > 1).count();
        info!(
            "Rebuilt multi-home grouping for version {}: {} interfaces, {} shared",
            ctx.version(),
            rebuilt.len(),
            multi_homed
        );
        *guard = Arc::clone(&rebuilt);
        rebuilt
    }
}
