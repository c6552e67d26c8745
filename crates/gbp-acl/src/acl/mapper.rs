//! Source/destination address assignment for a batch of ACEs.
//!
//! | Mapper      | Ingress | Egress |
//! |-------------|---------|--------|
//! | Source      | local   | peer   |
//! | Destination | peer    | local  |

use super::ace::AceBuilder;
use super::types::AclDirection;
use crate::resolver::resolve_l3_address;
use gbp_policy::{AddressEndpoint, AddressType};
use gbp_types::{AddressFamily, IpPrefix};
use tracing::{debug, warn};

/// DHCP (source, destination) port pairs that stay address-wildcarded.
const DHCP_PORT_PAIRS: [(u16, u16); 4] = [(67, 68), (68, 67), (548, 547), (547, 548)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressRole {
    Source,
    Destination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMapper {
    role: AddressRole,
    direction: AclDirection,
}

impl AddressMapper {
    pub const fn source(direction: AclDirection) -> Self {
        Self {
            role: AddressRole::Source,
            direction,
        }
    }

    pub const fn destination(direction: AclDirection) -> Self {
        Self {
            role: AddressRole::Destination,
            direction,
        }
    }

    pub const fn role(&self) -> AddressRole {
        self.role
    }

    /// Whether this mapper takes its address from the local endpoint.
    pub const fn uses_local(&self) -> bool {
        matches!(
            (self.role, self.direction),
            (AddressRole::Source, AclDirection::Ingress)
                | (AddressRole::Destination, AclDirection::Egress)
        )
    }

    /// Writes the mapped endpoint's address into every non-DHCP rule.
    ///
    /// An endpoint without a routable or parseable address leaves the batch
    /// untouched.
    pub fn update_rules(
        &self,
        rules: Vec<AceBuilder>,
        local: &AddressEndpoint,
        peer: &AddressEndpoint,
    ) -> Vec<AceBuilder> {
        let endpoint = if self.uses_local() { local } else { peer };

        let address = match resolve_l3_address(endpoint) {
            Ok(address) => address,
            Err(e) => {
                debug!("{:?} address not assigned: {}", self.role, e);
                return rules;
            }
        };
        let prefix: IpPrefix = match address.parse() {
            Ok(prefix) => prefix,
            Err(e) => {
                warn!(
                    "{:?} address of {} not assigned: {}",
                    self.role, endpoint.key, e
                );
                return rules;
            }
        };

        rules
            .into_iter()
            .map(|rule| {
                if is_dhcp_rule(&rule) {
                    debug!("Rule {} matches DHCP ports, keeping addresses wildcarded", rule.name());
                    return rule;
                }
                match self.role {
                    AddressRole::Source => rule.with_source_prefix(prefix),
                    AddressRole::Destination => rule.with_destination_prefix(prefix),
                }
            })
            .collect()
    }
}

/// True when the rule's port bounds match a DHCP client/server pair in
/// either orientation.
pub fn is_dhcp_rule(rule: &AceBuilder) -> bool {
    let source = rule.source_ports();
    let destination = rule.destination_ports();
    DHCP_PORT_PAIRS
        .iter()
        .any(|&(src, dst)| source.matches_port(src) && destination.matches_port(dst))
}

/// Drops rules whose ether-type cannot apply when both endpoints are IP
/// endpoints of the same family.
pub fn filter_irrelevant_families(
    rules: Vec<AceBuilder>,
    local: &AddressEndpoint,
    peer: &AddressEndpoint,
) -> Vec<AceBuilder> {
    let Some(family) = shared_ip_family(local, peer) else {
        return rules;
    };
    rules
        .into_iter()
        .filter(|rule| {
            let relevant = rule.ether_type() != Some(family.other());
            if !relevant {
                debug!("Rule {} does not apply to {} endpoints", rule.name(), family);
            }
            relevant
        })
        .collect()
}

fn shared_ip_family(local: &AddressEndpoint, peer: &AddressEndpoint) -> Option<AddressFamily> {
    let family_of = |ep: &AddressEndpoint| {
        if ep.key.address_type != AddressType::IpPrefix {
            return None;
        }
        ep.key.address.parse::<IpPrefix>().ok().map(|p| p.family())
    };
    match (family_of(local), family_of(peer)) {
        (Some(a), Some(b)) if a == b => Some(a),
        _ => None,
    }
}
