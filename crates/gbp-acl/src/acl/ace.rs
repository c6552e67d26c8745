//! ACE construction.
//!
//! [`AceBuilder`] is an immutable value: every `with_*` call consumes the
//! builder and returns a new one, and [`AceBuilder::build`] freezes it into
//! an [`Ace`].

use super::types::{Ace, AceIpMatch, AceMatches, AclAction, IcmpRange, ProtocolMatch};
use gbp_types::{AddressFamily, IpPrefix, PortRange};
use tracing::debug;

pub const PROTO_OTHER: u8 = 0;
pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

/// Lower and upper port bound as set by classifiers; either may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortBounds {
    pub lower: Option<u16>,
    pub upper: Option<u16>,
}

impl PortBounds {
    pub const fn exact(port: u16) -> Self {
        Self {
            lower: Some(port),
            upper: Some(port),
        }
    }

    pub const fn range(lower: u16, upper: u16) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// The range to put on the wire; present only when both bounds are.
    pub fn to_range(&self) -> Option<PortRange> {
        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) => PortRange::new(lower, upper).ok(),
            _ => None,
        }
    }

    /// With both bounds, tests inclusion; with one, tests equality.
    pub fn matches_port(&self, port: u16) -> bool {
        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) => lower <= port && port <= upper,
            (Some(bound), None) | (None, Some(bound)) => bound == port,
            (None, None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AceBuilder {
    name: String,
    protocol: Option<u8>,
    ether_type: Option<AddressFamily>,
    source_ports: PortBounds,
    destination_ports: PortBounds,
    ip: Option<AceIpMatch>,
    action: AclAction,
}

impl AceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: None,
            ether_type: None,
            source_ports: PortBounds::default(),
            destination_ports: PortBounds::default(),
            ip: None,
            action: AclAction::Deny,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> Option<u8> {
        self.protocol
    }

    pub fn ether_type(&self) -> Option<AddressFamily> {
        self.ether_type
    }

    pub fn source_ports(&self) -> PortBounds {
        self.source_ports
    }

    pub fn destination_ports(&self) -> PortBounds {
        self.destination_ports
    }

    pub fn ip(&self) -> Option<&AceIpMatch> {
        self.ip.as_ref()
    }

    pub fn action(&self) -> AclAction {
        self.action
    }

    pub fn with_protocol(self, protocol: u8) -> Self {
        Self {
            protocol: Some(protocol),
            ..self
        }
    }

    pub fn with_ether_type(self, family: AddressFamily) -> Self {
        Self {
            ether_type: Some(family),
            ..self
        }
    }

    pub fn with_source_ports(self, ports: PortBounds) -> Self {
        Self {
            source_ports: ports,
            ..self
        }
    }

    pub fn with_destination_ports(self, ports: PortBounds) -> Self {
        Self {
            destination_ports: ports,
            ..self
        }
    }

    /// Sets the source prefix. The IP version follows the prefix; a
    /// destination of the other version is dropped.
    pub fn with_source_prefix(self, prefix: IpPrefix) -> Self {
        let destination = self.kept_prefix(prefix.family(), AceIpMatch::destination);
        Self {
            ip: Some(AceIpMatch::new(prefix.family(), Some(prefix), destination)),
            ..self
        }
    }

    /// Sets the destination prefix. The IP version follows the prefix; a
    /// source of the other version is dropped.
    pub fn with_destination_prefix(self, prefix: IpPrefix) -> Self {
        let source = self.kept_prefix(prefix.family(), AceIpMatch::source);
        Self {
            ip: Some(AceIpMatch::new(prefix.family(), source, Some(prefix))),
            ..self
        }
    }

    pub fn with_action(self, action: AclAction) -> Self {
        Self { action, ..self }
    }

    pub fn permit(self) -> Self {
        self.with_action(AclAction::Permit)
    }

    fn kept_prefix(
        &self,
        family: AddressFamily,
        side: fn(&AceIpMatch) -> Option<&IpPrefix>,
    ) -> Option<IpPrefix> {
        let ip = self.ip.as_ref()?;
        let existing = side(ip).copied();
        if ip.family() != family && existing.is_some() {
            debug!(
                "ACE {}: {} prefix replaces {} match",
                self.name,
                family,
                ip.family()
            );
            return None;
        }
        existing
    }

    /// Freezes the builder into an ACE.
    pub fn build(self) -> Ace {
        let protocol = match self.protocol {
            None | Some(PROTO_OTHER) => ProtocolMatch::Other {
                number: PROTO_OTHER,
            },
            Some(PROTO_ICMP) => ProtocolMatch::Icmp {
                types: IcmpRange::ANY,
                codes: IcmpRange::ANY,
            },
            Some(PROTO_TCP) => ProtocolMatch::Tcp {
                source_ports: self.source_ports.to_range(),
                destination_ports: self.destination_ports.to_range(),
            },
            Some(PROTO_UDP) => ProtocolMatch::Udp {
                source_ports: self.source_ports.to_range(),
                destination_ports: self.destination_ports.to_range(),
            },
            Some(number) => ProtocolMatch::Other { number },
        };

        let ip = self
            .ip
            .or_else(|| self.ether_type.map(|family| AceIpMatch::new(family, None, None)));

        Ace {
            name: self.name,
            matches: AceMatches { ip, protocol },
            action: self.action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefix(s: &str) -> IpPrefix {
        s.parse().unwrap()
    }

    #[test]
    fn test_tcp_keeps_both_ranges() {
        let ace = AceBuilder::new("web")
            .with_protocol(PROTO_TCP)
            .with_source_ports(PortBounds::range(1024, 2048))
            .with_destination_ports(PortBounds::exact(80))
            .permit()
            .build();

        assert_eq!(
            ace.matches.protocol,
            ProtocolMatch::Tcp {
                source_ports: Some(PortRange::new(1024, 2048).unwrap()),
                destination_ports: Some(PortRange::single(80)),
            }
        );
        assert_eq!(ace.action, AclAction::Permit);
    }

    #[test]
    fn test_udp_drops_half_open_range() {
        let ace = AceBuilder::new("dns")
            .with_protocol(PROTO_UDP)
            .with_source_ports(PortBounds {
                lower: Some(53),
                upper: None,
            })
            .with_destination_ports(PortBounds::exact(53))
            .build();

        assert_eq!(
            ace.matches.protocol,
            ProtocolMatch::Udp {
                source_ports: None,
                destination_ports: Some(PortRange::single(53)),
            }
        );
    }

    #[test]
    fn test_icmp_ignores_ports() {
        let ace = AceBuilder::new("ping")
            .with_protocol(PROTO_ICMP)
            .with_source_ports(PortBounds::range(1024, 2048))
            .with_destination_ports(PortBounds::exact(80))
            .build();

        assert_eq!(
            ace.matches.protocol,
            ProtocolMatch::Icmp {
                types: IcmpRange { first: 0, last: 254 },
                codes: IcmpRange { first: 0, last: 254 },
            }
        );
    }

    #[test]
    fn test_unset_and_zero_protocol_is_catch_all() {
        let unset = AceBuilder::new("any").build();
        let zero = AceBuilder::new("any").with_protocol(0).build();
        assert_eq!(unset.matches.protocol, ProtocolMatch::Other { number: 0 });
        assert_eq!(zero.matches.protocol, ProtocolMatch::Other { number: 0 });
        assert_eq!(unset.action, AclAction::Deny);

        let gre = AceBuilder::new("gre").with_protocol(47).build();
        assert_eq!(gre.matches.protocol, ProtocolMatch::Other { number: 47 });
    }

    #[test]
    fn test_prefixes_same_family() {
        let ace = AceBuilder::new("r")
            .with_source_prefix(prefix("10.0.0.1"))
            .with_destination_prefix(prefix("10.0.0.2"))
            .build();
        assert_eq!(
            ace.matches.ip,
            Some(AceIpMatch::Ipv4 {
                source: Some(prefix("10.0.0.1/32")),
                destination: Some(prefix("10.0.0.2/32")),
            })
        );
    }

    #[test]
    fn test_last_family_wins() {
        let ace = AceBuilder::new("r")
            .with_source_prefix(prefix("10.0.0.1"))
            .with_destination_prefix(prefix("2001:db8::2"))
            .build();
        assert_eq!(
            ace.matches.ip,
            Some(AceIpMatch::Ipv6 {
                source: None,
                destination: Some(prefix("2001:db8::2/128")),
            })
        );
    }

    #[test]
    fn test_ether_type_without_addresses() {
        let ace = AceBuilder::new("v6-only")
            .with_ether_type(AddressFamily::Ipv6)
            .build();
        assert_eq!(
            ace.matches.ip,
            Some(AceIpMatch::Ipv6 {
                source: None,
                destination: None,
            })
        );
        assert_eq!(AceBuilder::new("none").build().matches.ip, None);
    }

    #[test]
    fn test_builder_steps_are_pure() {
        let base = AceBuilder::new("r").with_protocol(PROTO_TCP);
        let with_ports = base.clone().with_destination_ports(PortBounds::exact(22));
        assert!(base.destination_ports().is_empty());
        assert_eq!(with_ports.destination_ports(), PortBounds::exact(22));
    }

    #[test]
    fn test_port_bounds_matching() {
        assert!(PortBounds::range(60, 70).matches_port(67));
        assert!(!PortBounds::range(60, 66).matches_port(67));
        assert!(PortBounds { lower: Some(67), upper: None }.matches_port(67));
        assert!(PortBounds { lower: None, upper: Some(68) }.matches_port(68));
        assert!(!PortBounds::default().matches_port(67));
    }
}
