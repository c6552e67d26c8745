//! ACL and ACE data types handed to the device writer.

use gbp_types::{AddressFamily, IpPrefix, PortRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ACL direction relative to the bound interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AclDirection {
    /// Packets entering the switch from the interface.
    #[default]
    Ingress,
    /// Packets leaving the switch toward the interface.
    Egress,
}

impl AclDirection {
    pub const ALL: [AclDirection; 2] = [AclDirection::Ingress, AclDirection::Egress];
}

impl fmt::Display for AclDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "INGRESS"),
            Self::Egress => write!(f, "EGRESS"),
        }
    }
}

impl FromStr for AclDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INGRESS" => Ok(Self::Ingress),
            "EGRESS" => Ok(Self::Egress),
            _ => Err(format!("Unknown ACL direction: {}", s)),
        }
    }
}

/// Packet action of an ACE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAction {
    Permit,
    #[default]
    Deny,
}

impl fmt::Display for AclAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permit => write!(f, "permit"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Inclusive ICMP type or code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IcmpRange {
    pub first: u8,
    pub last: u8,
}

impl IcmpRange {
    /// Matches every ICMP type or code.
    pub const ANY: IcmpRange = IcmpRange { first: 0, last: 254 };
}

/// IP-version specific address match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum AceIpMatch {
    Ipv4 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<IpPrefix>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<IpPrefix>,
    },
    Ipv6 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<IpPrefix>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<IpPrefix>,
    },
}

impl AceIpMatch {
    pub fn new(
        family: AddressFamily,
        source: Option<IpPrefix>,
        destination: Option<IpPrefix>,
    ) -> Self {
        match family {
            AddressFamily::Ipv4 => Self::Ipv4 {
                source,
                destination,
            },
            AddressFamily::Ipv6 => Self::Ipv6 {
                source,
                destination,
            },
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Self::Ipv4 { .. } => AddressFamily::Ipv4,
            Self::Ipv6 { .. } => AddressFamily::Ipv6,
        }
    }

    pub fn source(&self) -> Option<&IpPrefix> {
        match self {
            Self::Ipv4 { source, .. } | Self::Ipv6 { source, .. } => source.as_ref(),
        }
    }

    pub fn destination(&self) -> Option<&IpPrefix> {
        match self {
            Self::Ipv4 { destination, .. } | Self::Ipv6 { destination, .. } => {
                destination.as_ref()
            }
        }
    }
}

/// Protocol-specific part of an ACE match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ProtocolMatch {
    /// Any protocol number without L4 fields; 0 acts as a catch-all.
    Other { number: u8 },
    Icmp {
        types: IcmpRange,
        codes: IcmpRange,
    },
    Tcp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_ports: Option<PortRange>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination_ports: Option<PortRange>,
    },
    Udp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_ports: Option<PortRange>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination_ports: Option<PortRange>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AceMatches {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<AceIpMatch>,
    pub protocol: ProtocolMatch,
}

/// A frozen access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ace {
    pub name: String,
    pub matches: AceMatches,
    pub action: AclAction,
}

impl Ace {
    pub fn source(&self) -> Option<&IpPrefix> {
        self.matches.ip.as_ref().and_then(AceIpMatch::source)
    }

    pub fn destination(&self) -> Option<&IpPrefix> {
        self.matches.ip.as_ref().and_then(AceIpMatch::destination)
    }
}

/// Ordered ACEs bound to one interface in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub name: String,
    pub direction: AclDirection,
    pub entries: Vec<Ace>,
}

impl Acl {
    pub fn new(interface: &str, direction: AclDirection, entries: Vec<Ace>) -> Self {
        Self {
            name: acl_name(interface, direction),
            direction,
            entries,
        }
    }

    pub fn entry(&self, name: &str) -> Option<&Ace> {
        self.entries.iter().find(|ace| ace.name == name)
    }
}

/// `<interface><INGRESS|EGRESS>`.
pub fn acl_name(interface: &str, direction: AclDirection) -> String {
    format!("{}{}", interface, direction)
}

/// Splits an ACL name back into interface and direction.
pub fn parse_acl_name(name: &str) -> Option<(&str, AclDirection)> {
    AclDirection::ALL.into_iter().find_map(|direction| {
        name.strip_suffix(direction.to_string().as_str())
            .map(|interface| (interface, direction))
    })
}
