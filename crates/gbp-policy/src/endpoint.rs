//! Address endpoints and their physical locations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Forwarding context an endpoint address lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    L3Context,
    L2BridgeDomain,
    L2FloodDomain,
}

impl ContextType {
    /// Returns true for routed (L3) contexts.
    pub const fn is_l3(&self) -> bool {
        matches!(self, Self::L3Context)
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L3Context => write!(f, "l3-context"),
            Self::L2BridgeDomain => write!(f, "l2-bridge-domain"),
            Self::L2FloodDomain => write!(f, "l2-flood-domain"),
        }
    }
}

impl FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "l3-context" => Ok(Self::L3Context),
            "l2-bridge-domain" => Ok(Self::L2BridgeDomain),
            "l2-flood-domain" => Ok(Self::L2FloodDomain),
            _ => Err(format!("Unknown context type: {}", s)),
        }
    }
}

/// Kind of address an endpoint is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    IpPrefix,
    MacAddress,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IpPrefix => write!(f, "ip-prefix"),
            Self::MacAddress => write!(f, "mac-address"),
        }
    }
}

/// Identity of an address endpoint.
///
/// Keys are totally ordered so every collection keyed by them iterates
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressEndpointKey {
    pub address: String,
    pub address_type: AddressType,
    pub context_id: String,
    pub context_type: ContextType,
}

impl AddressEndpointKey {
    pub fn new(
        address: impl Into<String>,
        address_type: AddressType,
        context_id: impl Into<String>,
        context_type: ContextType,
    ) -> Self {
        Self {
            address: address.into(),
            address_type,
            context_id: context_id.into(),
            context_type,
        }
    }

    /// An IP endpoint in an L3 context.
    pub fn l3(address: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self::new(address, AddressType::IpPrefix, context_id, ContextType::L3Context)
    }

    /// A MAC endpoint in a bridge domain.
    pub fn l2(address: impl Into<String>, bridge_domain: impl Into<String>) -> Self {
        Self::new(
            address,
            AddressType::MacAddress,
            bridge_domain,
            ContextType::L2BridgeDomain,
        )
    }
}

impl fmt::Display for AddressEndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.address, self.context_type, self.context_id)
    }
}

/// Physical attachment point of an endpoint.
///
/// `mount_point` names the device; `node_connector` names the interface,
/// either bare (`tap0`) or as a device interface path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AbsoluteLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_connector: Option<String>,
}

impl AbsoluteLocation {
    pub fn new(mount_point: impl Into<String>, node_connector: impl Into<String>) -> Self {
        Self {
            mount_point: Some(mount_point.into()),
            node_connector: Some(node_connector.into()),
        }
    }
}

/// An endpoint registered in the domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEndpoint {
    pub key: AddressEndpointKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<AbsoluteLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_endpoints: Vec<AddressEndpointKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_endpoints: Vec<AddressEndpointKey>,
}

impl AddressEndpoint {
    pub fn new(key: AddressEndpointKey) -> Self {
        Self {
            key,
            location: None,
            parent_endpoints: Vec::new(),
            child_endpoints: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: AbsoluteLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_parent(mut self, parent: AddressEndpointKey) -> Self {
        self.parent_endpoints.push(parent);
        self
    }

    pub fn with_child(mut self, child: AddressEndpointKey) -> Self {
        self.child_endpoints.push(child);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_context_type_parse() {
        assert_eq!("l3-context".parse::<ContextType>().unwrap(), ContextType::L3Context);
        assert_eq!(
            "L2_BRIDGE_DOMAIN".parse::<ContextType>().unwrap(),
            ContextType::L2BridgeDomain
        );
        assert!("l4-context".parse::<ContextType>().is_err());
        assert!(ContextType::L3Context.is_l3());
        assert!(!ContextType::L2FloodDomain.is_l3());
    }

    #[test]
    fn test_key_ordering_is_total() {
        let a = AddressEndpointKey::l3("10.0.0.1/32", "l3-ctx");
        let b = AddressEndpointKey::l3("10.0.0.2/32", "l3-ctx");
        let mac = AddressEndpointKey::l2("aa:bb:cc:dd:ee:ff", "bd-1");
        let mut keys = vec![mac.clone(), b.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, b, mac]);
    }

    #[test]
    fn test_endpoint_serde_defaults() {
        let yaml = r#"
key:
  address: 10.0.0.1/32
  address_type: ip_prefix
  context_id: l3-ctx
  context_type: l3_context
location:
  mount_point: vpp-node-1
  node_connector: tap0
"#;
        let ep: AddressEndpoint = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(ep.key, AddressEndpointKey::l3("10.0.0.1/32", "l3-ctx"));
        assert_eq!(ep.location, Some(AbsoluteLocation::new("vpp-node-1", "tap0")));
        assert!(ep.parent_endpoints.is_empty());
        assert!(ep.child_endpoints.is_empty());
    }
}
