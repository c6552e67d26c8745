//! Address and location resolution for endpoints.

use crate::error::ResolveError;
use gbp_policy::AddressEndpoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical attachment point: device node plus interface name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub node: String,
    pub interface: String,
}

impl Location {
    pub fn new(node: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            interface: interface.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.interface)
    }
}

/// Returns the routable address of an endpoint.
///
/// An endpoint in an L3 context supplies its own address; otherwise the
/// first parent in an L3 context does.
pub fn resolve_l3_address(endpoint: &AddressEndpoint) -> Result<&str, ResolveError> {
    if endpoint.key.context_type.is_l3() {
        return Ok(&endpoint.key.address);
    }
    endpoint
        .parent_endpoints
        .iter()
        .find(|parent| parent.context_type.is_l3())
        .map(|parent| parent.address.as_str())
        .ok_or_else(|| ResolveError::no_routable_address(&endpoint.key))
}

/// Returns where an endpoint is attached. Both the mount point and the
/// interface reference must be present.
pub fn resolve_location(endpoint: &AddressEndpoint) -> Result<Location, ResolveError> {
    let location = endpoint
        .location
        .as_ref()
        .ok_or_else(|| ResolveError::no_location(&endpoint.key))?;

    match (&location.mount_point, &location.node_connector) {
        (Some(mount_point), Some(connector)) => {
            let node = leaf_key(mount_point);
            let interface = leaf_key(connector);
            if node.is_empty() || interface.is_empty() {
                return Err(ResolveError::no_location(&endpoint.key));
            }
            Ok(Location::new(node, interface))
        }
        _ => Err(ResolveError::no_location(&endpoint.key)),
    }
}

/// Extracts the key value of the last list entry in an instance path.
///
/// `/ietf-interfaces:interfaces/ietf-interfaces:interface[ietf-interfaces:name='tap0']`
/// yields `tap0`; a bare name is returned trimmed.
pub fn leaf_key(path: &str) -> &str {
    let path = path.trim();
    let Some(open) = path.rfind('[') else {
        return path;
    };
    let selector = path[open + 1..].trim_end_matches(']');
    match selector.split_once('=') {
        Some((_, value)) => value.trim().trim_matches(|c: char| c == '\'' || c == '"'),
        None => selector.trim(),
    }
}
