//! Resolved group-based policy model.
//!
//! This crate holds the read-only vocabulary the ACL renderer consumes:
//!
//! - [`AddressEndpoint`]: endpoint identity, location and parent/child links
//! - [`ResolvedRule`], [`Classifier`], [`Action`]: resolved rules of a contract subject
//! - [`RuleGroup`]: ordered rules plus their contract/tenant/subject identity
//! - [`PolicyTable`]: `(local, peer) -> [(rule group, participation)]`
//! - [`PolicyContext`]: versioned snapshot tying the above together
//! - [`PolicySnapshot`]: JSON/YAML document form of a context

mod context;
mod endpoint;
mod error;
mod rule;
mod snapshot;

pub use context::{ForwardingSubnet, PolicyContext, PolicyTable};
pub use endpoint::{AbsoluteLocation, AddressEndpoint, AddressEndpointKey, AddressType, ContextType};
pub use error::{PolicyError, Result};
pub use rule::{
    Action, Classifier, Direction, ParamValue, ParameterValue, Participation, RangeValue,
    RendererResolvedPolicy, ResolvedRule, RuleGroup, RuleGroupKey, ALLOW_ACTION_ID,
    ETHER_TYPE_CLASSIFIER_ID, IP_PROTO_CLASSIFIER_ID, L4_CLASSIFIER_ID,
};
pub use snapshot::{PolicyEntry, PolicySnapshot};
