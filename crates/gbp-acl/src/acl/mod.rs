//! Policy-to-ACL compilation.
//!
//! Turns resolved group-based policy into two ordered ACLs (ingress and
//! egress) per endpoint interface.
//!
//! # Architecture
//!
//! ```text
//! PolicyContext ──> MultiHomeCache (EndpointsByInterface per version)
//!        │                 │
//!        ▼                 ▼
//!   RuleCompiler ─── per peer, per rule group ───┐
//!        │                                       │
//!        │   direction ─> classifier specializer ─> AceBuilder
//!        │                                       │
//!        │            AddressMapper (source, destination)
//!        ▼
//!   AclManager ──> AclWriter (write_acl, bind_acl, write_entries, remove_entries)
//! ```
//!
//! # Key Components
//!
//! - [`RuleCompiler`]: per-endpoint ordered entry list
//! - [`ClassifierKind`]: EtherType, IpProto and L4 classifiers with their
//!   parent chain
//! - [`AceBuilder`]: immutable entry builder
//! - [`AddressMapper`]: source/destination address assignment
//! - [`MultiHomeCache`]: endpoints sharing an interface
//! - [`AclManager`]: full and incremental pushes through an [`AclWriter`]
//!
//! [`AclWriter`]: crate::writer::AclWriter

mod ace;
mod classifier;
mod compiler;
mod direction;
mod manager;
mod mapper;
mod multihome;
mod types;

pub use ace::{AceBuilder, PortBounds, PROTO_ICMP, PROTO_OTHER, PROTO_TCP, PROTO_UDP};
pub use classifier::{merge_parameters, specialize, ClassifierKind, ParamMap, Specialized};
pub use compiler::RuleCompiler;
pub use direction::resolve_classifier_direction;
pub use manager::{AclManager, AclTarget, EndpointAcls, RulePlan, SyncMode};
pub use mapper::{filter_irrelevant_families, is_dhcp_rule, AddressMapper, AddressRole};
pub use multihome::{group_co_located_endpoints, EndpointsByInterface, MultiHomeCache};
pub use types::{
    acl_name, parse_acl_name, Ace, AceIpMatch, AceMatches, Acl, AclAction, AclDirection,
    IcmpRange, ProtocolMatch,
};
