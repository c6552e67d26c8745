//! GBP ACL renderer.
//!
//! Compiles resolved group-based policy into per-interface ingress and
//! egress ACLs for a VPP forwarding node, and pushes them through a device
//! writer.
//!
//! # Modules
//!
//! - [`acl`]: direction calculation, classifier specialization, ACE
//!   construction, rule compilation and the ACL manager
//! - [`resolver`]: endpoint address and location resolution
//! - [`writer`]: device configuration boundary
//! - [`config`]: renderer configuration
//! - [`error`]: error types

pub mod acl;
pub mod config;
pub mod error;
pub mod resolver;
pub mod writer;

pub use acl::{
    Ace, AceBuilder, Acl, AclAction, AclDirection, AclManager, AclTarget, EndpointAcls,
    RuleCompiler, RulePlan, SyncMode,
};
pub use config::{AclPolicyConfig, ExcludedInterface, RendererConfig};
pub use error::{AclError, ClassifierError, ResolveError, Result, WriterError};
pub use resolver::{resolve_l3_address, resolve_location, Location};
pub use writer::{AclBinding, AclWriter, InMemoryAclWriter, WrittenAcl};
