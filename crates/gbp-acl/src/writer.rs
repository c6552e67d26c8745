//! Device configuration boundary.
//!
//! The renderer never talks to a device directly. [`AclWriter`] is the seam:
//! a real implementation pushes ACLs to a forwarding node and binds them to
//! interfaces, with create-or-replace semantics. [`InMemoryAclWriter`]
//! records the resulting device state; the daemon's dry-run output and the
//! tests read it back.

use crate::acl::{parse_acl_name, Ace, Acl, AclDirection};
use crate::error::WriterError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[async_trait]
pub trait AclWriter: Send + Sync {
    /// Creates or replaces `acl` on `node`.
    async fn write_acl(&self, node: &str, acl: &Acl) -> Result<(), WriterError>;

    /// Attaches `acl` to `interface` in the ACL's direction.
    async fn bind_acl(&self, node: &str, interface: &str, acl: &Acl) -> Result<(), WriterError>;

    /// Creates or replaces individual entries of an existing ACL.
    async fn write_entries(
        &self,
        node: &str,
        acl_name: &str,
        entries: &[Ace],
    ) -> Result<(), WriterError>;

    /// Removes entries by name.
    async fn remove_entries(
        &self,
        node: &str,
        acl_name: &str,
        entry_names: &[String],
    ) -> Result<(), WriterError>;
}

/// An ACL as stored on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenAcl {
    pub node: String,
    pub acl: Acl,
}

/// An ACL attachment to an interface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AclBinding {
    pub node: String,
    pub interface: String,
    pub direction: AclDirection,
    pub acl_name: String,
}

#[derive(Debug, Default)]
struct DeviceState {
    acls: BTreeMap<(String, String), Acl>,
    bindings: BTreeMap<(String, String, AclDirection), String>,
    failing_nodes: BTreeSet<String>,
    calls: usize,
}

/// Writer that keeps device state in memory.
#[derive(Debug, Default)]
pub struct InMemoryAclWriter {
    state: Mutex<DeviceState>,
}

impl InMemoryAclWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation against `node` fails.
    pub fn with_failing_node(self, node: impl Into<String>) -> Self {
        self.lock().failing_nodes.insert(node.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_node(state: &mut DeviceState, node: &str, operation: &str) -> Result<(), WriterError> {
        state.calls += 1;
        if state.failing_nodes.contains(node) {
            return Err(WriterError::new(node, operation, "node unreachable"));
        }
        Ok(())
    }

    pub fn acl(&self, node: &str, acl_name: &str) -> Option<Acl> {
        self.lock()
            .acls
            .get(&(node.to_string(), acl_name.to_string()))
            .cloned()
    }

    /// All stored ACLs, ordered by node and name.
    pub fn acls(&self) -> Vec<WrittenAcl> {
        self.lock()
            .acls
            .iter()
            .map(|((node, _), acl)| WrittenAcl {
                node: node.clone(),
                acl: acl.clone(),
            })
            .collect()
    }

    pub fn bindings(&self) -> Vec<AclBinding> {
        self.lock()
            .bindings
            .iter()
            .map(|((node, interface, direction), acl_name)| AclBinding {
                node: node.clone(),
                interface: interface.clone(),
                direction: *direction,
                acl_name: acl_name.clone(),
            })
            .collect()
    }

    /// Number of writer calls made, failed ones included.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }
}

#[async_trait]
impl AclWriter for InMemoryAclWriter {
    async fn write_acl(&self, node: &str, acl: &Acl) -> Result<(), WriterError> {
        let mut state = self.lock();
        Self::check_node(&mut state, node, "write_acl")?;
        debug!("{}: write {} ({} entries)", node, acl.name, acl.entries.len());
        state
            .acls
            .insert((node.to_string(), acl.name.clone()), acl.clone());
        Ok(())
    }

    async fn bind_acl(&self, node: &str, interface: &str, acl: &Acl) -> Result<(), WriterError> {
        let mut state = self.lock();
        Self::check_node(&mut state, node, "bind_acl")?;
        if !state.acls.contains_key(&(node.to_string(), acl.name.clone())) {
            return Err(WriterError::new(
                node,
                "bind_acl",
                format!("ACL {} does not exist", acl.name),
            ));
        }
        state.bindings.insert(
            (node.to_string(), interface.to_string(), acl.direction),
            acl.name.clone(),
        );
        Ok(())
    }

    async fn write_entries(
        &self,
        node: &str,
        acl_name: &str,
        entries: &[Ace],
    ) -> Result<(), WriterError> {
        let mut state = self.lock();
        Self::check_node(&mut state, node, "write_entries")?;
        let Some((interface, direction)) = parse_acl_name(acl_name) else {
            return Err(WriterError::new(
                node,
                "write_entries",
                format!("malformed ACL name {}", acl_name),
            ));
        };
        let acl = state
            .acls
            .entry((node.to_string(), acl_name.to_string()))
            .or_insert_with(|| Acl::new(interface, direction, Vec::new()));
        for entry in entries {
            match acl.entries.iter_mut().find(|ace| ace.name == entry.name) {
                Some(existing) => *existing = entry.clone(),
                None => acl.entries.push(entry.clone()),
            }
        }
        Ok(())
    }

    async fn remove_entries(
        &self,
        node: &str,
        acl_name: &str,
        entry_names: &[String],
    ) -> Result<(), WriterError> {
        let mut state = self.lock();
        Self::check_node(&mut state, node, "remove_entries")?;
        if let Some(acl) = state.acls.get_mut(&(node.to_string(), acl_name.to_string())) {
            acl.entries.retain(|ace| !entry_names.contains(&ace.name));
        }
        Ok(())
    }
}
