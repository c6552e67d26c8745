//! Renderer configuration.
//!
//! Loaded from a YAML file; every field has a default so an absent file or
//! a partial file is valid.
//!
//! ```yaml
//! acl:
//!   deny_tenant_subnets: true
//!   allow_external: true
//! excluded_interfaces:
//!   - node: vpp-1
//!     interface: loop0
//! ```

use crate::error::{AclError, Result};
use crate::resolver::Location;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Default ACE policy appended after pairwise rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclPolicyConfig {
    /// Emit a Deny entry per tenant-owned forwarding subnet.
    #[serde(default = "default_true")]
    pub deny_tenant_subnets: bool,

    /// Emit a Permit entry for a parent endpoint outside the managed domain.
    #[serde(default = "default_true")]
    pub allow_external: bool,
}

/// An interface that never receives policy ACLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedInterface {
    pub node: String,
    pub interface: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default)]
    pub acl: AclPolicyConfig,

    #[serde(default)]
    pub excluded_interfaces: Vec<ExcludedInterface>,
}

fn default_true() -> bool {
    true
}

impl Default for AclPolicyConfig {
    fn default() -> Self {
        Self {
            deny_tenant_subnets: default_true(),
            allow_external: default_true(),
        }
    }
}

impl RendererConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| AclError::config_load("<inline>", e.to_string()))
    }

    /// Load configuration from file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => serde_yaml::from_str(&content)
                .map_err(|e| AclError::config_load(path.display().to_string(), e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(AclError::config_load(
                path.display().to_string(),
                e.to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (idx, excluded) in self.excluded_interfaces.iter().enumerate() {
            if excluded.node.trim().is_empty() {
                return Err(AclError::invalid_config(
                    format!("excluded_interfaces[{}].node", idx),
                    "must not be empty",
                ));
            }
            if excluded.interface.trim().is_empty() {
                return Err(AclError::invalid_config(
                    format!("excluded_interfaces[{}].interface", idx),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }

    /// Returns true if ACLs must not be rendered on `location`.
    pub fn is_excluded(&self, location: &Location) -> bool {
        self.excluded_interfaces
            .iter()
            .any(|ex| ex.node == location.node && ex.interface == location.interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert!(config.acl.deny_tenant_subnets);
        assert!(config.acl.allow_external);
        assert!(config.excluded_interfaces.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = RendererConfig::from_yaml("acl:\n  allow_external: false\n").unwrap();
        assert!(config.acl.deny_tenant_subnets);
        assert!(!config.acl.allow_external);
    }

    #[test]
    fn test_excluded_interfaces() {
        let yaml = r#"
excluded_interfaces:
  - node: vpp-1
    interface: loop0
"#;
        let config = RendererConfig::from_yaml(yaml).unwrap();
        assert!(config.is_excluded(&Location::new("vpp-1", "loop0")));
        assert!(!config.is_excluded(&Location::new("vpp-2", "loop0")));
        assert!(!config.is_excluded(&Location::new("vpp-1", "tap0")));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut config = RendererConfig::default();
        config.excluded_interfaces.push(ExcludedInterface {
            node: "vpp-1".to_string(),
            interface: " ".to_string(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("excluded_interfaces[0].interface"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "acl:\n  deny_tenant_subnets: false").unwrap();

        let config = RendererConfig::load_or_default(file.path()).unwrap();
        assert!(!config.acl.deny_tenant_subnets);
        assert!(config.acl.allow_external);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = RendererConfig::load_or_default("/nonexistent/aclrenderd.yaml").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "acl: [not, a, mapping]").unwrap();
        assert!(matches!(
            RendererConfig::load_or_default(file.path()),
            Err(AclError::ConfigLoad { .. })
        ));
    }
}
