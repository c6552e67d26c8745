//! Error types for ACL rendering.
//!
//! Per-rule and per-peer problems never surface from the compiler as
//! errors; they are logged and skipped. The types here cover what callers
//! can act on: endpoints that cannot be resolved, classifier parameters
//! that cannot populate a match, device writes that fail, and bad
//! configuration.

use gbp_policy::AddressEndpointKey;
use thiserror::Error;

/// Result type alias for renderer operations.
pub type Result<T> = std::result::Result<T, AclError>;

/// An endpoint could not be turned into an address or attachment point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Endpoint {endpoint} has no routable L3 address")]
    NoRoutableAddress { endpoint: String },

    #[error("Endpoint {endpoint} has no location")]
    NoLocation { endpoint: String },

    #[error("Endpoint {endpoint} not found in policy context")]
    UnknownEndpoint { endpoint: String },
}

impl ResolveError {
    pub fn no_routable_address(key: &AddressEndpointKey) -> Self {
        Self::NoRoutableAddress {
            endpoint: key.to_string(),
        }
    }

    pub fn no_location(key: &AddressEndpointKey) -> Self {
        Self::NoLocation {
            endpoint: key.to_string(),
        }
    }

    pub fn unknown_endpoint(key: &AddressEndpointKey) -> Self {
        Self::UnknownEndpoint {
            endpoint: key.to_string(),
        }
    }
}

/// Classifier parameters could not populate the ACE match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    #[error("Missing required parameter '{parameter}' for {classifier}")]
    MissingParameter {
        classifier: String,
        parameter: String,
    },

    #[error("Invalid value for parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },
}

impl ClassifierError {
    pub fn missing(classifier: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::MissingParameter {
            classifier: classifier.into(),
            parameter: parameter.into(),
        }
    }

    pub fn invalid(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

/// A device write or bind reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Device operation {operation} failed on {node}: {message}")]
pub struct WriterError {
    pub node: String,
    pub operation: String,
    pub message: String,
}

impl WriterError {
    pub fn new(
        node: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AclError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration {path}: {message}")]
    ConfigLoad { path: String, message: String },
}

impl AclError {
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn config_load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if a later policy or topology change may make the
    /// same operation succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AclError::Writer(_)
                | AclError::Resolve(ResolveError::NoLocation { .. })
                | AclError::Resolve(ResolveError::UnknownEndpoint { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_display() {
        let key = AddressEndpointKey::l3("10.0.0.1", "l3-ctx");
        let err = ResolveError::no_location(&key);
        assert_eq!(
            err.to_string(),
            "Endpoint 10.0.0.1@l3-context:l3-ctx has no location"
        );

        let err = WriterError::new("vpp-1", "write_acl", "connection refused");
        assert_eq!(
            err.to_string(),
            "Device operation write_acl failed on vpp-1: connection refused"
        );
    }

    #[test]
    fn test_is_retryable() {
        let key = AddressEndpointKey::l3("10.0.0.1", "l3-ctx");
        assert!(AclError::from(ResolveError::no_location(&key)).is_retryable());
        assert!(AclError::from(WriterError::new("n", "bind_acl", "timeout")).is_retryable());
        assert!(!AclError::from(ResolveError::no_routable_address(&key)).is_retryable());
        assert!(!AclError::invalid_config("excluded_interfaces", "empty node").is_retryable());
    }
}
