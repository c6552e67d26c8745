//! Network primitives shared by the GBP renderer crates.
//!
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)
//! - [`AddressFamily`]: the IP version of an address or prefix
//! - [`PortRange`]: inclusive L4 port ranges

mod ip;
mod port;

pub use ip::{AddressFamily, IpAddress, IpPrefix};
pub use port::PortRange;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid port range: {0}")]
    InvalidPortRange(String),
}
