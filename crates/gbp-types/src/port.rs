//! Inclusive L4 port ranges.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An inclusive L4 port range (`lower..=upper`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRange {
    pub lower: u16,
    pub upper: u16,
}

impl PortRange {
    /// Creates a new range, rejecting `lower > upper`.
    pub fn new(lower: u16, upper: u16) -> Result<Self, ParseError> {
        if lower > upper {
            return Err(ParseError::InvalidPortRange(format!(
                "min ({}) > max ({})",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    /// A range covering exactly one port.
    pub const fn single(port: u16) -> Self {
        Self {
            lower: port,
            upper: port,
        }
    }

    pub const fn contains(&self, port: u16) -> bool {
        self.lower <= port && port <= self.upper
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lower, self.upper)
    }
}

impl FromStr for PortRange {
    type Err = ParseError;

    /// Parses `"1000-2000"` or a single port `"80"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_port = |p: &str| {
            p.trim()
                .parse::<u16>()
                .map_err(|_| ParseError::InvalidPortRange(s.to_string()))
        };

        match s.split_once('-') {
            Some((min, max)) => PortRange::new(parse_port(min)?, parse_port(max)?),
            None => parse_port(s).map(PortRange::single),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_range_validate() {
        assert!(PortRange::new(1000, 2000).is_ok());
        assert!(PortRange::new(80, 80).is_ok());
        assert!(PortRange::new(2000, 1000).is_err());
    }

    #[test]
    fn test_range_contains() {
        let range = PortRange::new(1024, 2048).unwrap();
        assert!(range.contains(1024));
        assert!(range.contains(2048));
        assert!(!range.contains(1023));
        assert!(!range.contains(2049));
    }

    #[test]
    fn test_range_parse() {
        assert_eq!("1000-2000".parse::<PortRange>().unwrap(), PortRange::new(1000, 2000).unwrap());
        assert_eq!("80".parse::<PortRange>().unwrap(), PortRange::single(80));
        assert!("1000".parse::<PortRange>().is_ok());
        assert!("abc-def".parse::<PortRange>().is_err());
        assert!("70000".parse::<PortRange>().is_err());
        assert!("20-10".parse::<PortRange>().is_err());
    }

    #[test]
    fn test_range_display() {
        assert_eq!(PortRange::new(1000, 2000).unwrap().to_string(), "1000-2000");
    }
}
