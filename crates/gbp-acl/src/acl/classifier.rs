//! Classifier kinds and specialization.
//!
//! Classifier definitions form a single chain:
//!
//! ```text
//! Classifier-EtherType  <-  Classifier-IP-Protocol  <-  Classifier-L4
//! ```
//!
//! For one rule and one direction the specializer merges the parameters of
//! every applicable classifier and picks the most specific kind. That kind
//! then populates the ACE match level by level, starting at the root.

use super::ace::{AceBuilder, PortBounds, PROTO_TCP, PROTO_UDP};
use crate::error::ClassifierError;
use gbp_policy::{
    Classifier, Direction, ParamValue, ETHER_TYPE_CLASSIFIER_ID, IP_PROTO_CLASSIFIER_ID,
    L4_CLASSIFIER_ID,
};
use gbp_types::AddressFamily;
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

pub const ETHERTYPE_PARAM: &str = "ethertype";
pub const PROTO_PARAM: &str = "proto";
pub const SRC_PORT_PARAM: &str = "sourceport";
pub const DST_PORT_PARAM: &str = "destport";
pub const SRC_PORT_RANGE_PARAM: &str = "sourceport_range";
pub const DST_PORT_RANGE_PARAM: &str = "destport_range";

pub const ETHERTYPE_IPV4: i64 = 0x0800;
pub const ETHERTYPE_IPV6: i64 = 0x86DD;

/// Merged classifier parameters, keyed by name.
pub type ParamMap = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    EtherType,
    IpProto,
    L4,
}

static KINDS_BY_DEFINITION: Lazy<HashMap<&'static str, ClassifierKind>> = Lazy::new(|| {
    [
        ClassifierKind::EtherType,
        ClassifierKind::IpProto,
        ClassifierKind::L4,
    ]
    .into_iter()
    .map(|kind| (kind.definition_id(), kind))
    .collect()
});

impl ClassifierKind {
    pub fn from_definition_id(id: &str) -> Option<Self> {
        KINDS_BY_DEFINITION.get(id).copied()
    }

    pub const fn definition_id(&self) -> &'static str {
        match self {
            Self::EtherType => ETHER_TYPE_CLASSIFIER_ID,
            Self::IpProto => IP_PROTO_CLASSIFIER_ID,
            Self::L4 => L4_CLASSIFIER_ID,
        }
    }

    /// The kind this one specializes.
    pub const fn parent(&self) -> Option<Self> {
        match self {
            Self::EtherType => None,
            Self::IpProto => Some(Self::EtherType),
            Self::L4 => Some(Self::IpProto),
        }
    }

    /// Root-first chain ending with `self`.
    pub fn lineage(&self) -> Vec<Self> {
        let mut chain = vec![*self];
        let mut current = *self;
        while let Some(parent) = current.parent() {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    fn is_ancestor_of(&self, other: Self) -> bool {
        other.lineage().contains(self) && *self != other
    }

    /// Populates `builder` from `params`, applying every level of the chain
    /// from the root down to `self`.
    pub fn update_match(
        &self,
        params: &ParamMap,
        builder: AceBuilder,
    ) -> Result<AceBuilder, ClassifierError> {
        self.lineage().into_iter().try_fold(builder, |builder, level| {
            level.update_level(params, builder, level == *self)
        })
    }

    fn update_level(
        &self,
        params: &ParamMap,
        builder: AceBuilder,
        selected: bool,
    ) -> Result<AceBuilder, ClassifierError> {
        match self {
            Self::EtherType => match params.get(ETHERTYPE_PARAM) {
                None if selected => Err(ClassifierError::missing(*self, ETHERTYPE_PARAM)),
                None => Ok(builder),
                Some(ParamValue::Int(ETHERTYPE_IPV4)) => {
                    Ok(builder.with_ether_type(AddressFamily::Ipv4))
                }
                Some(ParamValue::Int(ETHERTYPE_IPV6)) => {
                    Ok(builder.with_ether_type(AddressFamily::Ipv6))
                }
                Some(other) => Err(ClassifierError::invalid(
                    ETHERTYPE_PARAM,
                    format!("unsupported ether-type {}", other),
                )),
            },
            Self::IpProto => match params.get(PROTO_PARAM) {
                None if selected => Err(ClassifierError::missing(*self, PROTO_PARAM)),
                None => Ok(builder),
                Some(ParamValue::Int(proto)) => u8::try_from(*proto)
                    .map(|proto| builder.with_protocol(proto))
                    .map_err(|_| {
                        ClassifierError::invalid(PROTO_PARAM, format!("{} is not 0-255", proto))
                    }),
                Some(other) => Err(ClassifierError::invalid(
                    PROTO_PARAM,
                    format!("expected an integer, got {}", other),
                )),
            },
            Self::L4 => {
                let source = port_bounds(params, SRC_PORT_PARAM, SRC_PORT_RANGE_PARAM)?;
                let destination = port_bounds(params, DST_PORT_PARAM, DST_PORT_RANGE_PARAM)?;
                if source.is_empty() && destination.is_empty() {
                    return Ok(builder);
                }
                match builder.protocol() {
                    Some(PROTO_TCP) | Some(PROTO_UDP) => Ok(builder
                        .with_source_ports(source)
                        .with_destination_ports(destination)),
                    proto => Err(ClassifierError::invalid(
                        PROTO_PARAM,
                        format!("L4 ports require TCP or UDP, got {:?}", proto),
                    )),
                }
            }
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.definition_id())
    }
}

impl From<ClassifierKind> for String {
    fn from(kind: ClassifierKind) -> Self {
        kind.to_string()
    }
}

/// Reads a single port or a port range; the two are mutually exclusive.
fn port_bounds(
    params: &ParamMap,
    port_param: &str,
    range_param: &str,
) -> Result<PortBounds, ClassifierError> {
    match (params.get(port_param), params.get(range_param)) {
        (None, None) => Ok(PortBounds::default()),
        (Some(_), Some(_)) => Err(ClassifierError::invalid(
            range_param,
            format!("cannot be combined with {}", port_param),
        )),
        (Some(ParamValue::Int(port)), None) => to_port(port_param, *port).map(PortBounds::exact),
        (None, Some(ParamValue::Range(range))) => {
            let lower = to_port(range_param, range.min)?;
            let upper = to_port(range_param, range.max)?;
            if lower > upper {
                return Err(ClassifierError::invalid(
                    range_param,
                    format!("min ({}) > max ({})", lower, upper),
                ));
            }
            Ok(PortBounds::range(lower, upper))
        }
        (Some(other), None) => Err(ClassifierError::invalid(
            port_param,
            format!("expected an integer, got {}", other),
        )),
        (None, Some(other)) => Err(ClassifierError::invalid(
            range_param,
            format!("expected a range, got {}", other),
        )),
    }
}

/// L4 ports are 1-65535.
fn to_port(param: &str, value: i64) -> Result<u16, ClassifierError> {
    u16::try_from(value)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| ClassifierError::invalid(param, format!("{} is not 1-65535", value)))
}

/// Merges parameters of `classifiers`: first occurrence of a name wins and
/// parameters without a value are ignored.
pub fn merge_parameters<'a>(classifiers: impl IntoIterator<Item = &'a Classifier>) -> ParamMap {
    let mut merged = ParamMap::new();
    for param in classifiers.into_iter().flat_map(|c| c.parameters.iter()) {
        if merged.contains_key(&param.name) {
            continue;
        }
        if let Some(value) = param.value() {
            merged.insert(param.name.clone(), value);
        }
    }
    merged
}

/// Result of specializing a rule's classifiers for one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specialized {
    pub kind: ClassifierKind,
    pub params: ParamMap,
}

impl Specialized {
    pub fn update_match(&self, builder: AceBuilder) -> Result<AceBuilder, ClassifierError> {
        self.kind.update_match(&self.params, builder)
    }
}

/// Selects the most specific classifier applicable in `direction`.
///
/// Returns `None` when nothing applies or the merged parameters are empty.
pub fn specialize(classifiers: &[Classifier], direction: Direction) -> Option<Specialized> {
    let applicable: Vec<&Classifier> = classifiers
        .iter()
        .filter(|c| c.direction == direction || c.direction == Direction::Bidirectional)
        .collect();

    let params = merge_parameters(applicable.iter().copied());
    if params.is_empty() {
        return None;
    }

    let mut feasible: Option<ClassifierKind> = None;
    for classifier in &applicable {
        let Some(kind) = ClassifierKind::from_definition_id(&classifier.definition_id) else {
            debug!(
                "Ignoring classifier {} with unknown definition {}",
                classifier.name, classifier.definition_id
            );
            continue;
        };
        match feasible {
            None => feasible = Some(kind),
            Some(current) if kind.parent() == Some(current) => feasible = Some(kind),
            Some(current) if kind == current || kind.is_ancestor_of(current) => {}
            Some(current) => debug!(
                "Classifier {} ({}) is unrelated to {}, keeping the first candidate",
                classifier.name, kind, current
            ),
        }
    }

    feasible.map(|kind| Specialized { kind, params })
}
