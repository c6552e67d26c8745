//! Resolved rules, classifiers, actions and rule groups.
//!
//! These are produced by upstream policy resolution and are immutable once
//! loaded; the ACL compiler only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Definition id of the ether-type classifier.
pub const ETHER_TYPE_CLASSIFIER_ID: &str = "Classifier-EtherType";
/// Definition id of the IP protocol classifier.
pub const IP_PROTO_CLASSIFIER_ID: &str = "Classifier-IP-Protocol";
/// Definition id of the L4 port classifier.
pub const L4_CLASSIFIER_ID: &str = "Classifier-L4";
/// Definition id of the only action the ACL renderer honors.
pub const ALLOW_ACTION_ID: &str = "Action-Allow";

/// Traffic direction a classifier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Bidirectional,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
            Self::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            "bidirectional" | "bidi" => Ok(Self::Bidirectional),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// Role an endpoint plays in a rule group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participation {
    Provider,
    Consumer,
}

impl fmt::Display for Participation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider => write!(f, "provider"),
            Self::Consumer => write!(f, "consumer"),
        }
    }
}

impl FromStr for Participation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "provider" => Ok(Self::Provider),
            "consumer" => Ok(Self::Consumer),
            _ => Err(format!("Unknown participation: {}", s)),
        }
    }
}

/// Inclusive integer range carried by a classifier parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeValue {
    pub min: i64,
    pub max: i64,
}

/// The non-null value of a classifier parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Str(String),
    Range(RangeValue),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
            Self::Range(r) => write!(f, "{}-{}", r.min, r.max),
        }
    }
}

/// A named classifier parameter as it arrives from policy resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_value: Option<RangeValue>,
}

impl ParameterValue {
    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            int_value: Some(value),
            string_value: None,
            range_value: None,
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            int_value: None,
            string_value: Some(value.into()),
            range_value: None,
        }
    }

    pub fn range(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            int_value: None,
            string_value: None,
            range_value: Some(RangeValue { min, max }),
        }
    }

    /// Returns the first non-null value (int, then string, then range).
    pub fn value(&self) -> Option<ParamValue> {
        if let Some(v) = self.int_value {
            return Some(ParamValue::Int(v));
        }
        if let Some(v) = &self.string_value {
            return Some(ParamValue::Str(v.clone()));
        }
        self.range_value.map(ParamValue::Range)
    }
}

/// A match-predicate template with a declared traffic direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifier {
    pub name: String,
    pub definition_id: String,
    pub direction: Direction,
    #[serde(default)]
    pub parameters: Vec<ParameterValue>,
}

impl Classifier {
    pub fn new(
        name: impl Into<String>,
        definition_id: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            name: name.into(),
            definition_id: definition_id.into(),
            direction,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterValue) -> Self {
        self.parameters.push(parameter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub definition_id: String,
}

impl Action {
    pub fn new(name: impl Into<String>, definition_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition_id: definition_id.into(),
        }
    }

    pub fn allow() -> Self {
        Self::new("allow", ALLOW_ACTION_ID)
    }

    pub fn is_allow(&self) -> bool {
        self.definition_id == ALLOW_ACTION_ID
    }
}

/// A rule produced by upstream policy resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRule {
    pub name: String,
    #[serde(default)]
    pub classifiers: Vec<Classifier>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl ResolvedRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classifiers: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifiers.push(classifier);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn has_allow_action(&self) -> bool {
        self.actions.iter().any(Action::is_allow)
    }
}

/// Identity of a rule group: the contract subject it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleGroupKey {
    pub contract_id: String,
    pub tenant_id: String,
    pub subject_name: String,
}

impl RuleGroupKey {
    pub fn new(
        contract_id: impl Into<String>,
        tenant_id: impl Into<String>,
        subject_name: impl Into<String>,
    ) -> Self {
        Self {
            contract_id: contract_id.into(),
            tenant_id: tenant_id.into(),
            subject_name: subject_name.into(),
        }
    }
}

impl fmt::Display for RuleGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.contract_id, self.subject_name)
    }
}

/// Ordered rules of one contract subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    #[serde(flatten)]
    pub key: RuleGroupKey,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub rules: Vec<ResolvedRule>,
}

impl RuleGroup {
    pub fn new(key: RuleGroupKey, order: u32) -> Self {
        Self {
            key,
            order,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: ResolvedRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Sort key for rule precedence: lower order first, then key.
    pub fn precedence(&self) -> (u32, &RuleGroupKey) {
        (self.order, &self.key)
    }
}

/// One rule group as seen from a renderer endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererResolvedPolicy {
    pub participation: Participation,
    pub rule_group: Arc<RuleGroup>,
}

impl RendererResolvedPolicy {
    pub fn new(participation: Participation, rule_group: Arc<RuleGroup>) -> Self {
        Self {
            participation,
            rule_group,
        }
    }
}
