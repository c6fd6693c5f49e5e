//! Decision points and their evaluated values.

use gramforge_formula::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Prefix marking an argument decision: `~<optimization>.<index>`.
pub const ARGUMENT_PREFIX: char = '~';

/// One tunable choice in the search space.
///
/// Identity and ordering use the name only; the type rides along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPoint {
    name: String,
    #[serde(rename = "type")]
    ty: ValueType,
}

impl DecisionPoint {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// "Should `optimization` run?"
    pub fn flag(optimization: &str) -> Self {
        Self::new(optimization, ValueType::Bool)
    }

    /// Argument slot `index` of `optimization`.
    pub fn argument(optimization: &str, index: usize, ty: ValueType) -> Self {
        Self::new(argument_name(optimization, index), ty)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }

    pub fn is_argument(&self) -> bool {
        self.name.starts_with(ARGUMENT_PREFIX)
    }
}

pub fn argument_name(optimization: &str, index: usize) -> String {
    format!("{}{}.{}", ARGUMENT_PREFIX, optimization, index)
}

impl PartialEq for DecisionPoint {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DecisionPoint {}

impl Ord for DecisionPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl PartialOrd for DecisionPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for DecisionPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for DecisionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// Evaluated decisions for one program: decision name to value.
///
/// Serialized as a plain JSON object, which is what external compile steps
/// receive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decisions(BTreeMap<String, Value>);

impl Decisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether `optimization` was switched on. Missing means off.
    pub fn is_enabled(&self, optimization: &str) -> bool {
        matches!(self.0.get(optimization), Some(Value::Bool(true)))
    }

    pub fn argument(&self, optimization: &str, index: usize) -> Option<&Value> {
        self.0.get(&argument_name(optimization, index))
    }

    /// Names of the optimizations switched on, in name order.
    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(name, value)| {
                !name.starts_with(ARGUMENT_PREFIX) && matches!(value, Value::Bool(true))
            })
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_identity_is_the_name() {
        let a = DecisionPoint::new("inline", ValueType::Bool);
        let b = DecisionPoint::new("inline", ValueType::Int);
        assert_eq!(a, b);
        let set: BTreeSet<_> = [a, b, DecisionPoint::flag("gvn")].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap().name(), "gvn");
    }

    #[test]
    fn test_argument_naming() {
        let point = DecisionPoint::argument("loop-unroll", 1, ValueType::Int);
        assert_eq!(point.name(), "~loop-unroll.1");
        assert!(point.is_argument());
        assert!(!DecisionPoint::flag("loop-unroll").is_argument());
    }

    #[test]
    fn test_decisions_helpers() {
        let mut decisions = Decisions::new();
        decisions.insert("inline", Value::Bool(true));
        decisions.insert("licm", Value::Bool(false));
        decisions.insert("~inline.0", Value::Int(225));
        assert!(decisions.is_enabled("inline"));
        assert!(!decisions.is_enabled("licm"));
        assert!(!decisions.is_enabled("gvn"));
        assert_eq!(decisions.argument("inline", 0), Some(&Value::Int(225)));
        assert_eq!(decisions.enabled().collect::<Vec<_>>(), vec!["inline"]);

        let json = serde_json::to_value(&decisions).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"inline": true, "licm": false, "~inline.0": 225})
        );
    }
}
