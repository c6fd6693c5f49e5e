//! Program features consumed by feature-reference formulas.

use crate::error::EvalError;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Name of a feature, plus the sub-feature for composite features.
///
/// `sub` is empty when the feature is not composite.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureRef {
    pub name: String,
    #[serde(default)]
    pub sub: String,
}

impl FeatureRef {
    pub fn new(name: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sub: sub.into(),
        }
    }

    pub fn simple(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }
}

impl fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.sub)
        }
    }
}

/// Read-only access to the features measured for one program.
pub trait FeatureOracle: Send + Sync {
    /// Look up a feature, failing if it is absent or not of type `ty`.
    fn lookup(&self, feature: &FeatureRef, ty: ValueType) -> Result<Value, EvalError>;

    /// Number of known features of type `ty`.
    fn count(&self, ty: ValueType) -> usize;

    /// The `index`-th feature of type `ty`, in a stable order.
    fn nth(&self, index: usize, ty: ValueType) -> Option<FeatureRef>;
}

/// In-memory feature table.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    values: BTreeMap<FeatureRef, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeatureEntry {
    name: String,
    #[serde(default)]
    sub: String,
    value: Value,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: FeatureRef, value: Value) -> Option<Value> {
        self.values.insert(feature, value)
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, sub: &str, value: impl Into<Value>) -> Self {
        self.insert(FeatureRef::new(name, sub), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FeatureRef, &Value)> {
        self.values.iter()
    }

    /// Parse a JSON array of `{"name", "sub", "value"}` entries.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<FeatureEntry> = serde_json::from_str(json)?;
        Ok(entries
            .into_iter()
            .map(|entry| (FeatureRef::new(entry.name, entry.sub), entry.value))
            .collect())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let entries: Vec<FeatureEntry> = self
            .values
            .iter()
            .map(|(feature, value)| FeatureEntry {
                name: feature.name.clone(),
                sub: feature.sub.clone(),
                value: value.clone(),
            })
            .collect();
        serde_json::to_string_pretty(&entries)
    }

    /// Load a feature table written by an extraction run.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    fn of_type(&self, ty: ValueType) -> impl Iterator<Item = &FeatureRef> {
        self.values
            .iter()
            .filter(move |(_, value)| value.ty() == ty)
            .map(|(feature, _)| feature)
    }
}

impl FromIterator<(FeatureRef, Value)> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = (FeatureRef, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl FeatureOracle for FeatureSet {
    fn lookup(&self, feature: &FeatureRef, ty: ValueType) -> Result<Value, EvalError> {
        let value = self
            .values
            .get(feature)
            .ok_or_else(|| EvalError::UnknownFeature(feature.clone()))?;
        if value.ty() != ty {
            return Err(EvalError::FeatureTypeMismatch {
                feature: feature.clone(),
                expected: ty,
                actual: value.ty(),
            });
        }
        Ok(value.clone())
    }

    fn count(&self, ty: ValueType) -> usize {
        self.of_type(ty).count()
    }

    fn nth(&self, index: usize, ty: ValueType) -> Option<FeatureRef> {
        self.of_type(ty).nth(index).cloned()
    }
}
