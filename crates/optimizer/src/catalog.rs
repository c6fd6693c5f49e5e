//! The catalog of known optimizations that seeds the decision points.

use crate::decision::DecisionPoint;
use anyhow::Result;
use gramforge_formula::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A named argument of an optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSlot {
    pub name: String,
    #[serde(rename = "type", with = "type_name")]
    pub ty: ValueType,
}

/// One optimization the compile step knows how to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentSlot>,
}

impl Optimization {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.arguments.push(ArgumentSlot {
            name: name.into(),
            ty,
        });
        self
    }
}

/// Ordered list of optimizations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptimizationCatalog {
    optimizations: Vec<Optimization>,
}

impl OptimizationCatalog {
    pub fn new(optimizations: Vec<Optimization>) -> Self {
        Self { optimizations }
    }

    /// A small mid-level pass catalog.
    pub fn default_passes() -> Self {
        Self::new(vec![
            Optimization::new("sroa"),
            Optimization::new("instcombine"),
            Optimization::new("simplifycfg"),
            Optimization::new("inline").with_argument("threshold", ValueType::Int),
            Optimization::new("gvn"),
            Optimization::new("licm"),
            Optimization::new("loop-rotate"),
            Optimization::new("loop-unroll")
                .with_argument("count", ValueType::Int)
                .with_argument("allow-partial", ValueType::Bool),
            Optimization::new("loop-vectorize").with_argument("width", ValueType::Int),
            Optimization::new("slp-vectorize"),
            Optimization::new("tailcallelim"),
            Optimization::new("dce"),
        ])
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    pub fn optimizations(&self) -> &[Optimization] {
        &self.optimizations
    }

    pub fn get(&self, name: &str) -> Option<&Optimization> {
        self.optimizations.iter().find(|opt| opt.name == name)
    }

    pub fn len(&self) -> usize {
        self.optimizations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.optimizations.is_empty()
    }

    /// One bool point per optimization; with `parameterized`, also one
    /// `~<optimization>.<index>` point per argument, typed as declared.
    pub fn decision_points(&self, parameterized: bool) -> BTreeSet<DecisionPoint> {
        let mut points = BTreeSet::new();
        for optimization in &self.optimizations {
            points.insert(DecisionPoint::flag(&optimization.name));
            if parameterized {
                for (index, argument) in optimization.arguments.iter().enumerate() {
                    points.insert(DecisionPoint::argument(&optimization.name, index, argument.ty));
                }
            }
        }
        points
    }

    /// Reject catalogs the grammar cannot produce formulas for.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for optimization in &self.optimizations {
            if optimization.name.is_empty() {
                return Err("optimization names must not be empty".into());
            }
            if !seen.insert(optimization.name.as_str()) {
                return Err(format!("duplicate optimization: {}", optimization.name));
            }
            for argument in &optimization.arguments {
                if argument.ty == ValueType::String {
                    return Err(format!(
                        "argument {} of {} is a string; only int, float and bool arguments can be searched",
                        argument.name, optimization.name
                    ));
                }
            }
        }
        Ok(())
    }
}

mod type_name {
    use gramforge_formula::ValueType;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ty: &ValueType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(ty.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ValueType, D::Error> {
        let name = String::deserialize(deserializer)?;
        ValueType::from_name(&name)
            .ok_or_else(|| D::Error::custom(format!("unknown argument type: {}", name)))
    }
}
