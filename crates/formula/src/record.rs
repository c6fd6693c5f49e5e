//! Persisted form of a formula.
//!
//! Every record carries its declared `type` and a `kind` tag; the remaining
//! fields depend on the kind:
//!
//! ```json
//! {"type": 0, "kind": "arithmetic", "op": "+",
//!  "lhs": {"type": 0, "kind": "literal", "value": 3},
//!  "rhs": {"type": 0, "kind": "feature", "feature": "opcode", "sub": "load"}}
//! ```

use crate::error::FormulaError;
use crate::features::FeatureRef;
use crate::formula::{ArithOp, BoolOp, Formula};
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaRecord {
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(flatten)]
    pub node: NodeRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeRecord {
    Literal {
        value: Value,
    },
    Arithmetic {
        op: ArithOp,
        lhs: Box<FormulaRecord>,
        rhs: Box<FormulaRecord>,
    },
    Boolean {
        op_type: ValueType,
        op: BoolOp,
        lhs: Box<FormulaRecord>,
        rhs: Box<FormulaRecord>,
    },
    Conditional {
        cond: Box<FormulaRecord>,
        then: Box<FormulaRecord>,
        #[serde(rename = "else")]
        otherwise: Box<FormulaRecord>,
    },
    Feature {
        feature: String,
        #[serde(default)]
        sub: String,
    },
}

impl From<&Formula> for FormulaRecord {
    fn from(formula: &Formula) -> Self {
        let boxed = |child: &Formula| Box::new(FormulaRecord::from(child));
        let node = match formula {
            Formula::Literal(value) => NodeRecord::Literal {
                value: value.clone(),
            },
            Formula::Arithmetic { op, lhs, rhs, .. } => NodeRecord::Arithmetic {
                op: *op,
                lhs: boxed(lhs),
                rhs: boxed(rhs),
            },
            Formula::Boolean {
                op_type,
                op,
                lhs,
                rhs,
            } => NodeRecord::Boolean {
                op_type: *op_type,
                op: *op,
                lhs: boxed(lhs),
                rhs: boxed(rhs),
            },
            Formula::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => NodeRecord::Conditional {
                cond: boxed(cond),
                then: boxed(then),
                otherwise: boxed(otherwise),
            },
            Formula::Feature { feature, .. } => NodeRecord::Feature {
                feature: feature.name.clone(),
                sub: feature.sub.clone(),
            },
        };
        FormulaRecord {
            ty: formula.ty(),
            node,
        }
    }
}

impl TryFrom<FormulaRecord> for Formula {
    type Error = FormulaError;

    /// Rebuild a formula, re-checking every typing rule on the way.
    fn try_from(record: FormulaRecord) -> Result<Self, Self::Error> {
        let declared = record.ty;
        let formula = match record.node {
            NodeRecord::Literal { value } => {
                if value.ty() != declared {
                    return Err(FormulaError::LiteralType {
                        expected: declared,
                        actual: value.ty(),
                    });
                }
                Formula::Literal(value)
            }
            NodeRecord::Arithmetic { op, lhs, rhs } => {
                Formula::arithmetic(op, Formula::try_from(*lhs)?, Formula::try_from(*rhs)?)?
            }
            NodeRecord::Boolean {
                op_type,
                op,
                lhs,
                rhs,
            } => {
                let formula =
                    Formula::boolean(op, Formula::try_from(*lhs)?, Formula::try_from(*rhs)?)?;
                if let Formula::Boolean { op_type: actual, .. } = &formula {
                    if *actual != op_type {
                        return Err(FormulaError::TypeMismatch {
                            expected: op_type,
                            actual: *actual,
                        });
                    }
                }
                formula
            }
            NodeRecord::Conditional {
                cond,
                then,
                otherwise,
            } => Formula::conditional(
                Formula::try_from(*cond)?,
                Formula::try_from(*then)?,
                Formula::try_from(*otherwise)?,
            )?,
            NodeRecord::Feature { feature, sub } => {
                Formula::feature(declared, FeatureRef::new(feature, sub))
            }
        };
        if formula.ty() != declared {
            return Err(FormulaError::TypeMismatch {
                expected: declared,
                actual: formula.ty(),
            });
        }
        Ok(formula)
    }
}

impl Formula {
    pub fn to_record(&self) -> FormulaRecord {
        FormulaRecord::from(self)
    }

    pub fn from_record(record: FormulaRecord) -> Result<Self, FormulaError> {
        Formula::try_from(record)
    }
}
