//! Weighted random generation of formulas.

use crate::error::FormulaError;
use crate::features::FeatureOracle;
use crate::formula::{ArithOp, BoolOp, Formula, FormulaKind};
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};

const NUMERIC_KINDS: [FormulaKind; 4] = [
    FormulaKind::Literal,
    FormulaKind::Arithmetic,
    FormulaKind::Conditional,
    FormulaKind::Feature,
];

const BOOL_KINDS: [FormulaKind; 3] = [
    FormulaKind::Literal,
    FormulaKind::Boolean,
    FormulaKind::Conditional,
];

/// Shape limits for generated trees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Grammar {
    /// Nodes at this depth (root = 0) are always leaves.
    pub max_depth: usize,
    /// Int literals are drawn from `0..=int_literal_max`.
    pub int_literal_max: i64,
    /// Float literals are drawn from `[0, float_literal_max)`.
    pub float_literal_max: f64,
}

impl Default for Grammar {
    fn default() -> Self {
        Self {
            max_depth: 6,
            int_literal_max: 64,
            float_literal_max: 64.0,
        }
    }
}

/// Everything generation and mutation need: the grammar, the features of
/// the program under search and a random stream.
pub struct GenContext<'a> {
    pub grammar: &'a Grammar,
    pub features: &'a dyn FeatureOracle,
    pub rng: &'a mut fastrand::Rng,
}

impl<'a> GenContext<'a> {
    pub fn new(
        grammar: &'a Grammar,
        features: &'a dyn FeatureOracle,
        rng: &'a mut fastrand::Rng,
    ) -> Self {
        Self {
            grammar,
            features,
            rng,
        }
    }

    /// Generate a tree of type `ty` rooted at depth 0.
    pub fn generate(&mut self, ty: ValueType) -> Result<Formula, FormulaError> {
        self.generate_at(ty, 0)
    }

    /// Generate a tree of type `ty` whose root sits at `depth`.
    pub fn generate_at(&mut self, ty: ValueType, depth: usize) -> Result<Formula, FormulaError> {
        let kind = self.pick_kind(ty, depth)?;
        let child = depth + 1;
        match kind {
            FormulaKind::Literal => Ok(Formula::Literal(self.random_literal(ty)?)),
            FormulaKind::Arithmetic => {
                let op = ArithOp::ALL[self.rng.usize(..ArithOp::ALL.len())];
                let lhs = self.generate_at(ty, child)?;
                let rhs = self.generate_at(ty, child)?;
                Formula::arithmetic(op, lhs, rhs)
            }
            FormulaKind::Boolean => {
                let op_type = if self.rng.bool() {
                    ValueType::Bool
                } else {
                    ValueType::Int
                };
                let ops = BoolOp::for_operand(op_type);
                let op = ops[self.rng.usize(..ops.len())];
                let lhs = self.generate_at(op_type, child)?;
                let rhs = self.generate_at(op_type, child)?;
                Formula::boolean(op, lhs, rhs)
            }
            FormulaKind::Conditional => {
                let cond = self.generate_at(ValueType::Bool, child)?;
                let then = self.generate_at(ty, child)?;
                let otherwise = self.generate_at(ty, child)?;
                Formula::conditional(cond, then, otherwise)
            }
            FormulaKind::Feature => {
                let count = self.features.count(ty);
                let index = self.rng.usize(..count);
                let feature = self
                    .features
                    .nth(index, ty)
                    .ok_or(FormulaError::UnsupportedGeneration(ty))?;
                Ok(Formula::feature(ty, feature))
            }
        }
    }

    /// A uniformly drawn literal of type `ty`.
    pub fn random_literal(&mut self, ty: ValueType) -> Result<Value, FormulaError> {
        match ty {
            ValueType::Int => Ok(Value::Int(self.rng.i64(0..=self.grammar.int_literal_max.max(0)))),
            ValueType::Float => Ok(Value::Float(self.rng.f64() * self.grammar.float_literal_max)),
            ValueType::Bool => Ok(Value::Bool(self.rng.bool())),
            ValueType::String => Err(FormulaError::UnsupportedGeneration(ty)),
        }
    }

    /// Roulette-wheel choice among the kinds allowed for `ty` at `depth`:
    /// draw in `[1, total]` and take the first kind whose cumulative weight
    /// reaches the draw.
    fn pick_kind(&mut self, ty: ValueType, depth: usize) -> Result<FormulaKind, FormulaError> {
        let kinds: &[FormulaKind] = match ty {
            ValueType::Int | ValueType::Float => &NUMERIC_KINDS,
            ValueType::Bool => &BOOL_KINDS,
            ValueType::String => return Err(FormulaError::UnsupportedGeneration(ty)),
        };
        let leaves_only = depth >= self.grammar.max_depth;
        let has_features = self.features.count(ty) > 0;
        let allowed = |kind: &&FormulaKind| {
            (!leaves_only || kind.is_leaf()) && (**kind != FormulaKind::Feature || has_features)
        };

        let total: u32 = kinds.iter().filter(allowed).map(|kind| kind.weight()).sum();
        let draw = self.rng.u32(1..=total);
        let mut cumulative = 0;
        for kind in kinds.iter().filter(allowed) {
            cumulative += kind.weight();
            if cumulative >= draw {
                return Ok(*kind);
            }
        }
        Ok(FormulaKind::Literal)
    }
}
