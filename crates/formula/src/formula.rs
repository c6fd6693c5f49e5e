//! The formula tree: construction, evaluation, folding and ordering.

use crate::error::{EvalError, FormulaError};
use crate::features::{FeatureOracle, FeatureRef};
use crate::grammar::GenContext;
use crate::mutation::EvolutionStrategy;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Node kinds, in their fixed ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormulaKind {
    Literal,
    Arithmetic,
    Boolean,
    Conditional,
    Feature,
}

impl FormulaKind {
    /// Relative weight in the generation roulette.
    pub const fn weight(self) -> u32 {
        match self {
            FormulaKind::Literal => 4,
            FormulaKind::Arithmetic => 2,
            FormulaKind::Boolean => 2,
            FormulaKind::Conditional => 1,
            FormulaKind::Feature => 3,
        }
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, FormulaKind::Literal | FormulaKind::Feature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

impl ArithOp {
    pub const ALL: [ArithOp; 4] = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div];

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    /// Integer arithmetic is checked; float arithmetic follows IEEE-754.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => {
                let result = match self {
                    ArithOp::Add => a.checked_add(*b),
                    ArithOp::Sub => a.checked_sub(*b),
                    ArithOp::Mul => a.checked_mul(*b),
                    ArithOp::Div => {
                        if *b == 0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        a.checked_div(*b)
                    }
                };
                result.map(Value::Int).ok_or(EvalError::Overflow(self))
            }
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(match self {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            })),
            _ => Err(EvalError::TypeMismatch {
                op: self.symbol().to_string(),
                lhs: lhs.ty(),
                rhs: rhs.ty(),
            }),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
}

impl BoolOp {
    const LOGICAL: [BoolOp; 4] = [BoolOp::Eq, BoolOp::Ne, BoolOp::And, BoolOp::Or];
    const RELATIONAL: [BoolOp; 6] = [
        BoolOp::Lt,
        BoolOp::Gt,
        BoolOp::Le,
        BoolOp::Ge,
        BoolOp::Eq,
        BoolOp::Ne,
    ];

    /// Operators defined for operands of type `op_type`.
    pub fn for_operand(op_type: ValueType) -> &'static [BoolOp] {
        match op_type {
            ValueType::Bool => &Self::LOGICAL,
            ValueType::Int | ValueType::Float | ValueType::String => &Self::RELATIONAL,
        }
    }

    pub fn is_defined_for(self, op_type: ValueType) -> bool {
        Self::for_operand(op_type).contains(&self)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BoolOp::Eq => "==",
            BoolOp::Ne => "!=",
            BoolOp::And => "&&",
            BoolOp::Or => "||",
            BoolOp::Lt => "<",
            BoolOp::Gt => ">",
            BoolOp::Le => "<=",
            BoolOp::Ge => ">=",
        }
    }

    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
        let mismatch = || EvalError::TypeMismatch {
            op: self.symbol().to_string(),
            lhs: lhs.ty(),
            rhs: rhs.ty(),
        };
        if lhs.ty() != rhs.ty() || !self.is_defined_for(lhs.ty()) {
            return Err(mismatch());
        }
        let result = match (self, lhs, rhs) {
            (BoolOp::And, Value::Bool(a), Value::Bool(b)) => *a && *b,
            (BoolOp::Or, Value::Bool(a), Value::Bool(b)) => *a || *b,
            (BoolOp::Eq, Value::Bool(a), Value::Bool(b)) => a == b,
            (BoolOp::Ne, Value::Bool(a), Value::Bool(b)) => a != b,
            (op, Value::Int(a), Value::Int(b)) => op.relate(a.partial_cmp(b)),
            (op, Value::Float(a), Value::Float(b)) => op.relate(a.partial_cmp(b)),
            (op, Value::String(a), Value::String(b)) => op.relate(a.partial_cmp(b)),
            _ => return Err(mismatch()),
        };
        Ok(Value::Bool(result))
    }

    // Unordered (NaN) comparisons are false except for `!=`.
    fn relate(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (BoolOp::Ne, None) => true,
            (_, None) => false,
            (BoolOp::Lt, Some(o)) => o == Ordering::Less,
            (BoolOp::Gt, Some(o)) => o == Ordering::Greater,
            (BoolOp::Le, Some(o)) => o != Ordering::Greater,
            (BoolOp::Ge, Some(o)) => o != Ordering::Less,
            (BoolOp::Eq, Some(o)) => o == Ordering::Equal,
            (BoolOp::Ne, Some(o)) => o != Ordering::Equal,
            (BoolOp::And | BoolOp::Or, Some(_)) => false,
        }
    }
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A typed expression tree. Every node owns its children.
#[derive(Debug, Clone)]
pub enum Formula {
    Literal(Value),
    Arithmetic {
        ty: ValueType,
        op: ArithOp,
        lhs: Box<Formula>,
        rhs: Box<Formula>,
    },
    /// Always of type bool; `op_type` is the type of both operands.
    Boolean {
        op_type: ValueType,
        op: BoolOp,
        lhs: Box<Formula>,
        rhs: Box<Formula>,
    },
    Conditional {
        ty: ValueType,
        cond: Box<Formula>,
        then: Box<Formula>,
        otherwise: Box<Formula>,
    },
    Feature {
        ty: ValueType,
        feature: FeatureRef,
    },
}

impl Formula {
    pub fn literal(value: impl Into<Value>) -> Self {
        Formula::Literal(value.into())
    }

    pub fn arithmetic(op: ArithOp, lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        let (l, r) = (lhs.ty(), rhs.ty());
        if l != r || !l.is_numeric() {
            return Err(FormulaError::ArithmeticOperands { lhs: l, rhs: r });
        }
        Ok(Formula::Arithmetic {
            ty: l,
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn boolean(op: BoolOp, lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        let (l, r) = (lhs.ty(), rhs.ty());
        if l != r {
            return Err(FormulaError::BooleanOperands { lhs: l, rhs: r });
        }
        if !op.is_defined_for(l) {
            return Err(FormulaError::InvalidOperator { op, op_type: l });
        }
        Ok(Formula::Boolean {
            op_type: l,
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn conditional(cond: Formula, then: Formula, otherwise: Formula) -> Result<Self, FormulaError> {
        if cond.ty() != ValueType::Bool {
            return Err(FormulaError::NonBoolCondition(cond.ty()));
        }
        if then.ty() != otherwise.ty() {
            return Err(FormulaError::BranchMismatch {
                then: then.ty(),
                otherwise: otherwise.ty(),
            });
        }
        Ok(Formula::Conditional {
            ty: then.ty(),
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn feature(ty: ValueType, feature: FeatureRef) -> Self {
        Formula::Feature { ty, feature }
    }

    /// Generate a fresh tree of type `ty` from the grammar.
    pub fn generate(ty: ValueType, ctx: &mut GenContext<'_>) -> Result<Self, FormulaError> {
        ctx.generate(ty)
    }

    /// Declared type of the value this node produces.
    pub fn ty(&self) -> ValueType {
        match self {
            Formula::Literal(value) => value.ty(),
            Formula::Arithmetic { ty, .. } => *ty,
            Formula::Boolean { .. } => ValueType::Bool,
            Formula::Conditional { ty, .. } => *ty,
            Formula::Feature { ty, .. } => *ty,
        }
    }

    pub fn kind(&self) -> FormulaKind {
        match self {
            Formula::Literal(_) => FormulaKind::Literal,
            Formula::Arithmetic { .. } => FormulaKind::Arithmetic,
            Formula::Boolean { .. } => FormulaKind::Boolean,
            Formula::Conditional { .. } => FormulaKind::Conditional,
            Formula::Feature { .. } => FormulaKind::Feature,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Formula::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Formula::Literal(_))
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(|child| child.size()).sum::<usize>()
    }

    /// Longest root-to-leaf path, counting edges.
    pub fn depth(&self) -> usize {
        self.children()
            .iter()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn children(&self) -> Vec<&Formula> {
        match self {
            Formula::Literal(_) | Formula::Feature { .. } => Vec::new(),
            Formula::Arithmetic { lhs, rhs, .. } | Formula::Boolean { lhs, rhs, .. } => {
                vec![lhs.as_ref(), rhs.as_ref()]
            }
            Formula::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => vec![cond.as_ref(), then.as_ref(), otherwise.as_ref()],
        }
    }

    /// Mutable slots of the immediate children, in declaration order.
    pub fn children_mut(&mut self) -> Vec<&mut Formula> {
        match self {
            Formula::Literal(_) | Formula::Feature { .. } => Vec::new(),
            Formula::Arithmetic { lhs, rhs, .. } | Formula::Boolean { lhs, rhs, .. } => {
                vec![lhs.as_mut(), rhs.as_mut()]
            }
            Formula::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => vec![cond.as_mut(), then.as_mut(), otherwise.as_mut()],
        }
    }

    /// Evaluate bottom-up against `features`.
    pub fn solve(&self, features: &dyn FeatureOracle) -> Result<Value, EvalError> {
        match self {
            Formula::Literal(value) => Ok(value.clone()),
            Formula::Arithmetic { op, lhs, rhs, .. } => {
                op.apply(&lhs.solve(features)?, &rhs.solve(features)?)
            }
            Formula::Boolean { op, lhs, rhs, .. } => {
                op.apply(&lhs.solve(features)?, &rhs.solve(features)?)
            }
            Formula::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => match cond.solve(features)? {
                Value::Bool(true) => then.solve(features),
                Value::Bool(false) => otherwise.solve(features),
                other => Err(EvalError::TypeMismatch {
                    op: "if".into(),
                    lhs: other.ty(),
                    rhs: ValueType::Bool,
                }),
            },
            Formula::Feature { ty, feature } => features.lookup(feature, *ty),
        }
    }

    /// Constant-fold this tree in place. Returns true if anything changed.
    ///
    /// Children are simplified first. A binary node whose operands are both
    /// literals becomes a literal, unless evaluation fails (integer division
    /// by zero, overflow) or yields a non-finite float, in which case it is
    /// kept. A conditional with a literal condition is replaced by the chosen
    /// branch after that branch is simplified; the discarded branch is not
    /// touched.
    pub fn simplify(&mut self) -> bool {
        match self {
            Formula::Literal(_) | Formula::Feature { .. } => false,
            Formula::Arithmetic { op, lhs, rhs, .. } => {
                let changed = lhs.simplify() | rhs.simplify();
                match fold(lhs, rhs, |l, r| op.apply(l, r)) {
                    Some(value) => {
                        *self = Formula::Literal(value);
                        true
                    }
                    None => changed,
                }
            }
            Formula::Boolean { op, lhs, rhs, .. } => {
                let changed = lhs.simplify() | rhs.simplify();
                match fold(lhs, rhs, |l, r| op.apply(l, r)) {
                    Some(value) => {
                        *self = Formula::Literal(value);
                        true
                    }
                    None => changed,
                }
            }
            Formula::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => {
                let changed = cond.simplify();
                let selected = match cond.as_literal() {
                    Some(Value::Bool(true)) => Some(take(then)),
                    Some(Value::Bool(false)) => Some(take(otherwise)),
                    _ => None,
                };
                match selected {
                    Some(mut branch) => {
                        branch.simplify();
                        *self = branch;
                        true
                    }
                    None => {
                        let branches = then.simplify() | otherwise.simplify();
                        changed || branches
                    }
                }
            }
        }
    }

    /// Hand the immediate child slots to `strategy`; leaves go through the
    /// strategy's scalar hooks instead. `depth` is this node's depth.
    pub fn evolve(
        &mut self,
        depth: usize,
        strategy: &mut dyn EvolutionStrategy,
        ctx: &mut GenContext<'_>,
    ) -> Result<(), FormulaError> {
        match self {
            Formula::Literal(value) => {
                strategy.mutate_value(value, ctx);
                Ok(())
            }
            Formula::Feature { ty, feature } => {
                strategy.mutate_feature(feature, *ty, ctx);
                Ok(())
            }
            _ => {
                let children = self.children_mut();
                strategy.evolve_children(children, depth + 1, ctx)
            }
        }
    }

    fn payload_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Formula::Literal(a), Formula::Literal(b)) => a.cmp(b),
            (
                Formula::Arithmetic {
                    op: op_a,
                    lhs: lhs_a,
                    rhs: rhs_a,
                    ..
                },
                Formula::Arithmetic {
                    op: op_b,
                    lhs: lhs_b,
                    rhs: rhs_b,
                    ..
                },
            ) => lhs_a
                .cmp(lhs_b)
                .then_with(|| rhs_a.cmp(rhs_b))
                .then_with(|| op_a.cmp(op_b)),
            (
                Formula::Boolean {
                    op_type: type_a,
                    op: op_a,
                    lhs: lhs_a,
                    rhs: rhs_a,
                },
                Formula::Boolean {
                    op_type: type_b,
                    op: op_b,
                    lhs: lhs_b,
                    rhs: rhs_b,
                },
            ) => type_a
                .cmp(type_b)
                .then_with(|| lhs_a.cmp(lhs_b))
                .then_with(|| rhs_a.cmp(rhs_b))
                .then_with(|| op_a.cmp(op_b)),
            (
                Formula::Conditional {
                    cond: cond_a,
                    then: then_a,
                    otherwise: else_a,
                    ..
                },
                Formula::Conditional {
                    cond: cond_b,
                    then: then_b,
                    otherwise: else_b,
                    ..
                },
            ) => cond_a
                .cmp(cond_b)
                .then_with(|| then_a.cmp(then_b))
                .then_with(|| else_a.cmp(else_b)),
            (Formula::Feature { feature: a, .. }, Formula::Feature { feature: b, .. }) => a.cmp(b),
            // Kinds differ; `cmp` has already ordered them.
            _ => Ordering::Equal,
        }
    }
}

fn fold<F>(lhs: &Formula, rhs: &Formula, apply: F) -> Option<Value>
where
    F: FnOnce(&Value, &Value) -> Result<Value, EvalError>,
{
    let (l, r) = (lhs.as_literal()?, rhs.as_literal()?);
    match apply(l, r).ok()? {
        Value::Float(v) if !v.is_finite() => None,
        value => Some(value),
    }
}

fn take(slot: &mut Formula) -> Formula {
    std::mem::replace(slot, Formula::Literal(Value::Bool(false)))
}

impl Ord for Formula {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind()
            .cmp(&other.kind())
            .then_with(|| self.ty().cmp(&other.ty()))
            .then_with(|| self.payload_cmp(other))
    }
}

impl PartialOrd for Formula {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Formula {}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Literal(value) => write!(f, "{}", value),
            Formula::Arithmetic { op, lhs, rhs, .. } => write!(f, "({} {} {})", lhs, op, rhs),
            Formula::Boolean { op, lhs, rhs, .. } => write!(f, "({} {} {})", lhs, op, rhs),
            Formula::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => write!(f, "(if {} then {} else {})", cond, then, otherwise),
            Formula::Feature { feature, .. } => write!(f, "${}", feature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;

    fn int(v: i64) -> Formula {
        Formula::literal(v)
    }

    fn add(lhs: Formula, rhs: Formula) -> Formula {
        Formula::arithmetic(ArithOp::Add, lhs, rhs).unwrap()
    }

    #[test]
    fn test_fold_addition_and_multiplication() {
        let mut sum = add(int(3), int(4));
        assert!(sum.simplify());
        assert_eq!(sum, int(7));

        let mut product = Formula::arithmetic(ArithOp::Mul, int(3), int(4)).unwrap();
        product.simplify();
        assert_eq!(product, int(12));
    }

    #[test]
    fn test_fold_nested() {
        // (1 + 2) * (10 - 4) => 18
        let lhs = add(int(1), int(2));
        let rhs = Formula::arithmetic(ArithOp::Sub, int(10), int(4)).unwrap();
        let mut formula = Formula::arithmetic(ArithOp::Mul, lhs, rhs).unwrap();
        formula.simplify();
        assert_eq!(formula, int(18));
    }

    #[test]
    fn test_conditional_selects_simplified_branch() {
        let else_branch = Formula::feature(ValueType::Int, FeatureRef::simple("never_looked_at"));
        let mut formula =
            Formula::conditional(Formula::literal(true), add(int(1), int(1)), else_branch).unwrap();
        formula.simplify();
        assert_eq!(formula, int(2));

        let mut formula = Formula::conditional(
            Formula::boolean(BoolOp::Lt, int(5), int(2)).unwrap(),
            int(1),
            Formula::feature(ValueType::Int, FeatureRef::simple("loops")),
        )
        .unwrap();
        formula.simplify();
        assert_eq!(
            formula,
            Formula::feature(ValueType::Int, FeatureRef::simple("loops"))
        );
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        let mut formula = Formula::arithmetic(ArithOp::Div, int(3), int(0)).unwrap();
        assert!(!formula.simplify());
        assert_eq!(formula.kind(), FormulaKind::Arithmetic);
        assert_eq!(
            formula.solve(&FeatureSet::new()),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_float_division_by_zero_follows_ieee_but_never_folds() {
        let mut formula =
            Formula::arithmetic(ArithOp::Div, Formula::literal(1.0), Formula::literal(0.0)).unwrap();
        assert_eq!(
            formula.solve(&FeatureSet::new()).unwrap(),
            Value::Float(f64::INFINITY)
        );
        formula.simplify();
        assert_eq!(formula.kind(), FormulaKind::Arithmetic);
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let formula = Formula::arithmetic(ArithOp::Mul, int(i64::MAX), int(2)).unwrap();
        assert_eq!(
            formula.solve(&FeatureSet::new()),
            Err(EvalError::Overflow(ArithOp::Mul))
        );
    }

    #[test]
    fn test_solve_with_features() {
        let features = FeatureSet::new()
            .with("inst_count", "", 400i64)
            .with("opcode", "call", 3i64);
        let calls = Formula::feature(ValueType::Int, FeatureRef::new("opcode", "call"));
        let size = Formula::feature(ValueType::Int, FeatureRef::simple("inst_count"));
        let formula = Formula::boolean(
            BoolOp::Gt,
            Formula::arithmetic(ArithOp::Mul, calls, int(100)).unwrap(),
            size,
        )
        .unwrap();
        assert_eq!(formula.solve(&features).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_missing_feature_propagates() {
        let formula = Formula::feature(ValueType::Int, FeatureRef::simple("absent"));
        assert!(matches!(
            formula.solve(&FeatureSet::new()),
            Err(EvalError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            Formula::arithmetic(ArithOp::Add, Formula::literal(true), Formula::literal(false)),
            Err(FormulaError::ArithmeticOperands { .. })
        ));
        assert!(matches!(
            Formula::boolean(BoolOp::And, int(1), int(2)),
            Err(FormulaError::InvalidOperator { .. })
        ));
        assert!(matches!(
            Formula::boolean(BoolOp::Lt, Formula::literal(true), Formula::literal(false)),
            Err(FormulaError::InvalidOperator { .. })
        ));
        assert!(matches!(
            Formula::conditional(int(1), int(2), int(3)),
            Err(FormulaError::NonBoolCondition(ValueType::Int))
        ));
        assert!(matches!(
            Formula::conditional(Formula::literal(true), int(2), Formula::literal(2.0)),
            Err(FormulaError::BranchMismatch { .. })
        ));
    }

    #[test]
    fn test_ordering_kind_then_type_then_payload() {
        let literal = int(100);
        let sum = add(int(0), int(0));
        assert!(literal < sum);
        assert!(int(5) < Formula::literal(0.5));
        assert!(add(int(1), int(9)) < add(int(2), int(0)));
        let sub = Formula::arithmetic(ArithOp::Sub, int(1), int(9)).unwrap();
        assert!(add(int(1), int(9)) < sub);
        assert_eq!(add(int(1), int(2)), add(int(1), int(2)));
    }

    #[test]
    fn test_boolean_keeps_operand_type() {
        let formula = Formula::boolean(BoolOp::Le, Formula::literal(1.0), Formula::literal(2.0)).unwrap();
        assert_eq!(formula.ty(), ValueType::Bool);
        match formula {
            Formula::Boolean { op_type, .. } => assert_eq!(op_type, ValueType::Float),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_display() {
        let formula = Formula::conditional(
            Formula::feature(ValueType::Bool, FeatureRef::simple("has_loops")),
            add(Formula::feature(ValueType::Int, FeatureRef::new("opcode", "br")), int(2)),
            int(0),
        )
        .unwrap();
        assert_eq!(
            formula.to_string(),
            "(if $has_loops then ($opcode[br] + 2) else 0)"
        );
    }
}
