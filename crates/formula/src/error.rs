//! Error types for formula construction and evaluation.

use crate::features::FeatureRef;
use crate::formula::{ArithOp, BoolOp};
use crate::value::ValueType;
use thiserror::Error;

/// Violations of the formula grammar.
///
/// These are construction-time contract errors: a correctly seeded search
/// never produces them, but records read from disk or hand-built trees can.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("arithmetic operands must be numeric and share a type, got {lhs} and {rhs}")]
    ArithmeticOperands { lhs: ValueType, rhs: ValueType },
    #[error("boolean operands must share a type, got {lhs} and {rhs}")]
    BooleanOperands { lhs: ValueType, rhs: ValueType },
    #[error("operator {op} is not defined for {op_type} operands")]
    InvalidOperator { op: BoolOp, op_type: ValueType },
    #[error("operator {op} is not defined for {ty} operands")]
    InvalidArithmetic { op: ArithOp, ty: ValueType },
    #[error("conditional requires a bool condition, got {0}")]
    NonBoolCondition(ValueType),
    #[error("conditional branches disagree: {then} vs {otherwise}")]
    BranchMismatch { then: ValueType, otherwise: ValueType },
    #[error("literal of type {actual} where {expected} was declared")]
    LiteralType { expected: ValueType, actual: ValueType },
    #[error("formula generation is not supported for {0} values")]
    UnsupportedGeneration(ValueType),
    #[error("expected a formula of type {expected}, got {actual}")]
    TypeMismatch { expected: ValueType, actual: ValueType },
}

/// Failures while solving a formula against a feature oracle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown feature {0}")]
    UnknownFeature(FeatureRef),
    #[error("feature {feature} has type {actual}, expected {expected}")]
    FeatureTypeMismatch {
        feature: FeatureRef,
        expected: ValueType,
        actual: ValueType,
    },
    #[error("integer division by zero")]
    DivisionByZero,
    #[error("integer overflow in {0}")]
    Overflow(ArithOp),
    #[error("operator {op} cannot combine {lhs} and {rhs}")]
    TypeMismatch {
        op: String,
        lhs: ValueType,
        rhs: ValueType,
    },
}
