//! Typed decision formulas for gramforge.
//!
//! A [`Formula`] is a small, strongly typed expression tree whose leaves are
//! literals or references to program features. Formulas are generated from a
//! weighted grammar, evaluated against a [`FeatureOracle`], constant-folded,
//! totally ordered (so they can live in ordered sets) and mutated through a
//! pluggable [`EvolutionStrategy`].

pub mod error;
pub mod features;
pub mod formula;
pub mod grammar;
pub mod mutation;
pub mod record;
pub mod value;

pub use error::{EvalError, FormulaError};
pub use features::{FeatureOracle, FeatureRef, FeatureSet};
pub use formula::{ArithOp, BoolOp, Formula, FormulaKind};
pub use grammar::{GenContext, Grammar};
pub use mutation::{EvolutionStrategy, SubtreeMutation};
pub use record::{FormulaRecord, NodeRecord};
pub use value::{Value, ValueType};
