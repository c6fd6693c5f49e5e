//! Mutation policies applied to formula trees.

use crate::error::FormulaError;
use crate::features::FeatureRef;
use crate::formula::Formula;
use crate::grammar::GenContext;
use crate::value::{Value, ValueType};

/// Policy deciding how a formula changes when it is evolved.
///
/// [`Formula::evolve`] hands the strategy the immediate child slots of an
/// interior node, or routes leaves to the scalar hooks. Alternative
/// exploration policies only need to implement this trait.
pub trait EvolutionStrategy {
    /// Mutate one or more of `children`, whose roots sit at `depth`.
    fn evolve_children(
        &mut self,
        children: Vec<&mut Formula>,
        depth: usize,
        ctx: &mut GenContext<'_>,
    ) -> Result<(), FormulaError>;

    /// Mutate a literal value in place.
    fn mutate_value(&mut self, value: &mut Value, ctx: &mut GenContext<'_>);

    /// Point a feature reference of type `ty` somewhere else.
    fn mutate_feature(&mut self, feature: &mut FeatureRef, ty: ValueType, ctx: &mut GenContext<'_>);
}

/// Default policy: pick one child uniformly; with probability
/// `mutation_probability` regenerate it from the grammar, otherwise recurse
/// into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubtreeMutation {
    pub mutation_probability: f64,
}

impl SubtreeMutation {
    pub fn new(mutation_probability: f64) -> Self {
        Self {
            mutation_probability: mutation_probability.clamp(0.0, 1.0),
        }
    }
}

impl Default for SubtreeMutation {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl EvolutionStrategy for SubtreeMutation {
    fn evolve_children(
        &mut self,
        mut children: Vec<&mut Formula>,
        depth: usize,
        ctx: &mut GenContext<'_>,
    ) -> Result<(), FormulaError> {
        if children.is_empty() {
            return Ok(());
        }
        let index = ctx.rng.usize(..children.len());
        let slot = children.swap_remove(index);
        if ctx.rng.f64() < self.mutation_probability {
            *slot = ctx.generate_at(slot.ty(), depth)?;
            Ok(())
        } else {
            slot.evolve(depth, self, ctx)
        }
    }

    fn mutate_value(&mut self, value: &mut Value, ctx: &mut GenContext<'_>) {
        match value {
            Value::Int(current) => {
                let doubled = current.saturating_mul(2);
                *current = ctx.rng.i64(doubled.min(0)..=doubled.max(0));
            }
            Value::Float(current) => {
                *current *= 2.0 * ctx.rng.f64();
            }
            Value::Bool(current) => *current = !*current,
            Value::String(_) => {}
        }
    }

    fn mutate_feature(&mut self, feature: &mut FeatureRef, ty: ValueType, ctx: &mut GenContext<'_>) {
        let count = ctx.features.count(ty);
        if count == 0 {
            return;
        }
        if let Some(choice) = ctx.features.nth(ctx.rng.usize(..count), ty) {
            *feature = choice;
        }
    }
}
