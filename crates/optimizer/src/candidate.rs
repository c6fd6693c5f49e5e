//! Candidates: one formula per decision point, plus a running score.

use crate::decision::{DecisionPoint, Decisions};
use gramforge_formula::{EvalError, EvolutionStrategy, FeatureOracle, Formula, FormulaError, GenContext};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A (possibly partial) assignment of formulas to decision points.
///
/// Equality and ordering are structural: entry count first, then the
/// `(point, formula)` pairs in point order. `score` and `count` do not take
/// part, so a candidate keeps its identity while its score moves.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    formulas: BTreeMap<DecisionPoint, Formula>,
    /// Running mean of observed fitness.
    pub score: f64,
    /// Observations folded into `score`.
    pub count: u32,
}

impl Candidate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_formulas(formulas: BTreeMap<DecisionPoint, Formula>) -> Self {
        Self {
            formulas,
            score: 0.0,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    pub fn get(&self, point: &DecisionPoint) -> Option<&Formula> {
        self.formulas.get(point)
    }

    pub fn formulas(&self) -> impl Iterator<Item = (&DecisionPoint, &Formula)> {
        self.formulas.iter()
    }

    /// Insert or replace the formula for `point`.
    pub fn insert(&mut self, point: DecisionPoint, formula: Formula) -> Result<(), FormulaError> {
        if formula.ty() != point.ty() {
            return Err(FormulaError::TypeMismatch {
                expected: point.ty(),
                actual: formula.ty(),
            });
        }
        // A map insert keeps the old key, and with it the old type.
        self.formulas.remove(&point);
        self.formulas.insert(point, formula);
        Ok(())
    }

    /// Whether every point in `points` has a formula.
    pub fn is_complete(&self, points: &BTreeSet<DecisionPoint>) -> bool {
        points.iter().all(|point| self.formulas.contains_key(point))
    }

    /// Fold one more fitness observation into the running mean.
    pub fn observe(&mut self, fitness: f64) {
        let count = f64::from(self.count);
        self.score = (count * self.score + fitness) / (count + 1.0);
        self.count += 1;
    }

    /// Evolve `round(rate * len)` distinct entries, each drawn uniformly
    /// without replacement, then simplify each evolved formula. Returns the
    /// number of entries evolved; any change resets the running score.
    pub fn evolve(
        &mut self,
        rate: f64,
        strategy: &mut dyn EvolutionStrategy,
        ctx: &mut GenContext<'_>,
    ) -> Result<usize, FormulaError> {
        let len = self.formulas.len();
        let quantity = ((rate.clamp(0.0, 1.0) * len as f64).round() as usize).min(len);
        if quantity == 0 {
            return Ok(0);
        }

        // Partial Fisher-Yates: the first `quantity` slots are the draw.
        let mut order: Vec<usize> = (0..len).collect();
        for i in 0..quantity {
            let j = ctx.rng.usize(i..len);
            order.swap(i, j);
        }
        let chosen: BTreeSet<usize> = order[..quantity].iter().copied().collect();

        for (_, formula) in self
            .formulas
            .iter_mut()
            .enumerate()
            .filter(|(index, _)| chosen.contains(index))
            .map(|(_, entry)| entry)
        {
            formula.evolve(0, strategy, ctx)?;
            formula.simplify();
        }

        self.score = 0.0;
        self.count = 0;
        Ok(quantity)
    }

    /// Generate and simplify a formula for every point not yet present.
    /// Returns the number of entries added.
    pub fn generate_missing(
        &mut self,
        points: &BTreeSet<DecisionPoint>,
        ctx: &mut GenContext<'_>,
    ) -> Result<usize, FormulaError> {
        let mut added = 0;
        for point in points {
            if let Entry::Vacant(slot) = self.formulas.entry(point.clone()) {
                let mut formula = ctx.generate(point.ty())?;
                formula.simplify();
                slot.insert(formula);
                added += 1;
            }
        }
        if added > 0 {
            self.score = 0.0;
            self.count = 0;
        }
        Ok(added)
    }

    /// Drop entries whose point is no longer active or whose active point
    /// now carries a different type. `generate_missing` refills the latter.
    pub fn retain_points(&mut self, points: &BTreeSet<DecisionPoint>) -> usize {
        let before = self.formulas.len();
        self.formulas.retain(|point, formula| match points.get(point) {
            Some(active) => active.ty() == point.ty() && formula.ty() == active.ty(),
            None => false,
        });
        before - self.formulas.len()
    }

    /// Evaluate every formula against the program's features.
    pub fn decide(&self, features: &dyn FeatureOracle) -> Result<Decisions, EvalError> {
        let mut decisions = Decisions::new();
        for (point, formula) in &self.formulas {
            decisions.insert(point.name(), formula.solve(features)?);
        }
        Ok(decisions)
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.formulas
            .len()
            .cmp(&other.formulas.len())
            .then_with(|| self.formulas.iter().cmp(other.formulas.iter()))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "score={:.4} count={}", self.score, self.count)?;
        for (point, formula) in &self.formulas {
            writeln!(f, "  {} = {}", point.name(), formula)?;
        }
        Ok(())
    }
}
