//! Search configuration.

use anyhow::{Context, Result};
use gramforge_formula::{Grammar, SubtreeMutation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables of a grammar-evolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Elite pool size per generation.
    pub candidates_number: usize,
    pub generations: usize,
    /// Probability that an elite clone is evolved before evaluation.
    pub evolve_probability: f64,
    /// Probability of regenerating a subtree instead of recursing into it.
    pub mutation_probability: f64,
    /// Fraction of a candidate's entries evolved at once.
    pub max_evolution_rate: f64,
    pub max_formula_depth: usize,
    pub int_literal_max: i64,
    pub float_literal_max: f64,
    /// Also search the arguments of each optimization.
    pub parameterized: bool,
    pub knowledge_base: Option<PathBuf>,
    pub seed: Option<u64>,
    pub oracle_timeout_ms: u64,
    /// Fitness assigned to failed, degenerate and timed-out evaluations.
    pub fallback_fitness: f64,
    /// Costs at or below this are treated as degenerate.
    pub min_cost: f64,
    /// Evaluation threads; all cores when unset.
    pub workers: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let grammar = Grammar::default();
        Self {
            candidates_number: 8,
            generations: 10,
            evolve_probability: 0.8,
            mutation_probability: 0.3,
            max_evolution_rate: 0.5,
            max_formula_depth: grammar.max_depth,
            int_literal_max: grammar.int_literal_max,
            float_literal_max: grammar.float_literal_max,
            parameterized: false,
            knowledge_base: None,
            seed: None,
            oracle_timeout_ms: 60_000,
            fallback_fitness: 0.0,
            min_cost: 1e-9,
            workers: None,
        }
    }
}

impl SearchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading search config {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("parsing search config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.candidates_number == 0 {
            return Err("candidates_number must be > 0".into());
        }
        if self.generations == 0 {
            return Err("generations must be > 0".into());
        }
        for (name, p) in [
            ("evolve_probability", self.evolve_probability),
            ("mutation_probability", self.mutation_probability),
            ("max_evolution_rate", self.max_evolution_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("{} must be in [0, 1], got {}", name, p));
            }
        }
        if self.int_literal_max < 0 {
            return Err("int_literal_max must be >= 0".into());
        }
        if !self.float_literal_max.is_finite() || self.float_literal_max < 0.0 {
            return Err("float_literal_max must be finite and >= 0".into());
        }
        if self.oracle_timeout_ms == 0 {
            return Err("oracle_timeout_ms must be > 0".into());
        }
        if !self.fallback_fitness.is_finite() {
            return Err("fallback_fitness must be finite".into());
        }
        if !self.min_cost.is_finite() || self.min_cost < 0.0 {
            return Err("min_cost must be finite and >= 0".into());
        }
        if self.workers == Some(0) {
            return Err("workers must be > 0 when set".into());
        }
        Ok(())
    }

    pub fn grammar(&self) -> Grammar {
        Grammar {
            max_depth: self.max_formula_depth,
            int_literal_max: self.int_literal_max,
            float_literal_max: self.float_literal_max,
        }
    }

    pub fn strategy(&self) -> SubtreeMutation {
        SubtreeMutation::new(self.mutation_probability)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}
