//! Evaluation results, rankings and the search report.

use crate::candidate::Candidate;
use crate::knowledge::CandidateRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// How one candidate evaluation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationStatus {
    Measured { cost: f64 },
    Failed { reason: String },
}

/// A candidate together with the fitness observed for it this generation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub candidate: Candidate,
    pub fitness: f64,
    pub status: EvaluationStatus,
}

impl Evaluation {
    pub fn measured(candidate: Candidate, cost: f64, fitness: f64) -> Self {
        Self {
            candidate,
            fitness,
            status: EvaluationStatus::Measured { cost },
        }
    }

    /// A failed evaluation scored with the fallback fitness.
    pub fn failed(candidate: Candidate, reason: impl Into<String>, fallback: f64) -> Self {
        Self {
            candidate,
            fitness: fallback,
            status: EvaluationStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, EvaluationStatus::Failed { .. })
    }

    /// Higher fitness first; equal fitness falls back to candidate order.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .fitness
            .total_cmp(&self.fitness)
            .then_with(|| self.candidate.cmp(&other.candidate))
    }
}

/// Evaluations kept in rank order.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    entries: Vec<Evaluation>,
}

impl Ranking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_evaluations(mut entries: Vec<Evaluation>) -> Self {
        entries.sort_by(Evaluation::rank_cmp);
        Self { entries }
    }

    pub fn insert(&mut self, evaluation: Evaluation) {
        let at = self
            .entries
            .partition_point(|e| e.rank_cmp(&evaluation) != Ordering::Greater);
        self.entries.insert(at, evaluation);
    }

    /// Merge another ranking into this one.
    pub fn extend(&mut self, other: Ranking) {
        self.entries.extend(other.entries);
        self.entries.sort_by(Evaluation::rank_cmp);
    }

    pub fn best(&self) -> Option<&Evaluation> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Evaluation> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Evaluation> {
        self.entries
    }
}

/// One line of the per-generation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: usize,
    pub pool: usize,
    pub failed: usize,
    pub best_fitness: f64,
    pub knowledge_size: usize,
}

/// Serializable summary of a finished search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub baseline_cost: f64,
    /// Fitness the best candidate scored in its latest evaluation.
    pub best_fitness: f64,
    /// Running score the knowledge base holds for the best candidate.
    pub knowledge_score: f64,
    pub best: CandidateRecord,
    pub generations: Vec<GenerationSummary>,
}

impl SearchReport {
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}
