//! The knowledge base: every scored candidate seen so far.

use crate::candidate::Candidate;
use crate::decision::DecisionPoint;
use anyhow::{Context, Result};
use gramforge_formula::{Formula, FormulaError, FormulaRecord, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Persisted form of one formula entry of a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    pub formula: FormulaRecord,
}

/// Persisted form of a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub score: f64,
    pub count: u32,
    pub formulas: Vec<EntryRecord>,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("decision {0} appears more than once")]
    DuplicateDecision(String),
    #[error("decision {name}: {source}")]
    Formula {
        name: String,
        #[source]
        source: FormulaError,
    },
}

impl From<&Candidate> for CandidateRecord {
    fn from(candidate: &Candidate) -> Self {
        Self {
            score: candidate.score,
            count: candidate.count,
            formulas: candidate
                .formulas()
                .map(|(point, formula)| EntryRecord {
                    name: point.name().to_string(),
                    ty: point.ty(),
                    formula: formula.to_record(),
                })
                .collect(),
        }
    }
}

impl TryFrom<CandidateRecord> for Candidate {
    type Error = RecordError;

    fn try_from(record: CandidateRecord) -> Result<Self, Self::Error> {
        let mut formulas = BTreeMap::new();
        for entry in record.formulas {
            let name = entry.name;
            let point = DecisionPoint::new(name.clone(), entry.ty);
            let formula = Formula::from_record(entry.formula).map_err(|source| RecordError::Formula {
                name: name.clone(),
                source,
            })?;
            if formula.ty() != point.ty() {
                return Err(RecordError::Formula {
                    name,
                    source: FormulaError::TypeMismatch {
                        expected: point.ty(),
                        actual: formula.ty(),
                    },
                });
            }
            if formulas.insert(point, formula).is_some() {
                return Err(RecordError::DuplicateDecision(name));
            }
        }
        let mut candidate = Candidate::with_formulas(formulas);
        candidate.score = record.score;
        candidate.count = record.count;
        Ok(candidate)
    }
}

/// Deduplicated set of scored candidates, ordered structurally.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    candidates: BTreeSet<Candidate>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn has(&self, candidate: &Candidate) -> bool {
        self.candidates.contains(candidate)
    }

    /// The stored copy of a structurally equal candidate, with its score.
    pub fn find(&self, candidate: &Candidate) -> Option<&Candidate> {
        self.candidates.get(candidate)
    }

    /// Upsert: replace any structurally equal candidate with this one.
    pub fn update(&mut self, candidate: Candidate) {
        self.candidates.replace(candidate);
    }

    /// The `index`-th candidate in structural order.
    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.iter().nth(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    /// Fold a fitness observation into the stored score of `candidate`
    /// (or start a fresh record) and upsert. Returns the stored
    /// `(score, count)`. Non-finite observations are ignored, since they
    /// cannot be persisted.
    pub fn record(&mut self, candidate: &Candidate, fitness: f64) -> (f64, u32) {
        if !fitness.is_finite() {
            warn!(fitness, "ignoring non-finite fitness");
            return self
                .find(candidate)
                .map(|stored| (stored.score, stored.count))
                .unwrap_or((0.0, 0));
        }
        let mut stored = match self.candidates.take(candidate) {
            Some(existing) => existing,
            None => {
                let mut fresh = candidate.clone();
                fresh.score = 0.0;
                fresh.count = 0;
                fresh
            }
        };
        stored.observe(fitness);
        debug!(score = stored.score, count = stored.count, fitness, "recorded observation");
        let observed = (stored.score, stored.count);
        self.candidates.insert(stored);
        observed
    }

    /// Candidates by descending score, ties broken by structural order.
    pub fn ranked(&self) -> Vec<&Candidate> {
        let mut ranked: Vec<&Candidate> = self.candidates.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.cmp(b)));
        ranked
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.ranked().into_iter().next()
    }

    pub fn to_records(&self) -> Vec<CandidateRecord> {
        self.candidates.iter().map(CandidateRecord::from).collect()
    }

    pub fn from_records(records: Vec<CandidateRecord>) -> Result<Self, RecordError> {
        let mut knowledge = Self::new();
        for record in records {
            knowledge.update(Candidate::try_from(record)?);
        }
        Ok(knowledge)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_records())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<CandidateRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records)?)
    }

    /// Load a persisted knowledge base. A missing file is an empty base; a
    /// malformed one is an error.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no knowledge base yet, starting empty");
            return Ok(Self::new());
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading knowledge base {}", path.display()))?;
        let knowledge = Self::from_json(&json)
            .with_context(|| format!("parsing knowledge base {}", path.display()))?;
        info!(path = %path.display(), candidates = knowledge.len(), "loaded knowledge base");
        Ok(knowledge)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)
            .with_context(|| format!("writing knowledge base {}", path.display()))?;
        info!(path = %path.display(), candidates = self.len(), "saved knowledge base");
        Ok(())
    }
}
