//! Candidate configurations and the knowledge base behind the search.
//!
//! # Key Components
//!
//! - [`decision::DecisionPoint`]: a named, typed slot to decide (run pass X?
//!   argument N of pass X?)
//! - [`catalog::OptimizationCatalog`]: the known optimizations that seed the
//!   decision points
//! - [`candidate::Candidate`]: one formula per decision point, with a running
//!   score
//! - [`knowledge::KnowledgeBase`]: the deduplicated, persisted set of scored
//!   candidates
//! - [`report::Ranking`]: fitness-ordered evaluations and the final report

pub mod candidate;
pub mod catalog;
pub mod decision;
pub mod knowledge;
pub mod report;

pub use candidate::Candidate;
pub use catalog::{ArgumentSlot, Optimization, OptimizationCatalog};
pub use decision::{DecisionPoint, Decisions};
pub use knowledge::{CandidateRecord, EntryRecord, KnowledgeBase, RecordError};
pub use report::{Evaluation, EvaluationStatus, GenerationSummary, Ranking, SearchReport};
