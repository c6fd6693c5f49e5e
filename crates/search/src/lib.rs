//! The gramforge search: configuration, compile oracles and the
//! generational evolution loop.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod oracle;
pub mod search;

pub use config::SearchConfig;
pub use oracle::{CommandOracle, CompileOracle, Isolated, OracleError};
pub use search::{GrammarEvolution, SearchOutcome};
