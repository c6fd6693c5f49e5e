//! CLI wiring for gramforge.

use crate::config::SearchConfig;
use crate::oracle::CommandOracle;
use crate::search::GrammarEvolution;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use gramforge_formula::FeatureSet;
use gramforge_optimizer::{KnowledgeBase, OptimizationCatalog};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gramforge",
    about = "Grammar-guided search for compiler optimization decisions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evolve decision formulas for one program, scoring them with an
    /// external compile-and-measure command.
    Search {
        /// JSON feature file: [{"name", "sub"?, "value"}].
        #[arg(long)]
        features: PathBuf,
        /// JSON optimization catalog; the built-in pass list when omitted.
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// JSON search configuration; flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        knowledge_base: Option<PathBuf>,
        #[arg(long)]
        generations: Option<usize>,
        #[arg(long)]
        candidates: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long, default_value_t = false)]
        parameterized: bool,
        /// Write the search report as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Compile-and-measure command. Receives the decisions on stdin and
        /// prints the cost as its last line of output.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print the best candidates of a knowledge base.
    Inspect {
        #[arg(long)]
        knowledge_base: PathBuf,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// List the decision points a catalog yields.
    Catalog {
        #[arg(long)]
        catalog: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        parameterized: bool,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match cli.command {
        Command::Search {
            features,
            catalog,
            config,
            knowledge_base,
            generations,
            candidates,
            seed,
            timeout_ms,
            parameterized,
            report,
            command,
        } => {
            let mut config = match config {
                Some(path) => SearchConfig::load(path)?,
                None => SearchConfig::default(),
            };
            if let Some(path) = knowledge_base {
                config.knowledge_base = Some(path);
            }
            if let Some(generations) = generations {
                config.generations = generations;
            }
            if let Some(candidates) = candidates {
                config.candidates_number = candidates;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.oracle_timeout_ms = timeout_ms;
            }
            config.parameterized |= parameterized;

            let features = FeatureSet::load(&features)?;
            let catalog = load_catalog(catalog.as_deref())?;
            let oracle = CommandOracle::from_command_line(&command, config.oracle_timeout())
                .ok_or_else(|| anyhow!("a compile-and-measure command is required after --"))?;
            info!(
                program = oracle.program(),
                features = features.len(),
                optimizations = catalog.len(),
                "starting search"
            );

            let mut search = GrammarEvolution::new(config, &catalog, &features, oracle)?;
            let outcome = search.run()?;

            println!(
                "baseline_cost={:.6} best_speedup={:.4} knowledge_score={:.4} evaluations={}",
                outcome.baseline_cost,
                outcome.best_fitness,
                outcome.knowledge_score,
                outcome.ranking.len()
            );
            print!("{}", outcome.best);

            if let Some(path) = report {
                outcome.report().save(&path)?;
                info!(path = %path.display(), "search report written");
            }
        }
        Command::Inspect {
            knowledge_base,
            top,
        } => {
            if !knowledge_base.exists() {
                return Err(anyhow!(
                    "knowledge base {} does not exist",
                    knowledge_base.display()
                ));
            }
            let knowledge = KnowledgeBase::load_from_file(&knowledge_base)?;
            println!("candidates={}", knowledge.len());
            for (rank, candidate) in knowledge.ranked().into_iter().take(top).enumerate() {
                println!("#{} {}", rank + 1, candidate);
            }
        }
        Command::Catalog {
            catalog,
            parameterized,
        } => {
            let catalog = load_catalog(catalog.as_deref())?;
            for point in catalog.decision_points(parameterized) {
                println!("{}", point);
            }
        }
    }

    Ok(())
}

fn load_catalog(path: Option<&Path>) -> Result<OptimizationCatalog> {
    let catalog = match path {
        Some(path) => OptimizationCatalog::load(path)?,
        None => OptimizationCatalog::default_passes(),
    };
    catalog
        .validate()
        .map_err(|err| anyhow!("invalid optimization catalog: {}", err))?;
    Ok(catalog)
}
