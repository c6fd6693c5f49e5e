//! The generational grammar-evolution loop.

use crate::config::SearchConfig;
use crate::oracle::{CompileOracle, Isolated, OracleError};
use anyhow::{anyhow, bail, Context, Result};
use gramforge_formula::{FeatureOracle, GenContext, Grammar, SubtreeMutation};
use gramforge_optimizer::{
    Candidate, CandidateRecord, DecisionPoint, Evaluation, GenerationSummary, KnowledgeBase,
    OptimizationCatalog, Ranking, SearchReport,
};
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Result of a finished search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: Candidate,
    /// Fitness of `best` in its best-ranked evaluation.
    pub best_fitness: f64,
    /// Running score the knowledge base holds for `best`.
    pub knowledge_score: f64,
    pub baseline_cost: f64,
    pub generations: Vec<GenerationSummary>,
    /// Every evaluation of the run, best first.
    pub ranking: Ranking,
}

impl SearchOutcome {
    pub fn report(&self) -> SearchReport {
        SearchReport {
            baseline_cost: self.baseline_cost,
            best_fitness: self.best_fitness,
            knowledge_score: self.knowledge_score,
            best: CandidateRecord::from(&self.best),
            generations: self.generations.clone(),
        }
    }
}

/// Turns one candidate into a scored evaluation. Shared read-only across
/// evaluation workers.
struct Evaluator<'a, O> {
    features: &'a dyn FeatureOracle,
    oracle: &'a O,
    baseline: f64,
    fallback: f64,
    min_cost: f64,
}

impl<O: CompileOracle> Evaluator<'_, O> {
    fn fitness(&self, cost: f64) -> Result<f64, OracleError> {
        if !cost.is_finite() || cost <= self.min_cost {
            return Err(OracleError::DegenerateCost(cost));
        }
        let fitness = self.baseline / cost;
        if !fitness.is_finite() {
            return Err(OracleError::DegenerateCost(cost));
        }
        Ok(fitness)
    }

    fn evaluate(&self, candidate: Candidate) -> Evaluation {
        let decisions = match candidate.decide(self.features) {
            Ok(decisions) => decisions,
            Err(err) => {
                warn!(error = %err, "candidate does not evaluate on these features");
                return Evaluation::failed(candidate, err.to_string(), self.fallback);
            }
        };
        let measured = self
            .oracle
            .compile_and_measure(&decisions)
            .and_then(|cost| self.fitness(cost).map(|fitness| (cost, fitness)));
        match measured {
            Ok((cost, fitness)) => {
                debug!(cost, fitness, enabled = decisions.enabled().count(), "candidate measured");
                Evaluation::measured(candidate, cost, fitness)
            }
            Err(err) => {
                warn!(error = %err, fallback = self.fallback, "evaluation failed");
                Evaluation::failed(candidate, err.to_string(), self.fallback)
            }
        }
    }
}

/// Evolves candidates over the decision points of a catalog, scoring them
/// through a compile oracle and accumulating results in a knowledge base.
///
/// Pool selection, evolution, completion and knowledge-base updates run on
/// the calling thread with one seeded generator; only evaluation fans out
/// over the worker pool. Every oracle call goes through an [`Isolated`]
/// barrier bounded by `oracle_timeout_ms`; a panic or timeout scores the
/// fallback fitness.
pub struct GrammarEvolution<'a, O> {
    config: SearchConfig,
    grammar: Grammar,
    strategy: SubtreeMutation,
    points: BTreeSet<DecisionPoint>,
    features: &'a dyn FeatureOracle,
    oracle: Isolated<O>,
    knowledge: KnowledgeBase,
    rng: fastrand::Rng,
    baseline: f64,
    workers: Option<rayon::ThreadPool>,
    ranking: Ranking,
    history: Vec<GenerationSummary>,
}

impl<'a, O: CompileOracle + 'static> GrammarEvolution<'a, O> {
    /// Seed the decision points, import the knowledge base and measure the
    /// baseline.
    pub fn new(
        config: SearchConfig,
        catalog: &OptimizationCatalog,
        features: &'a dyn FeatureOracle,
        oracle: O,
    ) -> Result<Self> {
        config.validate().map_err(|err| anyhow!("invalid search config: {}", err))?;
        catalog
            .validate()
            .map_err(|err| anyhow!("invalid optimization catalog: {}", err))?;
        let points = catalog.decision_points(config.parameterized);
        if points.is_empty() {
            bail!("the optimization catalog yields no decision points");
        }

        let knowledge = match &config.knowledge_base {
            Some(path) => KnowledgeBase::load_from_file(path)?,
            None => KnowledgeBase::new(),
        };

        let oracle = Isolated::new(oracle, config.oracle_timeout());
        let baseline = oracle
            .baseline_cost()
            .context("measuring the baseline program")?;
        if !baseline.is_finite() || baseline <= config.min_cost {
            bail!("baseline cost {} is not usable", baseline);
        }

        let workers = match config.workers {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .context("building the evaluation pool")?,
            ),
            None => None,
        };

        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        info!(
            decision_points = points.len(),
            parameterized = config.parameterized,
            imported = knowledge.len(),
            baseline,
            "search initialized"
        );

        Ok(Self {
            grammar: config.grammar(),
            strategy: config.strategy(),
            config,
            points,
            features,
            oracle,
            knowledge,
            rng,
            baseline,
            workers,
            ranking: Ranking::new(),
            history: Vec::new(),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn decision_points(&self) -> &BTreeSet<DecisionPoint> {
        &self.points
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn baseline_cost(&self) -> f64 {
        self.baseline
    }

    /// Rankings of every generation run so far, merged.
    pub fn ranking(&self) -> &Ranking {
        &self.ranking
    }

    /// Run the configured number of generations, then persist the knowledge
    /// base and report the best candidate.
    pub fn run(&mut self) -> Result<SearchOutcome> {
        for _ in 0..self.config.generations {
            self.step()?;
        }
        self.finalize()
    }

    /// One generation: select, evolve, complete, evaluate, rank and record.
    /// Returns this generation's ranking.
    pub fn step(&mut self) -> Result<Ranking> {
        let generation = self.history.len();
        let mut pool = self.select_pool()?;
        self.complete(&mut pool)?;

        let ranking = Ranking::from_evaluations(self.evaluate(pool));
        for evaluation in ranking.iter() {
            let (score, count) = self.knowledge.record(&evaluation.candidate, evaluation.fitness);
            debug!(generation, fitness = evaluation.fitness, score, count, "knowledge updated");
        }

        let summary = GenerationSummary {
            generation,
            pool: ranking.len(),
            failed: ranking.iter().filter(|e| e.is_failed()).count(),
            best_fitness: ranking.best().map(|e| e.fitness).unwrap_or(self.config.fallback_fitness),
            knowledge_size: self.knowledge.len(),
        };
        info!(
            generation,
            pool = summary.pool,
            failed = summary.failed,
            best_fitness = summary.best_fitness,
            knowledge = summary.knowledge_size,
            "generation complete"
        );
        self.history.push(summary);
        self.ranking.extend(ranking.clone());
        Ok(ranking)
    }

    /// Persist the knowledge base and report the overall best candidate.
    pub fn finalize(&self) -> Result<SearchOutcome> {
        if let Some(path) = &self.config.knowledge_base {
            self.knowledge.save_to_file(path)?;
        }

        let best = self
            .ranking
            .best()
            .ok_or_else(|| anyhow!("no generation has been run"))?;
        let knowledge_score = self
            .knowledge
            .find(&best.candidate)
            .map(|stored| stored.score)
            .unwrap_or(best.fitness);

        info!(
            best_fitness = best.fitness,
            knowledge_score,
            evaluations = self.ranking.len(),
            "search finished"
        );

        Ok(SearchOutcome {
            best: best.candidate.clone(),
            best_fitness: best.fitness,
            knowledge_score,
            baseline_cost: self.baseline,
            generations: self.history.clone(),
            ranking: self.ranking.clone(),
        })
    }

    /// Elite clones by knowledge-base score, some of them evolved, plus the
    /// best-known candidate unchanged. An empty knowledge base yields fresh
    /// empty candidates instead.
    fn select_pool(&mut self) -> Result<Vec<Candidate>> {
        let size = self.config.candidates_number;
        if self.knowledge.is_empty() {
            return Ok((0..size).map(|_| Candidate::new()).collect());
        }

        let ranked = self.knowledge.ranked();
        let mut pool = Vec::with_capacity(size + 1);
        let mut evolved = 0;
        for elite in ranked.iter().take(size) {
            let mut candidate = (*elite).clone();
            candidate.retain_points(&self.points);
            if self.rng.f64() < self.config.evolve_probability {
                let mut ctx = GenContext::new(&self.grammar, self.features, &mut self.rng);
                candidate.evolve(self.config.max_evolution_rate, &mut self.strategy, &mut ctx)?;
                evolved += 1;
            }
            pool.push(candidate);
        }

        let mut best = ranked[0].clone();
        best.retain_points(&self.points);
        pool.push(best);

        debug!(elites = pool.len() - 1, evolved, "pool selected");
        Ok(pool)
    }

    fn complete(&mut self, pool: &mut [Candidate]) -> Result<()> {
        let mut ctx = GenContext::new(&self.grammar, self.features, &mut self.rng);
        for candidate in pool.iter_mut() {
            candidate.generate_missing(&self.points, &mut ctx)?;
        }
        Ok(())
    }

    fn evaluate(&self, pool: Vec<Candidate>) -> Vec<Evaluation> {
        let evaluator = Evaluator {
            features: self.features,
            oracle: &self.oracle,
            baseline: self.baseline,
            fallback: self.config.fallback_fitness,
            min_cost: self.config.min_cost,
        };
        let run = || {
            pool.into_par_iter()
                .map(|candidate| evaluator.evaluate(candidate))
                .collect::<Vec<_>>()
        };
        match &self.workers {
            Some(workers) => workers.install(run),
            None => run(),
        }
    }
}
