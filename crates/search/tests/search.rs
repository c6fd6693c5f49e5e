use gramforge_formula::{FeatureSet, Formula, ValueType};
use gramforge_optimizer::{
    Candidate, DecisionPoint, Decisions, KnowledgeBase, Optimization, OptimizationCatalog,
};
use gramforge_search::{
    CompileOracle, GrammarEvolution, Isolated, OracleError, SearchConfig, SearchOutcome,
};
use std::time::Duration;

/// Each enabled pass shaves a fixed share off the cost.
struct PassCounter {
    baseline: f64,
}

impl CompileOracle for PassCounter {
    type Artifact = usize;

    fn baseline_cost(&self) -> Result<f64, OracleError> {
        Ok(self.baseline)
    }

    fn compile(&self, decisions: &Decisions) -> Result<usize, OracleError> {
        Ok(decisions.enabled().count())
    }

    fn measure(&self, enabled: &usize) -> Result<f64, OracleError> {
        Ok(self.baseline / (1.0 + *enabled as f64))
    }
}

struct AlwaysFails;

impl CompileOracle for AlwaysFails {
    type Artifact = ();

    fn baseline_cost(&self) -> Result<f64, OracleError> {
        Ok(100.0)
    }

    fn compile(&self, _decisions: &Decisions) -> Result<(), OracleError> {
        Err(OracleError::Compile("backend rejected the module".into()))
    }

    fn measure(&self, _artifact: &()) -> Result<f64, OracleError> {
        Ok(1.0)
    }
}

/// Panics on every decision set that enables `gvn`, hangs on `licm`.
struct Flaky;

impl CompileOracle for Flaky {
    type Artifact = f64;

    fn baseline_cost(&self) -> Result<f64, OracleError> {
        Ok(10.0)
    }

    fn compile(&self, decisions: &Decisions) -> Result<f64, OracleError> {
        if decisions.is_enabled("gvn") {
            panic!("gvn crashed the backend");
        }
        if decisions.is_enabled("licm") {
            std::thread::sleep(Duration::from_secs(2));
        }
        Ok(5.0)
    }

    fn measure(&self, cost: &f64) -> Result<f64, OracleError> {
        Ok(*cost)
    }
}

fn features() -> FeatureSet {
    FeatureSet::new()
        .with("inst_count", "", 1830i64)
        .with("opcode", "load", 212i64)
        .with("opcode", "store", 97i64)
        .with("loop_depth", "", 2i64)
        .with("has_calls", "", true)
        .with("est_cycles", "", 4.1e4)
}

fn small_catalog() -> OptimizationCatalog {
    OptimizationCatalog::new(vec![
        Optimization::new("gvn"),
        Optimization::new("licm"),
        Optimization::new("inline").with_argument("threshold", gramforge_formula::ValueType::Int),
        Optimization::new("dce"),
    ])
}

fn config(candidates: usize, generations: usize) -> SearchConfig {
    SearchConfig {
        candidates_number: candidates,
        generations,
        seed: Some(1234),
        ..SearchConfig::default()
    }
}

#[test]
fn one_generation_from_an_empty_knowledge_base() {
    let features = features();
    let oracle = PassCounter { baseline: 50.0 };
    let catalog = small_catalog();
    let mut search = GrammarEvolution::new(config(3, 1), &catalog, &features, oracle).unwrap();
    assert!(search.knowledge().is_empty());

    let outcome = search.run().unwrap();
    assert_eq!(outcome.ranking.len(), 3);
    assert!(!search.knowledge().is_empty());
    assert_eq!(outcome.generations.len(), 1);
    assert_eq!(outcome.best_fitness, outcome.ranking.best().unwrap().fitness);
    assert!(outcome.best.is_complete(search.decision_points()));

    let fitness: Vec<f64> = outcome.ranking.iter().map(|e| e.fitness).collect();
    assert!(fitness.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[test]
fn failing_oracle_falls_back_and_still_ranks() {
    let features = features();
    let oracle = AlwaysFails;
    let catalog = small_catalog();
    let config = SearchConfig {
        fallback_fitness: 0.25,
        ..config(5, 2)
    };
    let mut search = GrammarEvolution::new(config, &catalog, &features, oracle).unwrap();
    let outcome = search.run().unwrap();

    assert!(outcome.ranking.iter().all(|e| e.fitness == 0.25 && e.is_failed()));
    let candidates: Vec<_> = outcome.ranking.iter().map(|e| &e.candidate).collect();
    assert!(candidates.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(search.knowledge().iter().all(|c| c.score == 0.25));
    assert_eq!(outcome.generations.len(), 2);
    assert!(outcome.generations.iter().all(|g| g.failed == g.pool));
}

#[test]
fn knowledge_base_persists_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb").join("knowledge.json");
    let features = features();
    let catalog = small_catalog();

    let oracle = PassCounter { baseline: 20.0 };
    let first = SearchConfig {
        knowledge_base: Some(path.clone()),
        ..config(4, 2)
    };
    let mut search = GrammarEvolution::new(first, &catalog, &features, oracle).unwrap();
    let outcome = search.run().unwrap();
    let saved = search.knowledge().len();
    assert!(path.exists());

    let reloaded = KnowledgeBase::load_from_file(&path).unwrap();
    assert_eq!(reloaded.len(), saved);
    let stored = reloaded.find(&outcome.best).unwrap();
    assert_eq!(stored.score, outcome.knowledge_score);

    let second = SearchConfig {
        knowledge_base: Some(path.clone()),
        seed: Some(99),
        ..config(4, 1)
    };
    let oracle = PassCounter { baseline: 20.0 };
    let mut resumed = GrammarEvolution::new(second, &catalog, &features, oracle).unwrap();
    assert_eq!(resumed.knowledge().len(), saved);
    let again = resumed.run().unwrap();
    // The carried best is re-measured, so the run never regresses.
    assert!(again.best_fitness >= reloaded.best().unwrap().score - 1e-12);
}

#[test]
fn malformed_knowledge_base_is_fatal_at_init() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge.json");
    std::fs::write(&path, "{ not json").unwrap();
    let features = features();
    let oracle = PassCounter { baseline: 20.0 };
    let catalog = small_catalog();
    let config = SearchConfig {
        knowledge_base: Some(path),
        ..config(2, 1)
    };
    assert!(GrammarEvolution::new(config, &catalog, &features, oracle).is_err());
}

#[test]
fn parameterized_search_fills_argument_points() {
    let features = features();
    let oracle = PassCounter { baseline: 50.0 };
    let catalog = small_catalog();
    let config = SearchConfig {
        parameterized: true,
        ..config(3, 2)
    };
    let mut search = GrammarEvolution::new(config, &catalog, &features, oracle).unwrap();
    assert_eq!(search.decision_points().len(), 5);
    let outcome = search.run().unwrap();
    let threshold = outcome
        .best
        .get(&DecisionPoint::argument("inline", 0, ValueType::Int))
        .unwrap();
    assert_eq!(threshold.ty(), ValueType::Int);
}

#[test]
fn retyped_argument_is_regenerated_on_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge.json");
    let mut stale = Candidate::new();
    stale
        .insert(DecisionPoint::argument("inline", 0, ValueType::Int), Formula::literal(7i64))
        .unwrap();
    stale.insert(DecisionPoint::flag("inline"), Formula::literal(true)).unwrap();
    let mut knowledge = KnowledgeBase::new();
    knowledge.record(&stale, 1.5);
    knowledge.save_to_file(&path).unwrap();

    let features = features();
    let catalog = OptimizationCatalog::new(vec![
        Optimization::new("inline").with_argument("threshold", ValueType::Float),
    ]);
    let config = SearchConfig {
        knowledge_base: Some(path),
        parameterized: true,
        evolve_probability: 0.0,
        ..config(2, 1)
    };
    let mut search =
        GrammarEvolution::new(config, &catalog, &features, PassCounter { baseline: 10.0 })
            .unwrap();
    let outcome = search.run().unwrap();
    for evaluation in outcome.ranking.iter() {
        let threshold = evaluation
            .candidate
            .formulas()
            .find(|(point, _)| point.name() == "~inline.0")
            .unwrap();
        assert_eq!(threshold.0.ty(), ValueType::Float);
        assert_eq!(threshold.1.ty(), ValueType::Float);
    }
}

#[test]
fn extreme_speedups_keep_the_knowledge_base_loadable() {
    struct Extreme;

    impl CompileOracle for Extreme {
        type Artifact = ();

        fn baseline_cost(&self) -> Result<f64, OracleError> {
            Ok(1e308)
        }

        fn compile(&self, _decisions: &Decisions) -> Result<(), OracleError> {
            Ok(())
        }

        fn measure(&self, _artifact: &()) -> Result<f64, OracleError> {
            Ok(1e-8)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge.json");
    let features = features();
    let catalog = small_catalog();
    let config = SearchConfig {
        knowledge_base: Some(path.clone()),
        ..config(3, 1)
    };
    let mut search = GrammarEvolution::new(config, &catalog, &features, Extreme).unwrap();
    let outcome = search.run().unwrap();
    assert!(outcome.best_fitness.is_finite());
    assert!(outcome.ranking.iter().all(|e| e.is_failed()));

    let reloaded = KnowledgeBase::load_from_file(&path).unwrap();
    assert_eq!(reloaded.len(), search.knowledge().len());
}

#[test]
fn crashes_and_hangs_become_fallback_scores() {
    let oracle = Isolated::new(Flaky, Duration::from_millis(100));
    assert_flaky_scores(run_flaky(oracle, 60_000));
}

#[test]
fn unwrapped_oracle_panics_and_hangs_do_not_abort_the_run() {
    assert_flaky_scores(run_flaky(Flaky, 100));
}

fn run_flaky<O: CompileOracle + 'static>(oracle: O, timeout_ms: u64) -> SearchOutcome {
    let features = features();
    let catalog = OptimizationCatalog::new(vec![
        Optimization::new("gvn"),
        Optimization::new("licm"),
    ]);
    let config = SearchConfig {
        workers: Some(4),
        oracle_timeout_ms: timeout_ms,
        ..config(6, 1)
    };
    let mut search = GrammarEvolution::new(config, &catalog, &features, oracle).unwrap();
    search.run().unwrap()
}

fn assert_flaky_scores(outcome: SearchOutcome) {
    let features = features();
    assert_eq!(outcome.ranking.len(), 6);

    for evaluation in outcome.ranking.iter() {
        let decisions = evaluation.candidate.decide(&features);
        match decisions {
            Ok(d) if !d.is_enabled("gvn") && !d.is_enabled("licm") => {
                assert_eq!(evaluation.fitness, 2.0);
            }
            _ => {
                assert!(evaluation.is_failed());
                assert_eq!(evaluation.fitness, 0.0);
            }
        }
    }
}

#[cfg(unix)]
mod subprocess {
    use super::*;
    use gramforge_search::CommandOracle;

    fn sh(script: &str, timeout: Duration) -> CommandOracle {
        CommandOracle::new("sh", vec!["-c".into(), script.into()], timeout)
    }

    #[test]
    fn command_oracle_reads_cost_from_stdout() {
        let oracle = sh("cat > /dev/null; echo compiling; echo 12.5", Duration::from_secs(10));
        assert_eq!(oracle.baseline_cost(), Ok(12.5));
    }

    #[test]
    fn command_oracle_sees_the_decisions() {
        let script = r#"if grep -q '"gvn":true'; then echo 5; else echo 10; fi"#;
        let oracle = sh(script, Duration::from_secs(10));
        let mut decisions = Decisions::new();
        decisions.insert("gvn", gramforge_formula::Value::Bool(true));
        assert_eq!(oracle.compile_and_measure(&decisions), Ok(5.0));
        assert_eq!(oracle.baseline_cost(), Ok(10.0));
    }

    #[test]
    fn command_oracle_writes_output_before_reading_input() {
        let oracle = sh(
            "yes | head -c 200000; cat > /dev/null; echo 3",
            Duration::from_secs(10),
        );
        let mut decisions = Decisions::new();
        for i in 0..20_000 {
            decisions.insert(format!("pass{}", i), gramforge_formula::Value::Bool(true));
        }
        assert_eq!(oracle.compile_and_measure(&decisions), Ok(3.0));
    }

    #[test]
    fn command_oracle_failures() {
        let failing = sh("echo 'bad pass pipeline' >&2; exit 3", Duration::from_secs(10));
        assert!(matches!(
            failing.compile_and_measure(&Decisions::new()),
            Err(OracleError::Compile(_))
        ));

        let hanging = sh("sleep 5", Duration::from_millis(200));
        assert!(matches!(
            hanging.compile_and_measure(&Decisions::new()),
            Err(OracleError::Timeout(_))
        ));

        let missing = CommandOracle::new(
            "/nonexistent/gramforge-measure",
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            missing.baseline_cost(),
            Err(OracleError::Io(_))
        ));
    }

    #[test]
    fn search_with_an_external_command() {
        let features = features();
        let script = r#"if grep -q '"dce":true'; then echo 4; else echo 8; fi"#;
        let oracle = sh(script, Duration::from_secs(10));
        let catalog = small_catalog();
        let mut search = GrammarEvolution::new(config(3, 2), &catalog, &features, oracle).unwrap();
        let outcome = search.run().unwrap();
        assert!(outcome.best_fitness >= 1.0 || outcome.ranking.iter().all(|e| e.is_failed()));
        assert_eq!(outcome.report().generations.len(), 2);
    }
}
