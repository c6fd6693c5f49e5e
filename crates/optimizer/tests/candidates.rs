use gramforge_formula::{
    EvolutionStrategy, FeatureRef, FeatureSet, Formula, FormulaError, GenContext, Grammar, Value,
    ValueType,
};
use gramforge_optimizer::{Candidate, DecisionPoint, KnowledgeBase, OptimizationCatalog};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Flips every literal it reaches and counts how often it was asked.
#[derive(Default)]
struct CountingFlip {
    visits: usize,
}

impl EvolutionStrategy for CountingFlip {
    fn evolve_children(
        &mut self,
        _children: Vec<&mut Formula>,
        _depth: usize,
        _ctx: &mut GenContext<'_>,
    ) -> Result<(), FormulaError> {
        self.visits += 1;
        Ok(())
    }

    fn mutate_value(&mut self, value: &mut Value, _ctx: &mut GenContext<'_>) {
        self.visits += 1;
        if let Value::Bool(flag) = value {
            *flag = !*flag;
        }
    }

    fn mutate_feature(&mut self, _feature: &mut FeatureRef, _ty: ValueType, _ctx: &mut GenContext<'_>) {
        self.visits += 1;
    }
}

fn features() -> FeatureSet {
    FeatureSet::new()
        .with("inst_count", "", 840i64)
        .with("opcode", "br", 77i64)
        .with("loop_depth", "", 2i64)
        .with("is_leaf", "", true)
        .with("est_cycles", "", 1.9e4)
}

fn generated(seed: u64, parameterized: bool) -> Candidate {
    let features = features();
    let grammar = Grammar::default();
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut ctx = GenContext::new(&grammar, &features, &mut rng);
    let points = OptimizationCatalog::default_passes().decision_points(parameterized);
    let mut candidate = Candidate::new();
    candidate.generate_missing(&points, &mut ctx).unwrap();
    candidate
}

#[test]
fn evolve_touches_exactly_the_requested_share() {
    let features = features();
    let grammar = Grammar::default();
    let mut rng = fastrand::Rng::with_seed(11);
    let mut ctx = GenContext::new(&grammar, &features, &mut rng);

    let mut candidate = Candidate::new();
    for i in 0..10 {
        candidate
            .insert(DecisionPoint::flag(&format!("opt{}", i)), Formula::literal(false))
            .unwrap();
    }
    let before = candidate.clone();

    let mut strategy = CountingFlip::default();
    let evolved = candidate.evolve(0.5, &mut strategy, &mut ctx).unwrap();
    assert_eq!(evolved, 5);
    assert_eq!(strategy.visits, 5);

    let changed = before
        .formulas()
        .zip(candidate.formulas())
        .filter(|((_, old), (_, new))| old != new)
        .count();
    assert_eq!(changed, 5);
}

#[test]
fn evolve_with_zero_rate_is_a_no_op() {
    let features = features();
    let grammar = Grammar::default();
    let mut rng = fastrand::Rng::with_seed(3);
    let mut ctx = GenContext::new(&grammar, &features, &mut rng);

    let mut candidate = generated(5, false);
    candidate.score = 2.5;
    candidate.count = 4;
    let before = candidate.clone();
    let mut strategy = CountingFlip::default();
    assert_eq!(candidate.evolve(0.0, &mut strategy, &mut ctx).unwrap(), 0);
    assert_eq!(strategy.visits, 0);
    assert_eq!(candidate, before);
    assert_eq!((candidate.score, candidate.count), (2.5, 4));
}

#[test]
fn knowledge_base_round_trips_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("kb.json");

    let mut knowledge = KnowledgeBase::new();
    for seed in 0..12 {
        let mut candidate = generated(seed, seed % 2 == 0);
        candidate.score = seed as f64 * 0.25;
        candidate.count = seed as u32 + 1;
        knowledge.update(candidate);
    }
    knowledge.save_to_file(&path).unwrap();

    let loaded = KnowledgeBase::load_from_file(&path).unwrap();
    assert_eq!(loaded.len(), knowledge.len());
    for (a, b) in knowledge.iter().zip(loaded.iter()) {
        assert_eq!(a, b);
        assert_eq!((a.score, a.count), (b.score, b.count));
    }
}

#[test]
fn missing_knowledge_base_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = KnowledgeBase::load_from_file(&dir.path().join("absent.json")).unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn malformed_knowledge_base_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.json");
    std::fs::write(&path, "[{\"score\": 1.0, \"count\": \"many\"}]").unwrap();
    assert!(KnowledgeBase::load_from_file(&path).is_err());
}

#[test]
fn generate_missing_covers_new_points() {
    let features = features();
    let grammar = Grammar::default();
    let mut rng = fastrand::Rng::with_seed(8);
    let mut ctx = GenContext::new(&grammar, &features, &mut rng);

    let catalog = OptimizationCatalog::default_passes();
    let mut candidate = generated(1, false);
    let flags = catalog.decision_points(false);
    let all = catalog.decision_points(true);
    assert!(candidate.is_complete(&flags));
    assert!(!candidate.is_complete(&all));

    let extra: BTreeSet<_> = all.difference(&flags).cloned().collect();
    assert_eq!(candidate.generate_missing(&all, &mut ctx).unwrap(), extra.len());
    for point in &extra {
        assert_eq!(candidate.get(point).unwrap().ty(), point.ty());
    }
}

proptest! {
    #[test]
    fn candidate_order_is_total(a in 0u64..500, b in 0u64..500, c in 0u64..500) {
        let (ca, cb, cc) = (generated(a, a % 3 == 0), generated(b, b % 3 == 0), generated(c, c % 3 == 0));
        let relations = [ca < cb, ca == cb, cb < ca];
        prop_assert_eq!(relations.iter().filter(|r| **r).count(), 1);
        if ca < cb && cb < cc {
            prop_assert!(ca < cc);
        }
    }

    #[test]
    fn candidate_record_round_trip(seed in any::<u64>()) {
        let mut candidate = generated(seed, true);
        candidate.score = 1.5;
        candidate.count = 2;
        let mut knowledge = KnowledgeBase::new();
        knowledge.update(candidate.clone());
        let json = knowledge.to_json().unwrap();
        let loaded = KnowledgeBase::from_json(&json).unwrap();
        let restored = loaded.get(0).unwrap();
        prop_assert_eq!(restored, &candidate);
        prop_assert_eq!((restored.score, restored.count), (1.5, 2));
    }
}
