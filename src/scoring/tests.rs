// Tests for walking, aggregation and decisions
//
// Automata are compiled from hand-built dictionaries:
//   point masses: X.1 at 1 on [0, 50), X.2 at 99 on [50, inf)
//   isolated:     X.1 ~ N(10, 1), X.2 ~ N(90, 2) with critical areas

use super::*;
use crate::compiler::AutomatonCompiler;
use crate::error::PdtaError;
use crate::event::{Event, EventDictionary, SubEvent};
use crate::interval::Interval;
use crate::pta::Pta;
use std::sync::Arc;

fn compile(dictionary: EventDictionary, training: &[&[(&str, f64)]]) -> Pdta {
    let mut pta = Pta::new(Arc::new(dictionary));
    for pairs in training {
        pta.add_sequence(&TimedSequence::from_pairs(pairs.iter().copied()))
            .unwrap();
    }
    AutomatonCompiler::default().compile(&pta).unwrap()
}

fn point_masses() -> EventDictionary {
    let fast = SubEvent::fitted(
        "X.1".to_string(),
        Interval::new(0.0, 50.0).unwrap(),
        1.0,
        0.0,
        3.0,
        2.0,
    )
    .unwrap();
    let slow = SubEvent::fitted(
        "X.2".to_string(),
        Interval::new(50.0, f64::INFINITY).unwrap(),
        99.0,
        0.0,
        3.0,
        2.0,
    )
    .unwrap();
    EventDictionary::new(vec![Event::new("X", vec![fast, slow])])
}

fn isolated() -> EventDictionary {
    let low = SubEvent::fitted(
        "X.1".to_string(),
        Interval::new(0.0, 50.0).unwrap(),
        10.0,
        1.0,
        3.0,
        2.0,
    )
    .unwrap();
    let high = SubEvent::fitted(
        "X.2".to_string(),
        Interval::new(50.0, f64::INFINITY).unwrap(),
        90.0,
        2.0,
        3.0,
        2.0,
    )
    .unwrap();
    let mut dictionary = EventDictionary::new(vec![Event::new("X", vec![low, high])]);
    dictionary.isolate_critical_areas();
    dictionary
}

fn seq(pairs: &[(&str, f64)]) -> TimedSequence {
    TimedSequence::from_pairs(pairs.iter().copied())
}

fn scorer(decision: DecisionPolicy, mode: EvaluationMode) -> SequenceScorer {
    SequenceScorer::new(ScoringConfig {
        decision,
        mode,
        ..ScoringConfig::default()
    })
    .unwrap()
}

struct Threshold(f64);

impl OutlierClassifier for Threshold {
    fn train(&mut self, _vectors: &[Vec<f64>]) -> Result<()> {
        Ok(())
    }

    fn is_outlier(&self, vector: &[f64]) -> bool {
        vector[0] < self.0
    }
}

#[test]
fn test_fast_path_likelihoods() {
    let pdta = compile(point_masses(), &[&[("X", 1.0)], &[("X", 99.0)]]);
    let likelihoods = SequenceScorer::default()
        .likelihoods(&pdta, &seq(&[("X", 1.0)]))
        .unwrap();

    assert_eq!(likelihoods.event, vec![0.5, 1.0]);
    assert_eq!(likelihoods.time, vec![1.0]);
    assert_eq!(likelihoods.accepted_steps, 1);
    assert!(likelihoods.final_state.is_some());
}

#[test]
fn test_unknown_symbol_fails() {
    let pdta = compile(point_masses(), &[&[("X", 1.0)]]);
    let result = SequenceScorer::default().score(&pdta, &seq(&[("X", 1.0), ("Q", 1.0)]), None);
    assert!(matches!(result, Err(PdtaError::UnknownSymbol(ref s)) if s == "Q"));
}

#[test]
fn test_uncovered_time_is_an_impossible_step() {
    let pdta = compile(point_masses(), &[&[("X", 1.0)]]);
    let score = SequenceScorer::default()
        .score(&pdta, &seq(&[("X", -1.0)]), None)
        .unwrap();
    assert_eq!(score.likelihoods.event, vec![0.0, 0.0]);
    assert_eq!(score.likelihoods.time, vec![0.0]);
    assert_eq!(score.event_score, f64::NEG_INFINITY);
    assert!(score.anomalous);
}

#[test]
fn test_time_scored_against_dictionary_after_failure() {
    let pdta = compile(isolated(), &[&[("X", 10.0), ("X", 90.0)]]);
    let likelihoods = SequenceScorer::default()
        .likelihoods(&pdta, &seq(&[("X", 90.0), ("X", 90.0)]))
        .unwrap();

    assert_eq!(likelihoods.event, vec![0.0, 0.0, 0.0]);
    assert_eq!(likelihoods.time, vec![1.0, 1.0]);
    assert_eq!(likelihoods.accepted_steps, 0);
    assert_eq!(likelihoods.final_state, None);
}

#[test]
fn test_critical_step_borrows_neighbour_time_likelihood() {
    let dictionary = isolated();
    let expected = dictionary.event(0).sub_events[1].regime_likelihood(14.0);
    let pdta = compile(dictionary, &[&[("X", 10.0)], &[("X", 20.0)]]);

    let likelihoods = SequenceScorer::default()
        .likelihoods(&pdta, &seq(&[("X", 14.0)]))
        .unwrap();
    assert_eq!(likelihoods.event, vec![0.5, 1.0]);
    assert!(likelihoods.time[0] > 0.0);
    assert!((likelihoods.time[0] - expected).abs() < 1e-15);
}

#[test]
fn test_prefix_mode_reports_first_violation() {
    let pdta = compile(isolated(), &[&[("X", 10.0), ("X", 90.0)]]);
    let steps = DecisionPolicy::Steps(Thresholds::new(0.1, 0.0));

    let prefix = scorer(steps, EvaluationMode::Prefixes)
        .score(&pdta, &seq(&[("X", 10.0), ("X", 10.0), ("X", 10.0)]), None)
        .unwrap();
    assert!(prefix.anomalous);
    assert_eq!(prefix.first_violation, Some(2));

    let whole = scorer(steps, EvaluationMode::WholeSequence)
        .score(&pdta, &seq(&[("X", 10.0), ("X", 10.0), ("X", 10.0)]), None)
        .unwrap();
    assert!(whole.anomalous);
    assert_eq!(whole.first_violation, None);

    let accepted = scorer(steps, EvaluationMode::Prefixes)
        .score(&pdta, &seq(&[("X", 10.0), ("X", 90.0)]), None)
        .unwrap();
    assert!(!accepted.anomalous);
    assert_eq!(accepted.first_violation, None);
}

#[test]
fn test_prefix_mode_flags_unlikely_end() {
    let pdta = compile(isolated(), &[&[("X", 10.0), ("X", 90.0)]]);
    let score = scorer(
        DecisionPolicy::Steps(Thresholds::new(0.1, 0.0)),
        EvaluationMode::Prefixes,
    )
    .score(&pdta, &seq(&[("X", 10.0)]), None)
    .unwrap();

    assert_eq!(score.likelihoods.event, vec![1.0, 0.0]);
    assert!(score.anomalous);
    assert_eq!(score.first_violation, Some(2));
}

#[test]
fn test_classifier_decision() {
    let pdta = compile(point_masses(), &[&[("X", 1.0)], &[("X", 99.0)]]);
    let scorer = scorer(DecisionPolicy::Classifier, EvaluationMode::WholeSequence);

    let normal = scorer
        .score(&pdta, &seq(&[("X", 1.0)]), Some(&Threshold(-1.0)))
        .unwrap();
    assert!(!normal.anomalous);

    let unseen = scorer
        .score(&pdta, &seq(&[("X", 1.0), ("X", 1.0)]), Some(&Threshold(-1.0)))
        .unwrap();
    assert!(unseen.anomalous);

    assert!(matches!(
        scorer.score(&pdta, &seq(&[("X", 1.0)]), None),
        Err(PdtaError::Classifier(_))
    ));
}

#[test]
fn test_empty_sequence_only_scores_the_end() {
    let pdta = compile(point_masses(), &[&[("X", 1.0)]]);
    let score = SequenceScorer::default()
        .score(&pdta, &TimedSequence::default(), None)
        .unwrap();
    assert_eq!(score.likelihoods.event, vec![0.0]);
    assert!(score.likelihoods.time.is_empty());
    assert_eq!(score.time_score, f64::INFINITY);
    assert!(score.anomalous);
}

#[test]
fn test_features_are_finite() {
    let pdta = compile(point_masses(), &[&[("X", 1.0)]]);
    let scorer = SequenceScorer::default();
    let likelihoods = scorer.likelihoods(&pdta, &seq(&[("X", 98.0)])).unwrap();
    assert_eq!(scorer.features(&likelihoods), [LOG_FLOOR, LOG_FLOOR]);

    let empty = scorer.likelihoods(&pdta, &TimedSequence::default()).unwrap();
    assert_eq!(scorer.features(&empty), [LOG_FLOOR, 0.0]);
}
