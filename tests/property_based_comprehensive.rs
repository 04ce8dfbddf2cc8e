//! Property-based tests for the learning pipeline
//!
//! Properties covered:
//! 1. Compiled states carry unit probability mass
//! 2. Warning intervals nest in anomaly intervals, which cover the bound of
//!    every regular sub-event
//! 3. Training sequences are accepted by the automaton built from them
//! 4. Merge closure is idempotent
//! 5. Scoring never fails on known symbols, whatever the delays

use pdta::config::PipelineConfig;
use pdta::event::SubEvent;
use pdta::pipeline::AnomalyDetector;
use pdta::pta::{MergeEngine, MergeReport, Pta};
use pdta::scoring::SequenceScorer;
use pdta::sequence::{collect_time_samples, TimedSequence};
use pdta::splitter::SubEventSplitter;
use proptest::prelude::*;
use std::sync::Arc;

const SYMBOLS: [&str; 3] = ["a", "b", "c"];

/// One step: symbol, fast or slow regime, jitter inside the regime
fn step() -> impl Strategy<Value = (usize, bool, f64)> {
    (0usize..SYMBOLS.len(), any::<bool>(), 0.0f64..1.0)
}

fn sequence() -> impl Strategy<Value = TimedSequence> {
    prop::collection::vec(step(), 1..5).prop_map(|steps| {
        TimedSequence::from_pairs(steps.into_iter().map(|(symbol, slow, jitter)| {
            let time = if slow {
                40.0 + 4.0 * jitter
            } else {
                2.0 + jitter
            };
            (SYMBOLS[symbol], time)
        }))
    })
}

fn training_set() -> impl Strategy<Value = Vec<TimedSequence>> {
    prop::collection::vec(sequence(), 5..25)
}

fn check_nesting(sub: &SubEvent) {
    assert!(
        sub.warning.is_subset_of(&sub.anomaly),
        "{}: warning {:?} outside anomaly {:?}",
        sub.name,
        sub.warning,
        sub.anomaly
    );
    if !sub.is_critical() {
        assert!(
            sub.bound.is_subset_of(&sub.anomaly),
            "{}: bound {:?} outside anomaly {:?}",
            sub.name,
            sub.bound,
            sub.anomaly
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_probability_mass_is_one(training in training_set()) {
        let detector = AnomalyDetector::train(PipelineConfig::default(), &training).unwrap();
        for (index, state) in detector.automaton().states().iter().enumerate() {
            let mass = state.probability_mass();
            prop_assert!((mass - 1.0).abs() <= 1e-9, "state {} has mass {}", index, mass);
        }
    }

    #[test]
    fn prop_intervals_nest(training in training_set(), seed in any::<u64>()) {
        let samples = collect_time_samples(&training);
        let dictionary = SubEventSplitter::new(Default::default())
            .unwrap()
            .split_all(&samples, seed)
            .unwrap();
        for event in dictionary.events() {
            for sub in &event.sub_events {
                check_nesting(sub);
            }
        }
    }

    #[test]
    fn prop_training_sequences_are_accepted(training in training_set()) {
        let detector = AnomalyDetector::train(PipelineConfig::default(), &training).unwrap();
        let scorer = SequenceScorer::default();
        for sequence in &training {
            let likelihoods = scorer.likelihoods(detector.automaton(), sequence).unwrap();
            prop_assert_eq!(likelihoods.accepted_steps, sequence.len());
            prop_assert!(
                likelihoods.event.iter().all(|p| *p > 0.0),
                "rejected {:?}: {:?}",
                sequence,
                likelihoods.event
            );
        }
    }

    #[test]
    fn prop_merge_closure_is_idempotent(
        training in training_set(),
        picks in (any::<prop::sample::Index>(), any::<prop::sample::Index>()),
    ) {
        let samples = collect_time_samples(&training);
        let dictionary = SubEventSplitter::new(Default::default())
            .unwrap()
            .split_all(&samples, 0)
            .unwrap();
        let mut pta = Pta::new(Arc::new(dictionary));
        for sequence in &training {
            pta.add_sequence(sequence).unwrap();
        }

        let states = pta.breadth_first_states();
        let a = states[picks.0.index(states.len())];
        let b = states[picks.1.index(states.len())];
        let engine = MergeEngine::default();

        engine.merge(&mut pta, a, b);
        let converged = pta.state_count();
        let again = engine.merge(&mut pta, a, b);

        prop_assert_eq!(again, MergeReport::default());
        prop_assert_eq!(pta.state_count(), converged);
    }

    #[test]
    fn prop_scoring_known_symbols_never_fails(
        training in training_set(),
        candidate in prop::collection::vec((0usize..SYMBOLS.len(), 0.0f64..1000.0), 0..8),
    ) {
        let detector = AnomalyDetector::train(PipelineConfig::default(), &training).unwrap();
        let known: Vec<&str> = SYMBOLS
            .iter()
            .copied()
            .filter(|s| detector.automaton().dictionary().event_index(s).is_ok())
            .collect();
        prop_assume!(!known.is_empty());

        let candidate = TimedSequence::from_pairs(
            candidate.into_iter().map(|(symbol, time)| (known[symbol % known.len()], time)),
        );
        let score = detector.score(&candidate).unwrap();
        prop_assert_eq!(score.likelihoods.event.len(), candidate.len() + 1);
        prop_assert!(score.likelihoods.event.iter().all(|p| (0.0..=1.0).contains(p)));
        prop_assert!(score.likelihoods.time.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
