// Tests for PTA construction, merge closure and critical-area collapsing
//
// Dictionaries are built by hand so every boundary is known:
//   X.1 ~ N(10, 1) on [0, 50), X.2 ~ N(90, 2) on [50, inf), z = 3 / 2
// After isolation: X.|1 [0,7)  X.1 [7,13)  X.1|2 [13,84)  X.2 [84,96)  X.2| [96,inf)
// Both neighbours of X.1|2 enter it with p = 1 - Phi(3), threshold 7.

use super::*;
use crate::error::PdtaError;
use crate::event::{Event, SubEvent};

fn two_regimes() -> Event {
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
    Event::new("X", vec![low, high])
}

fn plain_pta() -> Pta {
    Pta::new(Arc::new(EventDictionary::new(vec![two_regimes()])))
}

fn isolated_pta() -> Pta {
    let mut dictionary = EventDictionary::new(vec![two_regimes()]);
    dictionary.isolate_critical_areas();
    Pta::new(Arc::new(dictionary))
}

fn insert(pta: &mut Pta, pairs: &[(&str, f64)]) -> StateId {
    pta.add_sequence(&TimedSequence::from_pairs(pairs.iter().copied()))
        .unwrap()
}

fn insert_times(pta: &mut Pta, pairs: &[(&str, f64)], times: usize) {
    for _ in 0..times {
        insert(pta, pairs);
    }
}

fn engine(critical_removal: CriticalRemoval, ambiguous: AmbiguousMergePolicy) -> MergeEngine {
    MergeEngine::new(MergeConfig {
        critical_removal,
        ambiguous,
    })
}

fn transition_on<'a>(pta: &'a Pta, state: StateId, name: &str) -> Option<&'a PtaTransition> {
    pta.state(state)
        .outgoing()
        .find(|(key, _)| pta.dictionary().sub_event(*key).name == name)
        .map(|(_, t)| pta.transition(t))
}

// ============================================================================
// Insertion
// ============================================================================

#[test]
fn test_two_single_step_sequences_branch_from_root() {
    let mut pta = plain_pta();
    let fast = insert(&mut pta, &[("X", 1.0)]);
    let slow = insert(&mut pta, &[("X", 99.0)]);

    assert_ne!(fast, slow);
    assert_eq!(pta.state_count(), 3);
    assert_eq!(pta.transition_count(), 2);
    assert_eq!(pta.outgoing_count(StateId::ROOT), 2);
    for state in [fast, slow] {
        assert_eq!(pta.incoming_count(state), 1);
        assert_eq!(pta.end_count(state), 1);
        assert_eq!(pta.state(state).father(), Some(StateId::ROOT));
    }
    assert_eq!(pta.tails().len(), 2);
}

#[test]
fn test_shared_prefix_increments_counts() {
    let mut pta = plain_pta();
    insert_times(&mut pta, &[("X", 1.0), ("X", 2.0)], 2);
    let short = insert(&mut pta, &[("X", 3.0)]);

    assert_eq!(pta.state_count(), 3);
    assert_eq!(transition_on(&pta, StateId::ROOT, "X.1").unwrap().count(), 3);
    assert_eq!(transition_on(&pta, short, "X.1").unwrap().count(), 2);
    assert_eq!(pta.end_count(short), 1);
    assert_eq!(pta.depth(), 2);
    assert_eq!(pta.sequence_count(), 3);
    assert!(!pta.tails().contains(&short));
    assert_eq!(pta.tails().len(), 1);
}

#[test]
fn test_failing_sequence_leaves_tree_untouched() {
    let mut pta = plain_pta();
    let result = pta.add_sequence(&TimedSequence::from_pairs([("X", 1.0), ("Z", 1.0)]));
    assert!(matches!(result, Err(PdtaError::UnknownSymbol(ref s)) if s == "Z"));

    let result = pta.add_sequence(&TimedSequence::from_pairs([("X", -1.0)]));
    assert!(matches!(result, Err(PdtaError::NoCoveringSubEvent { .. })));

    assert_eq!(pta.state_count(), 1);
    assert_eq!(pta.sequence_count(), 0);
}

#[test]
fn test_empty_sequence_is_skipped() {
    let mut pta = plain_pta();
    let end = pta.add_sequence(&TimedSequence::default()).unwrap();
    assert_eq!(end, StateId::ROOT);
    assert_eq!(pta.sequence_count(), 0);
    assert_eq!(pta.depth(), 0);
}

// ============================================================================
// Merge closure
// ============================================================================

/// root -X.1-> a -X.1-> c and root -X.2-> b -X.1-> d
fn diamond() -> (Pta, StateId, StateId) {
    let mut pta = plain_pta();
    insert(&mut pta, &[("X", 1.0), ("X", 1.0)]);
    insert(&mut pta, &[("X", 99.0), ("X", 1.0)]);
    let a = transition_on(&pta, StateId::ROOT, "X.1").unwrap().target();
    let b = transition_on(&pta, StateId::ROOT, "X.2").unwrap().target();
    (pta, a, b)
}

#[test]
fn test_merge_cascades_into_children() {
    let (mut pta, a, b) = diamond();
    let report = MergeEngine::default().merge(&mut pta, a, b);

    assert_eq!(report.merged_pairs, 2);
    assert_eq!(report.folded_transitions, 1);
    assert_eq!(pta.state_count(), 3);
    assert_eq!(pta.transition_count(), 3);
    assert_eq!(pta.representative(b), a);
    assert!(pta.state(b).is_removed());

    let child = transition_on(&pta, a, "X.1").unwrap();
    assert_eq!(child.count(), 2);
    assert_eq!(pta.end_count(child.target()), 2);
    assert_eq!(pta.incoming_count(a), 2);
    assert_eq!(pta.tails().len(), 1);
}

#[test]
fn test_merge_is_idempotent() {
    let (mut pta, a, b) = diamond();
    let engine = MergeEngine::default();
    engine.merge(&mut pta, a, b);
    let states = pta.state_count();

    let again = engine.merge(&mut pta, a, b);
    assert_eq!(again, MergeReport::default());
    assert_eq!(pta.state_count(), states);

    let reversed = engine.merge(&mut pta, b, a);
    assert_eq!(reversed.merged_pairs, 0);
}

#[test]
fn test_merge_into_root_builds_self_loop() {
    let mut pta = plain_pta();
    let a = {
        insert(&mut pta, &[("X", 1.0), ("X", 1.0)]);
        transition_on(&pta, StateId::ROOT, "X.1").unwrap().target()
    };
    // root is kept even when named second
    MergeEngine::default().merge(&mut pta, a, StateId::ROOT);

    assert_eq!(pta.state_count(), 1);
    assert_eq!(pta.transition_count(), 1);
    let self_loop = transition_on(&pta, StateId::ROOT, "X.1").unwrap();
    assert_eq!(self_loop.target(), StateId::ROOT);
    assert_eq!(self_loop.count(), 2);
    assert_eq!(pta.end_count(StateId::ROOT), 0);
}

#[test]
fn test_sweep_renumbers_breadth_first() {
    let (mut pta, a, b) = diamond();
    MergeEngine::default().merge(&mut pta, a, b);
    let report = pta.sweep();

    assert_eq!(report.states_dropped, 2);
    assert_eq!(report.transitions_dropped, 1);
    assert_eq!(pta.breadth_first_states(), vec![StateId(0), StateId(1), StateId(2)]);
    for state in pta.live_states() {
        assert_eq!(pta.representative(state.id()), state.id());
    }
    assert_eq!(pta.state(StateId(2)).father(), Some(StateId(1)));
    assert_eq!(pta.tails().iter().copied().collect::<Vec<_>>(), vec![StateId(2)]);
}

// ============================================================================
// Critical-area collapsing
// ============================================================================

#[test]
fn test_critical_transition_folds_above_threshold() {
    let mut pta = isolated_pta();
    insert(&mut pta, &[("X", 10.0)]);
    insert_times(&mut pta, &[("X", 20.0)], 8);

    let report = engine(CriticalRemoval::SinglePass, AmbiguousMergePolicy::Skip)
        .collapse_critical_areas(&mut pta)
        .unwrap();

    assert_eq!(report.critical_folds, 1);
    assert_eq!(report.states_swept, 1);
    assert_eq!(pta.state_count(), 2);
    let kept = transition_on(&pta, StateId::ROOT, "X.1").unwrap();
    assert_eq!(kept.count(), 9);
    assert_eq!(kept.span(), Interval::new(7.0, 84.0).unwrap());
    assert_eq!(pta.end_count(kept.target()), 9);
}

#[test]
fn test_critical_transition_at_threshold_is_kept() {
    let mut pta = isolated_pta();
    insert(&mut pta, &[("X", 10.0)]);
    insert_times(&mut pta, &[("X", 20.0)], 7);

    let report = engine(CriticalRemoval::SinglePass, AmbiguousMergePolicy::Skip)
        .collapse_critical_areas(&mut pta)
        .unwrap();

    assert_eq!(report.critical_folds, 0);
    assert_eq!(pta.state_count(), 3);
    assert!(transition_on(&pta, StateId::ROOT, "X.1|2").is_some());
}

#[test]
fn test_critical_fold_merges_subtrees() {
    let mut pta = isolated_pta();
    insert(&mut pta, &[("X", 10.0), ("X", 90.0)]);
    insert_times(&mut pta, &[("X", 20.0), ("X", 90.0)], 8);

    engine(CriticalRemoval::Recursive, AmbiguousMergePolicy::Skip)
        .collapse_critical_areas(&mut pta)
        .unwrap();

    assert_eq!(pta.state_count(), 3);
    let first = transition_on(&pta, StateId::ROOT, "X.1").unwrap();
    let second = transition_on(&pta, first.target(), "X.2").unwrap();
    assert_eq!(second.count(), 9);
}

#[test]
fn test_recursive_and_single_pass_agree() {
    let mut pta = isolated_pta();
    insert(&mut pta, &[("X", 10.0), ("X", 50.0)]);
    insert_times(&mut pta, &[("X", 20.0), ("X", 50.0)], 8);
    let mut recursive = pta.clone();

    let single = engine(CriticalRemoval::SinglePass, AmbiguousMergePolicy::Skip)
        .collapse_critical_areas(&mut pta)
        .unwrap();
    let revisited = engine(CriticalRemoval::Recursive, AmbiguousMergePolicy::Skip)
        .collapse_critical_areas(&mut recursive)
        .unwrap();

    // the root fold merges both subtrees, leaving X.1|2 with no neighbour below
    assert_eq!(single.critical_folds, 1);
    assert_eq!(single.ambiguous, 1);
    assert_eq!(revisited, single);

    assert_eq!(recursive.state_count(), pta.state_count());
    for tree in [&pta, &recursive] {
        let first = transition_on(tree, StateId::ROOT, "X.1").unwrap();
        assert_eq!(first.count(), 9);
        let second = transition_on(tree, first.target(), "X.1|2").unwrap();
        assert_eq!(second.count(), 9);
    }
}

#[test]
fn test_both_neighbours_is_ambiguous() {
    let mut pta = isolated_pta();
    insert(&mut pta, &[("X", 10.0)]);
    insert(&mut pta, &[("X", 90.0)]);
    insert_times(&mut pta, &[("X", 50.0)], 20);

    let skip = engine(CriticalRemoval::SinglePass, AmbiguousMergePolicy::Skip)
        .collapse_critical_areas(&mut pta.clone())
        .unwrap();
    assert_eq!(skip.ambiguous, 1);
    assert_eq!(skip.critical_folds, 0);

    let reject = engine(CriticalRemoval::SinglePass, AmbiguousMergePolicy::Reject)
        .collapse_critical_areas(&mut pta);
    assert!(matches!(
        reject,
        Err(PdtaError::AmbiguousMerge { state: 0, ref sub_event }) if sub_event == "X.1|2"
    ));
}

#[test]
fn test_no_neighbour_is_ambiguous() {
    let mut pta = isolated_pta();
    insert_times(&mut pta, &[("X", 50.0)], 20);

    let report = engine(CriticalRemoval::Recursive, AmbiguousMergePolicy::Skip)
        .collapse_critical_areas(&mut pta)
        .unwrap();
    assert_eq!(report.ambiguous, 1);
    assert_eq!(pta.state_count(), 2);
}

#[test]
fn test_disabled_removal_keeps_tree() {
    let mut pta = isolated_pta();
    insert(&mut pta, &[("X", 10.0)]);
    insert_times(&mut pta, &[("X", 20.0)], 8);

    let report = engine(CriticalRemoval::Disabled, AmbiguousMergePolicy::Reject)
        .collapse_critical_areas(&mut pta)
        .unwrap();
    assert_eq!(report, MergeReport::default());
    assert_eq!(pta.state_count(), 3);
}
