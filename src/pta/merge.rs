// State merging and critical-area collapsing
//
// `merge(a, b)` folds state b into state a. Folding outgoing transitions
// that share a sub-event makes their targets equivalent too, so a single
// merge request expands into a closure. Pending pairs go through a FIFO
// worklist instead of recursion; each processed pair removes one live
// state, so the closure always terminates.
//
// Critical-area removal looks at outgoing transitions labelled with a
// critical-area sub-event. Once such a transition has been taken more often
// than the "almost surely" threshold of its single realised neighbour, it is
// folded into that neighbour's transition and the targets are merged.

use super::{Pta, StateId, TransitionId};
use crate::error::{PdtaError, Result};
use crate::event::SubEventKey;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, trace, warn};

/// When critical-area transitions are collapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalRemoval {
    /// Keep every critical transition
    Disabled,
    /// One breadth-first pass over all states
    #[default]
    SinglePass,
    /// Visit every state a fold merged into right after the fold
    ///
    /// Folds only merge into children of the state being visited, which the
    /// breadth-first pass reaches later anyway, so the collapsed tree and the
    /// report match `SinglePass`. Only the visiting order differs.
    Recursive,
}

/// What to do when a critical transition has both or neither neighbour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousMergePolicy {
    /// Leave the transition in place and count the case
    #[default]
    Skip,
    /// Abort with [`PdtaError::AmbiguousMerge`]
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub critical_removal: CriticalRemoval,
    pub ambiguous: AmbiguousMergePolicy,
}

/// Bookkeeping of a merge run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeReport {
    /// State pairs actually merged (one state removed each)
    pub merged_pairs: usize,
    /// Outgoing transitions folded into an existing one
    pub folded_transitions: usize,
    /// Critical transitions folded into a neighbour
    pub critical_folds: usize,
    /// Critical transitions left alone because of both/neither neighbours
    pub ambiguous: usize,
    pub states_swept: usize,
}

impl MergeReport {
    pub fn absorb(&mut self, other: MergeReport) {
        self.merged_pairs += other.merged_pairs;
        self.folded_transitions += other.folded_transitions;
        self.critical_folds += other.critical_folds;
        self.ambiguous += other.ambiguous;
        self.states_swept += other.states_swept;
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge `b` into `a` and everything that follows from it
    ///
    /// Both states are resolved to their current representatives first;
    /// merging a state with itself (or an already merged pair) does nothing.
    /// The root always survives.
    pub fn merge(&self, pta: &mut Pta, a: StateId, b: StateId) -> MergeReport {
        let mut report = MergeReport::default();
        let mut pending = VecDeque::from([(a, b)]);

        while let Some((a, b)) = pending.pop_front() {
            let mut survivor = pta.representative(a);
            let mut absorbed = pta.representative(b);
            if survivor == absorbed {
                continue;
            }
            if absorbed == StateId::ROOT {
                std::mem::swap(&mut survivor, &mut absorbed);
            }
            trace!(%survivor, %absorbed, "merging states");

            Self::redirect_incoming(pta, survivor, absorbed, &mut report);
            Self::move_outgoing(pta, survivor, absorbed, &mut pending, &mut report);

            pta.states[absorbed.0].removed = true;
            pta.merged.union_into(survivor.0, absorbed.0);
            let was_tail = pta.tails.remove(&absorbed);
            if !pta.states[survivor.0].is_leaf() {
                pta.tails.remove(&survivor);
            } else if was_tail {
                pta.tails.insert(survivor);
            }
            report.merged_pairs += 1;
        }

        report
    }

    /// Point every transition entering `absorbed` at `survivor`
    fn redirect_incoming(
        pta: &mut Pta,
        survivor: StateId,
        absorbed: StateId,
        report: &mut MergeReport,
    ) {
        let incoming = std::mem::take(&mut pta.states[absorbed.0].incoming);
        for (key, by_source) in incoming {
            for (source, tid) in by_source {
                let existing = pta.states[survivor.0]
                    .incoming
                    .get(&key)
                    .and_then(|m| m.get(&source))
                    .copied();
                match existing {
                    Some(kept) if kept != tid => {
                        // source already reaches the survivor on this sub-event
                        Self::fold_into(pta, kept, tid);
                        pta.transitions[tid.0].removed = true;
                        if pta.states[source.0].outgoing.get(&key) == Some(&tid) {
                            pta.states[source.0].outgoing.insert(key, kept);
                        }
                        report.folded_transitions += 1;
                    }
                    _ => {
                        pta.transitions[tid.0].target = survivor;
                        pta.states[survivor.0]
                            .incoming
                            .entry(key)
                            .or_default()
                            .insert(source, tid);
                    }
                }
            }
        }
    }

    /// Move or fold every transition leaving `absorbed` onto `survivor`
    fn move_outgoing(
        pta: &mut Pta,
        survivor: StateId,
        absorbed: StateId,
        pending: &mut VecDeque<(StateId, StateId)>,
        report: &mut MergeReport,
    ) {
        let outgoing = std::mem::take(&mut pta.states[absorbed.0].outgoing);
        for (key, tid) in outgoing {
            let target = pta.transitions[tid.0].target;
            pta.unregister_incoming(target, key, absorbed, tid);

            match pta.states[survivor.0].outgoing.get(&key).copied() {
                Some(kept) => {
                    Self::fold_into(pta, kept, tid);
                    pta.transitions[tid.0].removed = true;
                    pending.push_back((pta.transitions[kept.0].target, target));
                    report.folded_transitions += 1;
                }
                None => {
                    pta.transitions[tid.0].source = survivor;
                    pta.states[survivor.0].outgoing.insert(key, tid);
                    pta.states[target.0]
                        .incoming
                        .entry(key)
                        .or_default()
                        .insert(survivor, tid);
                }
            }
        }
    }

    /// Add `from`'s count and span to `into`
    fn fold_into(pta: &mut Pta, into: TransitionId, from: TransitionId) {
        let (count, span) = {
            let t = &pta.transitions[from.0];
            (t.count, t.span)
        };
        let kept = &mut pta.transitions[into.0];
        kept.count += count;
        kept.span = kept.span.hull(&span);
    }

    /// Collapse the critical-area transitions leaving one state
    ///
    /// Returns the report and the states the folds merged into, so callers
    /// can revisit them.
    pub fn remove_critical_transitions(
        &self,
        pta: &mut Pta,
        state: StateId,
    ) -> Result<(MergeReport, Vec<StateId>)> {
        let state = pta.representative(state);
        let mut report = MergeReport::default();
        let mut merged_into = Vec::new();

        let critical: Vec<(SubEventKey, TransitionId)> = pta.states[state.0]
            .outgoing()
            .filter(|(key, _)| pta.dictionary.sub_event(*key).is_critical())
            .collect();

        for (key, tid) in critical {
            // an earlier fold in this pass may have merged the state away
            let state = pta.representative(state);
            if pta.states[state.0].outgoing_for(key) != Some(tid) {
                continue;
            }
            let Some(area) = pta.dictionary.sub_event(key).critical_area().copied() else {
                continue;
            };

            let (left, right) = pta.dictionary.neighbours(key);
            let left = left
                .and_then(|k| pta.states[state.0].outgoing_for(k))
                .zip(area.left);
            let right = right
                .and_then(|k| pta.states[state.0].outgoing_for(k))
                .zip(area.right);

            let (neighbour, threshold) = match (left, right) {
                (Some((t, a)), None) | (None, Some((t, a))) => (t, a.threshold),
                _ => {
                    let name = &pta.dictionary.sub_event(key).name;
                    match self.config.ambiguous {
                        AmbiguousMergePolicy::Skip => {
                            debug!(%state, sub_event = %name, "ambiguous critical transition left in place");
                            report.ambiguous += 1;
                            continue;
                        }
                        AmbiguousMergePolicy::Reject => {
                            warn!(%state, sub_event = %name, "ambiguous critical transition");
                            return Err(PdtaError::AmbiguousMerge {
                                state: state.0,
                                sub_event: name.clone(),
                            });
                        }
                    }
                }
            };

            let count = pta.transitions[tid.0].count;
            if count <= threshold {
                continue;
            }

            let critical_target = pta.transitions[tid.0].target;
            Self::fold_into(pta, neighbour, tid);
            pta.detach(tid);
            let neighbour_target = pta.transitions[neighbour.0].target;
            trace!(%state, count, threshold, "folding critical transition into neighbour");

            report.absorb(self.merge(pta, neighbour_target, critical_target));
            report.critical_folds += 1;
            merged_into.push(pta.representative(neighbour_target));
        }

        Ok((report, merged_into))
    }

    /// Apply the configured critical removal to the whole PTA, then sweep
    pub fn collapse_critical_areas(&self, pta: &mut Pta) -> Result<MergeReport> {
        let mut report = MergeReport::default();
        if self.config.critical_removal == CriticalRemoval::Disabled {
            return Ok(report);
        }

        let states_before = pta.state_count();
        // each live state is visited once, whichever route reaches it first
        let mut visited = vec![false; pta.states.len()];
        for state in pta.breadth_first_states() {
            if pta.states[state.0].removed || visited[state.0] {
                continue;
            }
            let mut stack = vec![state];
            while let Some(current) = stack.pop() {
                let current = pta.representative(current);
                if visited[current.0] {
                    continue;
                }
                visited[current.0] = true;
                let (pass, merged_into) = self.remove_critical_transitions(pta, current)?;
                report.absorb(pass);
                if self.config.critical_removal == CriticalRemoval::Recursive {
                    stack.extend(merged_into);
                }
            }
        }

        report.states_swept = pta.sweep().states_dropped;
        info!(
            states_before,
            states_after = pta.state_count(),
            critical_folds = report.critical_folds,
            ambiguous = report.ambiguous,
            "collapsed critical areas"
        );
        Ok(report)
    }
}
