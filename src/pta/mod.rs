// Prefix-tree automaton built from training sequences
//
// Every training sequence is resolved to a path of sub-events and inserted
// from the root: shared prefixes reuse (and count) existing transitions,
// the remainder grows a fresh branch. No attempt is made to find equivalent
// branches elsewhere; that is the merge engine's job.
//
// Ownership: the PTA owns flat arenas of states and transitions addressed by
// index. States reference transitions, transitions reference states, and
// neither ever owns the other. Merged-away states stay in the arena (marked
// removed, tracked by a disjoint set) until `sweep` compacts everything.

mod disjoint_set;
mod merge;

pub use disjoint_set::DisjointSet;
pub use merge::{AmbiguousMergePolicy, CriticalRemoval, MergeConfig, MergeEngine, MergeReport};

use crate::error::Result;
use crate::event::{EventDictionary, SubEventKey};
use crate::interval::Interval;
use crate::sequence::TimedSequence;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Index of a state in the PTA arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    pub const ROOT: StateId = StateId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Index of a transition in the PTA arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(usize);

impl TransitionId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct PtaState {
    id: StateId,
    father: Option<StateId>,
    /// sub-event → source state → transition
    incoming: BTreeMap<SubEventKey, BTreeMap<StateId, TransitionId>>,
    /// at most one transition per sub-event
    outgoing: BTreeMap<SubEventKey, TransitionId>,
    removed: bool,
}

impl PtaState {
    fn new(id: StateId, father: Option<StateId>) -> Self {
        Self {
            id,
            father,
            incoming: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            removed: false,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn father(&self) -> Option<StateId> {
        self.father
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn outgoing(&self) -> impl Iterator<Item = (SubEventKey, TransitionId)> + '_ {
        self.outgoing.iter().map(|(k, t)| (*k, *t))
    }

    pub fn outgoing_for(&self, key: SubEventKey) -> Option<TransitionId> {
        self.outgoing.get(&key).copied()
    }

    pub fn incoming(&self) -> impl Iterator<Item = TransitionId> + '_ {
        self.incoming.values().flat_map(|by_source| by_source.values().copied())
    }

    pub fn is_leaf(&self) -> bool {
        self.outgoing.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PtaTransition {
    source: StateId,
    target: StateId,
    sub_event: SubEventKey,
    count: u64,
    /// Time range routed through this transition: the sub-event bound plus
    /// any critical areas folded into it
    span: Interval,
    removed: bool,
}

impl PtaTransition {
    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn target(&self) -> StateId {
        self.target
    }

    pub fn sub_event(&self) -> SubEventKey {
        self.sub_event
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn span(&self) -> Interval {
        self.span
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

/// Counts of what a sweep discarded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub states_dropped: usize,
    pub transitions_dropped: usize,
}

/// The prefix-tree automaton
#[derive(Debug, Clone)]
pub struct Pta {
    dictionary: Arc<EventDictionary>,
    states: Vec<PtaState>,
    transitions: Vec<PtaTransition>,
    merged: DisjointSet,
    tails: BTreeSet<StateId>,
    depth: usize,
    sequence_count: u64,
}

impl Pta {
    /// Empty PTA holding only the root
    pub fn new(dictionary: Arc<EventDictionary>) -> Self {
        let mut tails = BTreeSet::new();
        tails.insert(StateId::ROOT);
        Self {
            dictionary,
            states: vec![PtaState::new(StateId::ROOT, None)],
            transitions: Vec::new(),
            merged: DisjointSet::new(1),
            tails,
            depth: 0,
            sequence_count: 0,
        }
    }

    /// Insert one training sequence and return the state it ends in
    ///
    /// Every step is resolved before the tree is touched, so a sequence with
    /// an unknown symbol or an uncovered time leaves the PTA unchanged.
    ///
    /// # Example
    /// ```
    /// use pdta::event::{Event, EventDictionary, SubEvent};
    /// use pdta::pta::{Pta, StateId};
    /// use pdta::sequence::TimedSequence;
    /// use std::sync::Arc;
    ///
    /// let dictionary = EventDictionary::new(vec![Event::new(
    ///     "X",
    ///     vec![SubEvent::dirac("X.1".to_string(), 1.0)],
    /// )]);
    /// let mut pta = Pta::new(Arc::new(dictionary));
    /// pta.add_sequence(&TimedSequence::from_pairs([("X", 1.0), ("X", 1.0)])).unwrap();
    /// pta.add_sequence(&TimedSequence::from_pairs([("X", 1.0)])).unwrap();
    ///
    /// assert_eq!(pta.state_count(), 3);
    /// assert_eq!(pta.depth(), 2);
    /// assert_eq!(pta.outgoing_count(StateId::ROOT), 2);
    /// ```
    pub fn add_sequence(&mut self, sequence: &TimedSequence) -> Result<StateId> {
        let path = sequence
            .iter()
            .map(|(symbol, time)| self.dictionary.resolve(symbol, time))
            .collect::<Result<Vec<_>>>()?;

        if path.is_empty() {
            debug!("skipping empty training sequence");
            return Ok(StateId::ROOT);
        }

        let mut current = self.representative(StateId::ROOT);
        for key in path {
            current = match self.states[current.0].outgoing.get(&key).copied() {
                Some(tid) => {
                    self.transitions[tid.0].count += 1;
                    self.representative(self.transitions[tid.0].target)
                }
                None => {
                    self.tails.remove(&current);
                    let child = self.new_state(Some(current));
                    self.attach(current, child, key, 1);
                    child
                }
            };
        }

        if self.states[current.0].is_leaf() {
            self.tails.insert(current);
        }
        self.depth = self.depth.max(sequence.len());
        self.sequence_count += 1;
        trace!(end = %current, length = sequence.len(), "inserted training sequence");
        Ok(current)
    }

    pub fn dictionary(&self) -> &Arc<EventDictionary> {
        &self.dictionary
    }

    pub fn root(&self) -> StateId {
        StateId::ROOT
    }

    pub fn state(&self, id: StateId) -> &PtaState {
        &self.states[id.0]
    }

    pub fn transition(&self, id: TransitionId) -> &PtaTransition {
        &self.transitions[id.0]
    }

    /// Current representative of a possibly merged-away state
    pub fn representative(&self, id: StateId) -> StateId {
        StateId(self.merged.resolve(id.0))
    }

    /// States not merged away, in arena order
    pub fn live_states(&self) -> impl Iterator<Item = &PtaState> + '_ {
        self.states.iter().filter(|s| !s.removed)
    }

    pub fn state_count(&self) -> usize {
        self.live_states().count()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.iter().filter(|t| !t.removed).count()
    }

    pub fn incoming_count(&self, id: StateId) -> u64 {
        self.states[id.0]
            .incoming()
            .map(|t| self.transitions[t.0].count)
            .sum()
    }

    pub fn outgoing_count(&self, id: StateId) -> u64 {
        self.states[id.0]
            .outgoing
            .values()
            .map(|t| self.transitions[t.0].count)
            .sum()
    }

    /// Number of sequences ending in the state: `max(0, in - out)`
    pub fn end_count(&self, id: StateId) -> u64 {
        self.incoming_count(id)
            .saturating_sub(self.outgoing_count(id))
    }

    /// Target states of the live outgoing transitions, in sub-event order
    pub fn children(&self, id: StateId) -> Vec<StateId> {
        self.states[id.0]
            .outgoing
            .values()
            .map(|t| self.transitions[t.0].target)
            .collect()
    }

    pub fn tails(&self) -> &BTreeSet<StateId> {
        &self.tails
    }

    /// Length of the longest inserted sequence
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn sequence_count(&self) -> u64 {
        self.sequence_count
    }

    /// Live states reachable from the root, breadth first
    pub fn breadth_first_states(&self) -> Vec<StateId> {
        let mut seen = vec![false; self.states.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([StateId::ROOT]);
        seen[0] = true;
        while let Some(state) = queue.pop_front() {
            order.push(state);
            for child in self.children(state) {
                if !seen[child.0] && !self.states[child.0].removed {
                    seen[child.0] = true;
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// Drop removed and unreachable states/transitions and renumber the
    /// arenas breadth first from the root
    pub fn sweep(&mut self) -> SweepReport {
        let order = self.breadth_first_states();
        let mut remap: Vec<Option<StateId>> = vec![None; self.states.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.0] = Some(StateId(new));
        }

        let mut states: Vec<PtaState> = order
            .iter()
            .enumerate()
            .map(|(new, old)| {
                let father = self.states[old.0]
                    .father
                    .map(|f| self.representative(f))
                    .and_then(|f| remap[f.0]);
                PtaState::new(StateId(new), father)
            })
            .collect();

        let mut transitions = Vec::new();
        for transition in &self.transitions {
            if transition.removed {
                continue;
            }
            let (Some(source), Some(target)) =
                (remap[transition.source.0], remap[transition.target.0])
            else {
                continue;
            };
            let id = TransitionId(transitions.len());
            states[source.0].outgoing.insert(transition.sub_event, id);
            states[target.0]
                .incoming
                .entry(transition.sub_event)
                .or_default()
                .insert(source, id);
            transitions.push(PtaTransition {
                source,
                target,
                ..transition.clone()
            });
        }

        let tails = self
            .tails
            .iter()
            .filter_map(|t| remap[self.representative(*t).0])
            .filter(|t| states[t.0].is_leaf())
            .collect();

        let report = SweepReport {
            states_dropped: self.states.len() - states.len(),
            transitions_dropped: self.transitions.len() - transitions.len(),
        };
        self.merged = DisjointSet::new(states.len());
        self.states = states;
        self.transitions = transitions;
        self.tails = tails;
        debug!(
            states = self.states.len(),
            transitions = self.transitions.len(),
            dropped_states = report.states_dropped,
            "swept PTA arenas"
        );
        report
    }

    fn new_state(&mut self, father: Option<StateId>) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(PtaState::new(id, father));
        self.merged.push();
        id
    }

    /// Create a transition and register it on both endpoints
    fn attach(
        &mut self,
        source: StateId,
        target: StateId,
        sub_event: SubEventKey,
        count: u64,
    ) -> TransitionId {
        let id = TransitionId(self.transitions.len());
        let span = self.dictionary.sub_event(sub_event).bound;
        self.transitions.push(PtaTransition {
            source,
            target,
            sub_event,
            count,
            span,
            removed: false,
        });
        self.states[source.0].outgoing.insert(sub_event, id);
        self.states[target.0]
            .incoming
            .entry(sub_event)
            .or_default()
            .insert(source, id);
        id
    }

    /// Unregister a transition from both endpoints and mark it removed
    fn detach(&mut self, id: TransitionId) {
        let (source, target, key) = {
            let t = &self.transitions[id.0];
            (t.source, t.target, t.sub_event)
        };
        if self.states[source.0].outgoing.get(&key) == Some(&id) {
            self.states[source.0].outgoing.remove(&key);
        }
        self.unregister_incoming(target, key, source, id);
        self.transitions[id.0].removed = true;
    }

    fn unregister_incoming(
        &mut self,
        target: StateId,
        key: SubEventKey,
        source: StateId,
        id: TransitionId,
    ) {
        let incoming = &mut self.states[target.0].incoming;
        if let Some(by_source) = incoming.get_mut(&key) {
            if by_source.get(&source) == Some(&id) {
                by_source.remove(&source);
            }
            if by_source.is_empty() {
                incoming.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests;
