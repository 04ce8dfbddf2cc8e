//! Training and batch scoring in one place
//!
//! [`AnomalyDetector::train`] runs the whole construction chain:
//!
//! ```text
//! samples -> split (parallel per symbol) -> isolate critical areas
//!         -> insert training sequences -> collapse critical transitions
//!         -> sweep -> compile -> verify
//! ```
//!
//! Construction is single threaded past the split; the trained detector is
//! immutable and scores sequences in parallel.

use crate::classifier::OutlierClassifier;
use crate::compiler::AutomatonCompiler;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::event::EventDictionary;
use crate::isolation_forest::IsolationForest;
use crate::pdta::Pdta;
use crate::pta::{MergeEngine, MergeReport, Pta};
use crate::scoring::{SequenceScore, SequenceScorer};
use crate::sequence::{collect_time_samples, ClassLabel, TimedSequence};
use crate::splitter::SubEventSplitter;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counts describing one training run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrainingSummary {
    pub symbols: usize,
    pub sub_events: usize,
    pub critical_sub_events: usize,
    pub training_sequences: usize,
    /// Sequences labelled as anomalies and left out of training
    pub skipped_sequences: usize,
    pub pta_states: usize,
    pub merged_states: usize,
    pub pdta_states: usize,
    pub pdta_transitions: usize,
    pub merge: MergeReport,
    pub classifier_trained: bool,
}

/// Verdict for one sequence of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSequence {
    /// Position in the input batch
    pub index: usize,
    pub anomalous: bool,
    pub score: Option<SequenceScore>,
    /// Why the sequence could not be scored; it then counts as anomalous
    pub error: Option<String>,
}

/// A trained model plus everything needed to score against it
pub struct AnomalyDetector {
    config: PipelineConfig,
    automaton: Pdta,
    scorer: SequenceScorer,
    classifier: Option<Box<dyn OutlierClassifier>>,
    summary: TrainingSummary,
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("config", &self.config)
            .field("summary", &self.summary)
            .field("classifier", &self.classifier.is_some())
            .finish()
    }
}

impl AnomalyDetector {
    /// Train from sequences, deriving delay samples from them
    ///
    /// Sequences labelled [`ClassLabel::Anomaly`] are not learned from.
    ///
    /// # Example
    /// ```
    /// use pdta::config::PipelineConfig;
    /// use pdta::pipeline::AnomalyDetector;
    /// use pdta::sequence::TimedSequence;
    ///
    /// let training: Vec<_> = (0..20)
    ///     .map(|i| TimedSequence::from_pairs([("open", 1.0 + (i % 10) as f64 * 0.1), ("close", 10.0)]))
    ///     .collect();
    /// let detector = AnomalyDetector::train(PipelineConfig::default(), &training).unwrap();
    ///
    /// let verdict = detector
    ///     .score(&TimedSequence::from_pairs([("close", 10.0), ("open", 2.0)]))
    ///     .unwrap();
    /// assert!(verdict.anomalous);
    /// ```
    pub fn train(config: PipelineConfig, sequences: &[TimedSequence]) -> Result<Self> {
        let normal = normal_sequences(sequences);
        let samples = collect_time_samples(&normal);
        Self::build(config, &samples, &normal, sequences.len(), None)
    }

    /// Train with explicit per-symbol delay samples
    pub fn train_with_samples(
        config: PipelineConfig,
        samples: &BTreeMap<String, Vec<f64>>,
        sequences: &[TimedSequence],
    ) -> Result<Self> {
        let normal = normal_sequences(sequences);
        Self::build(config, samples, &normal, sequences.len(), None)
    }

    /// Train with a caller-provided classifier back-end
    ///
    /// Used instead of the built-in isolation forest when the decision
    /// policy delegates to a classifier.
    pub fn train_with_classifier(
        config: PipelineConfig,
        sequences: &[TimedSequence],
        classifier: Box<dyn OutlierClassifier>,
    ) -> Result<Self> {
        let normal = normal_sequences(sequences);
        let samples = collect_time_samples(&normal);
        Self::build(config, &samples, &normal, sequences.len(), Some(classifier))
    }

    fn build(
        config: PipelineConfig,
        samples: &BTreeMap<String, Vec<f64>>,
        sequences: &[TimedSequence],
        total: usize,
        classifier: Option<Box<dyn OutlierClassifier>>,
    ) -> Result<Self> {
        config.validate()?;

        let dictionary = SubEventSplitter::new(config.splitter.clone())?
            .split_all(samples, config.seed)?;
        let mut summary = TrainingSummary {
            symbols: dictionary.len(),
            sub_events: dictionary.sub_event_count(),
            critical_sub_events: critical_count(&dictionary),
            training_sequences: sequences.len(),
            skipped_sequences: total - sequences.len(),
            ..TrainingSummary::default()
        };

        let mut pta = Pta::new(Arc::new(dictionary));
        for sequence in sequences {
            pta.add_sequence(sequence)?;
        }
        summary.pta_states = pta.state_count();
        debug!(states = summary.pta_states, depth = pta.depth(), "built prefix tree");

        summary.merge = MergeEngine::new(config.merge).collapse_critical_areas(&mut pta)?;
        summary.merged_states = pta.state_count();

        let automaton = AutomatonCompiler::new(config.compiler)?.compile(&pta)?;
        automaton.verify_probability_mass(config.compiler.tolerance)?;
        summary.pdta_states = automaton.state_count();
        summary.pdta_transitions = automaton.transition_count();

        let scorer = SequenceScorer::new(config.scoring)?;
        let classifier = if config.scoring.decision.needs_classifier() {
            let mut classifier = match classifier {
                Some(classifier) => classifier,
                None => Box::new(IsolationForest::new(
                    config.isolation_forest.clone(),
                    config.seed,
                )?) as Box<dyn OutlierClassifier>,
            };
            let features = sequences
                .iter()
                .map(|sequence| {
                    let likelihoods = scorer.likelihoods(&automaton, sequence)?;
                    Ok(scorer.features(&likelihoods).to_vec())
                })
                .collect::<Result<Vec<_>>>()?;
            classifier.train(&features)?;
            summary.classifier_trained = true;
            Some(classifier)
        } else {
            classifier
        };

        info!(
            symbols = summary.symbols,
            sub_events = summary.sub_events,
            pta_states = summary.pta_states,
            pdta_states = summary.pdta_states,
            critical_folds = summary.merge.critical_folds,
            "trained anomaly detector"
        );

        Ok(Self {
            config,
            automaton,
            scorer,
            classifier,
            summary,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn automaton(&self) -> &Pdta {
        &self.automaton
    }

    pub fn summary(&self) -> &TrainingSummary {
        &self.summary
    }

    /// Score one sequence
    pub fn score(&self, sequence: &TimedSequence) -> Result<SequenceScore> {
        self.scorer
            .score(&self.automaton, sequence, self.classifier.as_deref())
    }

    /// Score many sequences in parallel, keeping input order
    ///
    /// A sequence that cannot be scored is reported as anomalous together
    /// with its error; the rest of the batch is unaffected.
    pub fn score_batch(&self, sequences: &[TimedSequence]) -> Vec<ScoredSequence> {
        let results: Vec<ScoredSequence> = sequences
            .par_iter()
            .enumerate()
            .map(|(index, sequence)| self.scored(index, sequence))
            .collect();
        let anomalies = results.iter().filter(|r| r.anomalous).count();
        info!(sequences = results.len(), anomalies, "scored batch");
        results
    }

    /// Same as [`score_batch`](Self::score_batch) on the calling thread
    pub fn score_batch_sequential(&self, sequences: &[TimedSequence]) -> Vec<ScoredSequence> {
        sequences
            .iter()
            .enumerate()
            .map(|(index, sequence)| self.scored(index, sequence))
            .collect()
    }

    fn scored(&self, index: usize, sequence: &TimedSequence) -> ScoredSequence {
        match self.score(sequence) {
            Ok(score) => ScoredSequence {
                index,
                anomalous: score.anomalous,
                score: Some(score),
                error: None,
            },
            Err(error) => {
                warn!(index, %error, "sequence could not be scored");
                ScoredSequence {
                    index,
                    anomalous: true,
                    score: None,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

fn normal_sequences(sequences: &[TimedSequence]) -> Vec<TimedSequence> {
    sequences
        .iter()
        .filter(|s| s.label != Some(ClassLabel::Anomaly))
        .cloned()
        .collect()
}

fn critical_count(dictionary: &EventDictionary) -> usize {
    dictionary
        .events()
        .iter()
        .flat_map(|e| &e.sub_events)
        .filter(|s| s.is_critical())
        .count()
}
