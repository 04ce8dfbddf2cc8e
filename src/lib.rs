//! PDTA - probabilistic deterministic timed automata for timed event sequences
//!
//! This library learns a model of normal behaviour from sequences of
//! `(symbol, delay)` pairs and flags sequences that deviate from it:
//!
//! - [`splitter`]: split each symbol's delays into sub-events at kernel
//!   density minima and isolate the rarely visited critical areas
//! - [`pta`]: prefix tree of the training sequences over sub-events, plus
//!   the merge engine that folds critical transitions into their neighbours
//! - [`compiler`]: turn counts into a [`pdta::Pdta`] with probabilities
//! - [`scoring`]: walk a sequence through the automaton, aggregate
//!   likelihoods and decide
//! - [`pipeline`]: all of the above behind one configuration
//!
//! # Example
//! ```
//! use pdta::{AnomalyDetector, PipelineConfig, TimedSequence};
//!
//! let training: Vec<_> = (0..40)
//!     .map(|i| TimedSequence::from_pairs([("request", 5.0 + (i % 10) as f64 * 0.1), ("reply", 1.0)]))
//!     .collect();
//! let detector = AnomalyDetector::train(PipelineConfig::default(), &training).unwrap();
//!
//! assert!(!detector.score(&training[0]).unwrap().anomalous);
//! assert!(detector.score(&TimedSequence::from_pairs([("reply", 1.0)])).unwrap().anomalous);
//! ```

pub mod classifier;
pub mod compiler;
pub mod config;
pub mod error;
pub mod event;
pub mod interval;
pub mod isolation_forest;
pub mod logging;
pub mod pdta;
pub mod pipeline;
pub mod pta;
pub mod scoring;
pub mod sequence;
pub mod splitter;
pub mod stats;

pub use classifier::OutlierClassifier;
pub use compiler::{AutomatonCompiler, CompilerConfig, IntervalStrategy};
pub use config::PipelineConfig;
pub use error::{PdtaError, Result};
pub use event::{Event, EventDictionary, SubEvent, SubEventKey};
pub use interval::Interval;
pub use isolation_forest::{IsolationForest, IsolationForestConfig};
pub use pdta::Pdta;
pub use pipeline::{AnomalyDetector, ScoredSequence, TrainingSummary};
pub use pta::{MergeEngine, Pta};
pub use scoring::{Aggregation, DecisionPolicy, EvaluationMode, SequenceScore, SequenceScorer};
pub use sequence::{ClassLabel, TimedEvent, TimedSequence};
pub use splitter::{SplitterConfig, SubEventSplitter};
