//! Error taxonomy shared by training and scoring
//!
//! Construction-time errors abort training. Scoring-time errors are reported
//! per sequence so a batch keeps going.

use thiserror::Error;

/// Errors raised while learning or evaluating a timed automaton
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PdtaError {
    /// A sequence references a symbol that has no fitted event
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    /// No sub-event of the symbol covers the observed time value
    #[error("No sub-event of '{symbol}' covers time {time}")]
    NoCoveringSubEvent { symbol: String, time: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A training time sample is negative or NaN
    #[error("Invalid time sample {value} for symbol '{symbol}'")]
    InvalidSample { symbol: String, value: f64 },

    /// Outgoing probabilities and end probability of a state do not sum to one
    #[error("Inconsistent probability mass {mass} at state {state}")]
    InconsistentProbabilityMass { state: usize, mass: f64 },

    /// Critical-area removal found both or neither neighbouring transitions
    #[error("Ambiguous critical-area merge of '{sub_event}' at state {state}")]
    AmbiguousMerge { state: usize, sub_event: String },

    /// A serialized automaton failed to parse or references missing parts
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Outlier classifier failed: {0}")]
    Classifier(String),
}

/// Result type for automaton operations
pub type Result<T> = std::result::Result<T, PdtaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = PdtaError::UnknownSymbol("login".to_string());
        assert_eq!(err.to_string(), "Unknown symbol: login");

        let err = PdtaError::NoCoveringSubEvent {
            symbol: "X".to_string(),
            time: -1.0,
        };
        assert!(err.to_string().contains("'X'"));
        assert!(err.to_string().contains("-1"));
    }
}
