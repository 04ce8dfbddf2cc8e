// End-to-end configuration
//
// One struct gathers the settings of every stage so a whole training run
// can be described by a single TOML file. Missing sections and fields fall
// back to their defaults.

use crate::compiler::CompilerConfig;
use crate::error::Result;
use crate::isolation_forest::IsolationForestConfig;
use crate::pta::{AmbiguousMergePolicy, CriticalRemoval, MergeConfig};
use crate::scoring::{Aggregation, DecisionPolicy, EvaluationMode, ScoringConfig, Thresholds};
use crate::splitter::SplitterConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration of a training run and of scoring
///
/// # Example
/// ```
/// use pdta::config::PipelineConfig;
///
/// let config = PipelineConfig::from_toml_str(
///     r#"
///     seed = 7
///
///     [splitter]
///     bandwidth = { fixed = 2.5 }
///
///     [merge]
///     critical_removal = "recursive"
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.seed, 7);
/// assert_eq!(config.splitter.anomaly_coverage, 0.999);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub splitter: SplitterConfig,
    pub merge: MergeConfig,
    pub compiler: CompilerConfig,
    pub scoring: ScoringConfig,
    pub isolation_forest: IsolationForestConfig,

    /// Seeds KDE sub-sampling and the isolation forest
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            splitter: SplitterConfig::default(),
            merge: MergeConfig::default(),
            compiler: CompilerConfig::default(),
            scoring: ScoringConfig::default(),
            isolation_forest: IsolationForestConfig::default(),
            seed: 42,
        }
    }
}

impl PipelineConfig {
    /// Flag more: narrower regimes, every step checked, ambiguity is an error
    pub fn strict() -> Self {
        Self {
            splitter: SplitterConfig {
                anomaly_coverage: 0.99,
                warning_coverage: 0.9,
                ..SplitterConfig::default()
            },
            merge: MergeConfig {
                critical_removal: CriticalRemoval::Recursive,
                ambiguous: AmbiguousMergePolicy::Reject,
            },
            scoring: ScoringConfig {
                event_aggregation: Aggregation::LogMean,
                time_aggregation: Aggregation::LogMean,
                decision: DecisionPolicy::Both {
                    aggregates: Thresholds::new(-2.3, -4.6),
                    steps: Thresholds::new(0.01, 1e-4),
                },
                mode: EvaluationMode::Prefixes,
            },
            ..Self::default()
        }
    }

    /// Flag less: wide regimes, only whole-sequence aggregates matter
    pub fn permissive() -> Self {
        Self {
            splitter: SplitterConfig {
                anomaly_coverage: 0.9999,
                warning_coverage: 0.99,
                ..SplitterConfig::default()
            },
            merge: MergeConfig {
                critical_removal: CriticalRemoval::SinglePass,
                ambiguous: AmbiguousMergePolicy::Skip,
            },
            scoring: ScoringConfig {
                event_aggregation: Aggregation::LogMean,
                time_aggregation: Aggregation::LogMean,
                decision: DecisionPolicy::Aggregates(Thresholds::new(-6.9, -9.2)),
                mode: EvaluationMode::WholeSequence,
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.splitter.validate()?;
        self.compiler.validate()?;
        self.scoring.validate()?;
        if self.scoring.decision.needs_classifier() {
            self.isolation_forest.validate()?;
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents).context("Invalid pipeline configuration TOML")?;
        config
            .validate()
            .context("Pipeline configuration failed validation")?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize pipeline configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::{Bandwidth, DensityKernel};
    use std::io::Write;

    #[test]
    fn test_presets_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(PipelineConfig::strict().validate().is_ok());
        assert!(PipelineConfig::permissive().validate().is_ok());
        assert!(
            PipelineConfig::strict().splitter.anomaly_coverage
                < PipelineConfig::permissive().splitter.anomaly_coverage
        );
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        assert_eq!(
            PipelineConfig::from_toml_str("").unwrap(),
            PipelineConfig::default()
        );
    }

    #[test]
    fn test_nested_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [splitter]
            kernel = "balloon_quadratic"
            bandwidth = "silverman"
            max_kde_samples = 500

            [compiler]
            interval_strategy = "neighbor_widened"

            [scoring]
            event_aggregation = "lukasiewicz_conjunction"
            mode = "prefixes"

            [scoring.decision.steps]
            event = 0.05
            time = 0.001
            "#,
        )
        .unwrap();

        assert_eq!(config.splitter.kernel, DensityKernel::BalloonQuadratic);
        assert_eq!(config.splitter.bandwidth, Bandwidth::Silverman);
        assert_eq!(config.splitter.max_kde_samples, Some(500));
        assert_eq!(config.scoring.mode, EvaluationMode::Prefixes);
        assert_eq!(
            config.scoring.decision,
            DecisionPolicy::Steps(Thresholds::new(0.05, 0.001))
        );
        assert_eq!(config.scoring.time_aggregation, Aggregation::LogMean);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let error = PipelineConfig::from_toml_str("[splitter]\naccuracy = -1.0\n").unwrap_err();
        assert!(format!("{:#}", error).contains("validation"));

        assert!(PipelineConfig::from_toml_str("seed = \"seven\"").is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let config = PipelineConfig::strict();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        let loaded = PipelineConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_has_context() {
        let error = PipelineConfig::from_toml_file("/nonexistent/pdta.toml").unwrap_err();
        assert!(error.to_string().contains("Failed to read configuration file"));
    }
}
