//! # Configuration Management
//!
//! Loads the run configuration from several sources:
//! - Default values (built into the code)
//! - An optional `aec-offline.toml` in the working directory
//! - Environment variables with the `AEC_` prefix
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (`AEC_PIPELINE__BLOCK_MS`, `AEC_PROCESSING__NOISE_SUPPRESSION__ENABLED`, ...)
//! 2. Configuration file (`aec-offline.toml`)
//! 3. Default values (defined in the Default impls)
//!
//! Nested keys are separated by a double underscore in environment variables
//! because section and field names themselves contain single underscores.
//!
//! The command line stays `<farend> <nearend> <out> [--debug]`; everything
//! tunable lives here.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Base name of the optional configuration file.
pub const CONFIG_FILE_NAME: &str = "aec-offline";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "AEC";

/// Main configuration for one processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub processing: ProcessingConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Frame scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Duration of one processing block in milliseconds
    pub block_ms: u32,
}

/// Feature set applied once to the processing engine before the first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub echo_canceller: EchoCancellerConfig,
    pub gain_controller1: GainController1Config,
    pub gain_controller2: GainController2Config,
    pub high_pass_filter: HighPassFilterConfig,
    pub noise_suppression: NoiseSuppressionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoCancellerConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainController1Config {
    pub enabled: bool,
    pub mode: GainControlMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainController2Config {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighPassFilterConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSuppressionConfig {
    pub enabled: bool,
    pub level: NoiseSuppressionLevel,
}

/// Operating mode of the first-generation gain controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainControlMode {
    AdaptiveAnalog,
    AdaptiveDigital,
    FixedDigital,
}

impl GainControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GainControlMode::AdaptiveAnalog => "adaptive_analog",
            GainControlMode::AdaptiveDigital => "adaptive_digital",
            GainControlMode::FixedDigital => "fixed_digital",
        }
    }
}

/// Aggressiveness of noise suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseSuppressionLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl NoiseSuppressionLevel {
    /// Numeric level as printed in the configuration dump (0 = low .. 3 = very high).
    pub fn as_index(&self) -> u8 {
        match self {
            NoiseSuppressionLevel::Low => 0,
            NoiseSuppressionLevel::Moderate => 1,
            NoiseSuppressionLevel::High => 2,
            NoiseSuppressionLevel::VeryHigh => 3,
        }
    }
}

/// Settings for the `--debug` recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Engine metrics are sampled every this many frames
    pub metrics_interval: u64,
    /// A progress line is logged every this many frames
    pub progress_interval: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig { block_ms: 10 },
            processing: ProcessingConfig::default(),
            diagnostics: DiagnosticsConfig {
                metrics_interval: 10,
                progress_interval: 100,
            },
        }
    }
}

impl Default for ProcessingConfig {
    /// Echo cancellation only; everything else off.
    fn default() -> Self {
        Self {
            echo_canceller: EchoCancellerConfig { enabled: true },
            gain_controller1: GainController1Config {
                enabled: false,
                mode: GainControlMode::AdaptiveDigital,
            },
            gain_controller2: GainController2Config { enabled: false },
            high_pass_filter: HighPassFilterConfig { enabled: false },
            noise_suppression: NoiseSuppressionConfig {
                enabled: false,
                level: NoiseSuppressionLevel::High,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `aec-offline.toml` and `AEC_*` variables.
    pub fn load() -> PipelineResult<Self> {
        Self::from_sources(
            config::File::with_name(CONFIG_FILE_NAME).required(false),
            env_source(),
        )
    }

    pub(crate) fn from_sources<F, E>(file: F, env: E) -> PipelineResult<Self>
    where
        F: config::Source + Send + Sync + 'static,
        E: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(env)
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.pipeline.block_ms == 0 || self.pipeline.block_ms > 100 {
            return Err(PipelineError::Config(format!(
                "pipeline.block_ms must be between 1 and 100, got {}",
                self.pipeline.block_ms
            )));
        }
        if self.diagnostics.metrics_interval == 0 {
            return Err(PipelineError::Config(
                "diagnostics.metrics_interval must be greater than 0".to_string(),
            ));
        }
        if self.diagnostics.progress_interval == 0 {
            return Err(PipelineError::Config(
                "diagnostics.progress_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn no_env() -> config::Environment {
        env_source().source(Some(config::Map::new()))
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.block_ms, 10);
        assert!(config.processing.echo_canceller.enabled);
        assert!(!config.processing.noise_suppression.enabled);
        assert_eq!(config.processing.noise_suppression.level, NoiseSuppressionLevel::High);
        assert_eq!(config.diagnostics.metrics_interval, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.pipeline.block_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.diagnostics.metrics_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = config::File::from_str(
            r#"
            [pipeline]
            block_ms = 20

            [processing.noise_suppression]
            enabled = true
            level = "very_high"

            [processing.gain_controller1]
            enabled = true
            mode = "fixed_digital"
            "#,
            FileFormat::Toml,
        );
        let config = AppConfig::from_sources(file, no_env()).unwrap();
        assert_eq!(config.pipeline.block_ms, 20);
        assert!(config.processing.noise_suppression.enabled);
        assert_eq!(config.processing.noise_suppression.level, NoiseSuppressionLevel::VeryHigh);
        assert_eq!(config.processing.gain_controller1.mode, GainControlMode::FixedDigital);
        // Untouched sections keep their defaults
        assert!(config.processing.echo_canceller.enabled);
        assert_eq!(config.diagnostics.progress_interval, 100);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = config::File::from_str("[pipeline]\nblock_ms = 20\n", FileFormat::Toml);
        let mut vars = config::Map::new();
        vars.insert("AEC_PIPELINE__BLOCK_MS".to_string(), "10".to_string());
        vars.insert(
            "AEC_PROCESSING__HIGH_PASS_FILTER__ENABLED".to_string(),
            "true".to_string(),
        );
        let env = env_source().source(Some(vars));

        let config = AppConfig::from_sources(file, env).unwrap();
        assert_eq!(config.pipeline.block_ms, 10);
        assert!(config.processing.high_pass_filter.enabled);
    }

    #[test]
    fn test_serialized_defaults_load_back() {
        let text = toml::to_string(&AppConfig::default()).unwrap();
        let file = config::File::from_str(&text, FileFormat::Toml);
        let config = AppConfig::from_sources(file, no_env()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_bad_enum_value_is_config_error() {
        let file = config::File::from_str(
            "[processing.noise_suppression]\nlevel = \"extreme\"\n",
            FileFormat::Toml,
        );
        let err = AppConfig::from_sources(file, no_env()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
