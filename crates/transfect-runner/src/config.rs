//! Runner configuration, loaded from TOML.
//!
//! ```toml
//! [protocol]
//! excess = 1.2
//! aggregate_replicates = true
//!
//! [protocol.limits]
//! switch_threshold = 20.0
//!
//! [run]
//! auto_acknowledge = false
//! ```
//!
//! Any omitted key falls back to the three-rack bench defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use planner::PlannerConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV: &str = "TRANSFECT_CONFIG";

/// Options for executing a compiled plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Continue through checkpoints without waiting for the operator
    pub auto_acknowledge: bool,
    /// Where to write the run report (JSON)
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub protocol: PlannerConfig,
    pub run: RunSettings,
}

impl RunnerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: RunnerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML {}", path.display()))?;
        config
            .protocol
            .validate()
            .map_err(|e| anyhow::anyhow!(e.with_suggestion()))
            .with_context(|| format!("Invalid protocol in {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the config source: explicit path, then `TRANSFECT_CONFIG`,
    /// then built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(value) if !value.is_empty() => Self::from_file(Path::new(&value)),
            _ => {
                tracing::debug!("No config file given, using bench defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let toml_str = r#"
[protocol]
excess = 1.1
aggregate_replicates = false

[protocol.limits]
switch_threshold = 25.0

[protocol.reagents]
mix_a = "C6.3"

[run]
auto_acknowledge = true
"#;
        let config: RunnerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.protocol.excess, 1.1);
        assert!(!config.protocol.aggregate_replicates);
        assert_eq!(config.protocol.limits.switch_threshold, 25.0);
        assert_eq!(config.protocol.limits.high_volume_ceiling, 200.0);
        assert_eq!(config.protocol.reagents.mix_a.to_string(), "C6.3");
        assert_eq!(config.protocol.reagents.mix_b.to_string(), "D1.3");
        assert!(config.run.auto_acknowledge);
    }

    #[test]
    fn test_mixing_and_grouping_keys_from_toml() {
        let toml_str = r#"
[protocol.mixing]
repetitions = 5
distribution_mix = { mode = "fixed", volume = 10.0 }

[protocol.grouping]
delivery = "dna_destination"
"#;
        let config: RunnerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.protocol.mixing.repetitions, 5);
        assert_eq!(
            config.protocol.mixing.distribution_mix,
            planner::Agitation::Fixed { volume: 10.0 }
        );
        assert_eq!(config.protocol.grouping.delivery, planner::GroupKey::DnaDestination);
    }

    #[test]
    fn test_from_file_rejects_invalid_protocol() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[protocol]\nexcess = 0.5").unwrap();
        let err = RunnerConfig::from_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("excess"));
    }

    #[test]
    fn test_from_file_reads_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(&path, "[protocol]\nincubation_minutes = 15\n").unwrap();
        let config = RunnerConfig::from_file(&path).unwrap();
        assert_eq!(config.protocol.incubation_minutes, 15);
    }
}
