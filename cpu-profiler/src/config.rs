use crate::error::ConfigError;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Measure the profiler's own cost when it is constructed.
    pub estimate_overhead: bool,
    /// Check the timer type and name of every end-sample call against the open block.
    pub validate_nesting: bool,
    pub calibration: CalibrationConfig,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        ProfilerConfig {
            estimate_overhead: true,
            validate_nesting: cfg!(debug_assertions),
            calibration: CalibrationConfig::default(),
        }
    }
}

/// Shape of the synthetic workload used to estimate overhead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Trial rounds; the cheapest round wins.
    pub rounds: u32,
    /// Bare start/stop pairs per round when timing the timers themselves.
    pub timer_calls: u32,
    /// Repetitions of the recurring-name pattern.
    pub reuse_rounds: u32,
    /// Distinct names cycled through by each repetition.
    pub reuse_names: u32,
    /// Sample pairs per round that each use a never-seen name.
    pub unique_samples: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            rounds: 20,
            timer_calls: 1000,
            reuse_rounds: 100,
            reuse_names: 10,
            unique_samples: 500,
        }
    }
}

impl CalibrationConfig {
    /// Begin/end pairs issued by one round of the sampling workload.
    pub fn sample_pairs(&self) -> u64 {
        u64::from(self.reuse_rounds) * u64::from(self.reuse_names) + u64::from(self.unique_samples)
    }
}

impl ProfilerConfig {
    /// Default configuration with calibration switched off and nesting always checked.
    pub fn without_calibration() -> Self {
        ProfilerConfig {
            estimate_overhead: false,
            validate_nesting: true,
            ..Default::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: ProfilerConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.estimate_overhead {
            return Ok(());
        }
        let calibration = &self.calibration;
        if calibration.rounds == 0 {
            return Err(ConfigError::Invalid("calibration.rounds must be non-zero".into()));
        }
        if calibration.timer_calls == 0 {
            return Err(ConfigError::Invalid(
                "calibration.timer_calls must be non-zero".into(),
            ));
        }
        if calibration.sample_pairs() == 0 {
            return Err(ConfigError::Invalid(
                "calibration workload issues no sample pairs".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_calibration_workload() {
        let config = ProfilerConfig::default();
        assert!(config.estimate_overhead);
        assert_eq!(config.calibration.rounds, 20);
        assert_eq!(config.calibration.timer_calls, 1000);
        assert_eq!(config.calibration.sample_pairs(), 1500);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ProfilerConfig =
            serde_json::from_str(r#"{ "calibration": { "rounds": 3 } }"#).unwrap();
        assert_eq!(config.calibration.rounds, 3);
        assert_eq!(config.calibration.unique_samples, 500);
        assert!(config.estimate_overhead);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "estimate_overhead": false, "validate_nesting": true }}"#
        )
        .unwrap();

        let config = ProfilerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config, ProfilerConfig::without_calibration());
    }

    #[test]
    fn rejects_empty_workload() {
        let mut config = ProfilerConfig::default();
        config.calibration.reuse_rounds = 0;
        config.calibration.unique_samples = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ProfilerConfig::from_json_file("/nonexistent/profiler.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ProfilerConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
