//! Engine Configuration
//!
//! Settings fixed for the lifetime of a [`Synth`](crate::synth::Synth).
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```json
//! { "sampleRate": 48000, "bendScope": "omni" }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which voices a pitch-bend message reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BendScope {
    /// Only voices started on the bend's channel
    #[default]
    Channel,
    /// Every sounding voice
    Omni,
}

/// What a note-on does when its pitch is already sounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retrigger {
    /// Release the old voice and start a fresh one
    #[default]
    Replace,
    /// Keep the old voice, drop the new note
    Ignore,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample rate must be finite and positive, got {0}")]
    SampleRate(f64),

    #[error("bend range must be in (0, 24] semitones, got {0}")]
    BendRange(f64),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Semitones reached at full pitch-bend deflection
    pub bend_range_semitones: f64,
    pub bend_scope: BendScope,
    pub retrigger: Retrigger,
    /// Drop a raw MIDI message identical to the one just before it
    pub suppress_duplicates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            bend_range_semitones: 2.0,
            bend_scope: BendScope::Channel,
            retrigger: Retrigger::Replace,
            suppress_duplicates: false,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if !(self.bend_range_semitones > 0.0 && self.bend_range_semitones <= 24.0) {
            return Err(ConfigError::BendRange(self.bend_range_semitones));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bend_scope, BendScope::Channel);
        assert_eq!(config.retrigger, Retrigger::Replace);
        assert!(!config.suppress_duplicates);
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{ "sampleRate": 48000, "bendScope": "omni" }"#).unwrap();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.bend_scope, BendScope::Omni);
        assert_eq!(config.bend_range_semitones, 2.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::with_sample_rate(0.0).validate(),
            Err(ConfigError::SampleRate(_))
        ));
        assert!(EngineConfig::with_sample_rate(f64::NAN).validate().is_err());

        let config = EngineConfig {
            bend_range_semitones: 48.0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::BendRange(_))));

        assert!(matches!(
            EngineConfig::from_json(r#"{ "retrigger": "stack" }"#),
            Err(ConfigError::Json(_))
        ));
    }
}
