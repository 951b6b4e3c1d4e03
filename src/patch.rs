//! Patch Model
//!
//! A patch is the user-authored, JSON-serializable description of the
//! synthesizer: two oscillators, a mixer, and an optional ordered list of
//! filters. The engine only ever reads patches; edits produce a new value.
//!
//! The JSON shape is the one the editor exchanges with the outside world:
//!
//! ```json
//! {
//!   "meta": { "version": 1, "author": "default", "name": "untitled-patch" },
//!   "oscillators": [
//!     { "waveType": "sine", "detune": 0, "octave": 0 },
//!     { "waveType": "square", "detune": -498, "octave": 0 }
//!   ],
//!   "mixer": { "type": "am", "mix": 0, "carrierOsc": 0 },
//!   "filters": [
//!     { "type": "lowpass", "signal": "1", "frequency": 1000, "emphasis": 1, "gain": 0 }
//!   ]
//! }
//! ```

use crate::nodes::{FilterKind, WaveType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default FM modulation index when a patch leaves it out
pub const DEFAULT_FM_MOD_INDEX: f64 = 50.0;

/// Errors raised while accepting or exporting a patch
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Invalid patch JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("mixer.carrierOsc must be 0 or 1, got {0}")]
    InvalidCarrier(u8),
}

/// Identity and versioning; never consumed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchMeta {
    pub version: u32,
    pub author: String,
    pub name: String,
}

impl Default for PatchMeta {
    fn default() -> Self {
        Self {
            version: 1,
            author: "default".into(),
            name: "untitled-patch".into(),
        }
    }
}

/// One oscillator slot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OscillatorDef {
    pub wave_type: WaveType,

    /// Pitch offset in cents
    #[serde(default)]
    pub detune: f64,

    /// Pitch offset in octaves
    #[serde(default)]
    pub octave: i32,
}

/// How the two oscillators are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixerType {
    #[default]
    Volume,
    Additive,
    Am,
    Fm,
}

/// Mixer section as it appears in the document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerDef {
    #[serde(rename = "type")]
    pub kind: MixerType,

    /// Crossfade between oscillator 1 (0.0) and oscillator 2 (1.0)
    pub mix: f64,

    /// Carrier slot for AM/FM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_osc: Option<u8>,

    /// FM modulation depth, as a percentage of the carrier frequency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fm_mod_index: Option<f64>,
}

impl Default for MixerDef {
    fn default() -> Self {
        Self {
            kind: MixerType::Volume,
            mix: 0.5,
            carrier_osc: Some(0),
            fm_mod_index: Some(DEFAULT_FM_MOD_INDEX),
        }
    }
}

/// Resolved mixing mode, carrying only what each mode needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixMode {
    /// Crossfade: osc 1 at `1 - mix`, osc 2 at `mix`
    Volume { mix: f64 },
    /// Plain sum, halved
    Additive,
    /// Modulator drives the carrier's gain
    Am { carrier: usize },
    /// Modulator drives the carrier's frequency
    Fm { carrier: usize, mod_index: f64 },
}

impl MixMode {
    /// Slot of the modulating oscillator, if the mode has one
    pub fn modulator(&self) -> Option<usize> {
        match self {
            MixMode::Am { carrier } | MixMode::Fm { carrier, .. } => Some(1 - carrier),
            _ => None,
        }
    }
}

impl MixerDef {
    /// Resolve the document fields into a mixing mode
    pub fn mode(&self) -> MixMode {
        let carrier = usize::from(self.carrier_osc.unwrap_or(0).min(1));
        match self.kind {
            MixerType::Volume => MixMode::Volume { mix: self.mix },
            MixerType::Additive => MixMode::Additive,
            MixerType::Am => MixMode::Am { carrier },
            MixerType::Fm => MixMode::Fm {
                carrier,
                mod_index: self.fm_mod_index.unwrap_or(DEFAULT_FM_MOD_INDEX),
            },
        }
    }
}

/// Which signal a filter processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterSignal {
    /// Oscillator 1, before mixing
    #[default]
    #[serde(rename = "1")]
    First,
    /// Oscillator 2, before mixing
    #[serde(rename = "2")]
    Second,
    /// The mixed signal
    #[serde(rename = "combined")]
    Combined,
}

impl FilterSignal {
    /// Oscillator slot for pre-mix filters
    pub fn slot(&self) -> Option<usize> {
        match self {
            FilterSignal::First => Some(0),
            FilterSignal::Second => Some(1),
            FilterSignal::Combined => None,
        }
    }
}

/// One filter stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterDef {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub signal: FilterSignal,
    /// Cutoff or center frequency in Hz
    pub frequency: f64,
    /// Q
    pub emphasis: f64,
    /// Shelf gain in dB
    pub gain: f64,
}

impl Default for FilterDef {
    /// The stage the editor appends when a filter is added
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            signal: FilterSignal::First,
            frequency: 1000.0,
            emphasis: 1.0,
            gain: 0.0,
        }
    }
}

/// A complete synthesizer patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub meta: PatchMeta,
    pub oscillators: [OscillatorDef; 2],
    pub mixer: MixerDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterDef>>,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            meta: PatchMeta::default(),
            oscillators: [OscillatorDef::default(); 2],
            mixer: MixerDef::default(),
            filters: Some(vec![FilterDef::default()]),
        }
    }
}

fn check_range(field: impl Into<String>, value: f64, min: f64, max: f64) -> Result<(), PatchError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PatchError::OutOfRange {
            field: field.into(),
            value,
            min,
            max,
        })
    }
}

impl Patch {
    /// Parse and validate a patch document
    pub fn from_json(json: &str) -> Result<Self, PatchError> {
        let patch: Patch = serde_json::from_str(json)?;
        patch.validate()?;
        Ok(patch)
    }

    /// Serialize to the plain JSON document
    pub fn to_json(&self) -> Result<String, PatchError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Suggested download name for an exported patch
    pub fn file_name(&self) -> String {
        let name = self.meta.name.trim();
        if name.is_empty() {
            "untitled-patch.json".into()
        } else {
            format!("{}.json", name)
        }
    }

    /// Check every value against its documented range
    pub fn validate(&self) -> Result<(), PatchError> {
        for (i, osc) in self.oscillators.iter().enumerate() {
            check_range(
                format!("oscillators[{}].detune", i),
                osc.detune,
                -1200.0,
                1200.0,
            )?;
            check_range(
                format!("oscillators[{}].octave", i),
                osc.octave as f64,
                -3.0,
                3.0,
            )?;
        }

        check_range("mixer.mix", self.mixer.mix, 0.0, 1.0)?;
        if let Some(carrier) = self.mixer.carrier_osc {
            if carrier > 1 {
                return Err(PatchError::InvalidCarrier(carrier));
            }
        }
        if let Some(index) = self.mixer.fm_mod_index {
            check_range("mixer.fmModIndex", index, 0.0, f64::MAX)?;
        }

        for (i, filter) in self.filters().enumerate() {
            check_range(
                format!("filters[{}].frequency", i),
                filter.frequency,
                20.0,
                20000.0,
            )?;
            check_range(
                format!("filters[{}].emphasis", i),
                filter.emphasis,
                1.0,
                20.0,
            )?;
            check_range(format!("filters[{}].gain", i), filter.gain, -40.0, 40.0)?;
        }

        Ok(())
    }

    /// All filters in document order
    pub fn filters(&self) -> impl Iterator<Item = &FilterDef> {
        self.filters.iter().flatten()
    }

    /// Filters applied to one oscillator before mixing, in order
    pub fn pre_mix_filters(&self, slot: usize) -> impl Iterator<Item = &FilterDef> {
        self.filters()
            .filter(move |f| f.signal.slot() == Some(slot))
    }

    /// Filters applied to the mixed signal, in order
    pub fn combined_filters(&self) -> impl Iterator<Item = &FilterDef> {
        self.filters()
            .filter(|f| f.signal == FilterSignal::Combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AM_PATCH: &str = r#"{
        "meta": { "version": 3, "author": "tester", "name": "bell" },
        "oscillators": [
            { "waveType": "sine", "detune": 0, "octave": 0 },
            { "waveType": "square", "detune": -498, "octave": 0 }
        ],
        "mixer": { "type": "am", "mix": 0, "carrierOsc": 0 }
    }"#;

    #[test]
    fn test_default_patch() {
        let patch = Patch::default();
        assert!(patch.validate().is_ok());
        assert_eq!(patch.meta.name, "untitled-patch");
        assert_eq!(patch.mixer.mode(), MixMode::Volume { mix: 0.5 });
        assert_eq!(patch.pre_mix_filters(0).count(), 1);
        assert_eq!(patch.pre_mix_filters(1).count(), 0);
        assert_eq!(patch.combined_filters().count(), 0);
    }

    #[test]
    fn test_parse_am_patch() {
        let patch = Patch::from_json(AM_PATCH).unwrap();
        assert_eq!(patch.oscillators[1].wave_type, WaveType::Square);
        assert_eq!(patch.oscillators[1].detune, -498.0);
        assert_eq!(patch.mixer.mode(), MixMode::Am { carrier: 0 });
        assert_eq!(patch.mixer.mode().modulator(), Some(1));
        assert!(patch.filters.is_none());
        assert_eq!(patch.filters().count(), 0);
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{
            "meta": { "version": 1, "author": "a", "name": "n" },
            "oscillators": [ { "waveType": "triangle" }, { "waveType": "sawtooth" } ],
            "mixer": { "type": "fm", "mix": 0.2, "carrierOsc": 1 },
            "filters": null
        }"#;
        let patch = Patch::from_json(json).unwrap();
        assert_eq!(patch.oscillators[0].detune, 0.0);
        assert_eq!(patch.oscillators[0].octave, 0);
        assert_eq!(
            patch.mixer.mode(),
            MixMode::Fm {
                carrier: 1,
                mod_index: 50.0
            }
        );
    }

    #[test]
    fn test_missing_top_level_key_rejected() {
        let json = r#"{ "meta": { "version": 1, "author": "a", "name": "n" },
                        "oscillators": [ { "waveType": "sine" }, { "waveType": "sine" } ] }"#;
        assert!(matches!(Patch::from_json(json), Err(PatchError::Json(_))));
    }

    #[test]
    fn test_unknown_mixer_type_rejected() {
        let json = AM_PATCH.replace(r#""type": "am""#, r#""type": "ring""#);
        assert!(matches!(Patch::from_json(&json), Err(PatchError::Json(_))));
    }

    #[test]
    fn test_unknown_filter_type_rejected() {
        let json = AM_PATCH.replace(
            r#""carrierOsc": 0 }"#,
            r#""carrierOsc": 0 },
            "filters": [ { "type": "comb", "signal": "1", "frequency": 500, "emphasis": 1, "gain": 0 } ]"#,
        );
        assert!(matches!(Patch::from_json(&json), Err(PatchError::Json(_))));
    }

    #[test]
    fn test_oscillator_count_enforced() {
        let json = r#"{
            "meta": { "version": 1, "author": "a", "name": "n" },
            "oscillators": [ { "waveType": "sine" } ],
            "mixer": { "type": "volume", "mix": 0.5 }
        }"#;
        assert!(Patch::from_json(json).is_err());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut patch = Patch::default();
        patch.oscillators[0].octave = 4;
        assert!(matches!(
            patch.validate(),
            Err(PatchError::OutOfRange { ref field, .. }) if field == "oscillators[0].octave"
        ));

        let mut patch = Patch::default();
        patch.mixer.mix = 1.5;
        assert!(patch.validate().is_err());

        let mut patch = Patch::default();
        patch.mixer.carrier_osc = Some(2);
        assert!(matches!(patch.validate(), Err(PatchError::InvalidCarrier(2))));

        let mut patch = Patch::default();
        if let Some(filters) = patch.filters.as_mut() {
            filters[0].frequency = 10.0;
        }
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_export_is_plain_document() {
        let patch = Patch::from_json(AM_PATCH).unwrap();
        let value: serde_json::Value = serde_json::from_str(&patch.to_json().unwrap()).unwrap();
        assert_eq!(value["mixer"]["type"], "am");
        assert_eq!(value["oscillators"][1]["waveType"], "square");
        assert!(value.get("filters").is_none());
        assert_eq!(Patch::from_json(&patch.to_json().unwrap()).unwrap(), patch);
    }

    #[test]
    fn test_filter_signal_tags() {
        let filter: FilterDef = serde_json::from_str(
            r#"{ "type": "highshelf", "signal": "combined", "frequency": 8000, "emphasis": 2, "gain": -6 }"#,
        )
        .unwrap();
        assert_eq!(filter.kind, FilterKind::Highshelf);
        assert_eq!(filter.signal, FilterSignal::Combined);
        assert_eq!(filter.signal.slot(), None);
    }

    #[test]
    fn test_file_name() {
        let mut patch = Patch::default();
        assert_eq!(patch.file_name(), "untitled-patch.json");
        patch.meta.name = "  ".into();
        assert_eq!(patch.file_name(), "untitled-patch.json");
        patch.meta.name = "bass".into();
        assert_eq!(patch.file_name(), "bass.json");
    }
}
