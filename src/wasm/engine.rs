//! SynthEngine - Main WASM interface for the synth engine

use super::error::to_js;
use crate::config::EngineConfig;
use crate::patch::Patch;
use crate::synth::Synth;
use tracing::warn;
use wasm_bindgen::prelude::*;

const DISABLED: &str = "Audio engine is disabled";

/// Main WASM interface for the synth engine.
///
/// If the engine cannot be created the instance stays usable but silent.
/// `enabled` is false and `notice` explains why. MIDI, voice and render
/// calls become no-ops that report nothing sounding, while patch
/// operations return an "Audio engine is disabled" error.
#[wasm_bindgen]
pub struct SynthEngine {
    synth: Option<Synth>,
    notice: Option<String>,
    sample_rate: f64,
}

impl SynthEngine {
    fn from_config(config: EngineConfig) -> Self {
        // Initialize panic hook for better error messages
        console_error_panic_hook::set_once();

        let sample_rate = config.sample_rate;
        match Synth::new(config) {
            Ok(synth) => Self {
                synth: Some(synth),
                notice: None,
                sample_rate,
            },
            Err(e) => {
                warn!(error = %e, "audio engine disabled");
                Self {
                    synth: None,
                    notice: Some(format!("Audio is unavailable: {}", e)),
                    sample_rate,
                }
            }
        }
    }

    fn synth_mut(&mut self) -> Result<&mut Synth, JsValue> {
        self.synth.as_mut().ok_or_else(|| to_js(DISABLED))
    }
}

#[wasm_bindgen]
impl SynthEngine {
    /// Create an engine at the given sample rate with default settings
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> Self {
        Self::from_config(EngineConfig::with_sample_rate(sample_rate))
    }

    /// Create an engine from a config object (`{ sampleRate, bendScope, ... }`)
    pub fn with_config(config: JsValue) -> Self {
        match serde_wasm_bindgen::from_value::<EngineConfig>(config) {
            Ok(config) => Self::from_config(config),
            Err(e) => {
                warn!(error = %e, "unreadable engine config");
                Self {
                    synth: None,
                    notice: Some(format!("Audio is unavailable: invalid config: {}", e)),
                    sample_rate: 0.0,
                }
            }
        }
    }

    /// Whether audio can be produced
    #[wasm_bindgen(getter)]
    pub fn enabled(&self) -> bool {
        self.synth.is_some()
    }

    /// User-facing explanation when the engine is disabled
    #[wasm_bindgen(getter)]
    pub fn notice(&self) -> Option<String> {
        self.notice.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    // =========================================================================
    // MIDI
    // =========================================================================

    /// Feed one raw MIDI message (the `data` of a Web MIDI event)
    pub fn midi_message(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        match self.synth.as_mut() {
            Some(synth) => synth.handle_bytes(bytes).map_err(to_js),
            None => Ok(()),
        }
    }

    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) -> Result<(), JsValue> {
        match self.synth.as_mut() {
            Some(synth) => synth.note_on(channel, pitch, velocity).map_err(to_js),
            None => Ok(()),
        }
    }

    pub fn note_off(&mut self, pitch: u8) -> bool {
        self.synth
            .as_mut()
            .map(|synth| synth.note_off(pitch))
            .unwrap_or(false)
    }

    pub fn pitch_bend(&mut self, channel: u8, lsb: u8, msb: u8) -> Result<(), JsValue> {
        match self.synth.as_mut() {
            Some(synth) => synth.pitch_bend(channel, lsb, msb).map_err(to_js),
            None => Ok(()),
        }
    }

    /// Release every voice
    pub fn stop(&mut self) -> usize {
        self.synth.as_mut().map(Synth::stop).unwrap_or(0)
    }

    pub fn active_voice_count(&self) -> usize {
        self.synth
            .as_ref()
            .map(Synth::active_voice_count)
            .unwrap_or(0)
    }

    // =========================================================================
    // Patch Operations
    // =========================================================================

    /// Load a patch from a plain JS object
    pub fn load_patch(&mut self, patch: JsValue) -> Result<(), JsValue> {
        let patch: Patch = serde_wasm_bindgen::from_value(patch).map_err(to_js)?;
        self.synth_mut()?.set_patch(patch).map_err(to_js)
    }

    /// Load a patch from JSON text (file import or fetch)
    pub fn load_patch_json(&mut self, json: &str) -> Result<(), JsValue> {
        self.synth_mut()?.load_patch_json(json).map_err(to_js)
    }

    /// The current patch as a plain JS object
    pub fn patch(&self) -> Result<JsValue, JsValue> {
        let synth = self.synth.as_ref().ok_or_else(|| to_js(DISABLED))?;
        serde_wasm_bindgen::to_value(synth.patch()).map_err(to_js)
    }

    /// The current patch as JSON text, ready for download
    pub fn export_patch_json(&self) -> Result<String, JsValue> {
        let synth = self.synth.as_ref().ok_or_else(|| to_js(DISABLED))?;
        synth.export_patch_json().map_err(to_js)
    }

    /// Suggested file name for `export_patch_json`
    pub fn export_file_name(&self) -> String {
        self.synth
            .as_ref()
            .map(|synth| synth.patch().file_name())
            .unwrap_or_else(|| Patch::default().file_name())
    }

    // =========================================================================
    // Audio Processing
    // =========================================================================

    /// Process a block of samples, returning interleaved stereo
    /// (`[L0, R0, L1, R1, ...]`). A disabled engine yields silence.
    pub fn process_block(&mut self, num_samples: usize) -> js_sys::Float32Array {
        let mut block = vec![0.0f32; num_samples * 2];
        if let Some(synth) = self.synth.as_mut() {
            synth.render(&mut block);
        }
        js_sys::Float32Array::from(block.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_engine_ignores_playback() {
        let mut engine = SynthEngine::new(-1.0);
        assert!(!engine.enabled());
        assert!(engine.notice().is_some());

        assert!(engine.midi_message(&[0x90, 60, 100]).is_ok());
        assert!(engine.note_on(1, 60, 100).is_ok());
        assert!(engine.pitch_bend(1, 0, 0).is_ok());
        assert!(!engine.note_off(60));
        assert_eq!(engine.stop(), 0);
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(engine.export_file_name(), Patch::default().file_name());
    }
}
