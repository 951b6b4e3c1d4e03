//! Synth Engine
//!
//! [`Synth`] ties the pieces together: raw MIDI bytes go in, are decoded,
//! and drive the voice manager; the live graph is rendered sample by sample
//! into an interleaved stereo buffer.
//!
//! ```rust
//! use duosynth::prelude::*;
//!
//! let mut synth = Synth::new(EngineConfig::default()).unwrap();
//! synth.handle_bytes(&[0x90, 69, 100]).unwrap();
//!
//! let mut block = [0.0f32; 256];
//! synth.render(&mut block);
//!
//! synth.handle_bytes(&[0x80, 69, 0]).unwrap();
//! assert_eq!(synth.active_voice_count(), 0);
//! ```

use crate::config::{ConfigError, EngineConfig};
use crate::graph::{Graph, GraphError, NodeId, PortRef};
use crate::manager::VoiceManager;
use crate::midi::{decode, MessageKind, StatusMessage};
use crate::nodes::Destination;
use crate::patch::{Patch, PatchError};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Hard limit on rendered sample magnitude
pub const OUTPUT_LIMIT: f32 = 1.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid engine config: {0}")]
    Config(#[from] ConfigError),

    #[error("Signal graph error: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// The synthesizer engine
pub struct Synth {
    graph: Graph,
    destination: NodeId,
    voices: VoiceManager,
    patch: Patch,
    config: EngineConfig,
    last_message_id: Option<String>,
}

impl Synth {
    /// Create an engine with the default patch loaded
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let mut graph = Graph::new(config.sample_rate);
        let destination = graph.add("destination", Destination::new());
        graph.set_output(destination.id());
        let output: PortRef = destination.in_("in")?;

        info!(sample_rate = config.sample_rate, "synth engine ready");

        Ok(Self {
            voices: VoiceManager::new(&config, output),
            destination: destination.id(),
            graph,
            patch: Patch::default(),
            config,
            last_message_id: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The patch new notes are built from
    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// Replace the current patch. Sounding voices keep the patch they
    /// were started with.
    pub fn set_patch(&mut self, patch: Patch) -> Result<(), PatchError> {
        if let Err(e) = patch.validate() {
            warn!(error = %e, "rejected patch, keeping the current one");
            return Err(e);
        }
        debug!(name = %patch.meta.name, "patch loaded");
        self.patch = patch;
        Ok(())
    }

    /// Parse, validate and load a patch document. On error the current
    /// patch is left untouched.
    pub fn load_patch_json(&mut self, json: &str) -> Result<(), PatchError> {
        match Patch::from_json(json) {
            Ok(patch) => {
                debug!(name = %patch.meta.name, "patch imported");
                self.patch = patch;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "rejected patch import, keeping the current one");
                Err(e)
            }
        }
    }

    pub fn export_patch_json(&self) -> Result<String, PatchError> {
        self.patch.to_json()
    }

    /// Decode and handle one raw MIDI message
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let message = decode(bytes);

        if self.config.suppress_duplicates {
            if self.last_message_id.as_deref() == Some(message.id.as_str()) {
                trace!(id = %message.id, "duplicate MIDI message suppressed");
                return Ok(());
            }
            self.last_message_id = Some(message.id.clone());
        }

        self.handle_message(&message)
    }

    /// Handle a decoded MIDI message. Kinds the engine does not play are
    /// ignored.
    pub fn handle_message(&mut self, message: &StatusMessage) -> Result<(), EngineError> {
        let channel = message.channel.unwrap_or(1);
        match message.kind {
            MessageKind::NoteOn { pitch, velocity } => self.note_on(channel, pitch, velocity),
            MessageKind::NoteOff { pitch, .. } => {
                self.note_off(pitch);
                Ok(())
            }
            MessageKind::PitchBend { bend_lsb, bend_msb } => {
                self.pitch_bend(channel, bend_lsb, bend_msb)
            }
            MessageKind::Unknown => {
                trace!(id = %message.id, "ignoring unrecognised MIDI message");
                Ok(())
            }
            _ => {
                trace!(%message, "ignoring MIDI message");
                Ok(())
            }
        }
    }

    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) -> Result<(), EngineError> {
        let started = self
            .voices
            .note_on(&mut self.graph, &self.patch, channel, pitch, velocity)?;
        if started {
            debug!(channel, pitch, velocity, voices = self.voices.active_count(), "note on");
        }
        Ok(())
    }

    /// Release a note. Returns false if it was not sounding.
    pub fn note_off(&mut self, pitch: u8) -> bool {
        let released = self.voices.note_off(&mut self.graph, pitch);
        if released {
            debug!(pitch, voices = self.voices.active_count(), "note off");
        } else {
            trace!(pitch, "note off for silent pitch");
        }
        released
    }

    pub fn pitch_bend(&mut self, channel: u8, lsb: u8, msb: u8) -> Result<(), EngineError> {
        let retuned = self.voices.pitch_bend(&mut self.graph, channel, lsb, msb)?;
        debug!(channel, lsb, msb, retuned, "pitch bend");
        Ok(())
    }

    /// Release every sounding voice, returning how many there were.
    /// Held bends and signal state are cleared as well.
    pub fn stop(&mut self) -> usize {
        let released = self.voices.active_count();
        self.voices.reset(&mut self.graph);
        self.graph.reset();
        self.last_message_id = None;
        if released > 0 {
            debug!(released, "all voices stopped");
        }
        released
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.active_count()
    }

    /// Render one stereo frame
    #[inline]
    pub fn tick(&mut self) -> (f64, f64) {
        self.graph.tick()
    }

    /// Fill an interleaved stereo buffer. Samples are clamped to
    /// ±[`OUTPUT_LIMIT`]; a trailing odd sample is zeroed.
    pub fn render(&mut self, out: &mut [f32]) {
        let mut frames = out.chunks_exact_mut(2);
        for frame in &mut frames {
            let (left, right) = self.graph.tick();
            frame[0] = (left as f32).clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT);
            frame[1] = (right as f32).clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT);
        }
        for sample in frames.into_remainder() {
            *sample = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Oscillator, WaveType};
    use crate::patch::MixerType;
    use crate::voice::MixNodes;
    use approx::assert_relative_eq;

    const AM_PATCH: &str = r#"{
        "meta": { "version": 1, "author": "test", "name": "am-bell" },
        "oscillators": [
            { "waveType": "sine", "detune": 0, "octave": 0 },
            { "waveType": "square", "detune": -498, "octave": 0 }
        ],
        "mixer": { "type": "am", "mix": 0, "carrierOsc": 0 }
    }"#;

    fn synth() -> Synth {
        Synth::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Synth::new(EngineConfig::with_sample_rate(-1.0));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_am_scenario_end_to_end() {
        let mut synth = synth();
        synth.load_patch_json(AM_PATCH).unwrap();

        synth.handle_bytes(&[0x90, 69, 100]).unwrap();
        assert_eq!(synth.active_voice_count(), 1);

        let graph = synth.graph();
        let voice = synth.voices().voice(69).unwrap();
        let [carrier, modulator] = voice.chain().generators();

        assert_relative_eq!(
            graph.get_param(carrier, Oscillator::FREQUENCY).unwrap(),
            440.0,
            epsilon = 1e-9
        );
        assert_eq!(graph.get_param(modulator, Oscillator::DETUNE), Some(-498.0));
        assert!(matches!(voice.chain().mix(), MixNodes::Am { .. }));

        synth.handle_bytes(&[0x80, 69, 0]).unwrap();
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(synth.graph().node_count(), 1);
        assert_eq!(synth.graph().cable_count(), 0);
        assert!(!synth.graph().contains(carrier));
    }

    #[test]
    fn test_zero_velocity_note_on_releases() {
        let mut synth = synth();
        synth.handle_bytes(&[0x90, 60, 90]).unwrap();
        synth.handle_bytes(&[0x90, 60, 0]).unwrap();
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn test_unknown_and_unplayed_messages_ignored() {
        let mut synth = synth();
        synth.handle_bytes(&[0xF8]).unwrap();
        synth.handle_bytes(&[0x40, 1, 2]).unwrap();
        synth.handle_bytes(&[0xB0, 1, 64]).unwrap();
        synth.handle_bytes(&[0xC0, 3]).unwrap();
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(synth.graph().node_count(), 1);
    }

    #[test]
    fn test_duplicate_suppression() {
        let config = EngineConfig {
            suppress_duplicates: true,
            ..EngineConfig::default()
        };
        let mut synth = Synth::new(config).unwrap();

        synth.handle_bytes(&[0x90, 60, 100]).unwrap();
        let nodes = synth.graph().node_count();
        let osc = synth.voices().voice(60).unwrap().chain().generators()[0];

        // An echoed note-on does not retrigger
        synth.handle_bytes(&[0x90, 60, 100]).unwrap();
        assert_eq!(synth.graph().node_count(), nodes);
        assert!(synth.graph().contains(osc));

        synth.handle_bytes(&[0x80, 60, 0]).unwrap();
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn test_invalid_import_retains_patch() {
        let mut synth = synth();
        synth.load_patch_json(AM_PATCH).unwrap();

        assert!(synth.load_patch_json("{ not json").is_err());
        assert!(synth.load_patch_json(r#"{ "meta": {} }"#).is_err());
        let bad_mixer = AM_PATCH.replace(r#""am""#, r#""ring""#);
        assert!(synth.load_patch_json(&bad_mixer).is_err());

        assert_eq!(synth.patch().meta.name, "am-bell");
        assert_eq!(synth.patch().mixer.kind, MixerType::Am);
    }

    #[test]
    fn test_set_patch_validates() {
        let mut synth = synth();
        let mut patch = Patch::default();
        patch.mixer.mix = 2.0;
        assert!(synth.set_patch(patch).is_err());
        assert_eq!(synth.patch(), &Patch::default());

        let mut patch = Patch::default();
        patch.oscillators[0].wave_type = WaveType::Sawtooth;
        synth.set_patch(patch.clone()).unwrap();
        assert_eq!(synth.patch(), &patch);
    }

    #[test]
    fn test_export_round_trips_current_patch() {
        let mut synth = synth();
        synth.load_patch_json(AM_PATCH).unwrap();
        let exported = synth.export_patch_json().unwrap();
        assert_eq!(&Patch::from_json(&exported).unwrap(), synth.patch());
    }

    #[test]
    fn test_patch_change_does_not_touch_sounding_voice() {
        let mut synth = synth();
        synth.note_on(1, 60, 100).unwrap();
        let chain_nodes = synth.voices().voice(60).unwrap().chain().nodes().len();

        synth.load_patch_json(AM_PATCH).unwrap();
        assert_eq!(
            synth.voices().voice(60).unwrap().chain().nodes().len(),
            chain_nodes
        );
        assert!(matches!(
            synth.voices().voice(60).unwrap().chain().mix(),
            MixNodes::Volume { .. }
        ));
    }

    #[test]
    fn test_render_interleaved_and_clamped() {
        let mut synth = synth();
        let mut patch = Patch::default();
        patch.mixer.kind = MixerType::Additive;
        synth.set_patch(patch).unwrap();

        // Enough simultaneous notes to exceed full scale before clamping
        for pitch in 40..60 {
            synth.note_on(1, pitch, 127).unwrap();
        }

        let mut block = vec![0.0f32; 1025];
        synth.render(&mut block);

        assert!(block.iter().all(|s| s.abs() <= OUTPUT_LIMIT));
        assert!(block.iter().any(|s| s.abs() > 0.0));
        for frame in block[..1024].chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert_eq!(block[1024], 0.0);
    }

    #[test]
    fn test_stop_releases_everything() {
        let mut synth = synth();
        for pitch in [48, 52, 55] {
            synth.note_on(1, pitch, 100).unwrap();
        }
        assert_eq!(synth.stop(), 3);
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(synth.graph().node_count(), 1);

        let mut block = [1.0f32; 8];
        synth.render(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stop_clears_held_bend() {
        let mut synth = synth();
        synth.pitch_bend(1, 0, 0).unwrap();
        assert!(synth.voices().bend(1) < 1.0);

        synth.stop();
        assert_eq!(synth.voices().bend(1), 1.0);

        synth.note_on(1, 69, 100).unwrap();
        let osc = synth.voices().voice(69).unwrap().chain().generators()[0];
        assert_relative_eq!(
            synth.graph().get_param(osc, Oscillator::FREQUENCY).unwrap(),
            440.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_render_work_scales_linearly_with_voices() {
        let mut synth = synth();
        synth.note_on(1, 48, 100).unwrap();
        let mut block = [0.0f32; 2];
        synth.render(&mut block);
        let per_voice_nodes = synth.graph().node_count() - 1;
        let per_voice_reads = synth.graph().routed_inputs();
        assert_eq!(per_voice_reads, synth.graph().cable_count());

        for pitch in 49..64 {
            synth.note_on(1, pitch, 100).unwrap();
        }
        synth.render(&mut block);
        assert_eq!(synth.active_voice_count(), 16);

        // Each tick visits every node once and reads every cable once
        assert_eq!(synth.graph().node_count() - 1, 16 * per_voice_nodes);
        assert_eq!(synth.graph().routed_inputs(), 16 * per_voice_reads);
        assert_eq!(synth.graph().routed_inputs(), synth.graph().cable_count());
    }
}
