//! # duosynth: Two-Oscillator Synthesizer Engine
//!
//! `duosynth` turns a stream of MIDI note events into audio through a live
//! signal graph. Each sounding note gets its own chain of nodes, built from a
//! declarative [`Patch`]: two oscillators, a mixer, and optional filters.
//!
//! ## Architecture
//!
//! - **MIDI** - stateless decoding of raw channel-voice messages ([`midi`])
//! - **Patch Model** - the serde-backed patch document and its validation ([`patch`])
//! - **Signal Graph** - node arena, cables, topological execution ([`graph`], [`nodes`], [`port`])
//! - **Voices** - per-note chain construction ([`voice`]) and the pitch-keyed voice set ([`manager`])
//! - **Engine** - [`Synth`] ties everything together and renders stereo blocks
//!
//! ## Quick Start
//!
//! ```rust
//! use duosynth::prelude::*;
//!
//! let mut synth = Synth::new(EngineConfig::default()).unwrap();
//!
//! let mut patch = Patch::default();
//! patch.mixer.kind = MixerType::Fm;
//! synth.set_patch(patch).unwrap();
//!
//! // Middle C on channel 1
//! synth.handle_bytes(&[0x90, 60, 100]).unwrap();
//!
//! let mut block = vec![0.0f32; 2 * 128];
//! synth.render(&mut block);
//!
//! synth.stop();
//! ```

pub mod config;
pub mod graph;
pub mod manager;
pub mod midi;
pub mod nodes;
pub mod patch;
pub mod port;
pub mod synth;
pub mod tuning;
pub mod voice;

#[cfg(feature = "wasm")]
pub mod wasm;

/// Prelude module for convenient imports
pub mod prelude {
    // Signal conventions
    pub use crate::port::{
        GraphModule, ParamDef, ParamId, PortDef, PortId, PortSpec, PortValues, SignalKind,
    };

    // Live graph
    pub use crate::graph::{Cable, Graph, GraphError, NodeHandle, NodeId, PortRef};

    // Nodes
    pub use crate::nodes::{BiquadFilter, Destination, FilterKind, Gain, Oscillator, WaveType};

    // MIDI and tuning
    pub use crate::midi::{decode, MessageKind, StatusMessage};
    pub use crate::tuning::note_to_frequency;

    // Patch model
    pub use crate::patch::{
        FilterDef, FilterSignal, MixMode, MixerDef, MixerType, OscillatorDef, Patch, PatchError,
        PatchMeta,
    };

    // Voices
    pub use crate::manager::{Voice, VoiceManager};
    pub use crate::voice::{build_voice, MixNodes, VoiceChain};

    // Engine
    pub use crate::config::{BendScope, ConfigError, EngineConfig, Retrigger};
    pub use crate::synth::{EngineError, Synth};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
