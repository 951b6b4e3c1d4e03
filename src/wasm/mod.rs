//! WASM bindings for duosynth
//!
//! This module provides the JavaScript-facing API for running the engine
//! inside an AudioWorklet. The host forwards raw Web MIDI bytes and pulls
//! interleaved stereo blocks.

mod engine;
mod error;

pub use engine::SynthEngine;
pub use error::SynthError;

// Re-export wasm_bindgen for convenience
pub use wasm_bindgen::prelude::*;
