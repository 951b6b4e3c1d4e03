//! Error types for WASM bindings

use crate::patch::PatchError;
use crate::synth::EngineError;
use wasm_bindgen::prelude::*;

/// Error surfaced to JavaScript
#[wasm_bindgen]
pub struct SynthError {
    message: String,
}

#[wasm_bindgen]
impl SynthError {
    /// Get the error message
    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl From<EngineError> for SynthError {
    fn from(e: EngineError) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

impl From<PatchError> for SynthError {
    fn from(e: PatchError) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

impl From<serde_wasm_bindgen::Error> for SynthError {
    fn from(e: serde_wasm_bindgen::Error) -> Self {
        Self {
            message: format!("Invalid patch object: {}", e),
        }
    }
}

impl From<&str> for SynthError {
    fn from(message: &str) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl SynthError {
    /// Convert to JsValue for use as error return
    pub fn into_js(self) -> JsValue {
        JsValue::from_str(&self.message)
    }
}

/// Map any engine-side error straight to a `JsValue`
pub(crate) fn to_js<E: Into<SynthError>>(e: E) -> JsValue {
    e.into().into_js()
}
