//! Voice Manager
//!
//! Tracks which pitches are sounding and owns the [`VoiceChain`] of each.
//! Per pitch the state machine is simply Idle → Sounding → Idle; a pitch
//! has at most one voice at a time.

use crate::config::{BendScope, EngineConfig, Retrigger};
use crate::graph::{Graph, GraphError, PortRef};
use crate::patch::Patch;
use crate::tuning::bend_multiplier;
use crate::voice::{build_voice, VoiceChain};
use std::collections::BTreeMap;
use tracing::debug;

/// Number of MIDI channels
pub const CHANNELS: usize = 16;

/// One sounding note
#[derive(Debug)]
pub struct Voice {
    /// MIDI note number
    pub pitch: u8,
    /// 1-based MIDI channel the note arrived on
    pub channel: u8,
    pub velocity: u8,
    chain: VoiceChain,
}

impl Voice {
    pub fn chain(&self) -> &VoiceChain {
        &self.chain
    }
}

#[inline]
fn channel_index(channel: u8) -> usize {
    usize::from(channel.clamp(1, CHANNELS as u8) - 1)
}

/// Owns the active voice set
pub struct VoiceManager {
    voices: BTreeMap<u8, Voice>,
    /// Current bend multiplier per channel
    bends: [f64; CHANNELS],
    bend_range: f64,
    bend_scope: BendScope,
    retrigger: Retrigger,
    /// Where every voice's master gain is routed
    output: PortRef,
}

impl VoiceManager {
    pub fn new(config: &EngineConfig, output: PortRef) -> Self {
        Self {
            voices: BTreeMap::new(),
            bends: [1.0; CHANNELS],
            bend_range: config.bend_range_semitones,
            bend_scope: config.bend_scope,
            retrigger: config.retrigger,
            output,
        }
    }

    /// Number of sounding voices
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    pub fn is_sounding(&self, pitch: u8) -> bool {
        self.voices.contains_key(&pitch)
    }

    pub fn voice(&self, pitch: u8) -> Option<&Voice> {
        self.voices.get(&pitch)
    }

    /// Sounding voices in ascending pitch order
    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.values()
    }

    /// Current bend multiplier for a channel
    pub fn bend(&self, channel: u8) -> f64 {
        self.bends[channel_index(channel)]
    }

    /// Start a voice for `pitch`, built from `patch`.
    ///
    /// Returns `Ok(false)` if the pitch was already sounding and the
    /// retrigger policy is [`Retrigger::Ignore`].
    pub fn note_on(
        &mut self,
        graph: &mut Graph,
        patch: &Patch,
        channel: u8,
        pitch: u8,
        velocity: u8,
    ) -> Result<bool, GraphError> {
        let channel = channel.clamp(1, CHANNELS as u8);
        if let Some(existing) = self.voices.remove(&pitch) {
            match self.retrigger {
                Retrigger::Ignore => {
                    self.voices.insert(pitch, existing);
                    debug!(pitch, "note already sounding, ignoring retrigger");
                    return Ok(false);
                }
                Retrigger::Replace => {
                    debug!(pitch, "retriggering sounding note");
                    existing.chain.dispose(graph);
                }
            }
        }

        let chain = build_voice(graph, patch, pitch, velocity, self.output)?;

        let bend = self.bend(channel);
        if bend != 1.0 {
            if let Err(e) = chain.retune(graph, bend) {
                chain.dispose(graph);
                return Err(e);
            }
        }

        self.voices.insert(
            pitch,
            Voice {
                pitch,
                channel,
                velocity,
                chain,
            },
        );
        Ok(true)
    }

    /// Release the voice for `pitch`. Returns false if nothing was sounding.
    pub fn note_off(&mut self, graph: &mut Graph, pitch: u8) -> bool {
        match self.voices.remove(&pitch) {
            Some(voice) => {
                voice.chain.dispose(graph);
                true
            }
            None => false,
        }
    }

    /// Apply a pitch bend, returning how many voices were retuned.
    ///
    /// The multiplier is also remembered, so notes started later on an
    /// affected channel begin bent.
    pub fn pitch_bend(
        &mut self,
        graph: &mut Graph,
        channel: u8,
        lsb: u8,
        msb: u8,
    ) -> Result<usize, GraphError> {
        let channel = channel.clamp(1, CHANNELS as u8);
        let multiplier = bend_multiplier(lsb, msb, self.bend_range);

        match self.bend_scope {
            BendScope::Channel => self.bends[channel_index(channel)] = multiplier,
            BendScope::Omni => self.bends = [multiplier; CHANNELS],
        }

        let mut retuned = 0;
        for voice in self.voices.values() {
            if self.bend_scope == BendScope::Omni || voice.channel == channel {
                voice.chain.retune(graph, multiplier)?;
                retuned += 1;
            }
        }
        Ok(retuned)
    }

    /// Release every voice, returning how many there were
    pub fn all_notes_off(&mut self, graph: &mut Graph) -> usize {
        let count = self.voices.len();
        for (_, voice) in std::mem::take(&mut self.voices) {
            voice.chain.dispose(graph);
        }
        count
    }

    /// Release every voice and forget all bends
    pub fn reset(&mut self, graph: &mut Graph) {
        self.all_notes_off(graph);
        self.bends = [1.0; CHANNELS];
    }
}
