//! Signal Graph Builder
//!
//! Turns a [`Patch`] plus a note into a live chain of nodes inside the
//! [`Graph`]:
//!
//! ```text
//! osc1 ─ velocity1 ─ [pre-mix filters "1"] ─┐
//!                                           ├─ mix ─ [combined filters] ─ master ─ destination
//! osc2 ─ velocity2 ─ [pre-mix filters "2"] ─┘
//! ```
//!
//! The returned [`VoiceChain`] owns every node it created and tears them
//! all down in [`VoiceChain::dispose`].

use crate::graph::{Graph, GraphError, NodeHandle, NodeId, PortRef};
use crate::nodes::{BiquadFilter, Gain, Oscillator};
use crate::patch::{MixMode, Patch};
use crate::port::GraphModule;
use crate::tuning::{bent_frequency, note_to_frequency};

/// Fixed output ceiling applied to every voice
pub const MASTER_GAIN: f64 = 0.5;

/// Makeup gain for mixes that sum two full-scale sources
pub const SUMMED_MIX_GAIN: f64 = 0.5;

/// Velocity assumed when a note arrives with none
pub const DEFAULT_VELOCITY: u8 = 64;

/// Gain applied per oscillator for a given velocity
#[inline]
pub fn velocity_gain(velocity: u8) -> f64 {
    let velocity = if velocity == 0 {
        DEFAULT_VELOCITY
    } else {
        velocity
    };
    velocity as f64 / 127.0
}

/// Nodes created by the mix stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixNodes {
    /// Per-oscillator level gains summed into a bus
    Volume { levels: [NodeId; 2], bus: NodeId },
    /// Both oscillators summed into a halved bus
    Additive { bus: NodeId },
    /// Carrier gain whose control input is driven by the modulator
    Am { carrier_gain: NodeId },
    /// Modulation depth feeding the carrier's frequency input, and the
    /// halved bus carrying the carrier forward
    Fm { depth: NodeId, bus: NodeId },
}

/// Every node belonging to one sounding note
#[derive(Debug)]
pub struct VoiceChain {
    generators: [NodeId; 2],
    base_frequencies: [f64; 2],
    velocity_gains: [NodeId; 2],
    mix: MixNodes,
    master: NodeId,
    nodes: Vec<NodeId>,
}

impl VoiceChain {
    /// The two tone generators, in oscillator-slot order
    pub fn generators(&self) -> [NodeId; 2] {
        self.generators
    }

    /// Un-bent generator frequencies, including octave offsets
    pub fn base_frequencies(&self) -> [f64; 2] {
        self.base_frequencies
    }

    pub fn velocity_gains(&self) -> [NodeId; 2] {
        self.velocity_gains
    }

    pub fn mix(&self) -> MixNodes {
        self.mix
    }

    pub fn master(&self) -> NodeId {
        self.master
    }

    /// All nodes in creation order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Move both generators to their base frequency times `multiplier`
    pub fn retune(&self, graph: &mut Graph, multiplier: f64) -> Result<(), GraphError> {
        for (node, base) in self.generators.iter().zip(self.base_frequencies) {
            graph.set_param(*node, Oscillator::FREQUENCY, bent_frequency(base, multiplier))?;
        }
        Ok(())
    }

    /// Tear the chain down: cut its outgoing cables, stop the generators,
    /// then remove its nodes. Nodes already gone from the graph are skipped.
    pub fn dispose(self, graph: &mut Graph) {
        for &node in &self.nodes {
            if graph.contains(node) {
                let _ = graph.disconnect_outputs(node);
            }
        }
        for &node in &self.generators {
            let _ = graph.stop(node);
        }
        for &node in self.nodes.iter().rev() {
            let _ = graph.remove(node);
        }
    }
}

/// Build the chain for `note` from `patch`, route it into `output`, and
/// start its generators.
///
/// On failure every node created so far is removed again, so the graph is
/// left as it was.
///
/// `patch` is expected to have passed [`Patch::validate`]. Out-of-range
/// fields are not rejected here; octave offsets saturate instead of
/// overflowing.
pub fn build_voice(
    graph: &mut Graph,
    patch: &Patch,
    note: u8,
    velocity: u8,
    output: PortRef,
) -> Result<VoiceChain, GraphError> {
    let mut builder = ChainBuilder {
        graph,
        nodes: Vec::new(),
    };
    match builder.build(patch, note, velocity, output) {
        Ok(chain) => Ok(chain),
        Err(e) => {
            builder.abandon();
            Err(e)
        }
    }
}

struct ChainBuilder<'a> {
    graph: &'a mut Graph,
    nodes: Vec<NodeId>,
}

impl ChainBuilder<'_> {
    fn add<M: GraphModule + 'static>(&mut self, name: String, module: M) -> NodeHandle {
        let handle = self.graph.add(name, module);
        self.nodes.push(handle.id());
        handle
    }

    fn connect(&mut self, from: PortRef, to: PortRef) -> Result<(), GraphError> {
        self.graph.connect(from, to)
    }

    fn abandon(self) {
        for node in self.nodes.into_iter().rev() {
            let _ = self.graph.remove(node);
        }
    }

    fn build(
        &mut self,
        patch: &Patch,
        note: u8,
        velocity: u8,
        output: PortRef,
    ) -> Result<VoiceChain, GraphError> {
        let sample_rate = self.graph.sample_rate();
        let level = velocity_gain(velocity);

        let mut generators: Vec<NodeHandle> = Vec::with_capacity(2);
        let mut velocity_gains: Vec<NodeHandle> = Vec::with_capacity(2);
        let mut base_frequencies = [0.0; 2];
        let mut tails: Vec<PortRef> = Vec::with_capacity(2);

        for (slot, osc) in patch.oscillators.iter().enumerate() {
            let n = slot + 1;
            let semitones = osc.octave.saturating_mul(12);
            let frequency = note_to_frequency(i32::from(note).saturating_add(semitones));
            base_frequencies[slot] = frequency;

            let osc_node = self.add(
                format!("note{}.osc{}", note, n),
                Oscillator::new(osc.wave_type, frequency, sample_rate).with_detune(osc.detune),
            );
            let vel = self.add(format!("note{}.velocity{}", note, n), Gain::new(level));
            self.connect(osc_node.out("out")?, vel.in_("in")?)?;

            let mut tail = vel.out("out")?;
            for (i, def) in patch.pre_mix_filters(slot).enumerate() {
                let filter = self.add(
                    format!("note{}.filter{}.{}", note, n, i),
                    BiquadFilter::new(def.kind, def.frequency, def.emphasis, def.gain, sample_rate),
                );
                self.connect(tail, filter.in_("in")?)?;
                tail = filter.out("out")?;
            }

            generators.push(osc_node);
            velocity_gains.push(vel);
            tails.push(tail);
        }

        let (mix, mut tail) = match patch.mixer.mode() {
            MixMode::Volume { mix } => {
                let bus = self.add(format!("note{}.mix", note), Gain::new(1.0));
                let mut levels = [bus.id(); 2];
                for (slot, amount) in [1.0 - mix, mix].into_iter().enumerate() {
                    let lvl = self.add(format!("note{}.level{}", note, slot + 1), Gain::new(amount));
                    self.connect(tails[slot], lvl.in_("in")?)?;
                    self.connect(lvl.out("out")?, bus.in_("in")?)?;
                    levels[slot] = lvl.id();
                }
                (
                    MixNodes::Volume {
                        levels,
                        bus: bus.id(),
                    },
                    bus.out("out")?,
                )
            }
            MixMode::Additive => {
                let bus = self.add(format!("note{}.mix", note), Gain::new(SUMMED_MIX_GAIN));
                for &t in &tails {
                    self.connect(t, bus.in_("in")?)?;
                }
                (MixNodes::Additive { bus: bus.id() }, bus.out("out")?)
            }
            MixMode::Am { carrier } => {
                let modulator = 1 - carrier;
                let am = self.add(format!("note{}.am", note), Gain::new(1.0));
                self.connect(tails[carrier], am.in_("in")?)?;
                self.connect(tails[modulator], am.in_("gain")?)?;
                (
                    MixNodes::Am {
                        carrier_gain: am.id(),
                    },
                    am.out("out")?,
                )
            }
            MixMode::Fm { carrier, mod_index } => {
                let modulator = 1 - carrier;
                let depth = self.add(
                    format!("note{}.fm_depth", note),
                    Gain::new(mod_index / 100.0 * base_frequencies[carrier]),
                );
                self.connect(tails[modulator], depth.in_("in")?)?;
                self.connect(depth.out("out")?, generators[carrier].in_("frequency")?)?;

                let bus = self.add(format!("note{}.mix", note), Gain::new(SUMMED_MIX_GAIN));
                self.connect(tails[carrier], bus.in_("in")?)?;
                (
                    MixNodes::Fm {
                        depth: depth.id(),
                        bus: bus.id(),
                    },
                    bus.out("out")?,
                )
            }
        };

        for (i, def) in patch.combined_filters().enumerate() {
            let filter = self.add(
                format!("note{}.filter.{}", note, i),
                BiquadFilter::new(def.kind, def.frequency, def.emphasis, def.gain, sample_rate),
            );
            self.connect(tail, filter.in_("in")?)?;
            tail = filter.out("out")?;
        }

        let master = self.add(format!("note{}.master", note), Gain::new(MASTER_GAIN));
        self.connect(tail, master.in_("in")?)?;
        self.connect(master.out("out")?, output)?;

        for handle in &generators {
            self.graph.start(handle.id())?;
        }

        Ok(VoiceChain {
            generators: [generators[0].id(), generators[1].id()],
            base_frequencies,
            velocity_gains: [velocity_gains[0].id(), velocity_gains[1].id()],
            mix,
            master: master.id(),
            nodes: self.nodes.clone(),
        })
    }
}
