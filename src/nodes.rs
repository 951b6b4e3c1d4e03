//! Signal Graph Nodes
//!
//! The building blocks of a voice chain: tone generators, gain stages,
//! biquad filters, and the shared output sink.

use crate::port::{GraphModule, ParamDef, ParamId, PortDef, PortSpec, PortValues, SignalKind};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, Hertz, Type};
use libm::Libm;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Oscillator waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveType {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl WaveType {
    /// Unit-amplitude sample at normalized phase `phase` in [0, 1)
    #[inline]
    pub fn sample(&self, phase: f64) -> f64 {
        match self {
            WaveType::Sine => Libm::<f64>::sin(phase * TAU),
            WaveType::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveType::Sawtooth => 2.0 * phase - 1.0,
            WaveType::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// Tone generator
///
/// Produces a unit-amplitude periodic waveform. The effective frequency is
/// the FREQUENCY parameter plus whatever arrives on the `frequency` input,
/// shifted by DETUNE cents. Outputs silence until started and after stopped.
pub struct Oscillator {
    wave: WaveType,
    frequency: f64,
    detune: f64,
    phase: f64,
    sample_rate: f64,
    playing: bool,
    stopped: bool,
    spec: PortSpec,
}

impl Oscillator {
    pub const FREQUENCY: ParamId = 0;
    pub const DETUNE: ParamId = 1;

    pub const IN_FREQUENCY: u32 = 0;
    pub const OUT: u32 = 10;

    pub fn new(wave: WaveType, frequency: f64, sample_rate: f64) -> Self {
        Self {
            wave,
            frequency,
            detune: 0.0,
            phase: 0.0,
            sample_rate,
            playing: false,
            stopped: false,
            spec: PortSpec {
                inputs: vec![PortDef::new(
                    Self::IN_FREQUENCY,
                    "frequency",
                    SignalKind::Frequency,
                )],
                outputs: vec![PortDef::new(Self::OUT, "out", SignalKind::Audio)],
            },
        }
    }

    pub fn with_detune(mut self, cents: f64) -> Self {
        self.detune = cents;
        self
    }

    /// Frequency after detune, ignoring any modulation input
    pub fn effective_frequency(&self) -> f64 {
        self.frequency * Libm::<f64>::pow(2.0, self.detune / 1200.0)
    }
}

impl GraphModule for Oscillator {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        if !self.playing {
            outputs.set(Self::OUT, 0.0);
            return;
        }

        let fm = inputs.get_or(Self::IN_FREQUENCY, 0.0);
        let freq = (self.frequency + fm) * Libm::<f64>::pow(2.0, self.detune / 1200.0);

        outputs.set(Self::OUT, self.wave.sample(self.phase));

        // Modulated frequency may go negative; run the phase backwards then
        self.phase = (self.phase + freq / self.sample_rate).rem_euclid(1.0);
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn params(&self) -> &[ParamDef] {
        static PARAMS: &[ParamDef] = &[
            ParamDef {
                id: Oscillator::FREQUENCY,
                name: "frequency",
                default: 440.0,
                min: 0.0,
                max: 24000.0,
            },
            ParamDef {
                id: Oscillator::DETUNE,
                name: "detune",
                default: 0.0,
                min: -1200.0,
                max: 1200.0,
            },
        ];
        PARAMS
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        match id {
            Self::FREQUENCY => Some(self.frequency),
            Self::DETUNE => Some(self.detune),
            _ => None,
        }
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        match id {
            Self::FREQUENCY => self.frequency = value,
            Self::DETUNE => self.detune = value,
            _ => {}
        }
    }

    fn start(&mut self) {
        // A stopped source cannot be restarted
        if !self.stopped {
            self.playing = true;
        }
    }

    fn stop(&mut self) {
        self.playing = false;
        self.stopped = true;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn type_id(&self) -> &'static str {
        "oscillator"
    }
}

/// Gain stage
///
/// Scales its input by the GAIN parameter plus the `gain` control input,
/// which is how amplitude modulation is patched in.
pub struct Gain {
    gain: f64,
    spec: PortSpec,
}

impl Gain {
    pub const GAIN: ParamId = 0;

    pub const IN: u32 = 0;
    pub const IN_GAIN: u32 = 1;
    pub const OUT: u32 = 10;

    pub fn new(gain: f64) -> Self {
        Self {
            gain,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(Self::IN, "in", SignalKind::Audio),
                    PortDef::new(Self::IN_GAIN, "gain", SignalKind::Control),
                ],
                outputs: vec![PortDef::new(Self::OUT, "out", SignalKind::Audio)],
            },
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GraphModule for Gain {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let input = inputs.get_or(Self::IN, 0.0);
        let cv = inputs.get_or(Self::IN_GAIN, 0.0);
        outputs.set(Self::OUT, input * (self.gain + cv));
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _: f64) {}

    fn params(&self) -> &[ParamDef] {
        static PARAMS: &[ParamDef] = &[ParamDef {
            id: Gain::GAIN,
            name: "gain",
            default: 1.0,
            min: f64::MIN,
            max: f64::MAX,
        }];
        PARAMS
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        (id == Self::GAIN).then_some(self.gain)
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        if id == Self::GAIN {
            self.gain = value;
        }
    }

    fn type_id(&self) -> &'static str {
        "gain"
    }
}

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Lowshelf,
    Highshelf,
    Notch,
}

/// Second-order IIR filter (RBJ cookbook responses)
///
/// FREQUENCY is the cutoff/center in Hz, Q the emphasis, GAIN the shelf
/// boost/cut in dB (ignored by non-shelving responses).
pub struct BiquadFilter {
    kind: FilterKind,
    frequency: f64,
    q: f64,
    gain_db: f64,
    sample_rate: f64,
    state: DirectForm2Transposed<f64>,
    spec: PortSpec,
}

impl BiquadFilter {
    pub const FREQUENCY: ParamId = 0;
    pub const Q: ParamId = 1;
    pub const GAIN: ParamId = 2;

    pub const IN: u32 = 0;
    pub const OUT: u32 = 10;

    pub fn new(kind: FilterKind, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let coefficients = design(kind, frequency, q, gain_db, sample_rate);
        Self {
            kind,
            frequency,
            q,
            gain_db,
            sample_rate,
            state: DirectForm2Transposed::<f64>::new(coefficients),
            spec: PortSpec {
                inputs: vec![PortDef::new(Self::IN, "in", SignalKind::Audio)],
                outputs: vec![PortDef::new(Self::OUT, "out", SignalKind::Audio)],
            },
        }
    }

    fn redesign(&mut self) {
        let coefficients = design(
            self.kind,
            self.frequency,
            self.q,
            self.gain_db,
            self.sample_rate,
        );
        self.state.update_coefficients(coefficients);
    }
}

/// Compute coefficients, falling back to a passthrough if the parameters
/// are unusable (e.g. a zero sample rate).
fn design(kind: FilterKind, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Coefficients<f64> {
    try_design(kind, frequency, q, gain_db, sample_rate).unwrap_or(Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    })
}

fn try_design(
    kind: FilterKind,
    frequency: f64,
    q: f64,
    gain_db: f64,
    sample_rate: f64,
) -> Result<Coefficients<f64>, biquad::Errors> {
    // Keep the cutoff strictly inside (0, nyquist)
    let nyquist = sample_rate / 2.0;
    let f0 = frequency.clamp(1.0, (nyquist * 0.999).max(1.0));
    let response = match kind {
        FilterKind::Lowpass => Type::LowPass,
        FilterKind::Highpass => Type::HighPass,
        FilterKind::Bandpass => Type::BandPass,
        FilterKind::Notch => Type::Notch,
        FilterKind::Lowshelf => Type::LowShelf(gain_db),
        FilterKind::Highshelf => Type::HighShelf(gain_db),
    };
    Coefficients::<f64>::from_params(
        response,
        Hertz::<f64>::from_hz(sample_rate)?,
        Hertz::<f64>::from_hz(f0)?,
        q.max(1e-4),
    )
}

impl GraphModule for BiquadFilter {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let input = inputs.get_or(Self::IN, 0.0);
        outputs.set(Self::OUT, self.state.run(input));
    }

    fn reset(&mut self) {
        let coefficients = design(
            self.kind,
            self.frequency,
            self.q,
            self.gain_db,
            self.sample_rate,
        );
        self.state = DirectForm2Transposed::<f64>::new(coefficients);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.redesign();
    }

    fn params(&self) -> &[ParamDef] {
        static PARAMS: &[ParamDef] = &[
            ParamDef {
                id: BiquadFilter::FREQUENCY,
                name: "frequency",
                default: 1000.0,
                min: 20.0,
                max: 20000.0,
            },
            ParamDef {
                id: BiquadFilter::Q,
                name: "q",
                default: 1.0,
                min: 1.0,
                max: 20.0,
            },
            ParamDef {
                id: BiquadFilter::GAIN,
                name: "gain",
                default: 0.0,
                min: -40.0,
                max: 40.0,
            },
        ];
        PARAMS
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        match id {
            Self::FREQUENCY => Some(self.frequency),
            Self::Q => Some(self.q),
            Self::GAIN => Some(self.gain_db),
            _ => None,
        }
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        match id {
            Self::FREQUENCY => self.frequency = value,
            Self::Q => self.q = value,
            Self::GAIN => self.gain_db = value,
            _ => return,
        }
        self.redesign();
    }

    fn type_id(&self) -> &'static str {
        "biquad_filter"
    }
}

/// Output sink
///
/// Every voice's master gain lands here; the sum is copied to both the
/// left and right outputs.
pub struct Destination {
    spec: PortSpec,
}

impl Destination {
    pub const IN: u32 = 0;
    pub const OUT_LEFT: u32 = 0;
    pub const OUT_RIGHT: u32 = 1;

    pub fn new() -> Self {
        Self {
            spec: PortSpec {
                inputs: vec![PortDef::new(Self::IN, "in", SignalKind::Audio)],
                outputs: vec![
                    PortDef::new(Self::OUT_LEFT, "left", SignalKind::Audio),
                    PortDef::new(Self::OUT_RIGHT, "right", SignalKind::Audio),
                ],
            },
        }
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModule for Destination {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let mono = inputs.get_or(Self::IN, 0.0);
        outputs.set(Self::OUT_LEFT, mono);
        outputs.set(Self::OUT_RIGHT, mono);
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _: f64) {}

    fn type_id(&self) -> &'static str {
        "destination"
    }
}
