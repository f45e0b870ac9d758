//! Per-block signal conditioning used by the built-in engine: high-pass
//! filter, noise gate and digital gain control.
//!
//! All processors work on interleaved `f32` samples in `[-1.0, 1.0)`.

use crate::config::{GainControlMode, NoiseSuppressionLevel};

/// Cutoff of the DC/rumble filter.
const HIGH_PASS_CUTOFF_HZ: f32 = 80.0;
const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Target output level of the gain controllers (about -18 dBFS).
const TARGET_RMS: f32 = 0.125;
/// Below this the gain controllers hold their gain (about -60 dBFS).
const SILENCE_RMS: f32 = 0.001;

/// Second-order high-pass section, one state per channel (direct form I).
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    /// x1, x2, y1, y2 per channel
    state: Vec<[f32; 4]>,
    sample_rate: u32,
}

impl HighPassFilter {
    /// RBJ cookbook high-pass at the fixed cutoff.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        // Keep the cutoff well under Nyquist for very low rates.
        let cutoff = HIGH_PASS_CUTOFF_HZ.min(sample_rate as f32 * 0.25);
        let w0 = 2.0 * std::f32::consts::PI * cutoff / sample_rate as f32;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * BUTTERWORTH_Q);

        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            state: vec![[0.0; 4]; channels.max(1)],
            sample_rate,
        }
    }

    /// Whether this filter was designed for the given stream layout.
    pub fn matches(&self, sample_rate: u32, channels: usize) -> bool {
        self.sample_rate == sample_rate && self.state.len() == channels.max(1)
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        let channels = self.state.len();
        for (i, sample) in samples.iter_mut().enumerate() {
            let [x1, x2, y1, y2] = self.state[i % channels];
            let x = *sample;
            let y = self.b0 * x + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            self.state[i % channels] = [x, x1, y, y1];
            *sample = y;
        }
    }
}

/// Block-level noise gate.
///
/// Tracks the noise floor as a slowly rising minimum of block RMS and
/// attenuates blocks that sit close to it. The level picks the attenuation.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    attenuation: f32,
    noise_floor: Option<f32>,
    /// Gain applied at the end of the previous block, ramped from per block
    gain: f32,
}

impl NoiseGate {
    /// Blocks under `floor * OPEN_RATIO` count as noise.
    const OPEN_RATIO: f32 = 2.0;
    /// Per-block upward drift of the floor estimate.
    const FLOOR_RISE: f32 = 1.01;

    pub fn new(level: NoiseSuppressionLevel) -> Self {
        let attenuation = match level {
            NoiseSuppressionLevel::Low => 0.5,
            NoiseSuppressionLevel::Moderate => 0.25,
            NoiseSuppressionLevel::High => 0.125,
            NoiseSuppressionLevel::VeryHigh => 0.0625,
        };
        Self {
            attenuation,
            noise_floor: None,
            gain: 1.0,
        }
    }

    /// The first block only seeds the floor estimate; the gate starts open.
    pub fn process(&mut self, samples: &mut [f32]) {
        let level = rms(samples);
        let floor = match self.noise_floor {
            None => {
                self.noise_floor = Some(level);
                return;
            }
            Some(floor) if level >= floor => floor * Self::FLOOR_RISE,
            Some(_) => level,
        };
        self.noise_floor = Some(floor);

        let target = if level <= floor * Self::OPEN_RATIO {
            self.attenuation
        } else {
            1.0
        };
        ramp_gain(samples, self.gain, target);
        self.gain = target;
    }
}

/// Single-band digital gain controller.
#[derive(Debug, Clone)]
pub struct GainController {
    /// Fixed gain, or the adaptive gain's current value
    gain: f32,
    max_gain: f32,
    /// Fraction of the distance to the desired gain covered per block; 0 = fixed
    adaptation: f32,
}

impl GainController {
    /// First-generation controller in the configured mode.
    ///
    /// There is no analog microphone control offline, so the analog mode
    /// behaves like the adaptive digital one.
    pub fn agc1(mode: GainControlMode) -> Self {
        match mode {
            GainControlMode::AdaptiveAnalog | GainControlMode::AdaptiveDigital => Self {
                gain: 1.0,
                max_gain: db_to_linear(18.0),
                adaptation: 0.1,
            },
            GainControlMode::FixedDigital => Self {
                gain: db_to_linear(9.0),
                max_gain: db_to_linear(9.0),
                adaptation: 0.0,
            },
        }
    }

    /// Second-generation adaptive controller: wider range, slower adaptation.
    pub fn agc2() -> Self {
        Self {
            gain: 1.0,
            max_gain: db_to_linear(30.0),
            adaptation: 0.03,
        }
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        let start = self.gain;
        if self.adaptation > 0.0 {
            let level = rms(samples);
            if level > SILENCE_RMS {
                let desired = (TARGET_RMS / level).clamp(1.0 / self.max_gain, self.max_gain);
                self.gain += (desired - self.gain) * self.adaptation;
            }
        }
        ramp_gain(samples, start, self.gain);
        // Hard limiter
        for sample in samples.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

/// Root mean square of a block, 0 for an empty block.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Scale a block by a gain moving linearly from `from` to `to`.
fn ramp_gain(samples: &mut [f32], from: f32, to: f32) {
    let n = samples.len().max(1) as f32;
    for (i, sample) in samples.iter_mut().enumerate() {
        let g = from + (to - from) * (i as f32 + 1.0) / n;
        *sample *= g;
    }
}
