//! # Echo Canceller
//!
//! Time-domain NLMS adaptive filter that models the loudspeaker-to-microphone
//! echo path from the far-end signal and subtracts its estimate from the
//! near-end signal.
//!
//! ## Metrics:
//! Block powers of far-end, near-end and error signals are smoothed and turned
//! into ERL, ERLE, a residual echo likelihood and a divergence fraction. Every
//! metric stays unavailable until the filter has seen enough active far-end
//! audio to say something meaningful.

use crate::engine::DebugMetricsSnapshot;

/// Length of the modelled echo path.
const FILTER_LENGTH_MS: u32 = 64;
const STEP_SIZE: f32 = 0.5;
/// Regularisation of the NLMS normalisation
const REGULARIZATION: f32 = 1e-6;
/// Far-end block power below this counts as silence (about -60 dBFS).
const FAR_ACTIVE_POWER: f32 = 1e-6;
/// Active far-end blocks required before any metric is reported.
const WARMUP_BLOCKS: u32 = 20;
/// Smoothing factor applied to per-block powers.
const POWER_SMOOTHING: f32 = 0.1;
/// Number of recent active blocks the divergence fraction covers.
const DIVERGENCE_WINDOW: usize = 50;

/// Far-end history laid out twice so the newest-first window is always contiguous.
#[derive(Debug, Clone)]
struct History {
    buf: Vec<f32>,
    pos: usize,
    len: usize,
    energy: f32,
}

impl History {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; len * 2],
            pos: 0,
            len,
            energy: 0.0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.pos = (self.pos + self.len - 1) % self.len;
        let leaving = self.buf[self.pos];
        self.energy = (self.energy + sample * sample - leaving * leaving).max(0.0);
        self.buf[self.pos] = sample;
        self.buf[self.pos + self.len] = sample;
    }

    /// Newest sample first.
    fn window(&self) -> &[f32] {
        &self.buf[self.pos..self.pos + self.len]
    }
}

/// NLMS echo canceller for one near-end sample rate.
#[derive(Debug, Clone)]
pub struct EchoCanceller {
    sample_rate: u32,
    weights: Vec<f32>,
    history: History,
    far_power: f32,
    near_power: f32,
    error_power: f32,
    likelihood: f32,
    active_blocks: u32,
    divergence: std::collections::VecDeque<bool>,
}

impl EchoCanceller {
    pub fn new(sample_rate: u32) -> Self {
        let taps = ((sample_rate as u64 * FILTER_LENGTH_MS as u64 / 1000) as usize).max(1);
        Self {
            sample_rate,
            weights: vec![0.0; taps],
            history: History::new(taps),
            far_power: 0.0,
            near_power: 0.0,
            error_power: 0.0,
            likelihood: 0.0,
            active_blocks: 0,
            divergence: std::collections::VecDeque::with_capacity(DIVERGENCE_WINDOW),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Cancel echo from one interleaved near-end block.
    ///
    /// `reference` holds one mono far-end sample per near-end sample frame.
    /// The filter adapts on the channel average and subtracts the same
    /// estimate from every channel.
    pub fn process(&mut self, near: &mut [f32], channels: usize, reference: &[f32]) {
        let channels = channels.max(1);
        let frames = near.len() / channels;

        let mut far_sum = 0.0f64;
        let mut near_sum = 0.0f64;
        let mut error_sum = 0.0f64;
        let mut cross = 0.0f64;
        let mut estimate_sum = 0.0f64;

        for n in 0..frames {
            let x = reference.get(n).copied().unwrap_or(0.0);
            self.history.push(x);

            let window = self.history.window();
            let estimate: f32 = self.weights.iter().zip(window).map(|(w, x)| w * x).sum();

            let frame = &mut near[n * channels..(n + 1) * channels];
            let mic = frame.iter().sum::<f32>() / channels as f32;
            let error = mic - estimate;
            for sample in frame.iter_mut() {
                *sample -= estimate;
            }

            let step = STEP_SIZE * error / (self.history.energy + REGULARIZATION);
            for (w, x) in self.weights.iter_mut().zip(self.history.window()) {
                *w += step * x;
            }

            far_sum += (x * x) as f64;
            near_sum += (mic * mic) as f64;
            error_sum += (error * error) as f64;
            cross += (error * estimate) as f64;
            estimate_sum += (estimate * estimate) as f64;
        }

        if frames == 0 {
            return;
        }
        let far = (far_sum / frames as f64) as f32;
        if far < FAR_ACTIVE_POWER {
            // Nothing to learn about the echo path while the far end is silent.
            return;
        }

        let near = (near_sum / frames as f64) as f32;
        let error = (error_sum / frames as f64) as f32;
        let correlation = if error_sum > 0.0 && estimate_sum > 0.0 {
            (cross.abs() / (error_sum * estimate_sum).sqrt()) as f32
        } else {
            0.0
        };
        // Residual echo: error still tracks the echo estimate, or the filter removed little.
        let removed = if near > 0.0 { 1.0 - (error / near).min(1.0) } else { 1.0 };
        let block_likelihood = correlation.max(1.0 - removed).clamp(0.0, 1.0);

        if self.active_blocks == 0 {
            self.far_power = far;
            self.near_power = near;
            self.error_power = error;
            self.likelihood = block_likelihood;
        } else {
            smooth(&mut self.far_power, far);
            smooth(&mut self.near_power, near);
            smooth(&mut self.error_power, error);
            smooth(&mut self.likelihood, block_likelihood);
        }
        self.active_blocks = self.active_blocks.saturating_add(1);

        if self.divergence.len() == DIVERGENCE_WINDOW {
            self.divergence.pop_front();
        }
        self.divergence.push_back(error > near * 1.1);
    }

    /// Current metrics; all `None` until warmed up.
    pub fn metrics(&self) -> DebugMetricsSnapshot {
        if self.active_blocks < WARMUP_BLOCKS {
            return DebugMetricsSnapshot::default();
        }

        let diverged = self.divergence.iter().filter(|d| **d).count();
        DebugMetricsSnapshot {
            echo_return_loss: ratio_db(self.far_power, self.near_power),
            echo_return_loss_enhancement: ratio_db(self.near_power, self.error_power),
            filter_delay_ms: self.delay_ms(),
            residual_echo_likelihood: Some(self.likelihood),
            divergent_filter_fraction: Some(diverged as f32 / self.divergence.len().max(1) as f32),
        }
    }

    /// Position of the dominant tap, if the filter has one.
    fn delay_ms(&self) -> Option<i32> {
        let (index, peak) = self
            .weights
            .iter()
            .map(|w| w.abs())
            .enumerate()
            .fold((0, 0.0f32), |best, (i, w)| if w > best.1 { (i, w) } else { best });
        if peak < 1e-3 {
            return None;
        }
        Some((index as u64 * 1000 / self.sample_rate as u64) as i32)
    }
}

fn smooth(value: &mut f32, next: f32) {
    *value += (next - *value) * POWER_SMOOTHING;
}

fn ratio_db(numerator: f32, denominator: f32) -> Option<f32> {
    if numerator <= 0.0 || denominator <= 0.0 {
        return None;
    }
    Some(10.0 * (numerator / denominator).log10())
}
