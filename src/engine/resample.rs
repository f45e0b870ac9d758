//! # Reference Resampler
//!
//! Maps the mono far-end reference onto the near-end block length when the two
//! streams run at different rates.
//!
//! ## How It Works:
//! - One band-limited sinc resampler lives for the whole run, so its filter
//!   state carries across block boundaries
//! - Its ratio is `output_frames / input_frames`, which keeps one far-end block
//!   paired with one near-end block even when the 10 ms blocks are truncated
//! - Output frames per call vary by one or two, so they queue up and every
//!   block takes exactly `output_frames` from the front
//!
//! ## Rust Concepts:
//! - **VecDeque**: FIFO of resampled samples, cheap at both ends
//! - **Trait import**: `rubato::Resampler` must be in scope to call `process`

use crate::error::{PipelineError, PipelineResult};
use rubato::{
    Resampler,              // brings `process` into scope
    SincFixedIn,            // fixed input chunk, variable output
    SincInterpolationParameters,
    SincInterpolationType,
    WindowFunction,
};
use std::collections::VecDeque;

/// Samples of silence queued up front so per-call output jitter never runs the queue dry.
const JITTER_MARGIN: usize = 4;

/// Band-limited block resampler for the far-end reference.
pub struct ReferenceResampler {
    inner: SincFixedIn<f32>,
    input_frames: usize,
    output_frames: usize,
    pending: VecDeque<f32>,
}

impl ReferenceResampler {
    /// Resampler turning blocks of `input_frames` into blocks of `output_frames`.
    pub fn new(input_frames: usize, output_frames: usize) -> PipelineResult<Self> {
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let inner = SincFixedIn::<f32>::new(
            output_frames as f64 / input_frames as f64,
            1.0, // ratio never changes during a run
            params,
            input_frames,
            1,
        )
        .map_err(|e| PipelineError::Engine(format!("Failed to create reference resampler: {}", e)))?;

        let mut pending = VecDeque::with_capacity(output_frames * 3);
        pending.extend(std::iter::repeat(0.0).take(JITTER_MARGIN));
        Ok(Self {
            inner,
            input_frames,
            output_frames,
            pending,
        })
    }

    pub fn matches(&self, input_frames: usize, output_frames: usize) -> bool {
        self.input_frames == input_frames && self.output_frames == output_frames
    }

    /// Resample one reference block; always returns `output_frames` samples.
    ///
    /// While the filter is still filling, the missing head of the block is silence.
    pub fn process(&mut self, block: &[f32]) -> PipelineResult<Vec<f32>> {
        let resampled = self
            .inner
            .process(&[block], None)
            .map_err(|e| PipelineError::Engine(format!("Reference resampling failed: {}", e)))?;
        if let Some(channel) = resampled.into_iter().next() {
            self.pending.extend(channel);
        }

        let available = self.pending.len().min(self.output_frames);
        let mut out = vec![0.0; self.output_frames - available];
        out.extend(self.pending.drain(..available));

        // Rounding drift is absorbed by dropping the oldest surplus.
        let limit = self.output_frames * 2;
        if self.pending.len() > limit {
            let surplus = self.pending.len() - limit;
            self.pending.drain(..surplus);
        }
        Ok(out)
    }
}
