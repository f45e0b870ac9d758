//! # Processing Engine
//!
//! The narrow contract between the pipeline and the echo-cancellation /
//! gain-control engine, plus the adapter that enforces how it may be called.
//!
//! ## Key Components:
//! - **ProcessingEngine**: trait any engine implements (configure, reverse path,
//!   forward path, statistics)
//! - **ProcessingAdapter**: wraps an engine and rejects out-of-order calls
//! - **DebugMetricsSnapshot**: engine metrics, each value optional
//! - **BuiltinEngine**: the engine shipped with the binary
//! - **ReferenceResampler**: aligns far-end blocks with near-end blocks of another length
//!
//! ## Call Order Per Run:
//! 1. `configure` exactly once
//! 2. for every tick: `submit_reference`, then `submit_primary`
//! 3. `statistics` at any time after configuration

pub mod builtin;
pub mod echo_canceller;
pub mod filters;
pub mod resample;

pub use builtin::BuiltinEngine;

use crate::audio::frame::Frame;
use crate::audio::wav::StreamDescriptor;
use crate::config::ProcessingConfig;
use crate::error::{PipelineError, PipelineResult};

/// Engine-reported metrics at one point in time.
///
/// A `None` means the engine could not produce the value yet (for example
/// before its adaptive filter has converged). It is never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DebugMetricsSnapshot {
    /// Echo return loss in dB
    pub echo_return_loss: Option<f32>,
    /// Echo return loss enhancement in dB
    pub echo_return_loss_enhancement: Option<f32>,
    /// Estimated echo path delay
    pub filter_delay_ms: Option<i32>,
    /// Likelihood (0..1) that residual echo remains in the output
    pub residual_echo_likelihood: Option<f32>,
    /// Fraction (0..1) of recent blocks where the filter diverged
    pub divergent_filter_fraction: Option<f32>,
}

impl DebugMetricsSnapshot {
    /// Residual echo likelihood is known and above one half.
    pub fn echo_detected(&self) -> bool {
        matches!(self.residual_echo_likelihood, Some(likelihood) if likelihood > 0.5)
    }

    /// Compact Y/N availability string for logging.
    pub fn availability(&self) -> String {
        let flag = |present: bool| if present { "Y" } else { "N" };
        format!(
            "ERL={} ERLE={} REL={} DFF={} Delay={}",
            flag(self.echo_return_loss.is_some()),
            flag(self.echo_return_loss_enhancement.is_some()),
            flag(self.residual_echo_likelihood.is_some()),
            flag(self.divergent_filter_fraction.is_some()),
            flag(self.filter_delay_ms.is_some()),
        )
    }
}

/// An acoustic echo cancellation / gain control engine.
///
/// Buffers are interleaved 16-bit samples, processed in place. The descriptor
/// passed with each buffer describes that buffer's stream only.
pub trait ProcessingEngine {
    /// Apply the feature set. Called once, before any audio.
    fn apply_config(&mut self, config: &ProcessingConfig) -> PipelineResult<()>;

    /// Feed one far-end (loudspeaker) block.
    fn process_reverse_stream(
        &mut self,
        samples: &mut [i16],
        stream: &StreamDescriptor,
    ) -> PipelineResult<()>;

    /// Clean one near-end (microphone) block.
    fn process_stream(&mut self, samples: &mut [i16], stream: &StreamDescriptor)
        -> PipelineResult<()>;

    /// Metrics accumulated so far.
    fn statistics(&self) -> DebugMetricsSnapshot;
}

impl<E: ProcessingEngine + ?Sized> ProcessingEngine for &mut E {
    fn apply_config(&mut self, config: &ProcessingConfig) -> PipelineResult<()> {
        (**self).apply_config(config)
    }

    fn process_reverse_stream(
        &mut self,
        samples: &mut [i16],
        stream: &StreamDescriptor,
    ) -> PipelineResult<()> {
        (**self).process_reverse_stream(samples, stream)
    }

    fn process_stream(&mut self, samples: &mut [i16], stream: &StreamDescriptor) -> PipelineResult<()> {
        (**self).process_stream(samples, stream)
    }

    fn statistics(&self) -> DebugMetricsSnapshot {
        (**self).statistics()
    }
}

/// Enforces the engine call order for one run.
pub struct ProcessingAdapter<E: ProcessingEngine> {
    engine: E,
    configured: bool,
    /// A reference frame has been submitted for the current tick
    reference_pending: bool,
}

impl<E: ProcessingEngine> ProcessingAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            configured: false,
            reference_pending: false,
        }
    }

    /// Apply the one-time feature configuration.
    pub fn configure(&mut self, options: &ProcessingConfig) -> PipelineResult<()> {
        if self.configured {
            return Err(PipelineError::Engine(
                "engine configuration may only be applied once".to_string(),
            ));
        }
        self.engine.apply_config(options)?;
        self.configured = true;
        Ok(())
    }

    /// Pass a far-end frame through the reverse path, in place.
    pub fn submit_reference(
        &mut self,
        frame: &mut Frame,
        descriptor: &StreamDescriptor,
    ) -> PipelineResult<()> {
        self.ensure_configured()?;
        if self.reference_pending {
            return Err(PipelineError::Engine(
                "reference frame submitted twice in one tick".to_string(),
            ));
        }
        self.engine
            .process_reverse_stream(frame.samples_mut(), descriptor)?;
        self.reference_pending = true;
        Ok(())
    }

    /// Pass a near-end frame through the forward path, in place.
    ///
    /// Only valid after this tick's reference frame was submitted.
    pub fn submit_primary(
        &mut self,
        frame: &mut Frame,
        descriptor: &StreamDescriptor,
    ) -> PipelineResult<()> {
        self.ensure_configured()?;
        if !self.reference_pending {
            return Err(PipelineError::Engine(
                "primary frame submitted before its reference frame".to_string(),
            ));
        }
        self.reference_pending = false;
        self.engine.process_stream(frame.samples_mut(), descriptor)
    }

    pub fn statistics(&self) -> DebugMetricsSnapshot {
        self.engine.statistics()
    }

    fn ensure_configured(&self) -> PipelineResult<()> {
        if self.configured {
            Ok(())
        } else {
            Err(PipelineError::Engine(
                "frame submitted before the engine was configured".to_string(),
            ))
        }
    }
}
