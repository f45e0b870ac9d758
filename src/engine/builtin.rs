//! # Built-in Engine
//!
//! Self-contained [`ProcessingEngine`] so the runner works without an external
//! audio processing library.
//!
//! ## Forward Chain (near-end):
//! high-pass filter → echo canceller → noise gate → gain controller(s)
//!
//! ## Reverse Path (far-end):
//! The far-end block is left untouched; a mono copy is kept as the reference
//! for the next near-end block. When the two blocks differ in length (different
//! rates, or truncated 10 ms blocks) the reference goes through a
//! [`ReferenceResampler`] that lives for the whole run.

use crate::audio::wav::StreamDescriptor;
use crate::config::ProcessingConfig;
use crate::engine::echo_canceller::EchoCanceller;
use crate::engine::filters::{GainController, HighPassFilter, NoiseGate};
use crate::engine::resample::ReferenceResampler;
use crate::engine::{DebugMetricsSnapshot, ProcessingEngine};
use crate::error::{PipelineError, PipelineResult};
use tracing::debug;

/// Engine built from the processors in this crate.
#[derive(Default)]
pub struct BuiltinEngine {
    config: Option<ProcessingConfig>,
    /// Mono far-end block waiting for its near-end block
    reference: Vec<f32>,
    high_pass: Option<HighPassFilter>,
    echo_canceller: Option<EchoCanceller>,
    noise_gate: Option<NoiseGate>,
    agc1: Option<GainController>,
    agc2: Option<GainController>,
    /// Created on the first block pair whose lengths differ
    resampler: Option<ReferenceResampler>,
}

impl BuiltinEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn config(&self) -> PipelineResult<&ProcessingConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| PipelineError::Engine("built-in engine used before configuration".to_string()))
    }

    /// Recreate rate-dependent processors when the near-end layout changes.
    fn prepare(&mut self, stream: &StreamDescriptor) -> PipelineResult<()> {
        let config = self.config()?.clone();
        let channels = stream.channels as usize;

        if config.high_pass_filter.enabled
            && !self
                .high_pass
                .as_ref()
                .is_some_and(|hpf| hpf.matches(stream.sample_rate, channels))
        {
            self.high_pass = Some(HighPassFilter::new(stream.sample_rate, channels));
        }
        if config.echo_canceller.enabled
            && !self
                .echo_canceller
                .as_ref()
                .is_some_and(|aec| aec.sample_rate() == stream.sample_rate)
        {
            debug!(sample_rate = stream.sample_rate, "Initialising echo canceller");
            self.echo_canceller = Some(EchoCanceller::new(stream.sample_rate));
        }
        Ok(())
    }

    /// Take the pending far-end block, resampled to `frames` samples if needed.
    fn aligned_reference(&mut self, frames: usize) -> PipelineResult<Vec<f32>> {
        let reference = std::mem::take(&mut self.reference);
        if reference.len() == frames {
            return Ok(reference);
        }
        if reference.is_empty() {
            return Ok(vec![0.0; frames]);
        }

        let mut resampler = match self.resampler.take() {
            Some(resampler) if resampler.matches(reference.len(), frames) => resampler,
            _ => {
                debug!(from = reference.len(), to = frames, "Initialising reference resampler");
                ReferenceResampler::new(reference.len(), frames)?
            }
        };
        let aligned = resampler.process(&reference);
        self.resampler = Some(resampler);
        aligned
    }
}

impl ProcessingEngine for BuiltinEngine {
    fn apply_config(&mut self, config: &ProcessingConfig) -> PipelineResult<()> {
        self.noise_gate = config
            .noise_suppression
            .enabled
            .then(|| NoiseGate::new(config.noise_suppression.level));
        self.agc1 = config
            .gain_controller1
            .enabled
            .then(|| GainController::agc1(config.gain_controller1.mode));
        self.agc2 = config.gain_controller2.enabled.then(GainController::agc2);
        self.high_pass = None;
        self.echo_canceller = None;
        self.resampler = None;
        self.config = Some(config.clone());
        Ok(())
    }

    fn process_reverse_stream(
        &mut self,
        samples: &mut [i16],
        stream: &StreamDescriptor,
    ) -> PipelineResult<()> {
        self.config()?;
        self.reference = downmix(samples, stream.channels as usize);
        Ok(())
    }

    fn process_stream(&mut self, samples: &mut [i16], stream: &StreamDescriptor) -> PipelineResult<()> {
        self.prepare(stream)?;
        let channels = (stream.channels as usize).max(1);
        let mut block: Vec<f32> = samples.iter().map(|&s| to_float(s)).collect();
        let reference = if self.echo_canceller.is_some() {
            self.aligned_reference(block.len() / channels)?
        } else {
            Vec::new()
        };

        if let Some(hpf) = self.high_pass.as_mut() {
            hpf.process(&mut block);
        }
        if let Some(aec) = self.echo_canceller.as_mut() {
            aec.process(&mut block, channels, &reference);
        }
        if let Some(gate) = self.noise_gate.as_mut() {
            gate.process(&mut block);
        }
        if let Some(agc) = self.agc1.as_mut() {
            agc.process(&mut block);
        }
        if let Some(agc) = self.agc2.as_mut() {
            agc.process(&mut block);
        }

        for (out, value) in samples.iter_mut().zip(block) {
            *out = to_pcm(value);
        }
        // A reference is consumed by exactly one near-end block.
        self.reference.clear();
        Ok(())
    }

    fn statistics(&self) -> DebugMetricsSnapshot {
        self.echo_canceller
            .as_ref()
            .map(EchoCanceller::metrics)
            .unwrap_or_default()
    }
}

fn to_float(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

fn to_pcm(value: f32) -> i16 {
    (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Average interleaved channels into one mono float signal.
fn downmix(samples: &[i16], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().map(|&s| to_float(s)).sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoiseSuppressionLevel;

    fn passthrough_config() -> ProcessingConfig {
        let mut config = ProcessingConfig::default();
        config.echo_canceller.enabled = false;
        config
    }

    #[test]
    fn test_pcm_conversion_is_lossless() {
        for s in [i16::MIN, -12345, -1, 0, 1, 777, i16::MAX] {
            assert_eq!(to_pcm(to_float(s)), s);
        }
        assert_eq!(to_pcm(1.5), i16::MAX);
        assert_eq!(to_pcm(-1.5), i16::MIN);
    }

    #[test]
    fn test_everything_disabled_is_identity() {
        let d = StreamDescriptor::new(16000, 1);
        let mut engine = BuiltinEngine::new();
        engine.apply_config(&passthrough_config()).unwrap();

        let input: Vec<i16> = (0..160).map(|i| (i * 37 - 3000) as i16).collect();
        let mut far = vec![1000i16; 160];
        let mut near = input.clone();
        engine.process_reverse_stream(&mut far, &d).unwrap();
        engine.process_stream(&mut near, &d).unwrap();
        assert_eq!(near, input);
        assert_eq!(far, vec![1000i16; 160]);
        assert_eq!(engine.statistics(), DebugMetricsSnapshot::default());
    }

    #[test]
    fn test_default_config_with_silent_far_end_is_identity() {
        let d = StreamDescriptor::new(16000, 1);
        let mut engine = BuiltinEngine::new();
        engine.apply_config(&ProcessingConfig::default()).unwrap();

        let input: Vec<i16> = (0..160).map(|i| ((i % 20) * 500) as i16).collect();
        let mut near = input.clone();
        engine.process_reverse_stream(&mut vec![0; 160], &d).unwrap();
        engine.process_stream(&mut near, &d).unwrap();
        assert_eq!(near, input);
    }

    #[test]
    fn test_unconfigured_engine_rejects_audio() {
        let d = StreamDescriptor::new(16000, 1);
        let mut engine = BuiltinEngine::new();
        assert!(engine.process_reverse_stream(&mut [0; 160], &d).is_err());
        assert!(engine.process_stream(&mut [0; 160], &d).is_err());
    }

    #[test]
    fn test_noise_suppression_attenuates_steady_noise() {
        let d = StreamDescriptor::new(16000, 1);
        let mut config = passthrough_config();
        config.noise_suppression.enabled = true;
        config.noise_suppression.level = NoiseSuppressionLevel::VeryHigh;
        let mut engine = BuiltinEngine::new();
        engine.apply_config(&config).unwrap();

        let hiss: Vec<i16> = (0..160).map(|i| if i % 2 == 0 { 200 } else { -200 }).collect();
        let mut out = hiss.clone();
        for _ in 0..10 {
            out = hiss.clone();
            engine.process_reverse_stream(&mut vec![0; 160], &d).unwrap();
            engine.process_stream(&mut out, &d).unwrap();
        }
        assert!(out.iter().all(|s| s.abs() <= 13));
    }

    #[test]
    fn test_mismatched_rates_resample_reference() {
        let far_desc = StreamDescriptor::new(48000, 2);
        let near_desc = StreamDescriptor::new(16000, 1);
        let mut engine = BuiltinEngine::new();
        engine.apply_config(&ProcessingConfig::default()).unwrap();

        for _ in 0..5 {
            let mut far = vec![8000i16; 960];
            let mut near = vec![0i16; 160];
            engine.process_reverse_stream(&mut far, &far_desc).unwrap();
            engine.process_stream(&mut near, &near_desc).unwrap();
            assert!(engine.reference.is_empty());
        }
        assert!(engine.resampler.as_ref().is_some_and(|r| r.matches(480, 160)));
    }

    #[test]
    fn test_equal_block_lengths_skip_resampling() {
        let d = StreamDescriptor::new(16000, 1);
        let mut engine = BuiltinEngine::new();
        engine.apply_config(&ProcessingConfig::default()).unwrap();
        engine.process_reverse_stream(&mut vec![100; 160], &d).unwrap();
        engine.process_stream(&mut vec![0; 160], &d).unwrap();
        assert!(engine.resampler.is_none());
    }

    #[test]
    fn test_downmix_averages_channels() {
        let mono = downmix(&[16384, 0, -16384, -16384], 2);
        assert_eq!(mono, vec![0.25, -0.5]);
    }
}
