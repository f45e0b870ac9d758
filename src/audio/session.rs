//! # Processing Session
//!
//! Run-scoped state owned by the pipeline driver: the run id, the frame
//! counter, the running output size and the driver's current state.
//!
//! ## Session Lifecycle:
//! 1. **Init**: Session created, the three files are opened
//! 2. **ValidatingHeaders**: Reading both input headers
//! 3. **Configuring**: Provisional output header, engine configuration
//! 4. **Looping**: One frame pair per tick until either input runs out
//! 5. **Finalizing**: Patching the output header with the real data size
//! 6. **Done**: Summary reported
//!
//! **Failed** is reachable from every state before Looping.
//!
//! ## Rust Concepts:
//! - **Copy types**: `PipelineState` and `SessionStreams` are small enough to pass by value
//! - **matches!**: the whole transition table is one pattern
//! - **u32::try_from**: the RIFF size limit is checked, not truncated

use crate::audio::wav::{StreamDescriptor, BYTES_PER_SAMPLE}; // Stream layout and sample width
use crate::error::{PipelineError, PipelineResult};           // Error handling
use chrono::{DateTime, Utc};                                 // Run start time
use tracing::debug;                                          // State change logging
use uuid::Uuid;                                              // Run identifier

/// States of the pipeline driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    ValidatingHeaders,
    Configuring,
    Looping,
    Finalizing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::ValidatingHeaders => "validating_headers",
            PipelineState::Configuring => "configuring",
            PipelineState::Looping => "looping",
            PipelineState::Finalizing => "finalizing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    /// Whether the driver may move from `self` to `next`.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Init, ValidatingHeaders)
                | (ValidatingHeaders, Configuring)
                | (Configuring, Looping)
                | (Looping, Finalizing)
                | (Finalizing, Done)
                | (Init | ValidatingHeaders | Configuring, Failed)
        )
    }
}

/// The two validated input layouts and the output layout derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStreams {
    pub play: StreamDescriptor,
    pub rec: StreamDescriptor,
    /// Output layout, inherited from the near-end stream
    pub output: StreamDescriptor,
}

impl SessionStreams {
    pub fn new(play: StreamDescriptor, rec: StreamDescriptor) -> Self {
        Self {
            play,
            rec,
            output: rec,
        }
    }
}

/// Aggregate state of one processing run.
#[derive(Debug, Clone)]
pub struct ProcessingSession {
    /// Identifier attached to every log line of this run
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    frames: u64,
    bytes_written: u64,
    state: PipelineState,
}

impl ProcessingSession {
    /// Start a run in `Init`, before anything has been opened.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            frames: 0,
            bytes_written: 0,
            state: PipelineState::Init,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to the next state, rejecting transitions the state machine does not have.
    pub fn transition(&mut self, next: PipelineState) -> PipelineResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::Internal(format!(
                "invalid pipeline transition {} -> {}",
                self.state.as_str(),
                next.as_str()
            )));
        }
        debug!(run_id = %self.run_id, from = self.state.as_str(), to = next.as_str(), "Pipeline state change");
        self.state = next;
        Ok(())
    }

    /// Account for one processed frame of `samples` interleaved output samples.
    pub fn record_frame(&mut self, samples: usize) {
        self.frames += 1;
        self.bytes_written += (samples * BYTES_PER_SAMPLE) as u64;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Output data size as stored in the header.
    pub fn data_size(&self) -> PipelineResult<u32> {
        u32::try_from(self.bytes_written).map_err(|_| {
            PipelineError::Format(format!(
                "{} bytes of output exceed the WAV size limit",
                self.bytes_written
            ))
        })
    }

    /// Samples per channel written so far in the `output` layout.
    pub fn samples_processed(&self, output: &StreamDescriptor) -> u64 {
        self.bytes_written / output.block_align() as u64
    }
}
