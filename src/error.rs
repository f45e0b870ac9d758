//! # Error Handling
//!
//! Error types for the offline processing pipeline and how they map to
//! process exit codes.
//!
//! ## Error Categories:
//! - **Usage**: Wrong arguments on the command line, nothing has been opened yet
//! - **FileOpen**: One of the three files could not be opened in its required mode
//! - **Format**: A container header violated an expectation (tag, format code, bit depth, ...)
//! - **Io**: Short read of a fixed-size header, or any other I/O failure
//! - **Engine**: The processing engine contract was violated or the engine failed
//! - **Config**: Configuration file or environment values are invalid
//! - **Internal**: The driver attempted a state change its state machine does not have
//!
//! Reaching the end of an input stream during the frame loop is *not* an error;
//! it is how a run normally terminates.

use std::path::PathBuf;
use thiserror::Error;

/// Which of the three pipeline files an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    /// Far-end (reference) input
    FarEnd,
    /// Near-end (primary) input
    NearEnd,
    /// Processed output container
    Output,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::FarEnd => "far-end",
            FileRole::NearEnd => "near-end",
            FileRole::Output => "output",
        }
    }
}

impl std::fmt::Display for FileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while running the pipeline.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(PipelineError::Format("only 16-bit samples supported".to_string()));
/// ```
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Wrong argument count or unknown flag
    #[error("Usage error: {0}")]
    Usage(String),

    /// A pipeline file could not be opened for reading or writing
    #[error("Cannot open {role} file {}: {source}", path.display())]
    FileOpen {
        role: FileRole,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container header did not meet a required expectation
    #[error("Format error: {0}")]
    Format(String),

    /// Short header read or other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Processing engine contract violation or engine failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Driver bug, such as an illegal state transition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Process exit code for this error.
    ///
    /// Every failure is fatal to the run and reported the same way to the shell.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Attach the stream role to a format error so the user knows which input was rejected.
    pub fn in_stream(self, role: FileRole) -> Self {
        match self {
            PipelineError::Format(msg) => PipelineError::Format(format!("{} file: {}", role, msg)),
            other => other,
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, PipelineError>`.
pub type PipelineResult<T> = Result<T, PipelineError>;
