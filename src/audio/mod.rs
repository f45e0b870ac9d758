//! # Audio Module
//!
//! Container handling and framing for the offline two-stream pass.
//!
//! ## Key Components:
//! - **wav**: Canonical PCM WAV header codec with chunk skipping and size patch-back
//! - **frame**: Per-stream frame lengths and synchronized frame-pair extraction
//! - **session**: Run-scoped state of the pipeline driver
//!
//! ## Audio Format Requirements:
//! - **Bit Depth**: 16-bit signed PCM, little-endian
//! - **Sample Rate / Channels**: Any, read independently for each stream
//! - **Container**: RIFF/WAVE with linear PCM format code

pub mod frame;    // Frame scheduler
pub mod session;  // Processing session and driver states
pub mod wav;      // Container codec
