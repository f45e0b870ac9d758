//! # Diagnostics Recorder
//!
//! Optional observer enabled by `--debug`. It never changes the audio; it only
//! writes what went in and came out, plus engine metrics, next to the output.
//!
//! ## Dump Directory (`<output>_debug_dump/`):
//! - `play_raw.pcm`, `rec_raw.pcm`, `processed_raw.pcm`: raw interleaved 16-bit samples
//! - `debug_log.txt`: one CSV row of RMS/peak statistics per frame
//! - `echo_metrics.txt`: one CSV row of engine metrics every N frames, flushed immediately
//! - `processing_config.txt`: the engine feature set, written once
//!
//! ## Lifecycle:
//! [`DiagnosticsRecorder::open`] creates everything up front and reports
//! failures; [`DiagnosticsRecorder::close`] flushes and reports the frame count.
//! A [`DiagnosticsRecorder::disabled`] recorder does nothing at all.

use crate::audio::frame::Frame;
use crate::config::{DiagnosticsConfig, ProcessingConfig};
use crate::engine::DebugMetricsSnapshot;
use crate::error::PipelineResult;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const PLAY_RAW_FILE: &str = "play_raw.pcm";
pub const REC_RAW_FILE: &str = "rec_raw.pcm";
pub const PROCESSED_RAW_FILE: &str = "processed_raw.pcm";
pub const DEBUG_LOG_FILE: &str = "debug_log.txt";
pub const ECHO_METRICS_FILE: &str = "echo_metrics.txt";
pub const PROCESSING_CONFIG_FILE: &str = "processing_config.txt";

const DEBUG_LOG_HEADER: &str =
    "Frame,Play_RMS,Rec_RMS,Processed_RMS,Play_Peak,Rec_Peak,Processed_Peak";
const ECHO_METRICS_HEADER: &str =
    "Frame,ERL_dB,ERLE_dB,Filter_Delay_ms,Residual_Echo_Likelihood,Echo_Detected,AEC_Quality";
/// Written in place of a metric the engine could not provide.
const ABSENT: &str = "-1";

/// Directory the recorder writes to for a given output file: the output path
/// without its extension, suffixed with `_debug_dump`.
pub fn dump_dir_for(output: &Path) -> PathBuf {
    let stem = output.with_extension("");
    let mut name = stem.file_name().unwrap_or_default().to_os_string();
    name.push("_debug_dump");
    stem.with_file_name(name)
}

/// RMS and peak absolute amplitude of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub rms: f64,
    pub peak: u16,
}

impl FrameStats {
    pub fn of(samples: &[i16]) -> Self {
        if samples.is_empty() {
            return Self { rms: 0.0, peak: 0 };
        }
        let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
        Self {
            rms: (sum / samples.len() as f64).sqrt(),
            peak: samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0),
        }
    }
}

struct DumpFiles {
    dir: PathBuf,
    play_raw: BufWriter<File>,
    rec_raw: BufWriter<File>,
    processed_raw: BufWriter<File>,
    debug_log: BufWriter<File>,
    echo_metrics: BufWriter<File>,
}

impl DumpFiles {
    fn flush(&mut self) -> std::io::Result<()> {
        self.play_raw.flush()?;
        self.rec_raw.flush()?;
        self.processed_raw.flush()?;
        self.debug_log.flush()?;
        self.echo_metrics.flush()
    }
}

/// Per-run diagnostics sink; inert unless opened.
pub struct DiagnosticsRecorder {
    files: Option<DumpFiles>,
    settings: DiagnosticsConfig,
    frames: u64,
    metrics_rows: u64,
}

impl DiagnosticsRecorder {
    /// A recorder for runs without `--debug`.
    pub fn disabled(settings: &DiagnosticsConfig) -> Self {
        Self {
            files: None,
            settings: settings.clone(),
            frames: 0,
            metrics_rows: 0,
        }
    }

    /// Create the dump directory and all dump files, writing the CSV headers.
    pub fn open(dir: &Path, settings: &DiagnosticsConfig) -> PipelineResult<Self> {
        fs::create_dir_all(dir)?;
        let create = |name: &str| -> std::io::Result<BufWriter<File>> {
            Ok(BufWriter::new(File::create(dir.join(name))?))
        };

        let mut files = DumpFiles {
            dir: dir.to_path_buf(),
            play_raw: create(PLAY_RAW_FILE)?,
            rec_raw: create(REC_RAW_FILE)?,
            processed_raw: create(PROCESSED_RAW_FILE)?,
            debug_log: create(DEBUG_LOG_FILE)?,
            echo_metrics: create(ECHO_METRICS_FILE)?,
        };
        writeln!(files.debug_log, "{}", DEBUG_LOG_HEADER)?;
        writeln!(files.echo_metrics, "{}", ECHO_METRICS_HEADER)?;
        files.echo_metrics.flush()?;

        info!(dir = %dir.display(), "Data dump directory created");
        Ok(Self {
            files: Some(files),
            settings: settings.clone(),
            frames: 0,
            metrics_rows: 0,
        })
    }

    pub fn is_active(&self) -> bool {
        self.files.is_some()
    }

    pub fn dump_dir(&self) -> Option<&Path> {
        self.files.as_ref().map(|files| files.dir.as_path())
    }

    /// Write `processing_config.txt`.
    pub fn log_processing_config(&self, config: &ProcessingConfig) -> PipelineResult<()> {
        let Some(files) = self.files.as_ref() else {
            return Ok(());
        };
        fs::write(files.dir.join(PROCESSING_CONFIG_FILE), render_config(config))?;
        Ok(())
    }

    /// Append raw samples and one statistics row for a processed tick.
    pub fn record_frame(&mut self, play: &Frame, rec: &Frame, processed: &Frame) -> PipelineResult<()> {
        let Some(files) = self.files.as_mut() else {
            return Ok(());
        };
        self.frames += 1;

        files.play_raw.write_all(&play.to_le_bytes())?;
        files.rec_raw.write_all(&rec.to_le_bytes())?;
        files.processed_raw.write_all(&processed.to_le_bytes())?;

        let p = FrameStats::of(play.samples());
        let r = FrameStats::of(rec.samples());
        let o = FrameStats::of(processed.samples());
        writeln!(
            files.debug_log,
            "{},{:.3},{:.3},{:.3},{},{},{}",
            self.frames, p.rms, r.rms, o.rms, p.peak, r.peak, o.peak
        )?;

        if self.frames % self.settings.progress_interval == 0 {
            info!("Processed {} frames", self.frames);
        }
        Ok(())
    }

    /// Append an engine metrics row if the current frame is on the metrics interval.
    ///
    /// `statistics` is only called when a row is due. Returns whether a row was written.
    pub fn record_metrics<F>(&mut self, statistics: F) -> PipelineResult<bool>
    where
        F: FnOnce() -> DebugMetricsSnapshot,
    {
        let Some(files) = self.files.as_mut() else {
            return Ok(false);
        };
        if self.frames == 0 || self.frames % self.settings.metrics_interval != 0 {
            return Ok(false);
        }

        let stats = statistics();
        if self.frames % self.settings.progress_interval == 0 {
            debug!(frame = self.frames, "Stats availability: {}", stats.availability());
        }

        writeln!(files.echo_metrics, "{}", metrics_row(self.frames, &stats))?;
        // Flushed per row so an interrupted run still leaves a readable prefix.
        files.echo_metrics.flush()?;
        self.metrics_rows += 1;
        Ok(true)
    }

    /// Flush every dump file and report how many frames were recorded.
    pub fn close(mut self) -> PipelineResult<u64> {
        if let Some(files) = self.files.as_mut() {
            files.flush()?;
            info!(
                frames = self.frames,
                metrics_rows = self.metrics_rows,
                "Data dump completed"
            );
        }
        Ok(self.frames)
    }
}

fn metrics_row(frame: u64, stats: &DebugMetricsSnapshot) -> String {
    let float = |value: Option<f32>| value.map_or_else(|| ABSENT.to_string(), |v| format!("{:.3}", v));
    format!(
        "{},{},{},{},{},{},{}",
        frame,
        float(stats.echo_return_loss),
        float(stats.echo_return_loss_enhancement),
        stats
            .filter_delay_ms
            .map_or_else(|| ABSENT.to_string(), |d| d.to_string()),
        float(stats.residual_echo_likelihood),
        if stats.echo_detected() { 1 } else { 0 },
        float(stats.divergent_filter_fraction),
    )
}

fn render_config(config: &ProcessingConfig) -> String {
    let state = |enabled: bool| if enabled { "enabled" } else { "disabled" };
    let mut out = String::from("Audio Processing Configuration:\n");
    let _ = writeln!(out, "Echo Canceller: {}", state(config.echo_canceller.enabled));
    let _ = writeln!(out, "Gain Controller 1: {}", state(config.gain_controller1.enabled));
    if config.gain_controller1.enabled {
        let _ = writeln!(out, "Gain Controller 1 Mode: {}", config.gain_controller1.mode.as_str());
    }
    let _ = writeln!(out, "Gain Controller 2: {}", state(config.gain_controller2.enabled));
    let _ = writeln!(out, "High Pass Filter: {}", state(config.high_pass_filter.enabled));
    let _ = writeln!(out, "Noise Suppression: {}", state(config.noise_suppression.enabled));
    if config.noise_suppression.enabled {
        let _ = writeln!(
            out,
            "Noise Suppression Level: {}",
            config.noise_suppression.level.as_index()
        );
    }
    out
}
