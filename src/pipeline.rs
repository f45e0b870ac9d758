//! # Pipeline Driver
//!
//! Runs one offline pass: far-end and near-end WAV files in, one processed
//! WAV file out.
//!
//! ## Key Components:
//! - **RunRequest**: the three paths and the `--debug` switch
//! - **run**: drives the state machine in [`crate::audio::session`]
//! - **RunSummary**: what the run produced
//!
//! ## Per Tick:
//! 1. read one far-end and one near-end frame (stop when either runs short)
//! 2. far-end frame through the reverse path
//! 3. near-end frame through the forward path
//! 4. processed frame appended to the output, diagnostics if active
//!
//! The output header is written first with a zero data size and patched once
//! the loop ends, so the output file has to be seekable.

use crate::audio::frame::{FramePair, FrameScheduler};
use crate::audio::session::{PipelineState, ProcessingSession, SessionStreams};
use crate::audio::wav::{self, ParsedHeader};
use crate::config::AppConfig;
use crate::diagnostics::{dump_dir_for, DiagnosticsRecorder};
use crate::engine::{ProcessingAdapter, ProcessingEngine};
use crate::error::{FileRole, PipelineError, PipelineResult};
use chrono::Utc;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Inputs of one run, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub farend: PathBuf,
    pub nearend: PathBuf,
    pub output: PathBuf,
    /// Write the diagnostics dump next to the output
    pub debug: bool,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub frames: u64,
    /// Samples per channel written to the output
    pub samples: u64,
    /// Final value of the output's data-size field
    pub data_bytes: u32,
    pub output: PathBuf,
    pub dump_dir: Option<PathBuf>,
    pub elapsed_ms: i64,
}

/// The three files opened during `Init`.
struct OpenFiles {
    play: BufReader<File>,
    rec: BufReader<File>,
    out: BufWriter<File>,
}

/// Everything `Configuring` hands over to `Looping`.
struct Prepared<E: ProcessingEngine> {
    scheduler: FrameScheduler,
    adapter: ProcessingAdapter<E>,
    recorder: DiagnosticsRecorder,
    header_offset: u64,
}

/// Process `request.nearend` against `request.farend` into `request.output`.
///
/// ## Errors:
/// - **FileOpen**: an input cannot be read or the output cannot be created
/// - **Format** / **Io**: an input header is invalid (message names the stream)
/// - **Engine**: the engine rejected its configuration or a frame
/// - **Io**: any write to the output or the dump directory failed
///
/// Running out of input is the normal end of a run.
pub fn run<E: ProcessingEngine>(
    request: &RunRequest,
    config: &AppConfig,
    engine: E,
) -> PipelineResult<RunSummary> {
    let mut session = ProcessingSession::new();
    run_session(&mut session, request, config, engine)
}

/// Drive `session` from `Init` to `Done`, or to `Failed` when a step before
/// the frame loop goes wrong.
fn run_session<E: ProcessingEngine>(
    session: &mut ProcessingSession,
    request: &RunRequest,
    config: &AppConfig,
    engine: E,
) -> PipelineResult<RunSummary> {
    // Init
    let opened = open_files(request);
    let OpenFiles {
        play: mut play_file,
        rec: mut rec_file,
        out: mut out_file,
    } = abort(session, opened)?;

    // ValidatingHeaders
    session.transition(PipelineState::ValidatingHeaders)?;
    let headers = read_headers(&mut play_file, &mut rec_file);
    let (play_header, rec_header) = abort(session, headers)?;
    let streams = SessionStreams::new(play_header.descriptor, rec_header.descriptor);
    info!(
        run_id = %session.run_id,
        "Far-end: {}, near-end: {}",
        streams.play,
        streams.rec
    );

    // Configuring
    let prepared = prepare(session, &streams, &mut out_file, request, config, engine);
    let Prepared {
        scheduler,
        mut adapter,
        mut recorder,
        header_offset,
    } = abort(session, prepared)?;

    // Looping
    session.transition(PipelineState::Looping)?;
    let mut play_payload = wav::payload(&mut play_file, &play_header);
    let mut rec_payload = wav::payload(&mut rec_file, &rec_header);
    while let Some(FramePair { mut play, mut rec }) =
        scheduler.next_frame_pair(&mut play_payload, &mut rec_payload)?
    {
        // Raw copies only exist while a dump is being written.
        let raw = recorder.is_active().then(|| (play.clone(), rec.clone()));

        adapter.submit_reference(&mut play, &streams.play)?;
        adapter.submit_primary(&mut rec, &streams.rec)?;

        out_file.write_all(&rec.to_le_bytes())?;
        session.record_frame(rec.len());

        if let Some((raw_play, raw_rec)) = raw {
            recorder.record_frame(&raw_play, &raw_rec, &rec)?;
            recorder.record_metrics(|| adapter.statistics())?;
        }
    }
    debug!(run_id = %session.run_id, frames = session.frames(), "End of input reached");

    // Finalizing
    session.transition(PipelineState::Finalizing)?;
    let data_bytes = session.data_size()?;
    wav::patch_data_size(&mut out_file, header_offset, &streams.output, data_bytes)?;
    out_file.flush()?;
    let dump_dir = recorder.dump_dir().map(Path::to_path_buf);
    recorder.close()?;

    // Done
    session.transition(PipelineState::Done)?;
    let summary = RunSummary {
        run_id: session.run_id,
        frames: session.frames(),
        samples: session.samples_processed(&streams.output),
        data_bytes,
        output: request.output.clone(),
        dump_dir,
        elapsed_ms: (Utc::now() - session.started_at).num_milliseconds(),
    };
    info!(
        run_id = %summary.run_id,
        frames = summary.frames,
        elapsed_ms = summary.elapsed_ms,
        "Processing complete: {} samples written to {}",
        summary.samples,
        summary.output.display()
    );
    Ok(summary)
}

/// Move the session to `Failed` when `result` is an error, then hand the result back.
fn abort<T>(session: &mut ProcessingSession, result: PipelineResult<T>) -> PipelineResult<T> {
    if let Err(e) = &result {
        let stage = session.state().as_str();
        if session.transition(PipelineState::Failed).is_ok() {
            warn!(run_id = %session.run_id, stage, "Run failed before processing started: {}", e);
        }
    }
    result
}

fn open_files(request: &RunRequest) -> PipelineResult<OpenFiles> {
    let play = open_input(&request.farend, FileRole::FarEnd)?;
    let rec = open_input(&request.nearend, FileRole::NearEnd)?;
    let out = File::create(&request.output)
        .map(BufWriter::new)
        .map_err(|source| PipelineError::FileOpen {
            role: FileRole::Output,
            path: request.output.clone(),
            source,
        })?;
    Ok(OpenFiles { play, rec, out })
}

fn open_input(path: &Path, role: FileRole) -> PipelineResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| PipelineError::FileOpen {
            role,
            path: path.to_path_buf(),
            source,
        })
}

fn read_headers(
    play: &mut BufReader<File>,
    rec: &mut BufReader<File>,
) -> PipelineResult<(ParsedHeader, ParsedHeader)> {
    let play_header = wav::read_header(play).map_err(|e| e.in_stream(FileRole::FarEnd))?;
    let rec_header = wav::read_header(rec).map_err(|e| e.in_stream(FileRole::NearEnd))?;
    Ok((play_header, rec_header))
}

/// `Configuring`: frame geometry, provisional output header, engine setup and
/// the optional diagnostics dump.
fn prepare<E, W>(
    session: &mut ProcessingSession,
    streams: &SessionStreams,
    out: &mut W,
    request: &RunRequest,
    config: &AppConfig,
    engine: E,
) -> PipelineResult<Prepared<E>>
where
    E: ProcessingEngine,
    W: Write + Seek,
{
    session.transition(PipelineState::Configuring)?;
    let block_ms = config.pipeline.block_ms;
    let scheduler = FrameScheduler::new(&streams.play, &streams.rec, block_ms)?;
    warn_on_mismatch(session, streams, block_ms);

    let header_offset = out.stream_position()?;
    wav::write_header(out, &streams.output, 0)?;

    let mut adapter = ProcessingAdapter::new(engine);
    adapter.configure(&config.processing)?;

    let recorder = if request.debug {
        DiagnosticsRecorder::open(&dump_dir_for(&request.output), &config.diagnostics)?
    } else {
        DiagnosticsRecorder::disabled(&config.diagnostics)
    };
    recorder.log_processing_config(&config.processing)?;

    debug!(
        run_id = %session.run_id,
        play_len = scheduler.play_len(),
        rec_len = scheduler.rec_len(),
        block_ms,
        "Frame geometry"
    );
    Ok(Prepared {
        scheduler,
        adapter,
        recorder,
        header_offset,
    })
}

/// Streams at different rates are processed as given; flag the cases where the
/// blocks no longer cover the same time span.
fn warn_on_mismatch(session: &ProcessingSession, streams: &SessionStreams, block_ms: u32) {
    if streams.play.sample_rate != streams.rec.sample_rate {
        warn!(
            run_id = %session.run_id,
            "Sample rates differ (far-end {} Hz, near-end {} Hz); frames are paired by block duration",
            streams.play.sample_rate,
            streams.rec.sample_rate
        );
    }
    for (name, rate) in [("far-end", streams.play.sample_rate), ("near-end", streams.rec.sample_rate)] {
        if rate as u64 * block_ms as u64 % 1000 != 0 {
            warn!(
                run_id = %session.run_id,
                "{} block of {} ms at {} Hz is truncated; the streams will drift apart",
                name,
                block_ms,
                rate
            );
        }
    }
}
