//! # Frame Scheduler
//!
//! Cuts the far-end and near-end payloads into synchronized fixed-duration frames.
//!
//! ## Frame Length:
//! Each stream gets its own length from its own rate and channel count:
//! `floor(sample_rate * block_ms / 1000) * channels` samples. The truncation is
//! intentional and keeps output length deterministic.
//!
//! ## End of Stream:
//! A tick only produces a pair when *both* reads are complete. A short read on
//! either side discards whatever was read and ends the loop; that is the normal
//! way a run finishes, not an error.

use crate::audio::wav::{StreamDescriptor, BYTES_PER_SAMPLE};
use crate::error::{PipelineError, PipelineResult};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, Read};

/// Number of interleaved samples in one block of `block_ms` for a stream.
pub fn frame_length(descriptor: &StreamDescriptor, block_ms: u32) -> usize {
    (descriptor.sample_rate as u64 * block_ms as u64 / 1000) as usize * descriptor.channels as usize
}

/// One block of interleaved 16-bit samples for one stream.
///
/// Owned by the tick that read it; dropped when the iteration ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    pub fn from_samples(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Little-endian byte image, as written to WAV payloads and raw dumps.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.samples.len() * BYTES_PER_SAMPLE];
        LittleEndian::write_i16_into(&self.samples, &mut bytes);
        bytes
    }
}

/// Far-end and near-end frames for the same tick.
#[derive(Debug)]
pub struct FramePair {
    pub play: Frame,
    pub rec: Frame,
}

/// Per-run frame geometry for both input streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameScheduler {
    play_len: usize,
    rec_len: usize,
}

impl FrameScheduler {
    /// Derive both frame lengths.
    ///
    /// ## Errors:
    /// A stream whose rate is too low to yield a single sample per block is
    /// rejected: its frames would be empty and the loop could never end.
    pub fn new(
        play: &StreamDescriptor,
        rec: &StreamDescriptor,
        block_ms: u32,
    ) -> PipelineResult<Self> {
        let play_len = frame_length(play, block_ms);
        let rec_len = frame_length(rec, block_ms);

        for (name, descriptor, len) in [("far-end", play, play_len), ("near-end", rec, rec_len)] {
            if len == 0 {
                return Err(PipelineError::Format(format!(
                    "{} stream ({}) has no whole sample in a {} ms block",
                    name, descriptor, block_ms
                )));
            }
        }

        Ok(Self { play_len, rec_len })
    }

    pub fn play_len(&self) -> usize {
        self.play_len
    }

    pub fn rec_len(&self) -> usize {
        self.rec_len
    }

    /// Read the next far-end/near-end pair, or `None` once either stream runs short.
    pub fn next_frame_pair<P: Read, R: Read>(
        &self,
        play_stream: &mut P,
        rec_stream: &mut R,
    ) -> io::Result<Option<FramePair>> {
        next_frame_pair(play_stream, rec_stream, self.play_len, self.rec_len)
    }
}

/// Read exactly `play_len` and `rec_len` samples from the two streams.
///
/// Both streams are always read so that their cursors advance in lockstep.
pub fn next_frame_pair<P: Read, R: Read>(
    play_stream: &mut P,
    rec_stream: &mut R,
    play_len: usize,
    rec_len: usize,
) -> io::Result<Option<FramePair>> {
    let play = read_frame(play_stream, play_len)?;
    let rec = read_frame(rec_stream, rec_len)?;

    match (play, rec) {
        (Some(play), Some(rec)) => Ok(Some(FramePair { play, rec })),
        _ => Ok(None),
    }
}

/// Read one frame, `None` when fewer than `len` samples remain.
fn read_frame<R: Read>(stream: &mut R, len: usize) -> io::Result<Option<Frame>> {
    let mut bytes = vec![0u8; len * BYTES_PER_SAMPLE];
    let got = read_full(stream, &mut bytes)?;
    if got < bytes.len() {
        return Ok(None);
    }

    let mut samples = vec![0i16; len];
    LittleEndian::read_i16_into(&bytes, &mut samples);
    Ok(Some(Frame::from_samples(samples)))
}

/// Fill `buf` as far as the stream allows; returns the byte count actually read.
fn read_full<R: Read>(stream: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pcm(samples: usize) -> Cursor<Vec<u8>> {
        let frame = Frame::from_samples((0..samples).map(|i| (i % 1000) as i16).collect());
        Cursor::new(frame.to_le_bytes())
    }

    /// Delivers at most `chunk` bytes per read call.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_frame_length_ten_ms() {
        let cases = [
            (8000, 1, 80),
            (16000, 1, 160),
            (16000, 2, 320),
            (22050, 1, 220),
            (44100, 2, 882),
            (48000, 1, 480),
            (11025, 3, 330),
        ];
        for (rate, channels, expected) in cases {
            let d = StreamDescriptor::new(rate, channels);
            assert_eq!(frame_length(&d, 10), expected, "{}Hz x{}", rate, channels);
            assert_eq!(frame_length(&d, 10), (rate as usize * 10 / 1000) * channels as usize);
        }
    }

    #[test]
    fn test_independent_lengths_per_stream() {
        let scheduler = FrameScheduler::new(
            &StreamDescriptor::new(48000, 2),
            &StreamDescriptor::new(16000, 1),
            10,
        )
        .unwrap();
        assert_eq!(scheduler.play_len(), 960);
        assert_eq!(scheduler.rec_len(), 160);
    }

    #[test]
    fn test_rate_too_low_rejected() {
        let err = FrameScheduler::new(
            &StreamDescriptor::new(50, 1),
            &StreamDescriptor::new(16000, 1),
            10,
        )
        .unwrap_err();
        assert!(err.to_string().contains("far-end"));
    }

    #[test]
    fn test_equal_streams_yield_all_frames() {
        let mut play = pcm(16000);
        let mut rec = pcm(16000);
        let mut count = 0;
        while let Some(pair) = next_frame_pair(&mut play, &mut rec, 160, 160).unwrap() {
            assert_eq!(pair.play.len(), 160);
            assert_eq!(pair.rec.len(), 160);
            count += 1;
        }
        assert_eq!(count, 100);
    }

    #[test]
    fn test_short_far_end_stops_cleanly() {
        let mut play = pcm(15900);
        let mut rec = pcm(16000);
        let mut count = 0;
        while next_frame_pair(&mut play, &mut rec, 160, 160).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 99);
    }

    #[test]
    fn test_partial_near_end_discarded() {
        let mut play = pcm(1000);
        let mut rec = pcm(170);
        let first = next_frame_pair(&mut play, &mut rec, 160, 160).unwrap();
        assert!(first.is_some());
        assert!(next_frame_pair(&mut play, &mut rec, 160, 160).unwrap().is_none());
    }

    #[test]
    fn test_samples_decoded_little_endian() {
        let mut play = Cursor::new(vec![0x01, 0x00, 0xff, 0xff]);
        let mut rec = Cursor::new(vec![0x00, 0x80, 0xff, 0x7f]);
        let pair = next_frame_pair(&mut play, &mut rec, 2, 2).unwrap().unwrap();
        assert_eq!(pair.play.samples(), &[1, -1]);
        assert_eq!(pair.rec.samples(), &[i16::MIN, i16::MAX]);
        assert_eq!(pair.rec.to_le_bytes(), vec![0x00, 0x80, 0xff, 0x7f]);
    }

    #[test]
    fn test_fragmented_reads_assemble_full_frames() {
        let mut play = Trickle { inner: pcm(480), chunk: 7 };
        let mut rec = Trickle { inner: pcm(480), chunk: 3 };
        let mut count = 0;
        while let Some(pair) = next_frame_pair(&mut play, &mut rec, 160, 160).unwrap() {
            assert_eq!(pair.play.samples(), pair.rec.samples());
            assert_eq!(pair.play.samples()[1], (count * 160 + 1) as i16);
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
