//! # Container Codec
//!
//! Reads and writes the canonical 44-byte PCM WAV header.
//!
//! ## Layout (all numbers little-endian):
//! ```text
//!  0 "RIFF"   4 file_size   8 "WAVE"
//! 12 "fmt "  16 fmt_size   20 format  22 channels  24 sample_rate
//! 28 byte_rate  32 block_align  34 bits_per_sample
//! 36 "data"  40 data_size  44 payload...
//! ```
//!
//! ## Reading:
//! Only linear PCM (format 1) with 16-bit samples is accepted. Files that put
//! other chunks (`LIST`, `fact`, ...) between the format chunk and the data
//! chunk are handled by walking the chunk list until `data` is found.
//!
//! ## Writing:
//! Always the canonical contiguous layout. Because the real data size is only
//! known after processing, the writer emits a provisional header first and
//! patches it afterwards with [`patch_data_size`], which needs a seekable sink.

use crate::error::{PipelineError, PipelineResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Size of the canonical header in bytes.
pub const HEADER_SIZE: usize = 44;

/// The only sample width this pipeline handles.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Bytes per interleaved sample.
pub const BYTES_PER_SAMPLE: usize = 2;

const PCM_FORMAT: u16 = 1;
const FMT_CHUNK_SIZE: u32 = 16;
/// Header bytes counted by the RIFF size field besides the payload.
const RIFF_OVERHEAD: u32 = 36;
/// Offset of the first byte of the format chunk body.
const FMT_BODY_OFFSET: u64 = 20;

/// Sample rate and channel layout of one PCM stream.
///
/// Bit depth is not stored: every stream in this pipeline is 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamDescriptor {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes per interleaved sample frame (all channels).
    pub fn block_align(&self) -> u32 {
        self.channels as u32 * BYTES_PER_SAMPLE as u32
    }

    /// Bytes per second of audio.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.block_align() as u64
    }
}

impl std::fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz, {} channels", self.sample_rate, self.channels)
    }
}

/// The fixed-layout header record exactly as it appears on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub riff: [u8; 4],
    pub file_size: u32,
    pub wave: [u8; 4],
    pub fmt: [u8; 4],
    pub fmt_size: u32,
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data: [u8; 4],
    pub data_size: u32,
}

impl ContainerHeader {
    /// Build the canonical header for a stream carrying `data_size` payload bytes.
    pub fn canonical(descriptor: &StreamDescriptor, data_size: u32) -> PipelineResult<Self> {
        let file_size = RIFF_OVERHEAD.checked_add(data_size).ok_or_else(|| {
            PipelineError::Format(format!(
                "data size {} exceeds the 32-bit RIFF size limit",
                data_size
            ))
        })?;
        let byte_rate = u32::try_from(descriptor.byte_rate()).map_err(|_| {
            PipelineError::Format(format!("byte rate of {} does not fit the header", descriptor))
        })?;
        let block_align = u16::try_from(descriptor.block_align()).map_err(|_| {
            PipelineError::Format(format!("block alignment of {} does not fit the header", descriptor))
        })?;

        Ok(Self {
            riff: *b"RIFF",
            file_size,
            wave: *b"WAVE",
            fmt: *b"fmt ",
            fmt_size: FMT_CHUNK_SIZE,
            audio_format: PCM_FORMAT,
            channels: descriptor.channels,
            sample_rate: descriptor.sample_rate,
            byte_rate,
            block_align,
            bits_per_sample: BITS_PER_SAMPLE,
            data: *b"data",
            data_size,
        })
    }

    fn parse(raw: &[u8; HEADER_SIZE]) -> io::Result<Self> {
        let mut cursor = Cursor::new(&raw[..]);
        Ok(Self {
            riff: read_tag(&mut cursor)?,
            file_size: cursor.read_u32::<LittleEndian>()?,
            wave: read_tag(&mut cursor)?,
            fmt: read_tag(&mut cursor)?,
            fmt_size: cursor.read_u32::<LittleEndian>()?,
            audio_format: cursor.read_u16::<LittleEndian>()?,
            channels: cursor.read_u16::<LittleEndian>()?,
            sample_rate: cursor.read_u32::<LittleEndian>()?,
            byte_rate: cursor.read_u32::<LittleEndian>()?,
            block_align: cursor.read_u16::<LittleEndian>()?,
            bits_per_sample: cursor.read_u16::<LittleEndian>()?,
            data: read_tag(&mut cursor)?,
            data_size: cursor.read_u32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        let mut raw = Vec::with_capacity(HEADER_SIZE);
        raw.write_all(&self.riff)?;
        raw.write_u32::<LittleEndian>(self.file_size)?;
        raw.write_all(&self.wave)?;
        raw.write_all(&self.fmt)?;
        raw.write_u32::<LittleEndian>(self.fmt_size)?;
        raw.write_u16::<LittleEndian>(self.audio_format)?;
        raw.write_u16::<LittleEndian>(self.channels)?;
        raw.write_u32::<LittleEndian>(self.sample_rate)?;
        raw.write_u32::<LittleEndian>(self.byte_rate)?;
        raw.write_u16::<LittleEndian>(self.block_align)?;
        raw.write_u16::<LittleEndian>(self.bits_per_sample)?;
        raw.write_all(&self.data)?;
        raw.write_u32::<LittleEndian>(self.data_size)?;
        stream.write_all(&raw)
    }

    /// Check the mandatory preconditions, in on-disk order.
    fn validate(&self) -> PipelineResult<()> {
        if &self.riff != b"RIFF" {
            return Err(PipelineError::Format("not a valid RIFF file".to_string()));
        }
        if &self.wave != b"WAVE" {
            return Err(PipelineError::Format("not a WAVE file".to_string()));
        }
        if &self.fmt != b"fmt " {
            return Err(PipelineError::Format("fmt chunk not found".to_string()));
        }
        if self.fmt_size < FMT_CHUNK_SIZE {
            return Err(PipelineError::Format(format!(
                "fmt chunk is {} bytes, expected at least {}",
                self.fmt_size, FMT_CHUNK_SIZE
            )));
        }
        if self.audio_format != PCM_FORMAT {
            return Err(PipelineError::Format(format!(
                "only PCM format supported (format code {})",
                self.audio_format
            )));
        }
        if self.bits_per_sample != BITS_PER_SAMPLE {
            return Err(PipelineError::Format(format!(
                "only 16-bit samples supported ({} bits per sample)",
                self.bits_per_sample
            )));
        }
        if self.channels == 0 {
            return Err(PipelineError::Format("channel count is zero".to_string()));
        }
        if self.sample_rate == 0 {
            return Err(PipelineError::Format("sample rate is zero".to_string()));
        }
        Ok(())
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::new(self.sample_rate, self.channels)
    }
}

/// Result of reading an input header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    pub descriptor: StreamDescriptor,
    /// Absolute offset of the first payload byte.
    pub data_offset: u64,
    /// Declared payload size, `None` when the header carries an "unknown" placeholder.
    pub data_len: Option<u32>,
}

/// Read and validate a WAV header, leaving the stream positioned at the payload.
///
/// ## Errors:
/// - **Io**: fewer than [`HEADER_SIZE`] bytes available
/// - **Format**: tag mismatch, non-PCM format, bit depth other than 16,
///   zero channels/rate, or no `data` chunk before end of stream
pub fn read_header<R: Read + Seek>(stream: &mut R) -> PipelineResult<ParsedHeader> {
    let start = stream.stream_position()?;

    let mut raw = [0u8; HEADER_SIZE];
    stream.read_exact(&mut raw).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            PipelineError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("could not read WAV header ({} bytes required)", HEADER_SIZE),
            ))
        } else {
            PipelineError::Io(e)
        }
    })?;

    let header = ContainerHeader::parse(&raw)?;
    header.validate()?;
    let descriptor = header.descriptor();

    if header.fmt_size == FMT_CHUNK_SIZE && &header.data == b"data" {
        let data_offset = start + HEADER_SIZE as u64;
        return Ok(ParsedHeader {
            descriptor,
            data_offset,
            data_len: resolve_data_len(stream, data_offset, header.data_size)?,
        });
    }

    // The 8 bytes after the format chunk were something else; walk the chunk list.
    let fmt_end = FMT_BODY_OFFSET + padded(header.fmt_size);
    stream.seek(SeekFrom::Start(start + fmt_end))?;
    let (data_offset, data_size) = skip_to_data_chunk(stream)?;

    Ok(ParsedHeader {
        descriptor,
        data_offset,
        data_len: resolve_data_len(stream, data_offset, data_size)?,
    })
}

/// Advance chunk by chunk until a `data` chunk header has been consumed.
///
/// Returns the payload offset and the declared chunk size.
fn skip_to_data_chunk<R: Read + Seek>(stream: &mut R) -> PipelineResult<(u64, u32)> {
    loop {
        let id = match read_tag(stream) {
            Ok(id) => id,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(data_chunk_not_found()),
            Err(e) => return Err(e.into()),
        };
        let size = match stream.read_u32::<LittleEndian>() {
            Ok(size) => size,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(data_chunk_not_found()),
            Err(e) => return Err(e.into()),
        };

        if &id == b"data" {
            return Ok((stream.stream_position()?, size));
        }

        tracing::debug!(
            chunk = %String::from_utf8_lossy(&id),
            size,
            "Skipping non-data chunk"
        );
        stream.seek(SeekFrom::Current(padded(size) as i64))?;
    }
}

/// Emit the canonical header for `data_size` payload bytes.
pub fn write_header<W: Write>(
    stream: &mut W,
    descriptor: &StreamDescriptor,
    data_size: u32,
) -> PipelineResult<()> {
    ContainerHeader::canonical(descriptor, data_size)?.write_to(stream)?;
    Ok(())
}

/// Rewrite the header at `header_offset` with the final data size.
///
/// The write position is restored afterwards so later writes continue where
/// they left off.
pub fn patch_data_size<W: Write + Seek>(
    stream: &mut W,
    header_offset: u64,
    descriptor: &StreamDescriptor,
    final_data_size: u32,
) -> PipelineResult<()> {
    let header = ContainerHeader::canonical(descriptor, final_data_size)?;
    let resume_at = stream.stream_position()?;
    stream.seek(SeekFrom::Start(header_offset))?;
    header.write_to(stream)?;
    stream.seek(SeekFrom::Start(resume_at))?;
    Ok(())
}

/// Limit a reader positioned at the payload to the declared data size.
pub fn payload<R: Read>(stream: R, header: &ParsedHeader) -> io::Take<R> {
    stream.take(header.data_len.map_or(u64::MAX, u64::from))
}

fn read_tag<R: Read>(stream: &mut R) -> io::Result<[u8; 4]> {
    let mut tag = [0u8; 4];
    stream.read_exact(&mut tag)?;
    Ok(tag)
}

/// RIFF chunks are word aligned: odd sizes carry one pad byte.
fn padded(size: u32) -> u64 {
    size as u64 + (size as u64 & 1)
}

/// Interpret the declared data size, leaving the stream at `data_offset`.
///
/// 0 and 0xFFFFFFFF are written by streaming recorders that never patched the
/// size, so both mean "read to end". A 0 is taken literally when another chunk
/// header starts right at the payload offset and fits in the stream.
fn resolve_data_len<R: Read + Seek>(
    stream: &mut R,
    data_offset: u64,
    data_size: u32,
) -> PipelineResult<Option<u32>> {
    let len = match data_size {
        u32::MAX => None,
        0 if chunk_starts_at(stream, data_offset)? => Some(0),
        0 => None,
        n => Some(n),
    };
    stream.seek(SeekFrom::Start(data_offset))?;
    Ok(len)
}

fn chunk_starts_at<R: Read + Seek>(stream: &mut R, offset: u64) -> io::Result<bool> {
    let end = stream.seek(SeekFrom::End(0))?;
    if end < offset + 8 {
        return Ok(false);
    }
    stream.seek(SeekFrom::Start(offset))?;
    let id = read_tag(stream)?;
    let size = stream.read_u32::<LittleEndian>()?;
    let printable = id.iter().all(|b| b.is_ascii_alphanumeric() || *b == b' ');
    Ok(printable && offset + 8 + size as u64 <= end)
}

fn data_chunk_not_found() -> PipelineError {
    PipelineError::Format("data chunk not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(descriptor: &StreamDescriptor, samples: &[i16]) -> Vec<u8> {
        let mut out = Vec::new();
        write_header(&mut out, descriptor, (samples.len() * 2) as u32).unwrap();
        for s in samples {
            out.write_i16::<LittleEndian>(*s).unwrap();
        }
        out
    }

    /// RIFF/WAVE + fmt chunk of `fmt_size` bytes, then `extra` chunks, then data.
    fn wav_with_chunks(fmt_size: u32, extra: &[(&[u8; 4], Vec<u8>)], samples: &[i16]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.write_u32::<LittleEndian>(0).unwrap();
        out.extend_from_slice(b"WAVEfmt ");
        out.write_u32::<LittleEndian>(fmt_size).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u32::<LittleEndian>(16000).unwrap();
        out.write_u32::<LittleEndian>(32000).unwrap();
        out.write_u16::<LittleEndian>(2).unwrap();
        out.write_u16::<LittleEndian>(16).unwrap();
        out.resize(out.len() + (fmt_size as usize - 16), 0);
        for (id, body) in extra {
            out.extend_from_slice(*id);
            out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
            out.extend_from_slice(body);
            if body.len() % 2 == 1 {
                out.push(0);
            }
        }
        out.extend_from_slice(b"data");
        out.write_u32::<LittleEndian>((samples.len() * 2) as u32).unwrap();
        for s in samples {
            out.write_i16::<LittleEndian>(*s).unwrap();
        }
        out
    }

    #[test]
    fn test_header_round_trip() {
        let descriptor = StreamDescriptor::new(48000, 2);
        let bytes = wav_bytes(&descriptor, &[1, -1, 2, -2]);

        let parsed = read_header(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed.descriptor, descriptor);
        assert_eq!(parsed.data_offset, 44);
        assert_eq!(parsed.data_len, Some(8));
    }

    #[test]
    fn test_canonical_field_values() {
        let descriptor = StreamDescriptor::new(16000, 1);
        let mut out = Vec::new();
        write_header(&mut out, &descriptor, 32000).unwrap();
        assert_eq!(out.len(), HEADER_SIZE);

        let header = ContainerHeader::parse(out.as_slice().try_into().unwrap()).unwrap();
        assert_eq!(header.file_size, 32036);
        assert_eq!(header.fmt_size, 16);
        assert_eq!(header.audio_format, 1);
        assert_eq!(header.byte_rate, 32000);
        assert_eq!(header.block_align, 2);
        assert_eq!(header.data_size, 32000);
    }

    #[test]
    fn test_written_header_readable_by_hound() {
        let descriptor = StreamDescriptor::new(8000, 2);
        let samples: Vec<i16> = (0..80).map(|i| (i * 100) as i16).collect();
        let bytes = wav_bytes(&descriptor, &samples);

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        let decoded: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>().unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_reads_hound_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..441 {
            writer.write_sample((i as i16) * 3).unwrap();
        }
        writer.finalize().unwrap();

        let mut file = std::fs::File::open(&path).unwrap();
        let parsed = read_header(&mut file).unwrap();
        assert_eq!(parsed.descriptor, StreamDescriptor::new(22050, 1));
        assert_eq!(parsed.data_len, Some(882));
        assert_eq!(file.stream_position().unwrap(), parsed.data_offset);
    }

    #[test]
    fn test_skips_chunks_between_fmt_and_data() {
        let samples = [7i16, 8, 9];
        let bytes = wav_with_chunks(
            16,
            &[(b"LIST", b"INFOsoftware".to_vec()), (b"fact", vec![0, 0, 0, 0])],
            &samples,
        );

        let mut cursor = Cursor::new(bytes);
        let parsed = read_header(&mut cursor).unwrap();
        assert_eq!(parsed.data_offset, 36 + 8 + 12 + 8 + 4 + 8);
        assert_eq!(parsed.data_len, Some(6));
        assert_eq!(cursor.read_i16::<LittleEndian>().unwrap(), 7);
    }

    #[test]
    fn test_skips_odd_sized_chunk_and_long_fmt() {
        let bytes = wav_with_chunks(18, &[(b"junk", vec![1, 2, 3])], &[42]);

        let mut cursor = Cursor::new(bytes);
        let parsed = read_header(&mut cursor).unwrap();
        assert_eq!(parsed.descriptor, StreamDescriptor::new(16000, 1));
        assert_eq!(cursor.read_i16::<LittleEndian>().unwrap(), 42);
    }

    #[test]
    fn test_payload_is_bounded_by_data_size() {
        let descriptor = StreamDescriptor::new(16000, 1);
        let mut bytes = wav_bytes(&descriptor, &[1, 2]);
        bytes.extend_from_slice(b"LIST\x04\x00\x00\x00abcd");

        let mut cursor = Cursor::new(bytes);
        let parsed = read_header(&mut cursor).unwrap();
        let mut body = Vec::new();
        payload(cursor, &parsed).read_to_end(&mut body).unwrap();
        assert_eq!(body, vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_unknown_data_size_reads_to_end() {
        let descriptor = StreamDescriptor::new(16000, 1);
        let mut bytes = Vec::new();
        write_header(&mut bytes, &descriptor, 0).unwrap();
        bytes.extend_from_slice(&[5, 0, 6, 0]);

        let mut cursor = Cursor::new(bytes);
        let parsed = read_header(&mut cursor).unwrap();
        assert_eq!(parsed.data_len, None);
        let mut body = Vec::new();
        payload(cursor, &parsed).read_to_end(&mut body).unwrap();
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn test_empty_data_chunk_before_trailing_chunk() {
        let descriptor = StreamDescriptor::new(16000, 1);
        let mut bytes = Vec::new();
        write_header(&mut bytes, &descriptor, 0).unwrap();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&400u32.to_le_bytes());
        bytes.extend_from_slice(&[0x41; 400]);

        let mut cursor = Cursor::new(bytes);
        let parsed = read_header(&mut cursor).unwrap();
        assert_eq!(parsed.data_len, Some(0));
        assert_eq!(cursor.stream_position().unwrap(), 44);
        let mut body = Vec::new();
        payload(cursor, &parsed).read_to_end(&mut body).unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn test_unpatched_size_with_audio_reads_to_end() {
        let descriptor = StreamDescriptor::new(16000, 1);
        let mut bytes = Vec::new();
        write_header(&mut bytes, &descriptor, 0).unwrap();
        let samples: Vec<i16> = (0..160).map(|i| i * 10 - 800).collect();
        for s in &samples {
            bytes.write_i16::<LittleEndian>(*s).unwrap();
        }

        let mut cursor = Cursor::new(bytes);
        let parsed = read_header(&mut cursor).unwrap();
        assert_eq!(parsed.data_len, None);
        assert_eq!(cursor.stream_position().unwrap(), 44);
        let mut body = Vec::new();
        payload(cursor, &parsed).read_to_end(&mut body).unwrap();
        assert_eq!(body.len(), 320);
    }

    #[test]
    fn test_corrupt_riff_tag_rejected() {
        let mut bytes = wav_bytes(&StreamDescriptor::new(16000, 1), &[0; 4]);
        bytes[0..4].copy_from_slice(b"RIFX");
        let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, PipelineError::Format(ref m) if m.contains("RIFF")));
    }

    #[test]
    fn test_riff_checked_before_chunk_walk() {
        // Both the RIFF tag and the data tag are wrong, and there is no data chunk:
        // the error must be about RIFF, not about the walk.
        let mut bytes = wav_with_chunks(16, &[], &[]);
        bytes[0] = b'X';
        bytes[36..40].copy_from_slice(b"nope");
        let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("RIFF"));
    }

    #[test]
    fn test_wave_and_fmt_tags_checked() {
        let mut bytes = wav_bytes(&StreamDescriptor::new(16000, 1), &[]);
        bytes[8..12].copy_from_slice(b"AVI ");
        let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("WAVE"));

        let mut bytes = wav_bytes(&StreamDescriptor::new(16000, 1), &[]);
        bytes[12..16].copy_from_slice(b"cue ");
        let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("fmt"));
    }

    #[test]
    fn test_non_pcm_and_wrong_depth_rejected() {
        let mut bytes = wav_bytes(&StreamDescriptor::new(16000, 1), &[]);
        bytes[20] = 3; // IEEE float
        let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("PCM"));

        let mut bytes = wav_bytes(&StreamDescriptor::new(16000, 1), &[]);
        bytes[34] = 24;
        let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("16-bit"));
    }

    #[test]
    fn test_missing_data_chunk() {
        let mut bytes = wav_with_chunks(16, &[], &[]);
        bytes.truncate(36);
        bytes.extend_from_slice(b"LIST\x02\x00\x00\x00ab");
        bytes.resize(HEADER_SIZE.max(bytes.len()), 0);
        let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, PipelineError::Format(ref m) if m == "data chunk not found"));
    }

    #[test]
    fn test_short_header_is_io_error() {
        let err = read_header(&mut Cursor::new(b"RIFF\x00\x00".to_vec())).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn test_patch_restores_position() {
        let descriptor = StreamDescriptor::new(16000, 1);
        let mut cursor = Cursor::new(Vec::new());
        write_header(&mut cursor, &descriptor, 0).unwrap();
        cursor.write_all(&[1, 0, 2, 0]).unwrap();

        patch_data_size(&mut cursor, 0, &descriptor, 4).unwrap();
        assert_eq!(cursor.position(), 48);
        cursor.write_all(&[3, 0]).unwrap();

        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), 50);
        assert_eq!(&bytes[4..8], &40u32.to_le_bytes());
        assert_eq!(&bytes[40..44], &4u32.to_le_bytes());
        assert_eq!(&bytes[44..], &[1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn test_oversized_data_rejected() {
        let descriptor = StreamDescriptor::new(16000, 1);
        let err = write_header(&mut Vec::new(), &descriptor, u32::MAX - 10).unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
    }
}
