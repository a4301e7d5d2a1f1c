//! Binary debug trace of everything fed to the engine.
//!
//! A trace starts with the text line `#!vqetrace1.2` followed by typed
//! records. All integers use the byte order of the host that wrote the
//! trace; it is a debugging aid, not a portable format.
//!
//! ```text
//! init:    tag=0 (u8) | sample_rate_hz (i32)
//! capture: tag=1 (u8) | sample_rate_hz (u32) | num_channels (u32)
//!          | samples_per_channel (u32) | samples (i16 × channels × samples)
//! render:  tag=2, same layout as capture
//! ```
//!
//! Capture records hold the frame as received, before any processing.

use std::fmt;
use std::io::{self, Read, Write};

use crate::audio_frame::AudioFrame;

/// First line of every trace, without the trailing newline.
pub const TRACE_MAGIC: &str = "#!vqetrace1.2";

const INIT_TAG: u8 = 0;
const CAPTURE_TAG: u8 = 1;
const RENDER_TAG: u8 = 2;

/// Largest frame payload the reader accepts, in samples.
const MAX_TRACE_FRAME_SAMPLES: usize = 1 << 16;

/// Direction of a frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameEvent {
    Capture,
    Render,
}

impl FrameEvent {
    fn tag(self) -> u8 {
        match self {
            Self::Capture => CAPTURE_TAG,
            Self::Render => RENDER_TAG,
        }
    }
}

/// Appends records to a sink. Each record is issued as a single write.
#[derive(derive_more::Debug)]
pub(crate) struct TraceWriter {
    #[debug(skip)]
    sink: Box<dyn Write + Send>,
    #[debug(skip)]
    scratch: Vec<u8>,
    records_written: u64,
}

impl TraceWriter {
    /// Writes the magic line and an init record for `sample_rate_hz`.
    pub(crate) fn new(sink: Box<dyn Write + Send>, sample_rate_hz: u32) -> io::Result<Self> {
        let mut writer = Self {
            sink,
            scratch: Vec::new(),
            records_written: 0,
        };
        writer.sink.write_all(TRACE_MAGIC.as_bytes())?;
        writer.sink.write_all(b"\n")?;
        writer.write_init(sample_rate_hz)?;
        Ok(writer)
    }

    fn write_init(&mut self, sample_rate_hz: u32) -> io::Result<()> {
        self.scratch.clear();
        self.scratch.push(INIT_TAG);
        self.scratch
            .extend_from_slice(&(sample_rate_hz as i32).to_ne_bytes());
        self.flush_record()
    }

    /// Writes one frame. `frame.data` must hold exactly
    /// `samples_per_channel * num_channels` samples.
    pub(crate) fn write_frame(&mut self, event: FrameEvent, frame: &AudioFrame) -> io::Result<()> {
        let samples = &frame.data[..frame.num_samples()];
        self.scratch.clear();
        self.scratch.push(event.tag());
        self.scratch
            .extend_from_slice(&frame.sample_rate_hz.to_ne_bytes());
        self.scratch
            .extend_from_slice(&(frame.num_channels as u32).to_ne_bytes());
        self.scratch
            .extend_from_slice(&(frame.samples_per_channel as u32).to_ne_bytes());
        self.scratch
            .extend_from_slice(bytemuck::cast_slice::<i16, u8>(samples));
        self.flush_record()
    }

    fn flush_record(&mut self) -> io::Result<()> {
        self.sink.write_all(&self.scratch)?;
        self.records_written += 1;
        Ok(())
    }

    /// Records written so far, including the init record.
    pub(crate) fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flushes the sink and closes the trace.
    pub(crate) fn finish(mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// Error returned by [`TraceReader`].
#[derive(Debug)]
pub enum TraceError {
    /// The underlying reader failed.
    Io(io::Error),
    /// The stream does not start with [`TRACE_MAGIC`].
    BadMagic,
    /// A record starts with an unknown tag.
    UnknownEvent(u8),
    /// The stream ended in the middle of a record.
    Truncated,
    /// A frame record declares an implausible payload size.
    InvalidFrame {
        num_channels: u32,
        samples_per_channel: u32,
    },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "trace I/O error: {err}"),
            Self::BadMagic => write!(f, "not a trace: missing `{TRACE_MAGIC}` header"),
            Self::UnknownEvent(tag) => write!(f, "unknown trace record tag {tag}"),
            Self::Truncated => write!(f, "trace ends in the middle of a record"),
            Self::InvalidFrame {
                num_channels,
                samples_per_channel,
            } => write!(
                f,
                "frame record with {num_channels} channels of {samples_per_channel} samples is too large",
            ),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(err)
        }
    }
}

/// One decoded trace record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    /// Recording started with the engine at this sample rate.
    Init { sample_rate_hz: i32 },
    /// A capture frame as received by the engine.
    Capture(AudioFrame),
    /// A render frame as received by the engine.
    Render(AudioFrame),
}

/// Decodes a trace written on a host with the same byte order.
///
/// ```
/// use vqe::debug_trace::{TraceReader, TraceRecord};
///
/// let mut bytes = b"#!vqetrace1.2\n".to_vec();
/// bytes.push(0);
/// bytes.extend_from_slice(&16_000i32.to_ne_bytes());
///
/// let records: Vec<_> = TraceReader::new(bytes.as_slice())
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(records, [TraceRecord::Init { sample_rate_hz: 16_000 }]);
/// ```
#[derive(Debug)]
pub struct TraceReader<R> {
    reader: R,
}

impl<R: Read> TraceReader<R> {
    /// Checks the magic line and positions the reader at the first record.
    pub fn new(mut reader: R) -> Result<Self, TraceError> {
        let mut header = [0u8; TRACE_MAGIC.len() + 1];
        reader.read_exact(&mut header).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => TraceError::BadMagic,
            _ => TraceError::Io(err),
        })?;
        let (magic, newline) = header.split_at(TRACE_MAGIC.len());
        if magic != TRACE_MAGIC.as_bytes() || newline != b"\n" {
            return Err(TraceError::BadMagic);
        }
        Ok(Self { reader })
    }

    /// Reads the next record, or `None` at a clean end of stream.
    pub fn read_record(&mut self) -> Result<Option<TraceRecord>, TraceError> {
        let mut tag = [0u8; 1];
        loop {
            match self.reader.read(&mut tag) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(TraceError::Io(err)),
            }
        }

        match tag[0] {
            INIT_TAG => {
                let sample_rate_hz = i32::from_ne_bytes(self.read_array()?);
                Ok(Some(TraceRecord::Init { sample_rate_hz }))
            }
            CAPTURE_TAG => Ok(Some(TraceRecord::Capture(self.read_frame()?))),
            RENDER_TAG => Ok(Some(TraceRecord::Render(self.read_frame()?))),
            other => Err(TraceError::UnknownEvent(other)),
        }
    }

    fn read_array(&mut self) -> Result<[u8; 4], TraceError> {
        let mut bytes = [0u8; 4];
        self.reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_frame(&mut self) -> Result<AudioFrame, TraceError> {
        let sample_rate_hz = u32::from_ne_bytes(self.read_array()?);
        let num_channels = u32::from_ne_bytes(self.read_array()?);
        let samples_per_channel = u32::from_ne_bytes(self.read_array()?);

        let num_samples = (num_channels as usize)
            .checked_mul(samples_per_channel as usize)
            .filter(|&n| n <= MAX_TRACE_FRAME_SAMPLES)
            .ok_or(TraceError::InvalidFrame {
                num_channels,
                samples_per_channel,
            })?;
        let mut data = vec![0i16; num_samples];
        self.reader
            .read_exact(bytemuck::cast_slice_mut::<i16, u8>(&mut data))?;

        Ok(AudioFrame {
            sample_rate_hz,
            num_channels: num_channels as usize,
            samples_per_channel: samples_per_channel as usize,
            data,
            vad_activity: Default::default(),
        })
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}
