//! Public engine handle.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::audio_frame::AudioFrame;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::Config;
use crate::echo_cancellation::EchoCanceller;
use crate::echo_control_mobile::MobileEchoController;
use crate::gain_control::GainController;
use crate::high_pass_filter::HighPassFilter;
use crate::level_estimator::LevelEstimator;
use crate::noise_suppression::NoiseSuppressor;
use crate::stage::StageKind;
use crate::stats::AudioProcessingStats;
use crate::stream_config::{StreamConfig, StreamConfigError};
use crate::voice_detection::VoiceDetector;

/// Paths of this many bytes or more are rejected by
/// [`AudioProcessing::start_debug_recording`].
pub const MAX_FILENAME_SIZE: usize = 1024;

/// Errors returned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Empty frame data or empty recording path.
    NullInput,
    /// A parameter is outside its valid range.
    InvalidParameter,
    /// Frame sample rate differs from the configured rate, or a stage does
    /// not support the configured rate.
    BadSampleRate,
    /// Frame channel count differs from the configured count.
    BadChannelCount,
    /// Frame length differs from the configured 10 ms length.
    BadFrameLength,
    /// The debug recording could not be opened or written.
    FileError,
    /// A per-frame parameter (stream delay, analog level) was not set
    /// before processing.
    StreamParameterNotSet,
    /// The stage cannot be enabled.
    UnsupportedComponent,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NullInput => write!(f, "null or empty input"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::BadSampleRate => write!(f, "unsupported or mismatched sample rate"),
            Self::BadChannelCount => write!(f, "mismatched channel count"),
            Self::BadFrameLength => write!(f, "mismatched frame length"),
            Self::FileError => write!(f, "debug recording I/O error"),
            Self::StreamParameterNotSet => write!(f, "stream parameter not set for this frame"),
            Self::UnsupportedComponent => write!(f, "unsupported component"),
        }
    }
}

impl std::error::Error for Error {}

impl From<StreamConfigError> for Error {
    fn from(_: StreamConfigError) -> Self {
        Self::InvalidParameter
    }
}

/// Non-fatal conditions reported alongside a completed operation. Ordered
/// by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Warning {
    /// A stream parameter was out of range (and clamped) or insufficient
    /// for the stage to do its job on this frame.
    BadStreamParameter,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadStreamParameter => write!(f, "bad stream parameter"),
        }
    }
}

/// Outcome of a successful operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Ok,
    Warning(Warning),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn warning(&self) -> Option<Warning> {
        match *self {
            Self::Ok => None,
            Self::Warning(warning) => Some(warning),
        }
    }

    /// Keeps the more severe of two outcomes.
    pub(crate) fn merge(self, other: Self) -> Self {
        match (self.warning(), other.warning()) {
            (Some(a), Some(b)) => Self::Warning(a.max(b)),
            (Some(_), None) => self,
            (None, _) => other,
        }
    }
}

/// Exclusive access to one stage's parameters.
///
/// Holds the engine lock; calling engine methods while a guard is alive
/// deadlocks.
pub type StageGuard<'a, T> = MappedMutexGuard<'a, T>;

/// Voice quality enhancement engine.
///
/// All methods take `&self` and serialize on one internal lock, so the
/// engine can be shared between a capture thread and a render thread.
///
/// ```
/// use vqe::{AudioFrame, AudioProcessing, StageKind};
///
/// let apm = AudioProcessing::create(0);
/// apm.set_enabled(StageKind::NoiseSuppression, true).unwrap();
///
/// let mut frame = AudioFrame::new(16_000, 1);
/// let status = apm.process_capture_stream(&mut frame).unwrap();
/// assert!(status.is_ok());
/// ```
#[derive(Debug)]
pub struct AudioProcessing {
    inner: Mutex<AudioProcessingImpl>,
}

/// Builder for [`AudioProcessing`].
#[derive(Debug, Default)]
pub struct AudioProcessingBuilder {
    id: i32,
    config: Config,
    stream_config: StreamConfig,
}

impl AudioProcessingBuilder {
    /// Identifier attached to log events.
    pub fn id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn stream_config(mut self, stream_config: StreamConfig) -> Self {
        self.stream_config = stream_config;
        self
    }

    /// Validates the stream layout and config and initializes every stage.
    pub fn build(self) -> Result<AudioProcessing, Error> {
        self.stream_config.validate()?;
        let mut inner = AudioProcessingImpl::new(self.id, self.stream_config);
        inner.apply_config(self.config)?;
        Ok(AudioProcessing {
            inner: Mutex::new(inner),
        })
    }
}

impl AudioProcessing {
    pub fn builder() -> AudioProcessingBuilder {
        AudioProcessingBuilder::default()
    }

    /// An engine at 16 kHz mono with every stage disabled.
    pub fn create(id: i32) -> Self {
        Self {
            inner: Mutex::new(AudioProcessingImpl::new(id, StreamConfig::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AudioProcessingImpl> {
        self.inner.lock()
    }

    // ─── Stream configuration ───────────────────────────────────────

    /// Rebuilds the buffers and reinitializes every stage. Clears the
    /// stream delay flag.
    pub fn initialize(&self) -> Result<(), Error> {
        self.lock().initialize()
    }

    /// Sets the rate of both streams (8, 16 or 32 kHz) and reinitializes.
    pub fn set_sample_rate_hz(&self, rate: u32) -> Result<(), Error> {
        self.lock().set_sample_rate_hz(rate)
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.lock().stream_config().sample_rate_hz()
    }

    /// Sets the render channel count (1 or 2) and reinitializes.
    pub fn set_render_channels(&self, channels: usize) -> Result<(), Error> {
        self.lock().set_render_channels(channels)
    }

    pub fn render_channels(&self) -> usize {
        self.lock().stream_config().render_channels()
    }

    /// Sets the capture channel layout and reinitializes. `outputs` may be
    /// lower than `inputs`, in which case capture frames are downmixed.
    pub fn set_capture_channels(&self, inputs: usize, outputs: usize) -> Result<(), Error> {
        self.lock().set_capture_channels(inputs, outputs)
    }

    pub fn capture_input_channels(&self) -> usize {
        self.lock().stream_config().capture_input_channels()
    }

    pub fn capture_output_channels(&self) -> usize {
        self.lock().stream_config().capture_output_channels()
    }

    pub fn stream_config(&self) -> StreamConfig {
        self.lock().stream_config()
    }

    // ─── Delay bookkeeping ──────────────────────────────────────────

    /// Reports the delay between a render frame being analyzed and its echo
    /// reaching the capture side. Must be called before every capture frame
    /// while an echo stage is enabled.
    ///
    /// Negative delays fail with [`Error::InvalidParameter`] and leave the
    /// stored delay unchanged. Delays above 500 ms are stored as 500 and
    /// reported with [`Warning::BadStreamParameter`].
    pub fn set_stream_delay_ms(&self, delay_ms: i32) -> Result<Status, Error> {
        self.lock().set_stream_delay_ms(delay_ms)
    }

    pub fn stream_delay_ms(&self) -> i32 {
        self.lock().stream_delay_ms()
    }

    /// Whether the delay was set since the last render frame.
    pub fn was_stream_delay_set(&self) -> bool {
        self.lock().was_stream_delay_set()
    }

    // ─── Data plane ─────────────────────────────────────────────────

    /// Processes a near-end frame in place.
    ///
    /// On error the frame may be partially modified; in particular a
    /// downmix has already set `frame.num_channels` to the output count.
    pub fn process_capture_stream(&self, frame: &mut AudioFrame) -> Result<Status, Error> {
        self.lock().process_capture_stream(frame)
    }

    /// Feeds a far-end frame to the stages. The frame is not modified.
    pub fn analyze_reverse_stream(&self, frame: &AudioFrame) -> Result<Status, Error> {
        self.lock().analyze_reverse_stream(frame)
    }

    // ─── Stages ─────────────────────────────────────────────────────

    /// Enables or disables a stage. Enabling initializes the stage; if that
    /// fails the stage stays disabled.
    pub fn set_enabled(&self, kind: StageKind, enabled: bool) -> Result<(), Error> {
        self.lock().set_enabled(kind, enabled)
    }

    pub fn is_enabled(&self, kind: StageKind) -> bool {
        self.lock().is_enabled(kind)
    }

    /// Applies parameters and enable flags from `config`, then
    /// reinitializes. Nothing changes if the config is invalid or enables a
    /// stage the current stream cannot run ([`Error::BadSampleRate`] for
    /// mobile echo control at 32 kHz).
    pub fn apply_config(&self, config: Config) -> Result<(), Error> {
        self.lock().apply_config(config)
    }

    pub fn echo_cancellation(&self) -> StageGuard<'_, EchoCanceller> {
        MutexGuard::map(self.lock(), |inner| &mut inner.stages_mut().echo_cancellation)
    }

    pub fn echo_control_mobile(&self) -> StageGuard<'_, MobileEchoController> {
        MutexGuard::map(self.lock(), |inner| {
            &mut inner.stages_mut().echo_control_mobile
        })
    }

    pub fn gain_control(&self) -> StageGuard<'_, GainController> {
        MutexGuard::map(self.lock(), |inner| &mut inner.stages_mut().gain_control)
    }

    pub fn high_pass_filter(&self) -> StageGuard<'_, HighPassFilter> {
        MutexGuard::map(self.lock(), |inner| &mut inner.stages_mut().high_pass_filter)
    }

    pub fn level_estimator(&self) -> StageGuard<'_, LevelEstimator> {
        MutexGuard::map(self.lock(), |inner| &mut inner.stages_mut().level_estimator)
    }

    pub fn noise_suppression(&self) -> StageGuard<'_, NoiseSuppressor> {
        MutexGuard::map(self.lock(), |inner| &mut inner.stages_mut().noise_suppression)
    }

    pub fn voice_detection(&self) -> StageGuard<'_, VoiceDetector> {
        MutexGuard::map(self.lock(), |inner| &mut inner.stages_mut().voice_detection)
    }

    pub fn statistics(&self) -> AudioProcessingStats {
        self.lock().statistics()
    }

    // ─── Debug recording ────────────────────────────────────────────

    /// Starts writing a binary trace to `path`, closing any trace already
    /// in progress.
    ///
    /// Fails with [`Error::NullInput`] for an empty path,
    /// [`Error::InvalidParameter`] for a path of [`MAX_FILENAME_SIZE`] bytes
    /// or more, and [`Error::FileError`] if the file cannot be created or
    /// written.
    pub fn start_debug_recording(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let len = path.as_os_str().len();
        if len == 0 {
            return Err(Error::NullInput);
        }
        if len >= MAX_FILENAME_SIZE {
            return Err(Error::InvalidParameter);
        }
        let mut inner = self.lock();
        inner.stop_debug_recording()?;
        let file = File::create(path).map_err(|err| {
            tracing::warn!(path = %path.display(), %err, "failed to create debug recording");
            Error::FileError
        })?;
        inner.start_debug_recording(Box::new(file))
    }

    /// Starts writing a binary trace to an arbitrary sink, closing any trace
    /// already in progress.
    pub fn start_debug_recording_to(&self, sink: impl Write + Send + 'static) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.stop_debug_recording()?;
        inner.start_debug_recording(Box::new(sink))
    }

    /// Closes the trace. Succeeds without effect if none is in progress.
    pub fn stop_debug_recording(&self) -> Result<(), Error> {
        self.lock().stop_debug_recording()
    }

    pub fn is_recording(&self) -> bool {
        self.lock().is_recording()
    }

    // ─── Identity ───────────────────────────────────────────────────

    /// Writes the version report into `dest`, zero-filling the rest, and
    /// returns the number of bytes written.
    ///
    /// The report is `AudioProcessing 1.0.0` followed by one line per stage
    /// that has a version. Fails with [`Error::InvalidParameter`] if the
    /// next line does not fit; lines already written stay in `dest`.
    pub fn version(&self, dest: &mut [u8]) -> Result<usize, Error> {
        self.lock().version(dest)
    }

    /// The full version report.
    pub fn version_string(&self) -> String {
        self.lock().version_string()
    }

    pub fn change_unique_id(&self, id: i32) {
        self.lock().change_unique_id(id);
    }

    pub fn id(&self) -> i32 {
        self.lock().id()
    }
}
