//! Far-end buffering echo canceller.
//!
//! Keeps a short history of render frames, picks the one that lines up with
//! the current capture frame according to the reported stream delay, and
//! suppresses the capture signal while the aligned far end dominates it.

use std::collections::VecDeque;

use vqe_common_audio::audio_util::{apply_gain, db_to_ratio, mean_square};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing::{Error, Status, Warning};
use crate::config::EchoSuppressionLevel;
use crate::stage::{Stage, StageKind, StreamContext};

/// Render frames kept for delay alignment (500 ms).
pub(crate) const MAX_FAR_END_FRAMES: usize = 50;

/// Mean-square power above which the far end counts as active (~-50 dBFS).
pub(crate) const FAR_END_ACTIVE_POWER: f32 = 1.0e3;

/// History of mono far-end low-band frames, newest last.
#[derive(Debug, Default)]
pub(crate) struct FarEndBuffer {
    frames: VecDeque<Vec<i16>>,
}

impl FarEndBuffer {
    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    /// Appends the channel-averaged low band of `audio`.
    pub(crate) fn push(&mut self, audio: &AudioBuffer) {
        let band_length = audio.samples_per_split_channel();
        let num_channels = audio.num_channels();
        let mut frame = if self.frames.len() == MAX_FAR_END_FRAMES {
            self.frames.pop_front().unwrap_or_default()
        } else {
            Vec::with_capacity(band_length)
        };
        frame.clear();
        frame.extend((0..band_length).map(|i| {
            let sum: i32 = (0..num_channels)
                .map(|ch| i32::from(audio.low_pass_split_data(ch)[i]))
                .sum();
            (sum / num_channels as i32) as i16
        }));
        self.frames.push_back(frame);
    }

    /// The frame `delay_ms / 10` frames before the newest one, or `None` if
    /// the history is too short.
    pub(crate) fn aligned(&self, delay_ms: i32) -> Option<&[i16]> {
        let frames_back = usize::try_from(delay_ms / 10).ok()?;
        let index = self.frames.len().checked_sub(frames_back + 1)?;
        self.frames.get(index).map(Vec::as_slice)
    }
}

/// Mean-square power over all current channels of the low band.
pub(crate) fn capture_power(audio: &AudioBuffer) -> f32 {
    let num_channels = audio.num_channels();
    (0..num_channels)
        .map(|ch| mean_square(audio.low_pass_split_data(ch)))
        .sum::<f32>()
        / num_channels.max(1) as f32
}

/// Echo canceller stage.
///
/// Requires [`AudioProcessing::set_stream_delay_ms`](crate::AudioProcessing::set_stream_delay_ms)
/// before every capture frame.
#[derive(Debug)]
pub struct EchoCanceller {
    enabled: bool,
    suppression_level: EchoSuppressionLevel,
    far_end: FarEndBuffer,
    echo_return_loss_db: Option<f64>,
    last_delay_ms: Option<i32>,
}

impl EchoCanceller {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            suppression_level: EchoSuppressionLevel::Moderate,
            far_end: FarEndBuffer::default(),
            echo_return_loss_db: None,
            last_delay_ms: None,
        }
    }

    pub fn set_suppression_level(&mut self, level: EchoSuppressionLevel) {
        self.suppression_level = level;
    }

    pub fn suppression_level(&self) -> EchoSuppressionLevel {
        self.suppression_level
    }

    /// Echo return loss of the last capture frame in dB, if both ends had
    /// signal.
    pub fn echo_return_loss(&self) -> Option<f64> {
        self.echo_return_loss_db
    }

    /// Delay used to align the last capture frame.
    pub fn delay_ms(&self) -> Option<i32> {
        self.last_delay_ms
    }

    /// Number of buffered far-end frames.
    pub fn far_end_frames(&self) -> usize {
        self.far_end.len()
    }

    fn attenuation_db(&self) -> f32 {
        match self.suppression_level {
            EchoSuppressionLevel::Low => 6.0,
            EchoSuppressionLevel::Moderate => 12.0,
            EchoSuppressionLevel::High => 18.0,
        }
    }
}

impl Stage for EchoCanceller {
    fn kind(&self) -> StageKind {
        StageKind::EchoCancellation
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, _ctx: &StreamContext) -> Result<(), Error> {
        self.far_end.clear();
        self.echo_return_loss_db = None;
        self.last_delay_ms = None;
        Ok(())
    }

    fn process_capture_audio(
        &mut self,
        ctx: &StreamContext,
        audio: &mut AudioBuffer,
    ) -> Result<Status, Error> {
        if !ctx.was_stream_delay_set {
            return Err(Error::StreamParameterNotSet);
        }
        self.last_delay_ms = Some(ctx.stream_delay_ms);

        let Some(far) = self.far_end.aligned(ctx.stream_delay_ms) else {
            self.echo_return_loss_db = None;
            return Ok(Status::Warning(Warning::BadStreamParameter));
        };
        let far_power = mean_square(far);
        let near_power = capture_power(audio);

        self.echo_return_loss_db = (far_power > 0.0 && near_power > 0.0)
            .then(|| 10.0 * f64::from(far_power / near_power).log10());

        // Near end no louder than the aligned far end: treat as echo.
        if far_power > FAR_END_ACTIVE_POWER && near_power <= far_power {
            let gain = db_to_ratio(-self.attenuation_db());
            for ch in 0..audio.num_channels() {
                apply_gain(audio.low_pass_split_data_mut(ch), gain);
                if let Some(high) = audio.high_pass_split_data_mut(ch) {
                    apply_gain(high, gain);
                }
            }
        }
        Ok(Status::Ok)
    }

    fn process_render_audio(
        &mut self,
        _ctx: &StreamContext,
        audio: &AudioBuffer,
    ) -> Result<Status, Error> {
        self.far_end.push(audio);
        Ok(Status::Ok)
    }

    fn version(&self) -> &'static str {
        "AEC 2.5.0"
    }
}
