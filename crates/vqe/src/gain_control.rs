//! Automatic gain control.
//!
//! Three modes share one level measurement taken before the rest of the
//! capture pipeline runs:
//!
//! - `AdaptiveAnalog`: the caller reports the current analog (microphone)
//!   volume every frame and reads back a recommended volume that moves the
//!   signal towards the target level.
//! - `AdaptiveDigital`: a digital gain, bounded by the compression gain,
//!   slowly tracks the target level.
//! - `FixedDigital`: the compression gain is applied as-is.
//!
//! An optional limiter keeps the output below the target level.

use vqe_common_audio::audio_util::{
    MIN_LEVEL_DBFS, apply_gain, db_to_ratio, dbfs_to_float_s16, float_s16_to_dbfs,
};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing::{Error, Status};
use crate::config::{GainControlMode, MAX_COMPRESSION_GAIN_DB, MAX_TARGET_LEVEL_DBFS};
use crate::echo_cancellation::capture_power;
use crate::stage::{Stage, StageKind, StreamContext};

/// Frames quieter than this are not used for adaptation.
const MIN_SPEECH_LEVEL_DBFS: f32 = -60.0;
/// Slew limit of the adaptive digital gain.
const MAX_GAIN_CHANGE_DB_PER_FRAME: f32 = 0.2;
/// Level error tolerated before the analog recommendation moves.
const ANALOG_DEADBAND_DB: f32 = 2.0;

/// Gain controller stage.
#[derive(Debug)]
pub struct GainController {
    enabled: bool,
    mode: GainControlMode,
    target_level_dbfs: u8,
    compression_gain_db: u8,
    limiter_enabled: bool,
    analog_level_minimum: u16,
    analog_level_maximum: u16,
    stream_analog_level: Option<u16>,
    recommended_analog_level: u16,
    digital_gain_db: f32,
    capture_level_dbfs: f32,
    far_end_active_frames: u64,
    stream_is_saturated: bool,
}

impl GainController {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            mode: GainControlMode::AdaptiveAnalog,
            target_level_dbfs: 3,
            compression_gain_db: 9,
            limiter_enabled: true,
            analog_level_minimum: 0,
            analog_level_maximum: 255,
            stream_analog_level: None,
            recommended_analog_level: 0,
            digital_gain_db: 0.0,
            capture_level_dbfs: MIN_LEVEL_DBFS,
            far_end_active_frames: 0,
            stream_is_saturated: false,
        }
    }

    pub fn set_mode(&mut self, mode: GainControlMode) {
        self.mode = mode;
        self.reset_gain();
    }

    pub fn mode(&self) -> GainControlMode {
        self.mode
    }

    /// Target peak level in -dBFS. Fails with
    /// [`Error::InvalidParameter`] above 31.
    pub fn set_target_level_dbfs(&mut self, level: u8) -> Result<(), Error> {
        if level > MAX_TARGET_LEVEL_DBFS {
            return Err(Error::InvalidParameter);
        }
        self.target_level_dbfs = level;
        Ok(())
    }

    pub fn target_level_dbfs(&self) -> u8 {
        self.target_level_dbfs
    }

    /// Maximum digital gain in dB. Fails with
    /// [`Error::InvalidParameter`] above 90.
    pub fn set_compression_gain_db(&mut self, gain: u8) -> Result<(), Error> {
        if gain > MAX_COMPRESSION_GAIN_DB {
            return Err(Error::InvalidParameter);
        }
        self.compression_gain_db = gain;
        self.reset_gain();
        Ok(())
    }

    pub fn compression_gain_db(&self) -> u8 {
        self.compression_gain_db
    }

    pub fn enable_limiter(&mut self, enable: bool) {
        self.limiter_enabled = enable;
    }

    pub fn is_limiter_enabled(&self) -> bool {
        self.limiter_enabled
    }

    /// Range of the analog volume. Fails with
    /// [`Error::InvalidParameter`] unless `minimum < maximum`.
    pub fn set_analog_level_limits(&mut self, minimum: u16, maximum: u16) -> Result<(), Error> {
        if minimum >= maximum {
            return Err(Error::InvalidParameter);
        }
        self.analog_level_minimum = minimum;
        self.analog_level_maximum = maximum;
        self.recommended_analog_level = self.recommended_analog_level.clamp(minimum, maximum);
        Ok(())
    }

    pub fn analog_level_minimum(&self) -> u16 {
        self.analog_level_minimum
    }

    pub fn analog_level_maximum(&self) -> u16 {
        self.analog_level_maximum
    }

    /// Reports the current analog volume. Required before every capture
    /// frame in `AdaptiveAnalog` mode.
    pub fn set_stream_analog_level(&mut self, level: u16) -> Result<(), Error> {
        if !(self.analog_level_minimum..=self.analog_level_maximum).contains(&level) {
            return Err(Error::InvalidParameter);
        }
        self.stream_analog_level = Some(level);
        self.recommended_analog_level = level;
        Ok(())
    }

    /// Recommended analog volume for the next frame.
    pub fn stream_analog_level(&self) -> u16 {
        self.recommended_analog_level
    }

    /// Whether the last processed frame had to be clipped.
    pub fn stream_is_saturated(&self) -> bool {
        self.stream_is_saturated
    }

    /// Level of the last analyzed capture frame in dBFS.
    pub fn capture_level_dbfs(&self) -> f32 {
        self.capture_level_dbfs
    }

    /// Render frames with signal seen since initialization.
    pub fn far_end_active_frames(&self) -> u64 {
        self.far_end_active_frames
    }

    fn reset_gain(&mut self) {
        self.digital_gain_db = match self.mode {
            GainControlMode::FixedDigital => f32::from(self.compression_gain_db),
            GainControlMode::AdaptiveDigital | GainControlMode::AdaptiveAnalog => 0.0,
        };
    }

    fn target_dbfs(&self) -> f32 {
        -f32::from(self.target_level_dbfs)
    }

    fn update_digital_gain(&mut self) {
        if self.capture_level_dbfs < MIN_SPEECH_LEVEL_DBFS {
            return;
        }
        let desired = (self.target_dbfs() - self.capture_level_dbfs)
            .clamp(0.0, f32::from(self.compression_gain_db));
        let step = (desired - self.digital_gain_db)
            .clamp(-MAX_GAIN_CHANGE_DB_PER_FRAME, MAX_GAIN_CHANGE_DB_PER_FRAME);
        self.digital_gain_db += step;
    }

    fn update_analog_recommendation(&mut self, current: u16) {
        let mut level = current;
        if self.capture_level_dbfs >= MIN_SPEECH_LEVEL_DBFS {
            let step = 1 + (self.analog_level_maximum - self.analog_level_minimum) / 64;
            let error = self.target_dbfs() - self.capture_level_dbfs;
            if error > ANALOG_DEADBAND_DB {
                level = level.saturating_add(step).min(self.analog_level_maximum);
            } else if error < -ANALOG_DEADBAND_DB {
                level = level.saturating_sub(step).max(self.analog_level_minimum);
            }
        }
        self.recommended_analog_level = level;
    }
}

impl Stage for GainController {
    fn kind(&self) -> StageKind {
        StageKind::GainControl
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, _ctx: &StreamContext) -> Result<(), Error> {
        self.stream_analog_level = None;
        self.capture_level_dbfs = MIN_LEVEL_DBFS;
        self.far_end_active_frames = 0;
        self.stream_is_saturated = false;
        self.reset_gain();
        Ok(())
    }

    fn analyze_capture_audio(
        &mut self,
        _ctx: &StreamContext,
        audio: &AudioBuffer,
    ) -> Result<Status, Error> {
        if self.mode == GainControlMode::AdaptiveAnalog && self.stream_analog_level.is_none() {
            return Err(Error::StreamParameterNotSet);
        }
        self.capture_level_dbfs = float_s16_to_dbfs(capture_power(audio).sqrt());
        Ok(Status::Ok)
    }

    fn process_capture_audio(
        &mut self,
        _ctx: &StreamContext,
        audio: &mut AudioBuffer,
    ) -> Result<Status, Error> {
        match self.mode {
            GainControlMode::AdaptiveAnalog => {
                let Some(current) = self.stream_analog_level.take() else {
                    return Err(Error::StreamParameterNotSet);
                };
                self.update_analog_recommendation(current);
            }
            GainControlMode::AdaptiveDigital => self.update_digital_gain(),
            GainControlMode::FixedDigital => {}
        }

        let gain = db_to_ratio(self.digital_gain_db);
        let limit = dbfs_to_float_s16(self.target_dbfs()).round() as i16;
        let mut saturated = false;
        for ch in 0..audio.num_channels() {
            let low = audio.low_pass_split_data_mut(ch);
            saturated |= apply_gain(low, gain);
            if self.limiter_enabled {
                for s in low.iter_mut() {
                    *s = (*s).clamp(-limit, limit);
                }
            }
            if let Some(high) = audio.high_pass_split_data_mut(ch) {
                saturated |= apply_gain(high, gain);
            }
        }
        self.stream_is_saturated = saturated;
        Ok(Status::Ok)
    }

    fn process_render_audio(
        &mut self,
        _ctx: &StreamContext,
        audio: &AudioBuffer,
    ) -> Result<Status, Error> {
        if float_s16_to_dbfs(capture_power(audio).sqrt()) >= MIN_SPEECH_LEVEL_DBFS {
            self.far_end_active_frames += 1;
        }
        Ok(Status::Ok)
    }

    fn version(&self) -> &'static str {
        "AGC 1.7.0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_frame::AudioFrame;
    use crate::stream_config::StreamConfig;

    fn ctx() -> StreamContext {
        StreamContext {
            stream: StreamConfig::new(8_000, 1, 1, 1),
            stream_delay_ms: 0,
            was_stream_delay_set: false,
        }
    }

    fn buffer_with(level: i16) -> AudioBuffer {
        let mut audio = AudioBuffer::new(1, 80);
        let data = (0..80).map(|i| if i % 2 == 0 { level } else { -level }).collect();
        audio.deinterleave_from(&AudioFrame::from_interleaved(8_000, 1, data));
        audio
    }

    fn controller(mode: GainControlMode) -> GainController {
        let mut agc = GainController::new();
        agc.set_enabled(true);
        agc.set_mode(mode);
        agc.initialize(&ctx()).unwrap();
        agc
    }

    #[test]
    fn parameter_ranges_are_validated() {
        let mut agc = GainController::new();
        assert_eq!(agc.set_target_level_dbfs(32), Err(Error::InvalidParameter));
        assert_eq!(agc.set_target_level_dbfs(31), Ok(()));
        assert_eq!(agc.set_compression_gain_db(91), Err(Error::InvalidParameter));
        assert_eq!(agc.set_compression_gain_db(90), Ok(()));
        assert_eq!(agc.set_analog_level_limits(10, 10), Err(Error::InvalidParameter));
        assert_eq!(agc.set_analog_level_limits(10, 20), Ok(()));
        assert_eq!(agc.set_stream_analog_level(9), Err(Error::InvalidParameter));
        assert_eq!(agc.set_stream_analog_level(21), Err(Error::InvalidParameter));
        assert_eq!(agc.set_stream_analog_level(15), Ok(()));
    }

    #[test]
    fn adaptive_analog_requires_level_every_frame() {
        let mut agc = controller(GainControlMode::AdaptiveAnalog);
        let mut audio = buffer_with(100);
        assert_eq!(
            agc.analyze_capture_audio(&ctx(), &audio),
            Err(Error::StreamParameterNotSet)
        );

        agc.set_stream_analog_level(128).unwrap();
        agc.analyze_capture_audio(&ctx(), &audio).unwrap();
        agc.process_capture_audio(&ctx(), &mut audio).unwrap();
        assert_eq!(
            agc.analyze_capture_audio(&ctx(), &audio),
            Err(Error::StreamParameterNotSet)
        );
    }

    #[test]
    fn quiet_speech_raises_analog_recommendation() {
        let mut agc = controller(GainControlMode::AdaptiveAnalog);
        let mut audio = buffer_with(300);
        agc.set_stream_analog_level(100).unwrap();
        agc.analyze_capture_audio(&ctx(), &audio).unwrap();
        agc.process_capture_audio(&ctx(), &mut audio).unwrap();
        assert!(agc.stream_analog_level() > 100);
    }

    #[test]
    fn loud_speech_lowers_analog_recommendation() {
        let mut agc = controller(GainControlMode::AdaptiveAnalog);
        agc.set_target_level_dbfs(20).unwrap();
        let mut audio = buffer_with(30_000);
        agc.set_stream_analog_level(100).unwrap();
        agc.analyze_capture_audio(&ctx(), &audio).unwrap();
        agc.process_capture_audio(&ctx(), &mut audio).unwrap();
        assert!(agc.stream_analog_level() < 100);
    }

    #[test]
    fn silence_keeps_analog_level() {
        let mut agc = controller(GainControlMode::AdaptiveAnalog);
        let mut audio = buffer_with(0);
        agc.set_stream_analog_level(42).unwrap();
        agc.analyze_capture_audio(&ctx(), &audio).unwrap();
        agc.process_capture_audio(&ctx(), &mut audio).unwrap();
        assert_eq!(agc.stream_analog_level(), 42);
    }

    #[test]
    fn fixed_digital_applies_compression_gain() {
        let mut agc = controller(GainControlMode::FixedDigital);
        agc.set_compression_gain_db(6).unwrap();
        let mut audio = buffer_with(1000);
        agc.analyze_capture_audio(&ctx(), &audio).unwrap();
        agc.process_capture_audio(&ctx(), &mut audio).unwrap();
        assert_eq!(audio.data(0)[0], 1995);
        assert!(!agc.stream_is_saturated());
    }

    #[test]
    fn limiter_caps_output_at_target() {
        let mut agc = controller(GainControlMode::FixedDigital);
        agc.set_compression_gain_db(20).unwrap();
        let mut audio = buffer_with(10_000);
        agc.analyze_capture_audio(&ctx(), &audio).unwrap();
        agc.process_capture_audio(&ctx(), &mut audio).unwrap();
        assert!(agc.stream_is_saturated());
        let limit = dbfs_to_float_s16(-3.0).round() as i16;
        assert!(audio.data(0).iter().all(|&s| s.abs() <= limit));
    }

    #[test]
    fn adaptive_digital_gain_is_slew_limited() {
        let mut agc = controller(GainControlMode::AdaptiveDigital);
        let mut audio = buffer_with(1000);
        agc.analyze_capture_audio(&ctx(), &audio).unwrap();
        agc.process_capture_audio(&ctx(), &mut audio).unwrap();
        // One frame moves the gain by at most 0.2 dB.
        let expected = (1000.0 * db_to_ratio(MAX_GAIN_CHANGE_DB_PER_FRAME)).round() as i16;
        assert_eq!(audio.data(0)[0], expected);
    }

    #[test]
    fn render_counts_active_frames() {
        let mut agc = controller(GainControlMode::FixedDigital);
        agc.process_render_audio(&ctx(), &buffer_with(0)).unwrap();
        agc.process_render_audio(&ctx(), &buffer_with(5000)).unwrap();
        assert_eq!(agc.far_end_active_frames(), 1);
    }
}
