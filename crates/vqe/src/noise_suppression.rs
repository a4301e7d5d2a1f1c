//! Noise gate driven by a per-channel noise floor tracker.

use vqe_common_audio::audio_util::{apply_gain, db_to_ratio, mean_square};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing::{Error, Status};
use crate::config::NoiseSuppressionLevel;
use crate::stage::{Stage, StageKind, StreamContext};

/// Floor rise per frame while the signal stays above it (~10 dB/s).
const FLOOR_RISE_PER_FRAME: f32 = 1.023;
/// Frames within this power ratio of the floor (~6 dB) count as noise.
const NOISE_GATE_RATIO: f32 = 4.0;
/// Lowest tracked floor, in mean-square units.
const MIN_NOISE_FLOOR: f32 = 1.0;

/// Noise suppressor stage.
#[derive(Debug)]
pub struct NoiseSuppressor {
    enabled: bool,
    level: NoiseSuppressionLevel,
    noise_floor: Vec<Option<f32>>,
    suppressed_frames: u64,
}

impl NoiseSuppressor {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            level: NoiseSuppressionLevel::Moderate,
            noise_floor: Vec::new(),
            suppressed_frames: 0,
        }
    }

    pub fn set_level(&mut self, level: NoiseSuppressionLevel) {
        self.level = level;
    }

    pub fn level(&self) -> NoiseSuppressionLevel {
        self.level
    }

    /// Tracked noise floor of `channel` as mean-square power, once at least
    /// one frame has been seen.
    pub fn noise_floor(&self, channel: usize) -> Option<f32> {
        self.noise_floor.get(channel).copied().flatten()
    }

    /// Capture frames attenuated since initialization, counted per channel.
    pub fn suppressed_frames(&self) -> u64 {
        self.suppressed_frames
    }
}

impl Stage for NoiseSuppressor {
    fn kind(&self) -> StageKind {
        StageKind::NoiseSuppression
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, ctx: &StreamContext) -> Result<(), Error> {
        self.noise_floor = vec![None; ctx.stream.capture_input_channels()];
        self.suppressed_frames = 0;
        Ok(())
    }

    fn process_capture_audio(
        &mut self,
        _ctx: &StreamContext,
        audio: &mut AudioBuffer,
    ) -> Result<Status, Error> {
        let gain = db_to_ratio(-self.level.max_attenuation_db());
        // An aborted reinitialization can leave fewer trackers than channels.
        if self.noise_floor.len() < audio.num_channels() {
            self.noise_floor.resize(audio.num_channels(), None);
        }
        for ch in 0..audio.num_channels() {
            let power = mean_square(audio.low_pass_split_data(ch));
            let floor = match self.noise_floor[ch] {
                Some(floor) if power >= floor => floor * FLOOR_RISE_PER_FRAME,
                _ => power,
            }
            .max(MIN_NOISE_FLOOR);
            self.noise_floor[ch] = Some(floor);

            if power < floor * NOISE_GATE_RATIO {
                apply_gain(audio.low_pass_split_data_mut(ch), gain);
                if let Some(high) = audio.high_pass_split_data_mut(ch) {
                    apply_gain(high, gain);
                }
                self.suppressed_frames += 1;
            }
        }
        Ok(Status::Ok)
    }

    fn version(&self) -> &'static str {
        "NS 2.2.0"
    }
}
