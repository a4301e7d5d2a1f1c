//! Energy-based voice activity detection.
//!
//! Compares the energy of each decision block (10, 20 or 30 ms) of the mixed
//! low band against a noise floor learned from the first block and adapted
//! on non-speech blocks. A short hangover keeps the decision active across
//! brief pauses in speech.

use vqe_common_audio::audio_util::mean_square;

use crate::audio_buffer::AudioBuffer;
use crate::audio_frame::VadActivity;
use crate::audio_processing::{Error, Status};
use crate::config::Likelihood;
use crate::stage::{Stage, StageKind, StreamContext};

/// Blocks that stay active after the energy drops below threshold.
const HANGOVER_BLOCKS: u32 = 4;
/// Below this mean-square power nothing counts as speech (~-70 dBFS).
const MIN_SPEECH_POWER: f32 = 100.0;
const MIN_NOISE_FLOOR: f32 = 1.0;
/// Smoothing of the floor towards non-speech blocks.
const NOISE_FLOOR_ALPHA: f32 = 0.1;

/// Voice detector stage.
#[derive(Debug)]
pub struct VoiceDetector {
    enabled: bool,
    likelihood: Likelihood,
    frame_size_ms: u32,
    noise_floor: Option<f32>,
    hangover: u32,
    block_energy: f32,
    block_frames: u32,
    stream_has_voice: bool,
}

impl VoiceDetector {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            likelihood: Likelihood::Low,
            frame_size_ms: 10,
            noise_floor: None,
            hangover: 0,
            block_energy: 0.0,
            block_frames: 0,
            stream_has_voice: false,
        }
    }

    pub fn set_likelihood(&mut self, likelihood: Likelihood) {
        self.likelihood = likelihood;
    }

    pub fn likelihood(&self) -> Likelihood {
        self.likelihood
    }

    /// Decision interval. Fails with [`Error::InvalidParameter`] unless 10,
    /// 20 or 30 ms.
    pub fn set_frame_size_ms(&mut self, size: u32) -> Result<(), Error> {
        if !matches!(size, 10 | 20 | 30) {
            return Err(Error::InvalidParameter);
        }
        self.frame_size_ms = size;
        self.block_energy = 0.0;
        self.block_frames = 0;
        Ok(())
    }

    pub fn frame_size_ms(&self) -> u32 {
        self.frame_size_ms
    }

    /// Decision for the most recent block.
    pub fn stream_has_voice(&self) -> bool {
        self.stream_has_voice
    }

    /// Energy ratio over the floor a block must exceed to count as speech.
    fn threshold_ratio(&self) -> f32 {
        match self.likelihood {
            Likelihood::VeryLow => 2.0,
            Likelihood::Low => 4.0,
            Likelihood::Moderate => 8.0,
            Likelihood::High => 16.0,
        }
    }

    fn decide(&mut self, energy: f32) {
        let floor = *self
            .noise_floor
            .get_or_insert(energy.max(MIN_NOISE_FLOOR));
        let is_speech = energy > MIN_SPEECH_POWER && energy > floor * self.threshold_ratio();
        if is_speech {
            self.hangover = HANGOVER_BLOCKS;
            self.stream_has_voice = true;
            return;
        }
        self.noise_floor = Some(if energy < floor {
            energy.max(MIN_NOISE_FLOOR)
        } else {
            floor + NOISE_FLOOR_ALPHA * (energy - floor)
        });
        if self.hangover > 0 {
            self.hangover -= 1;
            self.stream_has_voice = true;
        } else {
            self.stream_has_voice = false;
        }
    }
}

impl Stage for VoiceDetector {
    fn kind(&self) -> StageKind {
        StageKind::VoiceDetection
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, _ctx: &StreamContext) -> Result<(), Error> {
        self.noise_floor = None;
        self.hangover = 0;
        self.block_energy = 0.0;
        self.block_frames = 0;
        self.stream_has_voice = false;
        Ok(())
    }

    fn process_capture_audio(
        &mut self,
        _ctx: &StreamContext,
        audio: &mut AudioBuffer,
    ) -> Result<Status, Error> {
        audio.copy_and_mix_low_pass();
        self.block_energy += mean_square(audio.mixed_low_pass_data());
        self.block_frames += 1;

        if self.block_frames * 10 >= self.frame_size_ms {
            let energy = self.block_energy / self.block_frames as f32;
            self.block_energy = 0.0;
            self.block_frames = 0;
            self.decide(energy);
        }

        audio.set_activity(if self.stream_has_voice {
            VadActivity::Active
        } else {
            VadActivity::Passive
        });
        Ok(Status::Ok)
    }

    fn version(&self) -> &'static str {
        "VAD 1.2.0"
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

    fn detector() -> VoiceDetector {
        let mut vad = VoiceDetector::new();
        vad.set_enabled(true);
        vad.initialize(&ctx()).unwrap();
        vad
    }

    fn run(vad: &mut VoiceDetector, level: i16) -> VadActivity {
        let mut audio = AudioBuffer::new(1, 80);
        let data = (0..80).map(|i| if i % 2 == 0 { level } else { -level }).collect();
        audio.deinterleave_from(&AudioFrame::from_interleaved(8_000, 1, data));
        vad.process_capture_audio(&ctx(), &mut audio).unwrap();
        audio.activity()
    }

    #[test]
    fn frame_size_is_validated() {
        let mut vad = VoiceDetector::new();
        assert_eq!(vad.set_frame_size_ms(15), Err(Error::InvalidParameter));
        assert_eq!(vad.set_frame_size_ms(0), Err(Error::InvalidParameter));
        assert_eq!(vad.set_frame_size_ms(30), Ok(()));
        assert_eq!(vad.frame_size_ms(), 30);
    }

    #[test]
    fn silence_is_passive() {
        let mut vad = detector();
        for _ in 0..5 {
            assert_eq!(run(&mut vad, 0), VadActivity::Passive);
        }
        assert!(!vad.stream_has_voice());
    }

    #[test]
    fn speech_after_noise_is_active_with_hangover() {
        let mut vad = detector();
        for _ in 0..20 {
            run(&mut vad, 30);
        }
        assert!(!vad.stream_has_voice());

        assert_eq!(run(&mut vad, 3000), VadActivity::Active);
        for _ in 0..HANGOVER_BLOCKS {
            assert_eq!(run(&mut vad, 30), VadActivity::Active);
        }
        assert_eq!(run(&mut vad, 30), VadActivity::Passive);
    }

    #[test]
    fn longer_blocks_delay_the_decision() {
        let mut vad = detector();
        vad.set_frame_size_ms(30).unwrap();
        for _ in 0..3 {
            assert_eq!(run(&mut vad, 0), VadActivity::Passive);
        }
        assert_eq!(run(&mut vad, 3000), VadActivity::Passive);
        assert_eq!(run(&mut vad, 3000), VadActivity::Passive);
        assert_eq!(run(&mut vad, 3000), VadActivity::Active);
    }

    #[test]
    fn higher_likelihood_needs_more_energy() {
        // Floor settles at the noise power; doubling the amplitude adds 6 dB.
        let mut low = detector();
        low.set_likelihood(Likelihood::VeryLow);
        let mut high = detector();
        high.set_likelihood(Likelihood::High);
        for _ in 0..50 {
            run(&mut low, 100);
            run(&mut high, 100);
        }
        assert_eq!(run(&mut low, 200), VadActivity::Active);
        assert_eq!(run(&mut high, 200), VadActivity::Passive);
    }
}
