//! The stage capability and the fixed stage set.

use std::fmt;

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing::{Error, Status};
use crate::echo_cancellation::EchoCanceller;
use crate::echo_control_mobile::MobileEchoController;
use crate::gain_control::GainController;
use crate::high_pass_filter::HighPassFilter;
use crate::level_estimator::LevelEstimator;
use crate::noise_suppression::NoiseSuppressor;
use crate::stream_config::StreamConfig;
use crate::voice_detection::VoiceDetector;

/// Identifies one of the seven pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    EchoCancellation,
    EchoControlMobile,
    GainControl,
    HighPassFilter,
    LevelEstimator,
    NoiseSuppression,
    VoiceDetection,
}

impl StageKind {
    /// Construction order. Stages are initialized and listed in the version
    /// report in this order.
    pub const ALL: [Self; 7] = [
        Self::EchoCancellation,
        Self::EchoControlMobile,
        Self::GainControl,
        Self::HighPassFilter,
        Self::LevelEstimator,
        Self::NoiseSuppression,
        Self::VoiceDetection,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::EchoCancellation => "echo_cancellation",
            Self::EchoControlMobile => "echo_control_mobile",
            Self::GainControl => "gain_control",
            Self::HighPassFilter => "high_pass_filter",
            Self::LevelEstimator => "level_estimator",
            Self::NoiseSuppression => "noise_suppression",
            Self::VoiceDetection => "voice_detection",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine state a stage may read during a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StreamContext {
    pub(crate) stream: StreamConfig,
    pub(crate) stream_delay_ms: i32,
    pub(crate) was_stream_delay_set: bool,
}

impl StreamContext {
    #[cfg(test)]
    #[inline]
    pub(crate) fn sample_rate_hz(&self) -> u32 {
        self.stream.sample_rate_hz()
    }

    #[inline]
    pub(crate) fn split_sample_rate_hz(&self) -> u32 {
        self.stream.split_sample_rate_hz()
    }

    /// Band length the stages see: half a frame when band-split.
    #[cfg(test)]
    #[inline]
    pub(crate) fn samples_per_split_channel(&self) -> usize {
        self.split_sample_rate_hz() as usize / 100
    }
}

/// One enhancement algorithm in the pipeline.
///
/// The engine skips disabled stages, so the processing hooks only run while
/// the stage is enabled. `initialize` runs for every stage whenever the
/// stream shape changes and must reset algorithm state.
pub(crate) trait Stage: fmt::Debug + Send {
    fn kind(&self) -> StageKind;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    fn initialize(&mut self, _ctx: &StreamContext) -> Result<(), Error> {
        Ok(())
    }

    fn process_capture_audio(
        &mut self,
        _ctx: &StreamContext,
        _audio: &mut AudioBuffer,
    ) -> Result<Status, Error> {
        Ok(Status::Ok)
    }

    /// Statistics-only pass over the capture audio; must not change samples.
    fn analyze_capture_audio(
        &mut self,
        _ctx: &StreamContext,
        _audio: &AudioBuffer,
    ) -> Result<Status, Error> {
        Ok(Status::Ok)
    }

    fn process_render_audio(
        &mut self,
        _ctx: &StreamContext,
        _audio: &AudioBuffer,
    ) -> Result<Status, Error> {
        Ok(Status::Ok)
    }

    /// Version text; empty if the stage reports none.
    fn version(&self) -> &'static str;
}

/// The fixed stage set, owned by the engine.
#[derive(Debug)]
pub(crate) struct Stages {
    pub(crate) echo_cancellation: EchoCanceller,
    pub(crate) echo_control_mobile: MobileEchoController,
    pub(crate) gain_control: GainController,
    pub(crate) high_pass_filter: HighPassFilter,
    pub(crate) level_estimator: LevelEstimator,
    pub(crate) noise_suppression: NoiseSuppressor,
    pub(crate) voice_detection: VoiceDetector,
}

impl Stages {
    pub(crate) fn new() -> Self {
        Self {
            echo_cancellation: EchoCanceller::new(),
            echo_control_mobile: MobileEchoController::new(),
            gain_control: GainController::new(),
            high_pass_filter: HighPassFilter::new(),
            level_estimator: LevelEstimator::new(),
            noise_suppression: NoiseSuppressor::new(),
            voice_detection: VoiceDetector::new(),
        }
    }

    pub(crate) fn get(&self, kind: StageKind) -> &dyn Stage {
        match kind {
            StageKind::EchoCancellation => &self.echo_cancellation,
            StageKind::EchoControlMobile => &self.echo_control_mobile,
            StageKind::GainControl => &self.gain_control,
            StageKind::HighPassFilter => &self.high_pass_filter,
            StageKind::LevelEstimator => &self.level_estimator,
            StageKind::NoiseSuppression => &self.noise_suppression,
            StageKind::VoiceDetection => &self.voice_detection,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: StageKind) -> &mut dyn Stage {
        match kind {
            StageKind::EchoCancellation => &mut self.echo_cancellation,
            StageKind::EchoControlMobile => &mut self.echo_control_mobile,
            StageKind::GainControl => &mut self.gain_control,
            StageKind::HighPassFilter => &mut self.high_pass_filter,
            StageKind::LevelEstimator => &mut self.level_estimator,
            StageKind::NoiseSuppression => &mut self.noise_suppression,
            StageKind::VoiceDetection => &mut self.voice_detection,
        }
    }

    /// Mutable handles to every stage in construction order.
    pub(crate) fn all_mut(&mut self) -> [&mut dyn Stage; 7] {
        [
            &mut self.echo_cancellation,
            &mut self.echo_control_mobile,
            &mut self.gain_control,
            &mut self.high_pass_filter,
            &mut self.level_estimator,
            &mut self.noise_suppression,
            &mut self.voice_detection,
        ]
    }

    /// Stages in construction order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &dyn Stage> {
        StageKind::ALL.into_iter().map(move |kind| self.get(kind))
    }

    pub(crate) fn is_enabled(&self, kind: StageKind) -> bool {
        self.get(kind).is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_report_their_kind_in_order() {
        let stages = Stages::new();
        let kinds: Vec<StageKind> = stages.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, StageKind::ALL);
    }

    #[test]
    fn mutable_handles_follow_construction_order() {
        let mut stages = Stages::new();
        let kinds: Vec<StageKind> = stages.all_mut().iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, StageKind::ALL);
    }

    #[test]
    fn all_stages_start_disabled() {
        let stages = Stages::new();
        assert!(stages.iter().all(|s| !s.is_enabled()));
    }

    #[test]
    fn versions_in_construction_order() {
        let stages = Stages::new();
        let versions: Vec<&str> = stages.iter().map(|s| s.version()).collect();
        assert_eq!(
            versions,
            ["AEC 2.5.0", "AECM 1.2.0", "AGC 1.7.0", "", "", "NS 2.2.0", "VAD 1.2.0"]
        );
    }

    #[test]
    fn split_length_halves_at_32k() {
        let ctx = StreamContext {
            stream: StreamConfig::new(32_000, 1, 1, 1),
            stream_delay_ms: 0,
            was_stream_delay_set: false,
        };
        assert_eq!(ctx.samples_per_split_channel(), 160);
        assert_eq!(ctx.sample_rate_hz(), 32_000);
    }
}
