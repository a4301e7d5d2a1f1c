//! Engine configuration.
//!
//! A [`Config`] enables stages and sets their parameters in one go. It can
//! be handed to [`AudioProcessingBuilder::config`](crate::AudioProcessingBuilder::config)
//! or applied later with [`AudioProcessing::apply_config`](crate::AudioProcessing::apply_config).
//! Individual parameters can also be changed through the typed stage
//! accessors on [`AudioProcessing`](crate::AudioProcessing).

use crate::audio_processing::Error;

pub(crate) const MAX_TARGET_LEVEL_DBFS: u8 = 31;
pub(crate) const MAX_COMPRESSION_GAIN_DB: u8 = 90;

/// Top-level configuration for the enhancement pipeline.
///
/// All stages are disabled (`None`) by default. Setting a stage to
/// `Some(...)` enables it and initializes it against the current stream
/// configuration.
///
/// # Example
///
/// ```
/// use vqe::Config;
/// use vqe::config::{GainControl, GainControlMode, NoiseSuppression, NoiseSuppressionLevel};
///
/// let config = Config {
///     noise_suppression: Some(NoiseSuppression {
///         level: NoiseSuppressionLevel::High,
///     }),
///     gain_control: Some(GainControl {
///         mode: GainControlMode::FixedDigital,
///         ..Default::default()
///     }),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Pipeline processing properties.
    pub pipeline: Pipeline,
    /// High-pass filter. Set to `Some(...)` to enable.
    pub high_pass_filter: Option<HighPassFilter>,
    /// Full echo canceller. Mutually exclusive with
    /// [`echo_control_mobile`](Self::echo_control_mobile).
    pub echo_cancellation: Option<EchoCancellation>,
    /// Low-complexity echo suppressor for mobile devices. Not available at
    /// 32 kHz.
    pub echo_control_mobile: Option<EchoControlMobile>,
    /// Automatic gain control. Set to `Some(...)` to enable.
    pub gain_control: Option<GainControl>,
    /// Noise suppression. Set to `Some(...)` to enable.
    pub noise_suppression: Option<NoiseSuppression>,
    /// Voice activity detection. Set to `Some(...)` to enable.
    pub voice_detection: Option<VoiceDetection>,
    /// Level estimation. Not supported; `Some(...)` is rejected.
    pub level_estimation: Option<LevelEstimation>,
}

impl Config {
    /// Checks parameter ranges and stage combinations without touching an
    /// engine.
    ///
    /// Fails with [`Error::InvalidParameter`] when both echo stages are
    /// requested or a parameter is out of range, and with
    /// [`Error::UnsupportedComponent`] when level estimation is requested.
    pub fn validate(&self) -> Result<(), Error> {
        if self.echo_cancellation.is_some() && self.echo_control_mobile.is_some() {
            return Err(Error::InvalidParameter);
        }
        if self.level_estimation.is_some() {
            return Err(Error::UnsupportedComponent);
        }
        if let Some(gc) = &self.gain_control {
            if gc.target_level_dbfs > MAX_TARGET_LEVEL_DBFS
                || gc.compression_gain_db > MAX_COMPRESSION_GAIN_DB
                || gc.analog_level_minimum >= gc.analog_level_maximum
            {
                return Err(Error::InvalidParameter);
            }
        }
        if let Some(vd) = &self.voice_detection {
            if !matches!(vd.frame_size_ms, 10 | 20 | 30) {
                return Err(Error::InvalidParameter);
            }
        }
        Ok(())
    }
}

/// Pipeline processing properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    /// How to reduce the capture channel count when the stream has fewer
    /// output than input channels.
    pub capture_downmix_method: DownmixMethod,
}

/// Ways to downmix stereo capture audio to mono.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DownmixMethod {
    /// Average the two channels.
    #[default]
    AverageChannels,
    /// Keep the first channel.
    UseFirstChannel,
}

/// High-pass filter settings. The filter has no parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighPassFilter;

/// Echo canceller settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoCancellation {
    /// Aggressiveness of the residual echo suppression (default: `Moderate`).
    pub suppression_level: EchoSuppressionLevel,
}

/// Echo canceller aggressiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EchoSuppressionLevel {
    Low,
    #[default]
    Moderate,
    High,
}

/// Mobile echo controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoControlMobile {
    /// Acoustic path between loudspeaker and microphone (default:
    /// `Speakerphone`).
    pub routing_mode: RoutingMode,
    /// Fill suppressed segments with low-level noise (default: true).
    pub comfort_noise: bool,
}

impl Default for EchoControlMobile {
    fn default() -> Self {
        Self {
            routing_mode: RoutingMode::Speakerphone,
            comfort_noise: true,
        }
    }
}

/// Loudspeaker routing, from quietest to loudest echo path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingMode {
    QuietEarpieceOrHeadset,
    Earpiece,
    LoudEarpiece,
    #[default]
    Speakerphone,
    LoudSpeakerphone,
}

/// Automatic gain control settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GainControl {
    /// Operating mode (default: `AdaptiveAnalog`).
    pub mode: GainControlMode,
    /// Target peak level in -dBFS, `0..=31` (default: 3, i.e. -3 dBFS).
    pub target_level_dbfs: u8,
    /// Maximum digital gain in dB, `0..=90` (default: 9).
    pub compression_gain_db: u8,
    /// Hard limiter at the target level (default: true).
    pub enable_limiter: bool,
    /// Lower bound of the analog volume range (default: 0).
    pub analog_level_minimum: u16,
    /// Upper bound of the analog volume range (default: 255).
    pub analog_level_maximum: u16,
}

impl Default for GainControl {
    fn default() -> Self {
        Self {
            mode: GainControlMode::AdaptiveAnalog,
            target_level_dbfs: 3,
            compression_gain_db: 9,
            enable_limiter: true,
            analog_level_minimum: 0,
            analog_level_maximum: 255,
        }
    }
}

/// Gain control operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GainControlMode {
    /// Recommends an analog volume from the level reported each frame.
    #[default]
    AdaptiveAnalog,
    /// Adapts a digital gain towards the target level.
    AdaptiveDigital,
    /// Applies the compression gain as a fixed digital gain.
    FixedDigital,
}

/// Noise suppression settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoiseSuppression {
    /// Aggressiveness level (default: `Moderate`).
    pub level: NoiseSuppressionLevel,
}

/// Noise suppression aggressiveness level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoiseSuppressionLevel {
    /// Low suppression (6 dB).
    Low,
    /// Moderate suppression (12 dB, default).
    #[default]
    Moderate,
    /// High suppression (18 dB).
    High,
    /// Very high suppression (21 dB).
    VeryHigh,
}

impl NoiseSuppressionLevel {
    /// Maximum attenuation applied to noise-only frames.
    pub(crate) fn max_attenuation_db(self) -> f32 {
        match self {
            Self::Low => 6.0,
            Self::Moderate => 12.0,
            Self::High => 18.0,
            Self::VeryHigh => 21.0,
        }
    }
}

/// Voice activity detection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDetection {
    /// How readily a frame is classified as speech (default: `Low`).
    pub likelihood: Likelihood,
    /// Decision interval in ms: 10, 20 or 30 (default: 10).
    pub frame_size_ms: u32,
}

impl Default for VoiceDetection {
    fn default() -> Self {
        Self {
            likelihood: Likelihood::Low,
            frame_size_ms: 10,
        }
    }
}

/// Likelihood that a frame is speech before it is reported as such. Lower
/// likelihood means more frames are reported as speech.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Likelihood {
    VeryLow,
    #[default]
    Low,
    Moderate,
    High,
}

/// Level estimation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelEstimation;
