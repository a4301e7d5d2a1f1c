//! Stream configuration: sample rate and channel layout of both paths.

/// Sample rates the engine accepts.
pub const SUPPORTED_SAMPLE_RATES_HZ: [u32; 3] = [8_000, 16_000, 32_000];
/// Rate at which the signal is split into two bands.
pub const BAND_SPLIT_RATE_HZ: u32 = 32_000;
/// Maximum number of channels on either path.
pub const MAX_NUM_CHANNELS: usize = 2;

/// Error returned by [`StreamConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamConfigError {
    /// Sample rate is not one of [`SUPPORTED_SAMPLE_RATES_HZ`].
    UnsupportedSampleRate { sample_rate_hz: u32 },
    /// A channel count is outside `1..=2`.
    UnsupportedChannelCount { num_channels: usize },
    /// More capture output channels than input channels.
    MoreOutputsThanInputs { inputs: usize, outputs: usize },
}

impl std::fmt::Display for StreamConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::UnsupportedSampleRate { sample_rate_hz } => write!(
                f,
                "unsupported sample rate {sample_rate_hz}; expected one of {SUPPORTED_SAMPLE_RATES_HZ:?}",
            ),
            Self::UnsupportedChannelCount { num_channels } => write!(
                f,
                "unsupported channel count {num_channels}; expected 1..={MAX_NUM_CHANNELS}",
            ),
            Self::MoreOutputsThanInputs { inputs, outputs } => write!(
                f,
                "capture output channels ({outputs}) exceed input channels ({inputs})",
            ),
        }
    }
}

impl std::error::Error for StreamConfigError {}

/// Shape of the capture and render streams.
///
/// Every frame handed to the engine must match this configuration. Any
/// change reinitializes the engine's buffers and stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    sample_rate_hz: u32,
    capture_input_channels: usize,
    capture_output_channels: usize,
    render_channels: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(16_000, 1, 1, 1)
    }
}

impl StreamConfig {
    /// Create a new stream configuration. Validated when handed to the
    /// engine.
    pub const fn new(
        sample_rate_hz: u32,
        capture_input_channels: usize,
        capture_output_channels: usize,
        render_channels: usize,
    ) -> Self {
        Self {
            sample_rate_hz,
            capture_input_channels,
            capture_output_channels,
            render_channels,
        }
    }

    /// The sampling rate in Hz.
    #[inline]
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    #[inline]
    pub fn capture_input_channels(&self) -> usize {
        self.capture_input_channels
    }

    #[inline]
    pub fn capture_output_channels(&self) -> usize {
        self.capture_output_channels
    }

    #[inline]
    pub fn render_channels(&self) -> usize {
        self.render_channels
    }

    /// The number of samples per channel in a 10 ms frame.
    #[inline]
    pub fn samples_per_channel(&self) -> usize {
        self.sample_rate_hz as usize / 100
    }

    /// Rate the stages run at: 16 kHz when the signal is band-split,
    /// otherwise the full rate.
    #[inline]
    pub fn split_sample_rate_hz(&self) -> u32 {
        if self.is_band_split() {
            16_000
        } else {
            self.sample_rate_hz
        }
    }

    /// Whether frames are split into a low and a high band.
    #[inline]
    pub fn is_band_split(&self) -> bool {
        self.sample_rate_hz == BAND_SPLIT_RATE_HZ
    }

    pub(crate) fn set_sample_rate_hz(&mut self, rate: u32) -> Result<(), StreamConfigError> {
        check_sample_rate(rate)?;
        self.sample_rate_hz = rate;
        Ok(())
    }

    pub(crate) fn set_render_channels(&mut self, channels: usize) -> Result<(), StreamConfigError> {
        check_channels(channels)?;
        self.render_channels = channels;
        Ok(())
    }

    pub(crate) fn set_capture_channels(
        &mut self,
        inputs: usize,
        outputs: usize,
    ) -> Result<(), StreamConfigError> {
        if outputs > inputs {
            return Err(StreamConfigError::MoreOutputsThanInputs { inputs, outputs });
        }
        check_channels(inputs)?;
        check_channels(outputs)?;
        self.capture_input_channels = inputs;
        self.capture_output_channels = outputs;
        Ok(())
    }

    /// Checks every field against the supported ranges.
    pub fn validate(&self) -> Result<(), StreamConfigError> {
        check_sample_rate(self.sample_rate_hz)?;
        if self.capture_output_channels > self.capture_input_channels {
            return Err(StreamConfigError::MoreOutputsThanInputs {
                inputs: self.capture_input_channels,
                outputs: self.capture_output_channels,
            });
        }
        check_channels(self.capture_input_channels)?;
        check_channels(self.capture_output_channels)?;
        check_channels(self.render_channels)
    }
}

fn check_sample_rate(sample_rate_hz: u32) -> Result<(), StreamConfigError> {
    if SUPPORTED_SAMPLE_RATES_HZ.contains(&sample_rate_hz) {
        Ok(())
    } else {
        Err(StreamConfigError::UnsupportedSampleRate { sample_rate_hz })
    }
}

fn check_channels(num_channels: usize) -> Result<(), StreamConfigError> {
    if (1..=MAX_NUM_CHANNELS).contains(&num_channels) {
        Ok(())
    } else {
        Err(StreamConfigError::UnsupportedChannelCount { num_channels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_16k_mono() {
        let config = StreamConfig::default();
        assert_eq!(config.sample_rate_hz(), 16_000);
        assert_eq!(config.capture_input_channels(), 1);
        assert_eq!(config.capture_output_channels(), 1);
        assert_eq!(config.render_channels(), 1);
        assert_eq!(config.samples_per_channel(), 160);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn derived_values_follow_rate() {
        let mut config = StreamConfig::default();
        for (rate, spc, split) in [(8_000, 80, 8_000), (16_000, 160, 16_000), (32_000, 320, 16_000)] {
            config.set_sample_rate_hz(rate).unwrap();
            assert_eq!(config.samples_per_channel(), spc);
            assert_eq!(config.split_sample_rate_hz(), split);
            assert_eq!(config.is_band_split(), rate == 32_000);
        }
    }

    #[test]
    fn rejects_unsupported_rate_and_keeps_old_value() {
        let mut config = StreamConfig::default();
        let err = config.set_sample_rate_hz(44_100).unwrap_err();
        assert_eq!(
            err,
            StreamConfigError::UnsupportedSampleRate {
                sample_rate_hz: 44_100
            }
        );
        assert_eq!(config.sample_rate_hz(), 16_000);
    }

    #[test]
    fn rejects_bad_channel_layouts() {
        let mut config = StreamConfig::default();
        assert_eq!(
            config.set_capture_channels(1, 2),
            Err(StreamConfigError::MoreOutputsThanInputs {
                inputs: 1,
                outputs: 2
            })
        );
        assert!(config.set_capture_channels(3, 1).is_err());
        assert!(config.set_capture_channels(2, 0).is_err());
        assert!(config.set_render_channels(0).is_err());
        assert!(config.set_render_channels(3).is_err());
        assert_eq!(config, StreamConfig::default());

        config.set_capture_channels(2, 1).unwrap();
        config.set_render_channels(2).unwrap();
        assert_eq!(config, StreamConfig::new(16_000, 2, 1, 2));
    }

    #[test]
    fn validate_reports_each_field() {
        assert!(StreamConfig::new(11_025, 1, 1, 1).validate().is_err());
        assert!(StreamConfig::new(8_000, 1, 2, 1).validate().is_err());
        assert!(StreamConfig::new(8_000, 1, 1, 3).validate().is_err());
        assert!(StreamConfig::new(32_000, 2, 2, 2).validate().is_ok());
    }
}
