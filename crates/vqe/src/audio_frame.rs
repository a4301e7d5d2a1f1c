//! Caller-owned 10 ms frame of interleaved 16-bit PCM.

/// Voice activity decision attached to a processed capture frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VadActivity {
    /// Speech was detected in the frame.
    Active,
    /// No speech was detected in the frame.
    Passive,
    /// No decision was made (voice detection disabled or not yet run).
    #[default]
    Unknown,
}

/// A packet of interleaved samples tagged with its shape.
///
/// `data` holds `samples_per_channel * num_channels` samples laid out as
/// `[ch0[0], ch1[0], ch0[1], ch1[1], ...]`. The engine overwrites `data`,
/// `num_channels` and `vad_activity` while processing a capture frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub sample_rate_hz: u32,
    pub num_channels: usize,
    pub samples_per_channel: usize,
    pub data: Vec<i16>,
    pub vad_activity: VadActivity,
}

impl AudioFrame {
    /// A silent 10 ms frame.
    pub fn new(sample_rate_hz: u32, num_channels: usize) -> Self {
        let samples_per_channel = sample_rate_hz as usize / 100;
        Self {
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            data: vec![0; samples_per_channel * num_channels],
            vad_activity: VadActivity::Unknown,
        }
    }

    /// Wraps already-interleaved samples. `samples_per_channel` is derived
    /// from the data length.
    pub fn from_interleaved(sample_rate_hz: u32, num_channels: usize, data: Vec<i16>) -> Self {
        let samples_per_channel = data.len().checked_div(num_channels).unwrap_or(0);
        Self {
            sample_rate_hz,
            num_channels,
            samples_per_channel,
            data,
            vad_activity: VadActivity::Unknown,
        }
    }

    /// Total number of samples across all channels.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples_per_channel * self.num_channels
    }

    /// Iterates over the samples of one channel.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = i16> + '_ {
        self.data
            .iter()
            .skip(channel)
            .step_by(self.num_channels.max(1))
            .copied()
    }
}
