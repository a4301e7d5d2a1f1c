//! Per-stream working storage shared by the stages.
//!
//! Holds the deinterleaved channels of the current frame, the low and high
//! bands when the stream is band-split, the filter bank state that persists
//! across frames, and scratch data derived from the low band.

use vqe_common_audio::splitting_filter::{QmfState, analysis_qmf, synthesis_qmf};

use crate::audio_frame::{AudioFrame, VadActivity};
use crate::config::DownmixMethod;
use crate::stream_config::BAND_SPLIT_RATE_HZ;

/// Full-band length at which the buffer splits into two bands.
const SPLIT_FRAME_LENGTH: usize = BAND_SPLIT_RATE_HZ as usize / 100;

/// Two-band storage and filter bank state for every channel.
#[derive(Debug)]
struct SplitBands {
    low: Vec<Vec<i16>>,
    high: Vec<Vec<i16>>,
    analysis_state1: Vec<QmfState>,
    analysis_state2: Vec<QmfState>,
    synthesis_state1: Vec<QmfState>,
    synthesis_state2: Vec<QmfState>,
}

impl SplitBands {
    fn new(num_channels: usize, band_length: usize) -> Self {
        Self {
            low: vec![vec![0; band_length]; num_channels],
            high: vec![vec![0; band_length]; num_channels],
            analysis_state1: vec![QmfState::default(); num_channels],
            analysis_state2: vec![QmfState::default(); num_channels],
            synthesis_state1: vec![QmfState::default(); num_channels],
            synthesis_state2: vec![QmfState::default(); num_channels],
        }
    }
}

#[derive(Debug)]
pub(crate) struct AudioBuffer {
    max_num_channels: usize,
    num_channels: usize,
    samples_per_channel: usize,
    channels: Vec<Vec<i16>>,
    split: Option<SplitBands>,
    mixed_low_pass: Vec<i16>,
    low_pass_reference: Vec<Vec<i16>>,
    reference_copied: bool,
    activity: VadActivity,
}

impl AudioBuffer {
    pub(crate) fn new(max_num_channels: usize, samples_per_channel: usize) -> Self {
        let split = (samples_per_channel == SPLIT_FRAME_LENGTH)
            .then(|| SplitBands::new(max_num_channels, samples_per_channel / 2));
        let band_length = if split.is_some() {
            samples_per_channel / 2
        } else {
            samples_per_channel
        };
        Self {
            max_num_channels,
            num_channels: max_num_channels,
            samples_per_channel,
            channels: vec![vec![0; samples_per_channel]; max_num_channels],
            split,
            mixed_low_pass: vec![0; band_length],
            low_pass_reference: vec![vec![0; band_length]; max_num_channels],
            reference_copied: false,
            activity: VadActivity::Unknown,
        }
    }

    /// Channels currently carrying signal. Drops after [`Self::mix`].
    #[inline]
    pub(crate) fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    /// Length of the band the stages operate on.
    #[inline]
    pub(crate) fn samples_per_split_channel(&self) -> usize {
        if self.split.is_some() {
            self.samples_per_channel / 2
        } else {
            self.samples_per_channel
        }
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn is_band_split(&self) -> bool {
        self.split.is_some()
    }

    #[cfg(test)]
    pub(crate) fn data(&self, channel: usize) -> &[i16] {
        &self.channels[channel]
    }

    /// The low band, or the full band when the buffer is not split.
    pub(crate) fn low_pass_split_data(&self, channel: usize) -> &[i16] {
        match &self.split {
            Some(split) => &split.low[channel],
            None => &self.channels[channel],
        }
    }

    pub(crate) fn low_pass_split_data_mut(&mut self, channel: usize) -> &mut [i16] {
        match &mut self.split {
            Some(split) => &mut split.low[channel],
            None => &mut self.channels[channel],
        }
    }

    /// The high band; `None` when the buffer is not split.
    #[cfg(test)]
    pub(crate) fn high_pass_split_data(&self, channel: usize) -> Option<&[i16]> {
        self.split.as_ref().map(|split| split.high[channel].as_slice())
    }

    pub(crate) fn high_pass_split_data_mut(&mut self, channel: usize) -> Option<&mut [i16]> {
        self.split
            .as_mut()
            .map(|split| split.high[channel].as_mut_slice())
    }

    /// Copy of the low band taken before noise suppression; `None` unless
    /// [`Self::copy_low_pass_to_reference`] ran on this frame.
    pub(crate) fn low_pass_reference(&self, channel: usize) -> Option<&[i16]> {
        self.reference_copied
            .then(|| self.low_pass_reference[channel].as_slice())
    }

    /// Mono mix of the low band produced by [`Self::copy_and_mix_low_pass`].
    pub(crate) fn mixed_low_pass_data(&self) -> &[i16] {
        &self.mixed_low_pass
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn activity(&self) -> VadActivity {
        self.activity
    }

    #[inline]
    pub(crate) fn set_activity(&mut self, activity: VadActivity) {
        self.activity = activity;
    }

    /// Loads an interleaved frame. The frame shape must already have been
    /// validated against the buffer.
    pub(crate) fn deinterleave_from(&mut self, frame: &AudioFrame) {
        assert!(frame.num_channels <= self.max_num_channels);
        assert_eq!(frame.samples_per_channel, self.samples_per_channel);
        let num_channels = frame.num_channels;
        self.num_channels = num_channels;
        self.reference_copied = false;
        self.activity = VadActivity::Unknown;

        if num_channels == 1 {
            self.channels[0].copy_from_slice(&frame.data[..self.samples_per_channel]);
            return;
        }
        for (ch, channel) in self.channels[..num_channels].iter_mut().enumerate() {
            for (i, sample) in channel.iter_mut().enumerate() {
                *sample = frame.data[i * frame.num_channels + ch];
            }
        }
    }

    /// Writes the current channels back into `frame.data`, resizing it to
    /// the current channel count, and copies the voice activity decision.
    pub(crate) fn interleave_to(&self, frame: &mut AudioFrame) {
        let num_channels = self.num_channels;
        frame.data.resize(self.samples_per_channel * num_channels, 0);
        frame.vad_activity = self.activity;

        if num_channels == 1 {
            frame.data.copy_from_slice(&self.channels[0]);
            return;
        }
        for (ch, channel) in self.channels[..num_channels].iter().enumerate() {
            for (i, &sample) in channel.iter().enumerate() {
                frame.data[i * num_channels + ch] = sample;
            }
        }
    }

    /// Reduces the full-band channels to `num_output_channels`. Only
    /// stereo to mono is supported.
    pub(crate) fn mix(&mut self, num_output_channels: usize, method: DownmixMethod) {
        assert_eq!(self.num_channels, 2, "only stereo input can be mixed");
        assert_eq!(num_output_channels, 1, "only mixing to mono is supported");

        if method == DownmixMethod::AverageChannels {
            let (left, right) = self.channels.split_at_mut(1);
            for (l, &r) in left[0].iter_mut().zip(right[0].iter()) {
                *l = ((i32::from(*l) + i32::from(r)) >> 1) as i16;
            }
        }
        self.num_channels = num_output_channels;
    }

    /// Averages the low band of all current channels into the mixed
    /// scratch buffer.
    pub(crate) fn copy_and_mix_low_pass(&mut self) {
        let num_channels = self.num_channels;
        let band_length = self.samples_per_split_channel();
        let mut mixed = std::mem::take(&mut self.mixed_low_pass);
        mixed.resize(band_length, 0);
        if num_channels == 1 {
            mixed.copy_from_slice(self.low_pass_split_data(0));
        } else {
            for (i, out) in mixed.iter_mut().enumerate() {
                let sum: i32 = (0..num_channels)
                    .map(|ch| i32::from(self.low_pass_split_data(ch)[i]))
                    .sum();
                *out = (sum / num_channels as i32) as i16;
            }
        }
        self.mixed_low_pass = mixed;
    }

    /// Snapshots the low band of every current channel.
    pub(crate) fn copy_low_pass_to_reference(&mut self) {
        for ch in 0..self.num_channels {
            let low = match &self.split {
                Some(split) => &split.low[ch],
                None => &self.channels[ch],
            };
            self.low_pass_reference[ch].copy_from_slice(low);
        }
        self.reference_copied = true;
    }

    /// Runs band analysis on one full-band channel. No-op when the buffer
    /// is not split.
    pub(crate) fn split_into_bands(&mut self, channel: usize) {
        if let Some(split) = &mut self.split {
            analysis_qmf(
                &self.channels[channel],
                &mut split.low[channel],
                &mut split.high[channel],
                &mut split.analysis_state1[channel],
                &mut split.analysis_state2[channel],
            );
        }
    }

    /// Recombines the two bands of one channel into its full-band data.
    /// No-op when the buffer is not split.
    pub(crate) fn merge_bands(&mut self, channel: usize) {
        if let Some(split) = &mut self.split {
            synthesis_qmf(
                &split.low[channel],
                &split.high[channel],
                &mut self.channels[channel],
                &mut split.synthesis_state1[channel],
                &mut split.synthesis_state2[channel],
            );
        }
    }
}
