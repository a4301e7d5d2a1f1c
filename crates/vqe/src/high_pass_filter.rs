//! Second-order high-pass filter on the capture low band.
//!
//! Removes DC and low-frequency rumble before the rest of the pipeline sees
//! the signal. The coefficients are Q12 fixed-point designs for 8 kHz and
//! 16 kHz evaluated in floating point.

use vqe_common_audio::biquad_filter::{BiQuadCoefficients, BiQuadFilter};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing::{Error, Status};
use crate::stage::{Stage, StageKind, StreamContext};

const Q12: f32 = 4096.0;

const COEFFICIENTS_8KHZ: BiQuadCoefficients = BiQuadCoefficients {
    b: [3798.0 / Q12, -7596.0 / Q12, 3798.0 / Q12],
    a: [-7807.0 / Q12, 3733.0 / Q12],
};

const COEFFICIENTS_16KHZ: BiQuadCoefficients = BiQuadCoefficients {
    b: [4012.0 / Q12, -8024.0 / Q12, 4012.0 / Q12],
    a: [-8002.0 / Q12, 3913.0 / Q12],
};

fn coefficients_for(ctx: &StreamContext) -> BiQuadCoefficients {
    if ctx.split_sample_rate_hz() == 8_000 {
        COEFFICIENTS_8KHZ
    } else {
        COEFFICIENTS_16KHZ
    }
}

/// High-pass filter stage. Has no parameters.
#[derive(Debug)]
pub struct HighPassFilter {
    enabled: bool,
    filters: Vec<BiQuadFilter>,
}

impl HighPassFilter {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            filters: Vec::new(),
        }
    }
}

impl Stage for HighPassFilter {
    fn kind(&self) -> StageKind {
        StageKind::HighPassFilter
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, ctx: &StreamContext) -> Result<(), Error> {
        self.filters = vec![
            BiQuadFilter::new(coefficients_for(ctx));
            ctx.stream.capture_input_channels()
        ];
        Ok(())
    }

    fn process_capture_audio(
        &mut self,
        ctx: &StreamContext,
        audio: &mut AudioBuffer,
    ) -> Result<Status, Error> {
        // An aborted reinitialization can leave fewer filters than channels.
        if self.filters.len() < audio.num_channels() {
            self.filters
                .resize(audio.num_channels(), BiQuadFilter::new(coefficients_for(ctx)));
        }
        for (ch, filter) in self.filters.iter_mut().enumerate().take(audio.num_channels()) {
            filter.process_s16(audio.low_pass_split_data_mut(ch));
        }
        Ok(Status::Ok)
    }

    fn version(&self) -> &'static str {
        ""
    }
}
