//! Half-duplex echo suppressor for handsets.
//!
//! Cheaper than [`EchoCanceller`](crate::EchoCanceller): while the
//! delay-aligned far end is active and louder than the near end, the capture
//! low band is attenuated by an amount that depends on the acoustic routing.
//! Runs at 8 and 16 kHz only.

use vqe_common_audio::audio_util::{db_to_ratio, mean_square, saturate_i16};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing::{Error, Status, Warning};
use crate::config::RoutingMode;
use crate::echo_cancellation::{FAR_END_ACTIVE_POWER, FarEndBuffer};
use crate::stage::{Stage, StageKind, StreamContext};

/// Peak amplitude of the comfort noise.
const COMFORT_NOISE_AMPLITUDE: i32 = 16;

/// Mobile echo controller stage.
#[derive(Debug)]
pub struct MobileEchoController {
    enabled: bool,
    routing_mode: RoutingMode,
    comfort_noise: bool,
    far_end: FarEndBuffer,
    noise_seed: u32,
    suppressing: bool,
}

impl MobileEchoController {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            routing_mode: RoutingMode::Speakerphone,
            comfort_noise: true,
            far_end: FarEndBuffer::default(),
            noise_seed: 1,
            suppressing: false,
        }
    }

    pub fn set_routing_mode(&mut self, mode: RoutingMode) {
        self.routing_mode = mode;
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.routing_mode
    }

    pub fn enable_comfort_noise(&mut self, enable: bool) {
        self.comfort_noise = enable;
    }

    pub fn is_comfort_noise_enabled(&self) -> bool {
        self.comfort_noise
    }

    /// Whether the last capture frame was attenuated.
    pub fn is_suppressing(&self) -> bool {
        self.suppressing
    }

    fn attenuation_db(&self) -> f32 {
        match self.routing_mode {
            RoutingMode::QuietEarpieceOrHeadset => 3.0,
            RoutingMode::Earpiece => 6.0,
            RoutingMode::LoudEarpiece => 9.0,
            RoutingMode::Speakerphone => 12.0,
            RoutingMode::LoudSpeakerphone => 15.0,
        }
    }

    /// Linear congruential noise in `-COMFORT_NOISE_AMPLITUDE..=COMFORT_NOISE_AMPLITUDE`.
    fn next_noise(&mut self) -> i32 {
        self.noise_seed = self.noise_seed.wrapping_mul(69_069).wrapping_add(1);
        let span = (2 * COMFORT_NOISE_AMPLITUDE + 1) as u32;
        ((self.noise_seed >> 16) % span) as i32 - COMFORT_NOISE_AMPLITUDE
    }
}

impl Stage for MobileEchoController {
    fn kind(&self) -> StageKind {
        StageKind::EchoControlMobile
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, ctx: &StreamContext) -> Result<(), Error> {
        self.far_end.clear();
        self.noise_seed = 1;
        self.suppressing = false;
        if self.enabled && ctx.stream.is_band_split() {
            return Err(Error::BadSampleRate);
        }
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
        let Some(far) = self.far_end.aligned(ctx.stream_delay_ms) else {
            self.suppressing = false;
            return Ok(Status::Warning(Warning::BadStreamParameter));
        };
        let far_power = mean_square(far);
        let gain = db_to_ratio(-self.attenuation_db());

        self.suppressing = false;
        for ch in 0..audio.num_channels() {
            // The pre-noise-suppression copy is a better echo estimate.
            let near_power = match audio.low_pass_reference(ch) {
                Some(reference) => mean_square(reference),
                None => mean_square(audio.low_pass_split_data(ch)),
            };
            if far_power <= FAR_END_ACTIVE_POWER || near_power > far_power {
                continue;
            }
            self.suppressing = true;
            let comfort_noise = self.comfort_noise;
            for i in 0..audio.samples_per_split_channel() {
                let noise = if comfort_noise { self.next_noise() } else { 0 };
                let sample = &mut audio.low_pass_split_data_mut(ch)[i];
                let attenuated = (f32::from(*sample) * gain).round() as i32;
                *sample = saturate_i16(attenuated + noise);
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
        "AECM 1.2.0"
    }
}
