//! Engine state and the capture and render pipelines.
//!
//! [`AudioProcessingImpl`] is the unlocked engine; the public
//! [`AudioProcessing`](crate::AudioProcessing) handle wraps it in a mutex and
//! forwards every call.

use std::io::Write;

use crate::audio_buffer::AudioBuffer;
use crate::audio_frame::AudioFrame;
use crate::audio_processing::{Error, Status, Warning};
use crate::config::{Config, GainControlMode, Pipeline};
use crate::debug_trace::{FrameEvent, TraceWriter};
use crate::stage::{Stage, StageKind, Stages, StreamContext};
use crate::stats::AudioProcessingStats;
use crate::stream_config::StreamConfig;

/// Largest stream delay the echo stages accept.
pub(crate) const MAX_STREAM_DELAY_MS: i32 = 500;

const VERSION: &str = "AudioProcessing 1.0.0";

#[derive(Debug)]
pub(crate) struct AudioProcessingImpl {
    id: i32,
    stream: StreamConfig,
    pipeline: Pipeline,
    stream_delay_ms: i32,
    was_stream_delay_set: bool,
    capture_audio: AudioBuffer,
    render_audio: AudioBuffer,
    stages: Stages,
    debug_trace: Option<TraceWriter>,
}

impl AudioProcessingImpl {
    /// Builds the buffers for `stream`. Stages start disabled and are
    /// initialized when enabled or on the next [`Self::initialize`].
    pub(crate) fn new(id: i32, stream: StreamConfig) -> Self {
        Self {
            id,
            stream,
            pipeline: Pipeline::default(),
            stream_delay_ms: 0,
            was_stream_delay_set: false,
            capture_audio: AudioBuffer::new(
                stream.capture_input_channels(),
                stream.samples_per_channel(),
            ),
            render_audio: AudioBuffer::new(stream.render_channels(), stream.samples_per_channel()),
            stages: Stages::new(),
            debug_trace: None,
        }
    }

    fn context(&self) -> StreamContext {
        StreamContext {
            stream: self.stream,
            stream_delay_ms: self.stream_delay_ms,
            was_stream_delay_set: self.was_stream_delay_set,
        }
    }

    pub(crate) fn stages_mut(&mut self) -> &mut Stages {
        &mut self.stages
    }

    pub(crate) fn initialize(&mut self) -> Result<(), Error> {
        let samples_per_channel = self.stream.samples_per_channel();
        self.capture_audio =
            AudioBuffer::new(self.stream.capture_input_channels(), samples_per_channel);
        self.render_audio = AudioBuffer::new(self.stream.render_channels(), samples_per_channel);
        self.was_stream_delay_set = false;

        let ctx = self.context();
        for stage in self.stages.all_mut() {
            if let Err(err) = stage.initialize(&ctx) {
                tracing::warn!(
                    id = self.id,
                    stage = %stage.kind(),
                    %err,
                    "stage initialization failed"
                );
                return Err(err);
            }
        }
        tracing::debug!(
            id = self.id,
            sample_rate_hz = self.stream.sample_rate_hz(),
            capture_input_channels = self.stream.capture_input_channels(),
            capture_output_channels = self.stream.capture_output_channels(),
            render_channels = self.stream.render_channels(),
            "initialized"
        );
        Ok(())
    }

    pub(crate) fn stream_config(&self) -> StreamConfig {
        self.stream
    }

    pub(crate) fn set_sample_rate_hz(&mut self, rate: u32) -> Result<(), Error> {
        self.stream.set_sample_rate_hz(rate)?;
        self.initialize()
    }

    pub(crate) fn set_render_channels(&mut self, channels: usize) -> Result<(), Error> {
        self.stream.set_render_channels(channels)?;
        self.initialize()
    }

    pub(crate) fn set_capture_channels(
        &mut self,
        inputs: usize,
        outputs: usize,
    ) -> Result<(), Error> {
        self.stream.set_capture_channels(inputs, outputs)?;
        self.initialize()
    }

    pub(crate) fn set_stream_delay_ms(&mut self, delay_ms: i32) -> Result<Status, Error> {
        self.was_stream_delay_set = true;
        if delay_ms < 0 {
            return Err(Error::InvalidParameter);
        }
        if delay_ms > MAX_STREAM_DELAY_MS {
            self.stream_delay_ms = MAX_STREAM_DELAY_MS;
            return Ok(Status::Warning(Warning::BadStreamParameter));
        }
        self.stream_delay_ms = delay_ms;
        Ok(Status::Ok)
    }

    pub(crate) fn stream_delay_ms(&self) -> i32 {
        self.stream_delay_ms
    }

    pub(crate) fn was_stream_delay_set(&self) -> bool {
        self.was_stream_delay_set
    }

    /// Checks a frame against the configured stream shape.
    fn validate_frame(&self, frame: &AudioFrame, num_channels: usize) -> Result<(), Error> {
        if frame.data.is_empty() {
            return Err(Error::NullInput);
        }
        if frame.sample_rate_hz != self.stream.sample_rate_hz() {
            return Err(Error::BadSampleRate);
        }
        if frame.num_channels != num_channels {
            return Err(Error::BadChannelCount);
        }
        if frame.samples_per_channel != self.stream.samples_per_channel()
            || frame.data.len() != frame.num_samples()
        {
            return Err(Error::BadFrameLength);
        }
        Ok(())
    }

    fn record(&mut self, event: FrameEvent, frame: &AudioFrame) -> Result<(), Error> {
        let Some(trace) = &mut self.debug_trace else {
            return Ok(());
        };
        trace.write_frame(event, frame).map_err(|err| {
            tracing::warn!(id = self.id, ?event, %err, "failed to write debug record");
            Error::FileError
        })
    }

    pub(crate) fn process_capture_stream(
        &mut self,
        frame: &mut AudioFrame,
    ) -> Result<Status, Error> {
        self.validate_frame(frame, self.stream.capture_input_channels())?;
        self.record(FrameEvent::Capture, frame)?;

        let num_inputs = self.stream.capture_input_channels();
        let num_outputs = self.stream.capture_output_channels();
        let ctx = self.context();
        let audio = &mut self.capture_audio;
        let stages = &mut self.stages;

        audio.deinterleave_from(frame);

        if num_outputs < num_inputs {
            audio.mix(num_outputs, self.pipeline.capture_downmix_method);
            frame.num_channels = num_outputs;
        }

        if ctx.stream.is_band_split() {
            for ch in 0..num_inputs {
                audio.split_into_bands(ch);
            }
        }

        let mut status = Status::Ok;
        if stages.high_pass_filter.is_enabled() {
            status = status.merge(stages.high_pass_filter.process_capture_audio(&ctx, audio)?);
        }
        if stages.gain_control.is_enabled() {
            status = status.merge(stages.gain_control.analyze_capture_audio(&ctx, audio)?);
        }
        if stages.echo_cancellation.is_enabled() {
            status = status.merge(stages.echo_cancellation.process_capture_audio(&ctx, audio)?);
        }
        if stages.echo_control_mobile.is_enabled() && stages.noise_suppression.is_enabled() {
            audio.copy_low_pass_to_reference();
        }
        if stages.noise_suppression.is_enabled() {
            status = status.merge(stages.noise_suppression.process_capture_audio(&ctx, audio)?);
        }
        if stages.echo_control_mobile.is_enabled() {
            status =
                status.merge(stages.echo_control_mobile.process_capture_audio(&ctx, audio)?);
        }
        if stages.voice_detection.is_enabled() {
            status = status.merge(stages.voice_detection.process_capture_audio(&ctx, audio)?);
        }
        if stages.gain_control.is_enabled() {
            status = status.merge(stages.gain_control.process_capture_audio(&ctx, audio)?);
        }

        if ctx.stream.is_band_split() {
            for ch in 0..num_outputs {
                audio.merge_bands(ch);
            }
        }

        audio.interleave_to(frame);
        Ok(status)
    }

    pub(crate) fn analyze_reverse_stream(&mut self, frame: &AudioFrame) -> Result<Status, Error> {
        self.validate_frame(frame, self.stream.render_channels())?;
        self.record(FrameEvent::Render, frame)?;

        let ctx = self.context();
        let audio = &mut self.render_audio;
        let stages = &mut self.stages;

        audio.deinterleave_from(frame);
        if ctx.stream.is_band_split() {
            for ch in 0..ctx.stream.render_channels() {
                audio.split_into_bands(ch);
            }
        }

        let audio = &*audio;
        let mut status = Status::Ok;
        for kind in [
            StageKind::EchoCancellation,
            StageKind::EchoControlMobile,
            StageKind::GainControl,
        ] {
            let stage = stages.get_mut(kind);
            if stage.is_enabled() {
                status = status.merge(stage.process_render_audio(&ctx, audio)?);
            }
        }

        self.was_stream_delay_set = false;
        Ok(status)
    }

    pub(crate) fn is_enabled(&self, kind: StageKind) -> bool {
        self.stages.is_enabled(kind)
    }

    pub(crate) fn set_enabled(&mut self, kind: StageKind, enabled: bool) -> Result<(), Error> {
        let exclusive_with = match kind {
            StageKind::EchoCancellation => Some(StageKind::EchoControlMobile),
            StageKind::EchoControlMobile => Some(StageKind::EchoCancellation),
            _ => None,
        };
        if enabled && exclusive_with.is_some_and(|other| self.stages.is_enabled(other)) {
            tracing::warn!(id = self.id, stage = %kind, "echo stages are mutually exclusive");
            return Err(Error::InvalidParameter);
        }

        let ctx = self.context();
        let stage = self.stages.get_mut(kind);
        if stage.is_enabled() == enabled {
            return Ok(());
        }
        stage.set_enabled(enabled);
        if enabled {
            if let Err(err) = stage.initialize(&ctx) {
                stage.set_enabled(false);
                tracing::warn!(id = self.id, stage = %kind, %err, "failed to enable stage");
                return Err(err);
            }
        }
        tracing::debug!(id = self.id, stage = %kind, enabled, "stage toggled");
        Ok(())
    }

    /// Rejects stages the current stream cannot run, before anything is
    /// applied.
    fn check_stream_support(&self, config: &Config) -> Result<(), Error> {
        if config.echo_control_mobile.is_some() && self.stream.is_band_split() {
            return Err(Error::BadSampleRate);
        }
        Ok(())
    }

    pub(crate) fn apply_config(&mut self, config: Config) -> Result<(), Error> {
        if let Err(err) = config.validate().and_then(|()| self.check_stream_support(&config)) {
            tracing::warn!(id = self.id, %err, "rejected configuration");
            return Err(err);
        }
        let Config {
            pipeline,
            high_pass_filter,
            echo_cancellation,
            echo_control_mobile,
            gain_control,
            noise_suppression,
            voice_detection,
            level_estimation,
        } = config;
        let stages = &mut self.stages;

        if let Some(ec) = &echo_cancellation {
            stages
                .echo_cancellation
                .set_suppression_level(ec.suppression_level);
        }
        if let Some(ecm) = &echo_control_mobile {
            stages.echo_control_mobile.set_routing_mode(ecm.routing_mode);
            stages
                .echo_control_mobile
                .enable_comfort_noise(ecm.comfort_noise);
        }
        if let Some(gc) = &gain_control {
            let agc = &mut stages.gain_control;
            agc.set_mode(gc.mode);
            agc.set_target_level_dbfs(gc.target_level_dbfs)?;
            agc.set_compression_gain_db(gc.compression_gain_db)?;
            agc.enable_limiter(gc.enable_limiter);
            agc.set_analog_level_limits(gc.analog_level_minimum, gc.analog_level_maximum)?;
        }
        if let Some(ns) = &noise_suppression {
            stages.noise_suppression.set_level(ns.level);
        }
        if let Some(vd) = &voice_detection {
            stages.voice_detection.set_likelihood(vd.likelihood);
            stages.voice_detection.set_frame_size_ms(vd.frame_size_ms)?;
        }

        for (kind, enabled) in [
            (StageKind::EchoCancellation, echo_cancellation.is_some()),
            (StageKind::EchoControlMobile, echo_control_mobile.is_some()),
            (StageKind::GainControl, gain_control.is_some()),
            (StageKind::HighPassFilter, high_pass_filter.is_some()),
            (StageKind::LevelEstimator, level_estimation.is_some()),
            (StageKind::NoiseSuppression, noise_suppression.is_some()),
            (StageKind::VoiceDetection, voice_detection.is_some()),
        ] {
            stages.get_mut(kind).set_enabled(enabled);
        }
        self.pipeline = pipeline;
        self.initialize()
    }

    pub(crate) fn statistics(&self) -> AudioProcessingStats {
        let stages = &self.stages;
        let ec = stages.echo_cancellation.is_enabled();
        let ecm = stages.echo_control_mobile.is_enabled();
        let gc = stages.gain_control.is_enabled();
        AudioProcessingStats {
            echo_return_loss: ec
                .then(|| stages.echo_cancellation.echo_return_loss())
                .flatten(),
            delay_ms: if ec {
                stages.echo_cancellation.delay_ms()
            } else {
                ecm.then_some(self.stream_delay_ms)
            },
            voice_detected: stages
                .voice_detection
                .is_enabled()
                .then(|| stages.voice_detection.stream_has_voice()),
            stream_is_saturated: gc.then(|| stages.gain_control.stream_is_saturated()),
            recommended_analog_level: (gc
                && stages.gain_control.mode() == GainControlMode::AdaptiveAnalog)
                .then(|| stages.gain_control.stream_analog_level()),
        }
    }

    pub(crate) fn start_debug_recording(
        &mut self,
        sink: Box<dyn Write + Send>,
    ) -> Result<(), Error> {
        let trace = TraceWriter::new(sink, self.stream.sample_rate_hz()).map_err(|err| {
            tracing::warn!(id = self.id, %err, "failed to start debug recording");
            Error::FileError
        })?;
        self.debug_trace = Some(trace);
        tracing::info!(id = self.id, "debug recording started");
        Ok(())
    }

    pub(crate) fn stop_debug_recording(&mut self) -> Result<(), Error> {
        let Some(trace) = self.debug_trace.take() else {
            return Ok(());
        };
        let records = trace.records_written();
        trace.finish().map_err(|err| {
            tracing::warn!(id = self.id, %err, "failed to close debug recording");
            Error::FileError
        })?;
        tracing::info!(id = self.id, records, "debug recording stopped");
        Ok(())
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.debug_trace.is_some()
    }

    /// Non-empty stage versions in construction order.
    fn stage_versions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages
            .iter()
            .map(|stage| stage.version())
            .filter(|version| !version.is_empty())
    }

    pub(crate) fn version(&self, dest: &mut [u8]) -> Result<usize, Error> {
        dest.fill(0);
        let mut position = 0;
        let mut append = |chunk: &[&str]| {
            let length: usize = chunk.iter().map(|part| part.len()).sum();
            if dest.len() - position < length {
                return Err(Error::InvalidParameter);
            }
            for part in chunk {
                dest[position..position + part.len()].copy_from_slice(part.as_bytes());
                position += part.len();
            }
            Ok(())
        };

        append(&[VERSION])?;
        for version in self.stage_versions() {
            append(&["\n", version])?;
        }
        Ok(position)
    }

    pub(crate) fn version_string(&self) -> String {
        let mut report = String::from(VERSION);
        for version in self.stage_versions() {
            report.push('\n');
            report.push_str(version);
        }
        report
    }

    pub(crate) fn change_unique_id(&mut self, id: i32) {
        tracing::debug!(old = self.id, new = id, "changed unique id");
        self.id = id;
    }

    pub(crate) fn id(&self) -> i32 {
        self.id
    }
}
