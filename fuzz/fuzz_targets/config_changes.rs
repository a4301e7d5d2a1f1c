#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vqe::config::{
    EchoCancellation, EchoControlMobile, GainControl, GainControlMode, HighPassFilter,
    NoiseSuppression, NoiseSuppressionLevel, VoiceDetection,
};
use vqe::{AudioFrame, AudioProcessing, Config, StageKind};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    steps: Vec<FuzzStep>,
    /// Audio samples to process between config changes
    samples: Vec<i16>,
}

#[derive(Debug, Arbitrary)]
enum FuzzStep {
    Apply(FuzzConfig),
    Toggle { stage: u8, enabled: bool },
    SampleRate(u8),
    CaptureChannels(u8, u8),
    Delay(i32),
    AnalogLevel(u16),
}

#[derive(Debug, Arbitrary)]
struct FuzzConfig {
    hpf_enabled: bool,
    ec_enabled: bool,
    ecm_enabled: bool,
    agc_enabled: bool,
    agc_mode: u8,
    agc_target: u8,
    agc_compression: u8,
    ns_enabled: bool,
    ns_level: u8,
    vad_enabled: bool,
    vad_frame_size: u32,
}

fn ns_level(idx: u8) -> NoiseSuppressionLevel {
    match idx % 4 {
        0 => NoiseSuppressionLevel::Low,
        1 => NoiseSuppressionLevel::Moderate,
        2 => NoiseSuppressionLevel::High,
        _ => NoiseSuppressionLevel::VeryHigh,
    }
}

fn agc_mode(idx: u8) -> GainControlMode {
    match idx % 3 {
        0 => GainControlMode::AdaptiveAnalog,
        1 => GainControlMode::AdaptiveDigital,
        _ => GainControlMode::FixedDigital,
    }
}

fn to_config(cfg: &FuzzConfig) -> Config {
    Config {
        high_pass_filter: cfg.hpf_enabled.then_some(HighPassFilter),
        echo_cancellation: cfg.ec_enabled.then(EchoCancellation::default),
        echo_control_mobile: cfg.ecm_enabled.then(EchoControlMobile::default),
        gain_control: cfg.agc_enabled.then(|| GainControl {
            mode: agc_mode(cfg.agc_mode),
            target_level_dbfs: cfg.agc_target,
            compression_gain_db: cfg.agc_compression,
            ..Default::default()
        }),
        noise_suppression: cfg.ns_enabled.then(|| NoiseSuppression {
            level: ns_level(cfg.ns_level),
        }),
        voice_detection: cfg.vad_enabled.then(|| VoiceDetection {
            frame_size_ms: cfg.vad_frame_size,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fuzz_target!(|input: FuzzInput| {
    if input.steps.is_empty() {
        return;
    }

    let apm = AudioProcessing::create(0);
    for step in &input.steps {
        match step {
            FuzzStep::Apply(cfg) => {
                let _ = apm.apply_config(to_config(cfg));
            }
            FuzzStep::Toggle { stage, enabled } => {
                let kind = StageKind::ALL[usize::from(*stage) % StageKind::ALL.len()];
                let _ = apm.set_enabled(kind, *enabled);
            }
            FuzzStep::SampleRate(rate) => {
                let _ = apm.set_sample_rate_hz(u32::from(*rate) * 1000);
            }
            FuzzStep::CaptureChannels(inputs, outputs) => {
                let _ = apm.set_capture_channels(usize::from(*inputs), usize::from(*outputs));
            }
            FuzzStep::Delay(delay) => {
                let _ = apm.set_stream_delay_ms(*delay);
            }
            FuzzStep::AnalogLevel(level) => {
                let _ = apm.gain_control().set_stream_analog_level(*level);
            }
        }

        let stream = apm.stream_config();
        let samples_per_channel = stream.samples_per_channel();
        let render_len = samples_per_channel * stream.render_channels();
        let capture_len = samples_per_channel * stream.capture_input_channels();

        let mut render = input.samples.clone();
        render.resize(render_len, 0);
        let _ = apm.analyze_reverse_stream(&AudioFrame::from_interleaved(
            stream.sample_rate_hz(),
            stream.render_channels(),
            render,
        ));

        let mut capture = input.samples.clone();
        capture.resize(capture_len, 0);
        let mut frame = AudioFrame::from_interleaved(
            stream.sample_rate_hz(),
            stream.capture_input_channels(),
            capture,
        );
        let _ = apm.process_capture_stream(&mut frame);
    }
});
