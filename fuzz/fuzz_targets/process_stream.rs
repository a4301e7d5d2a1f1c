#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vqe::config::{GainControl, GainControlMode, HighPassFilter, NoiseSuppression, VoiceDetection};
use vqe::{AudioFrame, AudioProcessing, Config, StreamConfig};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Sample rate index: 0=8k, 1=16k, 2=32k
    sample_rate_idx: u8,
    /// Capture input channels (clamped to 1-2)
    channels: u8,
    /// Downmix stereo capture to mono
    downmix: bool,
    /// Stream delay reported before each capture frame
    delay_ms: i32,
    /// Frames as (is_render, samples); short frames are padded with silence
    frames: Vec<(bool, Vec<i16>)>,
}

fn sample_rate(idx: u8) -> u32 {
    match idx % 3 {
        0 => 8000,
        1 => 16000,
        _ => 32000,
    }
}

fuzz_target!(|input: FuzzInput| {
    let rate = sample_rate(input.sample_rate_idx);
    let inputs = usize::from(input.channels % 2) + 1;
    let outputs = if input.downmix { 1 } else { inputs };
    let samples_per_channel = (rate / 100) as usize;

    let config = Config {
        high_pass_filter: Some(HighPassFilter),
        gain_control: Some(GainControl {
            mode: GainControlMode::AdaptiveDigital,
            ..Default::default()
        }),
        noise_suppression: Some(NoiseSuppression::default()),
        voice_detection: Some(VoiceDetection::default()),
        ..Default::default()
    };
    let Ok(apm) = AudioProcessing::builder()
        .config(config)
        .stream_config(StreamConfig::new(rate, inputs, outputs, inputs))
        .build()
    else {
        return;
    };

    for (is_render, mut samples) in input.frames {
        samples.resize(samples_per_channel * inputs, 0);
        let mut frame = AudioFrame::from_interleaved(rate, inputs, samples);
        if is_render {
            let _ = apm.analyze_reverse_stream(&frame);
        } else {
            let _ = apm.set_stream_delay_ms(input.delay_ms);
            if apm.process_capture_stream(&mut frame).is_ok() {
                assert_eq!(frame.num_channels, outputs);
                assert_eq!(frame.data.len(), samples_per_channel * outputs);
            }
        }
    }
});
