//! Minimal echo suppression demo.
//!
//! Feeds a synthetic far-end tone through the render path and a capture
//! signal containing an attenuated copy of it, then checks that the mobile
//! echo controller reduced the capture level.
//!
//! ```sh
//! cargo run -p vqe --example simple
//! ```

use vqe::config::{EchoControlMobile, HighPassFilter};
use vqe::{AudioFrame, AudioProcessing, Config, StreamConfig};

const SAMPLE_RATE_HZ: u32 = 16_000;
const DELAY_MS: i32 = 20;

fn main() {
    let config = Config {
        high_pass_filter: Some(HighPassFilter),
        echo_control_mobile: Some(EchoControlMobile {
            comfort_noise: false,
            ..Default::default()
        }),
        ..Default::default()
    };
    let apm = AudioProcessing::builder()
        .config(config)
        .stream_config(StreamConfig::new(SAMPLE_RATE_HZ, 1, 1, 1))
        .build()
        .unwrap();

    let mut input_energy = 0.0f64;
    let mut output_energy = 0.0f64;
    for n in 0..100 {
        let (render, mut capture) = sample_frames(n);
        apm.analyze_reverse_stream(&render).unwrap();
        apm.set_stream_delay_ms(DELAY_MS).unwrap();

        input_energy += energy(&capture);
        apm.process_capture_stream(&mut capture).unwrap();
        output_energy += energy(&capture);
    }

    assert!(
        output_energy < input_energy,
        "echo suppression should have reduced the capture level"
    );
    println!(
        "Processed 1 s of audio: capture energy reduced by {:.1} dB.",
        10.0 * (input_energy / output_energy).log10()
    );
}

/// Far-end frame `n` and a capture frame picking it up through the room.
fn sample_frames(n: usize) -> (AudioFrame, AudioFrame) {
    let samples_per_channel = SAMPLE_RATE_HZ as usize / 100;
    let render: Vec<i16> = (0..samples_per_channel)
        .map(|i| {
            let t = (n * samples_per_channel + i) as f32 / SAMPLE_RATE_HZ as f32;
            ((t * 440.0 * std::f32::consts::TAU).sin() * 12_000.0) as i16
        })
        .collect();
    let capture = render.iter().map(|&s| s / 4).collect();
    (
        AudioFrame::from_interleaved(SAMPLE_RATE_HZ, 1, render),
        AudioFrame::from_interleaved(SAMPLE_RATE_HZ, 1, capture),
    )
}

fn energy(frame: &AudioFrame) -> f64 {
    frame.data.iter().map(|&s| f64::from(s).powi(2)).sum()
}
