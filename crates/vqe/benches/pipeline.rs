//! Benchmarks for the vqe capture and render pipelines and the QMF filter bank.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vqe::config::{
    EchoControlMobile, GainControl, GainControlMode, HighPassFilter, NoiseSuppression,
    VoiceDetection,
};
use vqe::{AudioFrame, AudioProcessing, Config, StreamConfig};
use vqe_common_audio::splitting_filter::{QmfState, analysis_qmf, synthesis_qmf};

// ---------------------------------------------------------------------------
// Full pipeline benchmarks
// ---------------------------------------------------------------------------

fn tone(sample_rate_hz: u32, num_channels: usize) -> AudioFrame {
    let samples_per_channel = sample_rate_hz as usize / 100;
    let data = (0..samples_per_channel)
        .flat_map(|i| {
            let s = ((i as f32 * 0.07).sin() * 8000.0) as i16;
            std::iter::repeat_n(s, num_channels)
        })
        .collect();
    AudioFrame::from_interleaved(sample_rate_hz, num_channels, data)
}

fn make_apm(sample_rate_hz: u32, num_channels: usize) -> AudioProcessing {
    // The mobile echo controller is not available at 32 kHz.
    let echo_control_mobile = (sample_rate_hz != 32_000).then(EchoControlMobile::default);
    let config = Config {
        high_pass_filter: Some(HighPassFilter),
        echo_control_mobile,
        gain_control: Some(GainControl {
            mode: GainControlMode::AdaptiveDigital,
            ..Default::default()
        }),
        noise_suppression: Some(NoiseSuppression::default()),
        voice_detection: Some(VoiceDetection::default()),
        ..Default::default()
    };
    let apm = AudioProcessing::builder()
        .config(config)
        .stream_config(StreamConfig::new(
            sample_rate_hz,
            num_channels,
            num_channels,
            num_channels,
        ))
        .build()
        .unwrap();

    // Warm up so the far-end history is full.
    let render = tone(sample_rate_hz, num_channels);
    let mut capture = tone(sample_rate_hz, num_channels);
    for _ in 0..60 {
        apm.analyze_reverse_stream(&render).unwrap();
        apm.set_stream_delay_ms(40).unwrap();
        let _ = apm.process_capture_stream(&mut capture);
    }
    apm
}

fn bench_process_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_capture_stream");

    for (name, rate, channels) in [
        ("8k_mono", 8_000, 1),
        ("16k_mono", 16_000, 1),
        ("32k_mono", 32_000, 1),
        ("16k_stereo", 16_000, 2),
    ] {
        let apm = make_apm(rate, channels);
        let render = tone(rate, channels);
        let input = tone(rate, channels);
        let mut frame = input.clone();

        group.bench_function(name, |b| {
            b.iter(|| {
                apm.analyze_reverse_stream(black_box(&render)).unwrap();
                apm.set_stream_delay_ms(40).unwrap();
                frame.data.copy_from_slice(&input.data);
                apm.process_capture_stream(black_box(&mut frame)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_downmix(c: &mut Criterion) {
    let mut group = c.benchmark_group("downmix");
    let apm = AudioProcessing::create(0);
    apm.set_capture_channels(2, 1).unwrap();
    let input = tone(16_000, 2);
    let mut frame = input.clone();

    group.bench_function("16k_stereo_to_mono", |b| {
        b.iter(|| {
            frame.num_channels = 2;
            frame.data.clone_from(&input.data);
            apm.process_capture_stream(black_box(&mut frame)).unwrap();
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Component benchmarks
// ---------------------------------------------------------------------------

fn bench_qmf(c: &mut Criterion) {
    let mut group = c.benchmark_group("qmf");

    let input: Vec<i16> = (0..320)
        .map(|i| ((i as f32 * 0.3).sin() * 10_000.0) as i16)
        .collect();
    let mut low = [0i16; 160];
    let mut high = [0i16; 160];
    let mut output = [0i16; 320];
    let mut analysis = (QmfState::default(), QmfState::default());
    let mut synthesis = (QmfState::default(), QmfState::default());

    group.bench_function("analysis_320", |b| {
        b.iter(|| {
            analysis_qmf(
                black_box(&input),
                &mut low,
                &mut high,
                &mut analysis.0,
                &mut analysis.1,
            );
        });
    });

    group.bench_function("round_trip_320", |b| {
        b.iter(|| {
            analysis_qmf(
                black_box(&input),
                &mut low,
                &mut high,
                &mut analysis.0,
                &mut analysis.1,
            );
            synthesis_qmf(
                &low,
                &high,
                &mut output,
                &mut synthesis.0,
                &mut synthesis.1,
            );
        });
    });

    group.finish();
}

criterion_group!(benches, bench_process_capture, bench_downmix, bench_qmf);
criterion_main!(benches);
