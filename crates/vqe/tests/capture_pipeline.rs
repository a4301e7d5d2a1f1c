//! Capture and render path behavior through the public API.

use proptest::prelude::any;
use proptest::sample::select;
use test_strategy::proptest;
use vqe::config::{
    DownmixMethod, EchoCancellation, EchoControlMobile, GainControl, GainControlMode,
    HighPassFilter, NoiseSuppression, Pipeline, RoutingMode, VoiceDetection,
};
use vqe::{
    AudioFrame, AudioProcessing, Config, Error, StageKind, Status, StreamConfig, VadActivity,
    Warning,
};

const MAX_FRAME_SAMPLES: usize = 640;

fn frame_from(rate: u32, channels: usize, samples: &[i16]) -> AudioFrame {
    let len = rate as usize / 100 * channels;
    AudioFrame::from_interleaved(rate, channels, samples[..len].to_vec())
}

fn tone(rate: u32, channels: usize, amplitude: f32) -> AudioFrame {
    let samples_per_channel = rate as usize / 100;
    let data = (0..samples_per_channel)
        .flat_map(|i| {
            let phase = std::f32::consts::TAU * 500.0 * i as f32 / rate as f32;
            std::iter::repeat_n((amplitude * phase.sin()).round() as i16, channels)
        })
        .collect();
    AudioFrame::from_interleaved(rate, channels, data)
}

fn energy(samples: &[i16]) -> f64 {
    samples.iter().map(|&s| f64::from(s).powi(2)).sum()
}

// ── Frame shape ──────────────────────────────────────────────────────────────

#[proptest]
fn valid_shapes_process_and_take_output_channel_count(
    #[strategy(select(vec![8_000u32, 16_000, 32_000]))] rate: u32,
    #[strategy(1usize..=2)] inputs: usize,
    #[strategy(1usize..=#inputs)] outputs: usize,
    #[strategy(proptest::collection::vec(any::<i16>(), MAX_FRAME_SAMPLES))] samples: Vec<i16>,
) {
    let apm = AudioProcessing::create(0);
    apm.set_sample_rate_hz(rate).unwrap();
    apm.set_capture_channels(inputs, outputs).unwrap();

    let mut frame = frame_from(rate, inputs, &samples);
    let samples_per_channel = frame.samples_per_channel;
    assert_eq!(apm.process_capture_stream(&mut frame), Ok(Status::Ok));
    assert_eq!(frame.samples_per_channel, samples_per_channel);
    assert_eq!(frame.sample_rate_hz, rate);
    assert_eq!(frame.num_channels, outputs);
    assert_eq!(frame.data.len(), samples_per_channel * outputs);
}

#[proptest]
fn mismatched_rate_is_always_bad_sample_rate(
    #[strategy(any::<u32>())]
    #[filter(#rate != 16_000)]
    rate: u32,
    #[strategy(0usize..4)] channels: usize,
    #[strategy(0usize..400)] samples_per_channel: usize,
    #[strategy(proptest::collection::vec(any::<i16>(), 1..64))] data: Vec<i16>,
) {
    let apm = AudioProcessing::create(0);
    let mut frame = AudioFrame {
        sample_rate_hz: rate,
        num_channels: channels,
        samples_per_channel,
        data,
        vad_activity: VadActivity::Unknown,
    };
    assert_eq!(apm.process_capture_stream(&mut frame), Err(Error::BadSampleRate));
    assert_eq!(apm.analyze_reverse_stream(&frame), Err(Error::BadSampleRate));
}

#[proptest]
fn mismatched_length_is_always_bad_frame_length(
    #[strategy(0usize..1000)]
    #[filter(#samples_per_channel != 160)]
    samples_per_channel: usize,
) {
    let apm = AudioProcessing::create(0);
    let mut frame = AudioFrame::new(16_000, 1);
    frame.samples_per_channel = samples_per_channel;
    assert_eq!(apm.process_capture_stream(&mut frame), Err(Error::BadFrameLength));
    assert_eq!(apm.analyze_reverse_stream(&frame), Err(Error::BadFrameLength));
}

#[test]
fn empty_frame_is_null_input() {
    let apm = AudioProcessing::create(0);
    let mut frame = AudioFrame::new(44_100, 5);
    frame.data.clear();
    assert_eq!(apm.process_capture_stream(&mut frame), Err(Error::NullInput));
    assert_eq!(apm.analyze_reverse_stream(&frame), Err(Error::NullInput));
}

#[test]
fn channel_count_is_checked_per_path() {
    let apm = AudioProcessing::create(0);
    apm.set_render_channels(2).unwrap();

    let mut stereo = AudioFrame::new(16_000, 2);
    assert_eq!(apm.process_capture_stream(&mut stereo), Err(Error::BadChannelCount));
    assert_eq!(apm.analyze_reverse_stream(&stereo), Ok(Status::Ok));

    let mono = AudioFrame::new(16_000, 1);
    assert_eq!(apm.analyze_reverse_stream(&mono), Err(Error::BadChannelCount));
}

// ── Passthrough ─────────────────────────────────────────────────────────────

#[proptest]
fn disabled_pipeline_is_bit_exact_below_32k(
    #[strategy(select(vec![8_000u32, 16_000]))] rate: u32,
    #[strategy(1usize..=2)] channels: usize,
    #[strategy(proptest::collection::vec(any::<i16>(), MAX_FRAME_SAMPLES))] samples: Vec<i16>,
) {
    let apm = AudioProcessing::create(0);
    apm.set_sample_rate_hz(rate).unwrap();
    apm.set_capture_channels(channels, channels).unwrap();

    let input = frame_from(rate, channels, &samples);
    let mut frame = input.clone();
    apm.process_capture_stream(&mut frame).unwrap();
    assert_eq!(frame.data, input.data);
    assert_eq!(frame.vad_activity, VadActivity::Unknown);
}

#[proptest]
fn disabled_pipeline_settles_to_identity_at_32k(
    #[strategy(-16_000i16..=16_000)] level: i16,
) {
    let apm = AudioProcessing::create(0);
    apm.set_sample_rate_hz(32_000).unwrap();

    let input = AudioFrame::from_interleaved(32_000, 1, vec![level; 320]);
    let mut frame = input.clone();
    for _ in 0..30 {
        frame.clone_from(&input);
        apm.process_capture_stream(&mut frame).unwrap();
    }
    for &s in &frame.data {
        assert!((i32::from(s) - i32::from(level)).abs() <= 1, "{s} vs {level}");
    }
}

#[test]
fn disabled_pipeline_preserves_tone_energy_at_32k() {
    let apm = AudioProcessing::create(0);
    apm.set_sample_rate_hz(32_000).unwrap();

    // 500 Hz at 32 kHz: five whole periods per frame.
    let input = tone(32_000, 1, 8000.0);
    let mut frame = input.clone();
    for _ in 0..30 {
        frame.clone_from(&input);
        apm.process_capture_stream(&mut frame).unwrap();
    }
    let ratio = energy(&frame.data) / energy(&input.data);
    assert!((ratio - 1.0).abs() < 0.05, "energy ratio {ratio}");
}

#[test]
fn render_path_leaves_frame_untouched() {
    let apm = AudioProcessing::builder()
        .config(Config {
            echo_cancellation: Some(EchoCancellation::default()),
            ..Default::default()
        })
        .stream_config(StreamConfig::new(32_000, 1, 1, 2))
        .build()
        .unwrap();
    let render = tone(32_000, 2, 10_000.0);
    let copy = render.clone();
    apm.analyze_reverse_stream(&render).unwrap();
    assert_eq!(render, copy);
}

// ── Downmix ─────────────────────────────────────────────────────────────────

#[test]
fn downmix_averages_by_default() {
    let apm = AudioProcessing::create(0);
    apm.set_capture_channels(2, 1).unwrap();
    let mut frame = AudioFrame::from_interleaved(16_000, 2, [1000i16, 3000].repeat(160));
    apm.process_capture_stream(&mut frame).unwrap();
    assert_eq!(frame.num_channels, 1);
    assert_eq!(frame.data, vec![2000; 160]);
}

#[test]
fn downmix_can_keep_first_channel() {
    let apm = AudioProcessing::builder()
        .config(Config {
            pipeline: Pipeline {
                capture_downmix_method: DownmixMethod::UseFirstChannel,
            },
            ..Default::default()
        })
        .stream_config(StreamConfig::new(8_000, 2, 1, 1))
        .build()
        .unwrap();
    let mut frame = AudioFrame::from_interleaved(8_000, 2, [-5i16, 700].repeat(80));
    apm.process_capture_stream(&mut frame).unwrap();
    assert_eq!(frame.data, vec![-5; 80]);
}

#[test]
fn downmix_channel_count_persists_when_a_stage_fails() {
    let apm = AudioProcessing::create(0);
    apm.set_capture_channels(2, 1).unwrap();
    apm.set_enabled(StageKind::EchoCancellation, true).unwrap();

    // No stream delay was reported, so the echo canceller fails after the
    // downmix already happened.
    let mut frame = AudioFrame::new(16_000, 2);
    assert_eq!(
        apm.process_capture_stream(&mut frame),
        Err(Error::StreamParameterNotSet)
    );
    assert_eq!(frame.num_channels, 1);
    assert_eq!(frame.data.len(), 320);

    // The next frame from the caller still has to be stereo.
    assert_eq!(
        apm.process_capture_stream(&mut frame),
        Err(Error::BadChannelCount)
    );
}

// ── Stages in the pipeline ──────────────────────────────────────────────────

#[test]
fn echo_canceller_reports_short_history_as_warning() {
    let apm = AudioProcessing::create(0);
    apm.set_enabled(StageKind::EchoCancellation, true).unwrap();
    apm.analyze_reverse_stream(&tone(16_000, 1, 8000.0)).unwrap();

    // One far-end frame is not enough for a 30 ms delay.
    apm.set_stream_delay_ms(30).unwrap();
    let mut frame = tone(16_000, 1, 2000.0);
    assert_eq!(
        apm.process_capture_stream(&mut frame),
        Ok(Status::Warning(Warning::BadStreamParameter))
    );
}

#[test]
fn echo_canceller_measures_return_loss_and_suppresses() {
    let apm = AudioProcessing::create(0);
    apm.set_enabled(StageKind::EchoCancellation, true).unwrap();

    let render = tone(16_000, 1, 8000.0);
    let echo = tone(16_000, 1, 2000.0);
    let mut frame = echo.clone();
    for _ in 0..5 {
        apm.analyze_reverse_stream(&render).unwrap();
        apm.set_stream_delay_ms(0).unwrap();
        frame.clone_from(&echo);
        assert_eq!(apm.process_capture_stream(&mut frame), Ok(Status::Ok));
    }

    let stats = apm.statistics();
    let erl = stats.echo_return_loss.unwrap();
    assert!((erl - 12.04).abs() < 0.5, "erl {erl}");
    assert_eq!(stats.delay_ms, Some(0));
    assert!(energy(&frame.data) < energy(&echo.data) / 4.0);
}

fn mobile_echo_engine(noise_suppression: bool) -> AudioProcessing {
    AudioProcessing::builder()
        .config(Config {
            echo_control_mobile: Some(EchoControlMobile {
                routing_mode: RoutingMode::Speakerphone,
                comfort_noise: false,
            }),
            noise_suppression: noise_suppression.then(NoiseSuppression::default),
            ..Default::default()
        })
        .stream_config(StreamConfig::new(8_000, 1, 1, 1))
        .build()
        .unwrap()
}

/// Runs a few ticks of far end `render` and near end `capture`, returning
/// the last processed capture frame.
fn run_ticks(apm: &AudioProcessing, render: &AudioFrame, capture: &AudioFrame) -> AudioFrame {
    let mut frame = capture.clone();
    for _ in 0..3 {
        apm.analyze_reverse_stream(render).unwrap();
        apm.set_stream_delay_ms(0).unwrap();
        frame.clone_from(capture);
        assert_eq!(apm.process_capture_stream(&mut frame), Ok(Status::Ok));
    }
    frame
}

#[test]
fn mobile_echo_control_suppresses_near_end_below_far_end() {
    let apm = mobile_echo_engine(false);
    let near = tone(8_000, 1, 2000.0);
    let frame = run_ticks(&apm, &tone(8_000, 1, 5000.0), &near);
    assert!(apm.echo_control_mobile().is_suppressing());
    assert!(energy(&frame.data) < energy(&near.data) / 10.0);
}

#[test]
fn mobile_echo_control_judges_the_band_before_noise_suppression() {
    // Noise suppression pulls the near end well below the far end, but the
    // unsuppressed copy is louder, so this is double talk and not echo.
    let apm = mobile_echo_engine(true);
    let near = tone(8_000, 1, 8000.0);
    let frame = run_ticks(&apm, &tone(8_000, 1, 5000.0), &near);
    assert!(apm.noise_suppression().suppressed_frames() > 0);
    assert!(energy(&frame.data) < energy(&tone(8_000, 1, 5000.0).data));
    assert!(!apm.echo_control_mobile().is_suppressing());
}

#[test]
fn high_pass_filter_removes_dc_through_pipeline() {
    let apm = AudioProcessing::builder()
        .config(Config {
            high_pass_filter: Some(HighPassFilter),
            ..Default::default()
        })
        .build()
        .unwrap();
    let input = AudioFrame::from_interleaved(16_000, 1, vec![4000; 160]);
    let mut frame = input.clone();
    for _ in 0..50 {
        frame.clone_from(&input);
        apm.process_capture_stream(&mut frame).unwrap();
    }
    assert!(frame.data.iter().all(|s| s.abs() < 50));
}

#[test]
fn voice_detection_marks_frames() {
    let apm = AudioProcessing::builder()
        .config(Config {
            voice_detection: Some(VoiceDetection::default()),
            ..Default::default()
        })
        .build()
        .unwrap();

    let mut frame = AudioFrame::new(16_000, 1);
    apm.process_capture_stream(&mut frame).unwrap();
    assert_eq!(frame.vad_activity, VadActivity::Passive);

    let mut frame = tone(16_000, 1, 10_000.0);
    apm.process_capture_stream(&mut frame).unwrap();
    assert_eq!(frame.vad_activity, VadActivity::Active);
    assert!(apm.voice_detection().stream_has_voice());
    assert_eq!(apm.statistics().voice_detected, Some(true));
}

#[test]
fn adaptive_analog_gain_needs_level_every_frame() {
    let apm = AudioProcessing::builder()
        .config(Config {
            gain_control: Some(GainControl::default()),
            ..Default::default()
        })
        .build()
        .unwrap();

    let mut frame = tone(16_000, 1, 300.0);
    assert_eq!(
        apm.process_capture_stream(&mut frame),
        Err(Error::StreamParameterNotSet)
    );

    apm.gain_control().set_stream_analog_level(128).unwrap();
    let mut frame = tone(16_000, 1, 300.0);
    assert_eq!(apm.process_capture_stream(&mut frame), Ok(Status::Ok));

    // Quiet input: the recommendation moves up.
    let level = apm.statistics().recommended_analog_level.unwrap();
    assert!(level > 128, "recommended {level}");
}

#[test]
fn fixed_digital_gain_amplifies() {
    let apm = AudioProcessing::builder()
        .config(Config {
            gain_control: Some(GainControl {
                mode: GainControlMode::FixedDigital,
                compression_gain_db: 6,
                enable_limiter: false,
                ..Default::default()
            }),
            ..Default::default()
        })
        .build()
        .unwrap();
    let input = tone(16_000, 1, 1000.0);
    let mut frame = input.clone();
    apm.process_capture_stream(&mut frame).unwrap();
    let ratio = energy(&frame.data) / energy(&input.data);
    assert!((ratio - 3.98).abs() < 0.1, "power ratio {ratio}");
}

#[test]
fn noise_suppression_attenuates_stationary_noise() {
    let apm = AudioProcessing::builder()
        .config(Config {
            noise_suppression: Some(NoiseSuppression::default()),
            ..Default::default()
        })
        .build()
        .unwrap();
    let input = tone(16_000, 1, 500.0);
    let mut frame = input.clone();
    for _ in 0..10 {
        frame.clone_from(&input);
        apm.process_capture_stream(&mut frame).unwrap();
    }
    assert!(energy(&frame.data) < energy(&input.data) / 10.0);
    assert!(apm.noise_suppression().noise_floor(0).is_some());
}
