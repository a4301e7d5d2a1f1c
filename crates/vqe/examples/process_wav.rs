//! Process a 16-bit WAV file through vqe and write the result.
//!
//! An optional far-end WAV is fed to the render path frame by frame, so the
//! echo stages have something to work with. A debug trace of the session
//! can be written alongside.
//!
//! ```sh
//! cargo run -p vqe --features examples --example process_wav -- \
//!     mic.wav out.wav --far-end speaker.wav --aecm --ns --agc --delay 40
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing_subscriber::EnvFilter;

use vqe::config::{
    EchoCancellation, EchoControlMobile, GainControl, GainControlMode, HighPassFilter,
    NoiseSuppression, NoiseSuppressionLevel, VoiceDetection,
};
use vqe::{AudioFrame, AudioProcessing, Config, StreamConfig, VadActivity};

#[derive(Parser, Debug)]
#[command(about = "Process a WAV file through the vqe pipeline")]
struct Args {
    /// Near-end (microphone) recording. 8, 16 or 32 kHz, mono or stereo.
    input: PathBuf,

    /// Where to write the processed audio.
    output: PathBuf,

    /// Far-end (loudspeaker) recording at the same rate as the input.
    #[arg(long)]
    far_end: Option<PathBuf>,

    /// Downmix stereo input to mono.
    #[arg(long)]
    mono: bool,

    /// Enable the high-pass filter.
    #[arg(long)]
    hpf: bool,

    /// Enable the echo canceller.
    #[arg(long, conflicts_with = "aecm")]
    aec: bool,

    /// Enable the mobile echo controller.
    #[arg(long)]
    aecm: bool,

    /// Enable noise suppression.
    #[arg(long)]
    ns: bool,

    /// Enable adaptive digital gain control.
    #[arg(long)]
    agc: bool,

    /// Enable voice detection and report the share of active frames.
    #[arg(long)]
    vad: bool,

    /// Stream delay reported to the echo stages, in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay: i32,

    /// Write a debug trace of the session to this file.
    #[arg(long)]
    trace: Option<PathBuf>,
}

fn read_wav(path: &Path) -> Result<(WavSpec, Vec<i16>)> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!("{} is not 16-bit PCM", path.display());
    }
    let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    Ok((spec, samples))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let (spec, input) = read_wav(&args.input)?;
    let sample_rate_hz = spec.sample_rate;
    let input_channels = usize::from(spec.channels);
    let output_channels = if args.mono { 1 } else { input_channels };

    let far_end = match &args.far_end {
        Some(path) => {
            let (far_spec, samples) = read_wav(path)?;
            ensure!(
                far_spec.sample_rate == sample_rate_hz,
                "far end must be sampled at {sample_rate_hz} Hz"
            );
            Some((usize::from(far_spec.channels), samples))
        }
        None => None,
    };
    let render_channels = far_end.as_ref().map_or(1, |(channels, _)| *channels);

    let config = Config {
        high_pass_filter: args.hpf.then_some(HighPassFilter),
        echo_cancellation: args.aec.then(EchoCancellation::default),
        echo_control_mobile: args.aecm.then(EchoControlMobile::default),
        gain_control: args.agc.then(|| GainControl {
            mode: GainControlMode::AdaptiveDigital,
            ..Default::default()
        }),
        noise_suppression: args.ns.then_some(NoiseSuppression {
            level: NoiseSuppressionLevel::High,
        }),
        voice_detection: args.vad.then(VoiceDetection::default),
        ..Default::default()
    };
    let stream = StreamConfig::new(
        sample_rate_hz,
        input_channels,
        output_channels,
        render_channels,
    );
    stream.validate()?;
    let apm = AudioProcessing::builder()
        .config(config)
        .stream_config(stream)
        .build()?;

    if let Some(path) = &args.trace {
        apm.start_debug_recording(path)?;
    }

    let out_spec = WavSpec {
        channels: u16::try_from(output_channels)?,
        ..spec
    };
    let mut writer = WavWriter::create(&args.output, out_spec)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    let samples_per_channel = stream.samples_per_channel();
    let mut warnings = 0usize;
    let mut active_frames = 0usize;
    let mut frames = 0usize;
    for (index, chunk) in input
        .chunks_exact(samples_per_channel * input_channels)
        .enumerate()
    {
        if let Some((channels, far)) = &far_end {
            let start = index * samples_per_channel * channels;
            let end = start + samples_per_channel * channels;
            let mut data = far.get(start..end).unwrap_or_default().to_vec();
            data.resize(samples_per_channel * channels, 0);
            let render = AudioFrame::from_interleaved(sample_rate_hz, *channels, data);
            apm.analyze_reverse_stream(&render)?;
        }
        if args.aec || args.aecm {
            apm.set_stream_delay_ms(args.delay)?;
        }

        let mut frame =
            AudioFrame::from_interleaved(sample_rate_hz, input_channels, chunk.to_vec());
        let status = apm.process_capture_stream(&mut frame)?;
        if !status.is_ok() {
            warnings += 1;
        }
        if frame.vad_activity == VadActivity::Active {
            active_frames += 1;
        }
        frames += 1;

        for &sample in &frame.data {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    apm.stop_debug_recording()?;

    println!(
        "Processed {frames} frames ({} s) into {}",
        frames as f32 / 100.0,
        args.output.display()
    );
    if warnings > 0 {
        println!("{warnings} frames completed with warnings");
    }
    if args.vad {
        println!("Voice detected in {active_frames} of {frames} frames");
    }
    let stats = apm.statistics();
    if let Some(erl) = stats.echo_return_loss {
        println!("Last echo return loss: {erl:.1} dB");
    }
    Ok(())
}
