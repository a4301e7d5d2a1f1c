//! Print the records of a debug trace written by
//! `AudioProcessing::start_debug_recording`.
//!
//! ```sh
//! cargo run -p vqe --features examples --example dump_trace -- trace.bin
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use vqe::AudioFrame;
use vqe::debug_trace::{TraceReader, TraceRecord};

#[derive(Parser, Debug)]
#[command(about = "Print the records of a vqe debug trace")]
struct Args {
    /// Trace file to read.
    trace: PathBuf,

    /// Print the first samples of every frame.
    #[arg(long)]
    samples: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let file = File::open(&args.trace)
        .with_context(|| format!("failed to open {}", args.trace.display()))?;
    let reader = TraceReader::new(BufReader::new(file)).context("not a vqe trace")?;

    let (mut captures, mut renders) = (0usize, 0usize);
    for (index, record) in reader.enumerate() {
        let record = record.with_context(|| format!("bad record #{index}"))?;
        match record {
            TraceRecord::Init { sample_rate_hz } => {
                println!("#{index:<6} init     {sample_rate_hz} Hz");
            }
            TraceRecord::Capture(frame) => {
                captures += 1;
                print_frame(index, "capture", &frame, args.samples);
            }
            TraceRecord::Render(frame) => {
                renders += 1;
                print_frame(index, "render", &frame, args.samples);
            }
        }
    }
    println!("{captures} capture and {renders} render frames");
    Ok(())
}

fn print_frame(index: usize, kind: &str, frame: &AudioFrame, samples: bool) {
    print!(
        "#{index:<6} {kind:<8} {} Hz, {} ch, {} samples/ch",
        frame.sample_rate_hz, frame.num_channels, frame.samples_per_channel
    );
    if samples {
        print!(" {:?}", &frame.data[..frame.data.len().min(8)]);
    }
    println!();
}
