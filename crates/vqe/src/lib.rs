//! Voice quality enhancement engine.
//!
//! Coordinates a fixed sequence of enhancement stages (high-pass filter,
//! echo cancellation, mobile echo control, gain control, noise suppression,
//! voice detection) over 10 ms frames of 16-bit PCM audio from a near-end
//! capture path and a far-end render path.
//!
//! # Quick Start
//!
//! ```
//! use vqe::config::{HighPassFilter, NoiseSuppression};
//! use vqe::{AudioFrame, AudioProcessing, Config, StreamConfig};
//!
//! let config = Config {
//!     high_pass_filter: Some(HighPassFilter),
//!     noise_suppression: Some(NoiseSuppression::default()),
//!     ..Default::default()
//! };
//!
//! let apm = AudioProcessing::builder()
//!     .config(config)
//!     .stream_config(StreamConfig::new(16_000, 1, 1, 1))
//!     .build()
//!     .unwrap();
//!
//! // For each 10 ms tick:
//! let render = AudioFrame::new(16_000, 1);
//! apm.analyze_reverse_stream(&render).unwrap();
//!
//! let mut capture = AudioFrame::new(16_000, 1);
//! apm.process_capture_stream(&mut capture).unwrap();
//! ```

pub(crate) mod audio_buffer;
pub mod audio_frame;
mod audio_processing;
pub(crate) mod audio_processing_impl;
pub mod config;
pub mod debug_trace;
pub(crate) mod echo_cancellation;
pub(crate) mod echo_control_mobile;
pub(crate) mod gain_control;
pub(crate) mod high_pass_filter;
pub(crate) mod level_estimator;
pub(crate) mod noise_suppression;
pub(crate) mod stage;
pub mod stats;
pub mod stream_config;
pub(crate) mod voice_detection;

// Public re-exports.
pub use audio_frame::{AudioFrame, VadActivity};
pub use audio_processing::{
    AudioProcessing, AudioProcessingBuilder, Error, MAX_FILENAME_SIZE, StageGuard, Status,
    Warning,
};
pub use config::Config;
pub use echo_cancellation::EchoCanceller;
pub use echo_control_mobile::MobileEchoController;
pub use gain_control::GainController;
pub use high_pass_filter::HighPassFilter;
pub use level_estimator::LevelEstimator;
pub use noise_suppression::NoiseSuppressor;
pub use stage::StageKind;
pub use stats::AudioProcessingStats;
pub use stream_config::StreamConfig;
pub use voice_detection::VoiceDetector;
