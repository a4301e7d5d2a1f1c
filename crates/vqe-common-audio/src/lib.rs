#![doc = include_str!("../README.md")]

#![deny(unsafe_code)]

pub mod audio_util;
pub mod biquad_filter;
pub mod splitting_filter;
