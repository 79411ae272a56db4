#![deny(unreachable_patterns)]
//! FFmpeg CLI boundary for the derush pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeout and cancellation
//! - FFprobe media inspection
//! - The narrow [`MediaEngine`] capability trait (probe, mux, extract PCM,
//!   extract range, concat) behind which all codec-level work happens
//!
//! No decoding or encoding is performed in-process; everything is delegated
//! to the external `ffmpeg`/`ffprobe` binaries.

pub mod command;
pub mod engine;
pub mod error;
pub mod fs_utils;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use engine::{FfmpegEngine, MediaEngine, DURATION_TOLERANCE_SECS};
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use probe::{probe_media, AudioStream, MediaInfo, VideoStream};
