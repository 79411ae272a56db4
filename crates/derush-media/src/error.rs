//! Error types for media operations.

use derush_models::TimeRange;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur at the external media-engine boundary.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("ffmpeg {operation} failed: {message}")]
    ToolFailed {
        operation: &'static str,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe failed on {path}: {message}")]
    ProbeFailed {
        path: PathBuf,
        message: String,
        stderr: Option<String>,
    },

    /// Mux refusal: the two elementary streams do not describe the same
    /// recording (fetch desync).
    #[error("audio ({audio_secs:.2}s) and video ({video_secs:.2}s) durations diverge beyond tolerance")]
    DurationMismatch { audio_secs: f64, video_secs: f64 },

    /// Cut refusal: the requested range lies outside the source.
    #[error("cut range {range} exceeds source duration {duration_secs:.3}s")]
    RangeOutOfBounds {
        range: TimeRange,
        duration_secs: f64,
    },

    /// Concat refusal: a clip's encoding parameters differ from the first
    /// clip's.
    #[error("clip {path} is not concatenable: {message}")]
    IncompatibleClip { path: PathBuf, message: String },

    #[error("no clips to concatenate")]
    NoClips,

    #[error("external tool timed out after {0} seconds")]
    Timeout(u64),

    #[error("operation cancelled")]
    Cancelled,

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid media file: {0}")]
    InvalidMedia(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a tool failure error, keeping only the useful tail of stderr.
    pub fn tool_failed(
        operation: &'static str,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        let message = stderr
            .as_deref()
            .and_then(|s| s.lines().rev().find(|l| !l.trim().is_empty()))
            .unwrap_or("exited with non-zero status")
            .to_string();
        Self::ToolFailed {
            operation,
            message,
            stderr,
            exit_code,
        }
    }

    /// Create an invalid-media error.
    pub fn invalid_media(message: impl Into<String>) -> Self {
        Self::InvalidMedia(message.into())
    }

    /// True when the underlying cause was a timeout of the external tool.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MediaError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failed_takes_last_stderr_line() {
        let err = MediaError::tool_failed(
            "mux",
            Some("frame=1\nframe=2\nSomething went wrong\n\n".to_string()),
            Some(1),
        );
        assert!(err.to_string().contains("Something went wrong"));
    }

    #[test]
    fn test_duration_mismatch_display() {
        let err = MediaError::DurationMismatch {
            audio_secs: 10.0,
            video_secs: 14.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("10.00s") && msg.contains("14.50s"), "{msg}");
    }
}
