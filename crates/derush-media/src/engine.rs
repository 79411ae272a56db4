//! The external media-processing capability boundary.
//!
//! [`MediaEngine`] is the narrow contract the pipeline depends on:
//! probe, mux, PCM extraction, range extraction and concatenation. The
//! production implementation shells out to FFmpeg; tests substitute an
//! in-memory fake so planning and orchestration can be verified without
//! the real binaries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use derush_models::TimeRange;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, MediaInfo};

/// Maximum tolerated divergence between audio and video stream durations
/// before a mux is refused as a fetch desync.
pub const DURATION_TOLERANCE_SECS: f64 = 2.0;

/// Seconds of fast (keyframe) input seeking left before the accurate
/// output seek when extracting a range.
const FAST_SEEK_MARGIN_SECS: f64 = 5.0;

/// Narrow capability interface over the external media engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Inspect a media file.
    async fn probe(&self, file: &Path) -> MediaResult<MediaInfo>;

    /// Combine one video and one audio elementary stream into a single
    /// container without re-encoding.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> MediaResult<()>;

    /// Decode the audio track to raw mono f32 little-endian PCM at the
    /// given sample rate.
    async fn extract_pcm(&self, input: &Path, output: &Path, sample_rate: u32) -> MediaResult<()>;

    /// Extract one time range as an independent clip, audio and video in
    /// sync, cut at the nearest safe boundary.
    async fn extract_range(&self, input: &Path, range: TimeRange, output: &Path)
        -> MediaResult<()>;

    /// Join ordered clips losslessly into one file.
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()>;
}

/// [`MediaEngine`] implementation backed by the `ffmpeg`/`ffprobe` CLIs.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    timeout: Duration,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegEngine {
    /// Create an engine whose external invocations are bounded by
    /// `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel_rx: None,
        }
    }

    /// Attach a cancellation signal; a fired signal kills in-flight
    /// FFmpeg processes.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    fn runner(&self) -> FfmpegRunner {
        let runner = FfmpegRunner::new().with_timeout(self.timeout);
        match &self.cancel_rx {
            Some(rx) => runner.with_cancel(rx.clone()),
            None => runner,
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, file: &Path) -> MediaResult<MediaInfo> {
        probe_media(file, self.timeout).await
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> MediaResult<()> {
        let video_info = self.probe(video).await?;
        if !video_info.has_video() {
            return Err(MediaError::invalid_media(format!(
                "no video stream in {}",
                video.display()
            )));
        }

        let audio_info = self.probe(audio).await?;
        if !audio_info.has_audio() {
            return Err(MediaError::invalid_media(format!(
                "no audio stream in {}",
                audio.display()
            )));
        }

        let divergence = (video_info.duration - audio_info.duration).abs();
        if divergence > DURATION_TOLERANCE_SECS {
            return Err(MediaError::DurationMismatch {
                audio_secs: audio_info.duration,
                video_secs: video_info.duration,
            });
        }

        debug!(
            video = %video.display(),
            audio = %audio.display(),
            divergence_secs = divergence,
            "muxing elementary streams"
        );

        let cmd = FfmpegCommand::new(video, output)
            .extra_input(audio)
            .codec_copy()
            .output_args(["-movflags", "+faststart"]);

        self.runner().run(&cmd, "mux").await
    }

    async fn extract_pcm(&self, input: &Path, output: &Path, sample_rate: u32) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output).output_args([
            "-vn",
            "-ar",
            &sample_rate.to_string(),
            "-ac",
            "1",
            "-f",
            "f32le",
        ]);

        self.runner().run(&cmd, "extract_pcm").await?;

        let metadata = tokio::fs::metadata(output).await?;
        if metadata.len() == 0 {
            return Err(MediaError::invalid_media(format!(
                "no audio data decoded from {}",
                input.display()
            )));
        }

        Ok(())
    }

    async fn extract_range(
        &self,
        input: &Path,
        range: TimeRange,
        output: &Path,
    ) -> MediaResult<()> {
        let info = self.probe(input).await?;

        // Guard against planner bugs: a range past the end of the source
        // would silently produce a short clip.
        if range.end_secs() > info.duration + info.frame_interval_secs() {
            return Err(MediaError::RangeOutOfBounds {
                range,
                duration_secs: info.duration,
            });
        }

        let start = range.start_secs();
        // Two-pass seeking: fast input seek lands on a keyframe shortly
        // before the target, the accurate output seek covers the rest.
        // Stream copy cannot cut between keyframes without desyncing
        // audio from video, so the clip boundary is re-encoded.
        let fast_seek = (start - FAST_SEEK_MARGIN_SECS).max(0.0);
        let accurate_seek = start - fast_seek;

        debug!(
            input = %input.display(),
            %range,
            "extracting keep range"
        );

        let cmd = FfmpegCommand::new(input, output)
            .seek(fast_seek)
            .output_arg("-ss")
            .output_arg(format!("{:.3}", accurate_seek))
            .duration(range.duration_secs())
            .video_codec("libx264")
            .preset("veryfast")
            .crf(20)
            .audio_codec("aac")
            .audio_bitrate("128k")
            .output_args(["-avoid_negative_ts", "make_zero"]);

        self.runner().run(&cmd, "extract_range").await
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()> {
        if clips.is_empty() {
            return Err(MediaError::NoClips);
        }

        // All clips derive from one source, but verify before splicing:
        // the concat demuxer silently produces garbage on mismatched
        // parameters.
        let reference = self.probe(&clips[0]).await?;
        for clip in &clips[1..] {
            let info = self.probe(clip).await?;
            if let Err(message) = check_concatenable(&reference, &info) {
                return Err(MediaError::IncompatibleClip {
                    path: clip.clone(),
                    message,
                });
            }
        }

        let list_dir = tempfile::tempdir()?;
        let list_path = list_dir.path().join("concat.txt");
        let list_content: String = clips
            .iter()
            .map(|p| format!("file '{}'\n", p.display()))
            .collect();
        tokio::fs::write(&list_path, &list_content).await?;

        let cmd = FfmpegCommand::new(&list_path, output)
            .input_args(["-f", "concat", "-safe", "0"])
            .codec_copy()
            .output_args(["-movflags", "+faststart"]);

        self.runner().run(&cmd, "concat").await?;

        info!(clips = clips.len(), output = %output.display(), "concatenation complete");
        Ok(())
    }
}

/// Verify that two probed clips can be joined with stream copy.
fn check_concatenable(reference: &MediaInfo, other: &MediaInfo) -> Result<(), String> {
    let (ref_video, other_video) = match (&reference.video, &other.video) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err("missing video stream".to_string()),
    };

    if ref_video.codec != other_video.codec {
        return Err(format!(
            "video codec {} != {}",
            other_video.codec, ref_video.codec
        ));
    }
    if (ref_video.width, ref_video.height) != (other_video.width, other_video.height) {
        return Err(format!(
            "dimensions {}x{} != {}x{}",
            other_video.width, other_video.height, ref_video.width, ref_video.height
        ));
    }
    if (ref_video.fps - other_video.fps).abs() > 0.01 {
        return Err(format!(
            "frame rate {:.3} != {:.3}",
            other_video.fps, ref_video.fps
        ));
    }

    let ref_audio_codec = reference.audio.as_ref().map(|a| a.codec.as_str());
    let other_audio_codec = other.audio.as_ref().map(|a| a.codec.as_str());
    if ref_audio_codec != other_audio_codec {
        return Err(format!(
            "audio codec {:?} != {:?}",
            other_audio_codec, ref_audio_codec
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AudioStream, VideoStream};

    fn info(codec: &str, width: u32, height: u32, fps: f64, audio_codec: &str) -> MediaInfo {
        MediaInfo {
            duration: 10.0,
            size: 0,
            bitrate: 0,
            video: Some(VideoStream {
                codec: codec.to_string(),
                width,
                height,
                fps,
            }),
            audio: Some(AudioStream {
                codec: audio_codec.to_string(),
                sample_rate: Some(48_000),
            }),
        }
    }

    #[test]
    fn test_concatenable_identical() {
        let a = info("h264", 1920, 1080, 30.0, "aac");
        let b = info("h264", 1920, 1080, 30.0, "aac");
        assert!(check_concatenable(&a, &b).is_ok());
    }

    #[test]
    fn test_concatenable_fps_within_tolerance() {
        let a = info("h264", 1920, 1080, 29.97, "aac");
        let b = info("h264", 1920, 1080, 29.972, "aac");
        assert!(check_concatenable(&a, &b).is_ok());
    }

    #[test]
    fn test_not_concatenable() {
        let a = info("h264", 1920, 1080, 30.0, "aac");
        assert!(check_concatenable(&a, &info("hevc", 1920, 1080, 30.0, "aac")).is_err());
        assert!(check_concatenable(&a, &info("h264", 1280, 720, 30.0, "aac")).is_err());
        assert!(check_concatenable(&a, &info("h264", 1920, 1080, 25.0, "aac")).is_err());
        assert!(check_concatenable(&a, &info("h264", 1920, 1080, 30.0, "mp3")).is_err());
    }
}
