//! Shared test support: an in-memory fake of the media engine.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use derush_media::{AudioStream, MediaEngine, MediaError, MediaInfo, MediaResult, VideoStream};
use derush_models::TimeRange;
use derush_pipeline::silence::ANALYSIS_SAMPLE_RATE;

/// A deterministic [`MediaEngine`] writing predictable bytes instead of
/// invoking FFmpeg.
pub struct FakeEngine {
    duration_secs: f64,
    pcm: Vec<f32>,
    fail_cut_index: Option<usize>,
    cuts: Mutex<Vec<TimeRange>>,
}

impl FakeEngine {
    pub fn new(duration_secs: f64, pcm: Vec<f32>) -> Self {
        Self {
            duration_secs,
            pcm,
            fail_cut_index: None,
            cuts: Mutex::new(Vec::new()),
        }
    }

    /// Make the nth `extract_range` call fail.
    pub fn failing_cut(mut self, index: usize) -> Self {
        self.fail_cut_index = Some(index);
        self
    }

    pub fn recorded_cuts(&self) -> Vec<TimeRange> {
        self.cuts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn probe(&self, _file: &Path) -> MediaResult<MediaInfo> {
        Ok(MediaInfo {
            duration: self.duration_secs,
            size: 0,
            bitrate: 0,
            video: Some(VideoStream {
                codec: "h264".to_string(),
                width: 1920,
                height: 1080,
                fps: 30.0,
            }),
            audio: Some(AudioStream {
                codec: "aac".to_string(),
                sample_rate: Some(48_000),
            }),
        })
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> MediaResult<()> {
        let mut bytes = tokio::fs::read(video).await?;
        bytes.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn extract_pcm(
        &self,
        _input: &Path,
        output: &Path,
        _sample_rate: u32,
    ) -> MediaResult<()> {
        let bytes: Vec<u8> = self.pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn extract_range(
        &self,
        _input: &Path,
        range: TimeRange,
        output: &Path,
    ) -> MediaResult<()> {
        let index = {
            let mut cuts = self.cuts.lock().unwrap();
            cuts.push(range);
            cuts.len() - 1
        };
        if self.fail_cut_index == Some(index) {
            return Err(MediaError::invalid_media("injected cut failure"));
        }
        tokio::fs::write(output, format!("clip:{range}")).await?;
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()> {
        if clips.is_empty() {
            return Err(MediaError::NoClips);
        }
        let mut joined = Vec::new();
        for clip in clips {
            joined.extend(tokio::fs::read(clip).await?);
            joined.push(b'\n');
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }
}

/// Build a 16 kHz PCM signal from (amplitude, milliseconds) spans.
pub fn pcm_profile(spans: &[(f32, u64)]) -> Vec<f32> {
    let samples_per_ms = ANALYSIS_SAMPLE_RATE as u64 / 1000;
    spans
        .iter()
        .flat_map(|&(amplitude, ms)| {
            std::iter::repeat(amplitude).take((ms * samples_per_ms) as usize)
        })
        .collect()
}
