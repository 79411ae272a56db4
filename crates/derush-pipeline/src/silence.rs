//! Silence detection over an RMS loudness profile.
//!
//! The engine decodes the muxed file's audio to raw mono f32 PCM; the
//! detector turns it into per-window RMS loudness (dBFS) and scans for
//! maximal runs of non-active windows long enough to count as silence.
//!
//! A run touching the very start or end of the media is a valid silence
//! interval. Runs separated by a gap smaller than the window resolution
//! are not merged here; merging is the planner's responsibility.

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use derush_media::MediaEngine;
use derush_models::{DerushOptions, TimeRange};

use crate::error::AnalysisError;

/// Sample rate the audio track is decoded to for analysis.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16_000;

/// Width of one loudness window.
pub const WINDOW_MS: u64 = 100;

/// Produces silence intervals for a muxed media file.
pub struct SilenceDetector {
    engine: Arc<dyn MediaEngine>,
}

impl SilenceDetector {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }

    /// Decode the audio track of `media` and return its silence
    /// intervals, ordered and non-overlapping.
    pub async fn detect(
        &self,
        media: &Path,
        scratch: &Path,
        options: &DerushOptions,
    ) -> Result<Vec<TimeRange>, AnalysisError> {
        let pcm_path = scratch.join("loudness.f32");
        self.engine
            .extract_pcm(media, &pcm_path, ANALYSIS_SAMPLE_RATE)
            .await
            .map_err(AnalysisError::Decode)?;

        let samples = load_samples(&pcm_path).await?;
        tokio::fs::remove_file(&pcm_path).await.ok();

        if samples.is_empty() {
            return Err(AnalysisError::NoAudioData);
        }

        let total_ms = (samples.len() as u64 * 1000) / ANALYSIS_SAMPLE_RATE as u64;
        let window_samples = (ANALYSIS_SAMPLE_RATE as u64 * WINDOW_MS / 1000) as usize;
        let levels = loudness_profile(&samples, window_samples);

        let silences = scan_silence(&levels, WINDOW_MS, total_ms, options);

        debug!(
            samples = samples.len(),
            windows = levels.len(),
            duration_ms = total_ms,
            silences = silences.len(),
            "silence analysis complete"
        );

        Ok(silences)
    }
}

/// Load raw f32le audio samples from a file.
async fn load_samples(path: &Path) -> Result<Vec<f32>, AnalysisError> {
    let bytes = tokio::fs::read(path).await?;

    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(samples)
}

/// Per-window RMS loudness in dBFS. The trailing partial window is
/// measured too, so the profile covers the full duration.
fn loudness_profile(samples: &[f32], window_samples: usize) -> Vec<f32> {
    samples.chunks(window_samples).map(window_db).collect()
}

fn window_db(window: &[f32]) -> f32 {
    let sum_squares: f64 = window.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    let rms = (sum_squares / window.len() as f64).sqrt();
    if rms > 0.0 {
        (20.0 * rms.log10()) as f32
    } else {
        f32::NEG_INFINITY
    }
}

/// Scan a loudness profile for maximal silent runs of at least
/// `min_silence_ms`.
///
/// A window is active iff its level is strictly above the noise floor
/// and, when a ceiling is configured, strictly below it.
fn scan_silence(
    levels: &[f32],
    window_ms: u64,
    total_ms: u64,
    options: &DerushOptions,
) -> Vec<TimeRange> {
    let is_active = |db: f32| {
        db > options.noise_floor_db
            && options.max_loudness_db.map_or(true, |ceiling| db < ceiling)
    };

    let mut silences = Vec::new();
    let mut run_start: Option<usize> = None;

    let mut push_run = |start_window: usize, end_window: usize| {
        let range = TimeRange::new(
            start_window as u64 * window_ms,
            (end_window as u64 * window_ms).min(total_ms),
        );
        if range.duration_ms() >= options.min_silence_ms {
            silences.push(range);
        }
    };

    for (i, &db) in levels.iter().enumerate() {
        if !is_active(db) {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            push_run(start, i);
        }
    }
    if let Some(start) = run_start {
        push_run(start, levels.len());
    }

    silences
}
