//! Pipeline orchestration.
//!
//! Drives resolve -> fetch (audio ∥ video) -> mux -> detect -> plan ->
//! cut -> concat, owns the per-run scratch directory, and reports either
//! an output artifact or a stage-tagged failure. Intermediates are
//! deleted as soon as their consumer succeeds; the scratch directory is
//! removed on every exit path, so a failed run leaves nothing behind.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, info_span, warn, Instrument};

use derush_media::{move_file, FfmpegEngine, MediaEngine};
use derush_models::{
    format_seconds, range::total_duration_ms, DerushOptions, RunId, RunReport, StreamManifest,
    TimeRange,
};
use derush_stream::{
    FetcherConfig, ManifestResolver, ResolverConfig, RetryConfig, SegmentFetcher, StreamClient,
};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage};
use crate::progress::{cut_percent, ProgressEvent, ProgressSink};
use crate::silence::SilenceDetector;

/// What to de-rush: a remote share URL or an already-local media file.
#[derive(Debug, Clone)]
pub enum Source {
    Remote { share_url: String },
    Local { path: PathBuf },
}

impl Source {
    pub fn remote(share_url: impl Into<String>) -> Self {
        Self::Remote {
            share_url: share_url.into(),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Deterministic file stem for artifacts derived from this source.
    pub fn stem(&self) -> String {
        match self {
            Source::Local { path } => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video".to_string()),
            Source::Remote { share_url } => {
                let tail = share_url
                    .split(['?', '#'])
                    .next()
                    .unwrap_or(share_url)
                    .rsplit('/')
                    .find(|part| !part.is_empty());
                match tail {
                    Some(tail) => sanitize_stem(tail),
                    None => "video".to_string(),
                }
            }
        }
    }
}

fn sanitize_stem(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.trim_matches('-').is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

/// Cancels an in-flight run.
///
/// Cancellation kills outstanding external-process invocations and
/// abandons chunk downloads; partial scratch artifacts are removed.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// One de-rush pipeline instance.
///
/// Construct one `Pipeline` per run; the cancel handle applies to every
/// run driven by this instance.
pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<dyn MediaEngine>,
    resolver: ManifestResolver,
    fetcher: SegmentFetcher,
    detector: SilenceDetector,
    progress: Option<ProgressSink>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl Pipeline {
    /// Create a pipeline backed by the real FFmpeg engine.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let engine: Arc<dyn MediaEngine> = Arc::new(
            FfmpegEngine::new(config.tool_timeout).with_cancel(cancel_rx.clone()),
        );
        Self::build(config, engine, cancel_tx, cancel_rx)
    }

    /// Create a pipeline with a caller-supplied media engine.
    ///
    /// Used by tests to substitute a fake engine, and by embedders with
    /// their own engine wrapper.
    pub fn with_engine(
        config: PipelineConfig,
        engine: Arc<dyn MediaEngine>,
    ) -> Result<Self, PipelineError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self::build(config, engine, cancel_tx, cancel_rx)
    }

    fn build(
        config: PipelineConfig,
        engine: Arc<dyn MediaEngine>,
        cancel_tx: watch::Sender<bool>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<Self, PipelineError> {
        let client = StreamClient::new(config.cookie.clone())
            .map_err(|e| PipelineError::Setup(e.to_string()))?;

        let resolver = ManifestResolver::new(
            client.clone(),
            ResolverConfig {
                preferred_bandwidth: config.preferred_bandwidth,
            },
        );

        let fetcher = SegmentFetcher::new(
            client,
            FetcherConfig {
                max_concurrency: config.chunk_concurrency,
                retry: RetryConfig::default()
                    .with_max_retries(config.chunk_retries)
                    .with_base_delay(config.retry_base_delay),
            },
        );

        let detector = SilenceDetector::new(Arc::clone(&engine));

        Ok(Self {
            config,
            engine,
            resolver,
            fetcher,
            detector,
            progress: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        })
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Handle for cancelling runs driven by this pipeline.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Run the full pipeline for one source.
    pub async fn run(
        &self,
        source: &Source,
        options: &DerushOptions,
    ) -> Result<RunReport, PipelineError> {
        let run_id = RunId::new();
        let span = info_span!("derush_run", run_id = %run_id);
        self.run_inner(run_id, source, options).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: RunId,
        source: &Source,
        options: &DerushOptions,
    ) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let stem = source.stem();

        tokio::fs::create_dir_all(&self.config.scratch_root).await?;
        // Every intermediate lives below this directory; dropping it on
        // any exit path removes them all.
        let scratch = tempfile::Builder::new()
            .prefix(&format!("derush_{}_", run_id.short()))
            .tempdir_in(&self.config.scratch_root)?;

        info!(source = ?source, "pipeline run starting");

        let (muxed, source_owned) = match source {
            Source::Remote { share_url } => {
                let muxed = self.acquire_remote(share_url, scratch.path()).await?;
                (muxed, true)
            }
            Source::Local { path } => {
                if !path.exists() {
                    return Err(PipelineError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("local source {} does not exist", path.display()),
                    )));
                }
                (path.clone(), false)
            }
        };

        if options.skip_derush {
            let info = self
                .engine
                .probe(&muxed)
                .await
                .map_err(PipelineError::Probe)?;
            let duration_ms = info.duration_ms();

            let output_path = if source_owned {
                let output_path = self.config.output_root.join(format!("{stem}.mp4"));
                move_file(&muxed, &output_path)
                    .await
                    .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;
                output_path
            } else {
                // Nothing to do for a local file: it already is the artifact
                muxed.clone()
            };

            self.report(Stage::Finalize, 100);
            info!(output = %output_path.display(), "reconstruction complete, de-rush skipped");
            return Ok(RunReport {
                run_id,
                output_path,
                source_duration_ms: duration_ms,
                output_duration_ms: duration_ms,
                silence_ranges: 0,
                keep_ranges: 0,
                started_at,
                finished_at: Utc::now(),
            });
        }

        let outcome = self
            .derush(&muxed, scratch.path(), options, &stem, source_owned)
            .await?;

        Ok(RunReport {
            run_id,
            output_path: outcome.output_path,
            source_duration_ms: outcome.source_duration_ms,
            output_duration_ms: outcome.kept_ms,
            silence_ranges: outcome.silence_ranges,
            keep_ranges: outcome.keep_ranges,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Resolve, fetch both streams concurrently, and mux.
    async fn acquire_remote(
        &self,
        share_url: &str,
        scratch: &Path,
    ) -> Result<PathBuf, PipelineError> {
        self.check_cancelled()?;
        let resolved = self.resolver.resolve(share_url).await?;
        self.report(Stage::Resolve, 5);

        let audio_path = scratch.join("audio.ts");
        let video_path = scratch.join("video.ts");

        // The two fetches run concurrently; the first failure aborts the
        // sibling's in-flight chunk downloads and its partial output is
        // discarded with the scratch directory, never muxed.
        tokio::try_join!(
            self.fetch_one(&resolved.audio, &audio_path),
            self.fetch_one(&resolved.video, &video_path)
        )?;
        self.report(Stage::Fetch, 25);

        self.check_cancelled()?;
        let muxed = scratch.join("muxed.mp4");
        self.engine
            .mux(&video_path, &audio_path, &muxed)
            .await
            .map_err(map_media_error(PipelineError::Mux))?;

        // The elementary streams are consumed; only the muxed file moves on
        tokio::fs::remove_file(&audio_path).await.ok();
        tokio::fs::remove_file(&video_path).await.ok();
        self.report(Stage::Mux, 35);

        Ok(muxed)
    }

    /// Fetch one elementary stream, tagging failures with the track kind.
    async fn fetch_one(
        &self,
        manifest: &StreamManifest,
        dest: &Path,
    ) -> Result<(), PipelineError> {
        let kind = manifest.kind;
        self.fetcher
            .fetch_stream(manifest, dest)
            .await
            .map_err(|source| PipelineError::Fetch { kind, source })
    }

    /// Analyse, plan, cut and concatenate; returns the published output
    /// path and run statistics.
    async fn derush(
        &self,
        muxed: &Path,
        scratch: &Path,
        options: &DerushOptions,
        stem: &str,
        muxed_owned: bool,
    ) -> Result<DerushOutcome, PipelineError> {
        self.check_cancelled()?;
        let info = self
            .engine
            .probe(muxed)
            .await
            .map_err(map_media_error(PipelineError::Probe))?;
        let duration_ms = info.duration_ms();

        let silences = self.detector.detect(muxed, scratch, options).await?;
        self.report(Stage::Analyze, 55);
        info!(
            silences = silences.len(),
            duration = %format_seconds(info.duration),
            "silence analysis finished"
        );

        let keeps = crate::planner::plan_keep_ranges(duration_ms, &silences, options);
        if keeps.is_empty() {
            warn!("entire source classified as silence");
            return Err(PipelineError::NoContent);
        }
        self.report(Stage::Plan, 60);

        let clips = self.cut_keeps(muxed, scratch, &keeps).await?;

        self.check_cancelled()?;
        let joined = scratch.join("derushed.mp4");
        self.engine
            .concat(&clips, &joined)
            .await
            .map_err(map_media_error(PipelineError::Concat))?;
        self.report(Stage::Concat, 95);

        // Consumed intermediates: clips and, for a fetched source, the
        // muxed container. A local source file is the caller's.
        for clip in &clips {
            tokio::fs::remove_file(clip).await.ok();
        }
        if muxed_owned {
            tokio::fs::remove_file(muxed).await.ok();
        }

        let output_path = self.config.output_root.join(format!("{stem}_derushed.mp4"));
        move_file(&joined, &output_path)
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;
        self.report(Stage::Finalize, 100);

        let kept_ms = total_duration_ms(&keeps);
        info!(
            output = %output_path.display(),
            kept_ms,
            removed_ms = duration_ms.saturating_sub(kept_ms),
            "de-rush complete"
        );

        Ok(DerushOutcome {
            output_path,
            source_duration_ms: duration_ms,
            kept_ms,
            silence_ranges: silences.len(),
            keep_ranges: keeps.len(),
        })
    }

    /// Extract each keep interval as an independent clip, in order.
    async fn cut_keeps(
        &self,
        muxed: &Path,
        scratch: &Path,
        keeps: &[TimeRange],
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let clips_dir = scratch.join("clips");
        tokio::fs::create_dir_all(&clips_dir).await?;

        let mut clips = Vec::with_capacity(keeps.len());
        for (index, keep) in keeps.iter().enumerate() {
            self.check_cancelled()?;
            let clip_path = clips_dir.join(format!("seg_{index:04}.mp4"));
            self.engine
                .extract_range(muxed, *keep, &clip_path)
                .await
                .map_err(|source| match source {
                    derush_media::MediaError::Cancelled => PipelineError::Cancelled,
                    source => PipelineError::Cut { index, source },
                })?;
            clips.push(clip_path);
            self.report(Stage::Cut, cut_percent(index + 1, keeps.len()));
        }

        Ok(clips)
    }

    fn report(&self, stage: Stage, percent: u8) {
        if let Some(sink) = &self.progress {
            sink(ProgressEvent { stage, percent });
        }
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if *self.cancel_rx.borrow() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// What the de-rush phase produced.
struct DerushOutcome {
    output_path: PathBuf,
    source_duration_ms: u64,
    kept_ms: u64,
    silence_ranges: usize,
    keep_ranges: usize,
}

/// Map an engine error to its stage variant, letting cancellation keep
/// its own identity.
fn map_media_error<F>(wrap: F) -> impl Fn(derush_media::MediaError) -> PipelineError
where
    F: Fn(derush_media::MediaError) -> PipelineError,
{
    move |e| match e {
        derush_media::MediaError::Cancelled => PipelineError::Cancelled,
        e => wrap(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_stem() {
        let source = Source::local("/videos/talk recording.mp4");
        assert_eq!(source.stem(), "talk recording");
    }

    #[test]
    fn test_remote_stem() {
        let source = Source::remote("https://host.example/share/a1B2c3D4?t=12");
        assert_eq!(source.stem(), "a1B2c3D4");

        let source = Source::remote("https://host.example/share/a1B2c3D4/");
        assert_eq!(source.stem(), "a1B2c3D4");
    }

    #[test]
    fn test_remote_stem_sanitized() {
        let source = Source::remote("https://host.example/share/v%20odd");
        assert_eq!(source.stem(), "v-20odd");
    }

    #[test]
    fn test_degenerate_stem_falls_back() {
        let source = Source::remote("https://host.example");
        assert_eq!(source.stem(), "host.example");
    }
}
