//! Segment fetching: manifest -> one elementary stream file.
//!
//! Chunk downloads run concurrently under a bounded limit, but every
//! chunk's bytes land in an index-addressed part file and the stream is
//! assembled strictly in manifest order after a completeness check.
//! Arrival order never affects byte order; a wrong order would corrupt
//! the stream.

use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use url::Url;

use derush_models::{MediaKind, StreamManifest};

use crate::client::StreamClient;
use crate::error::FetchError;
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Maximum chunks downloaded concurrently per stream.
    pub max_concurrency: usize,
    /// Per-chunk retry behavior.
    pub retry: RetryConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            retry: RetryConfig::default(),
        }
    }
}

/// One chunk's failure, reported out of the download task.
struct ChunkFailure {
    index: usize,
    url: String,
    attempts: u32,
    message: String,
}

/// Downloads every chunk of a manifest and reassembles them in order.
#[derive(Clone)]
pub struct SegmentFetcher {
    client: StreamClient,
    config: FetcherConfig,
}

impl SegmentFetcher {
    pub fn new(client: StreamClient, config: FetcherConfig) -> Self {
        Self { client, config }
    }

    /// Fetch all chunks of `manifest` and write the assembled elementary
    /// stream to `dest`.
    ///
    /// Fails without writing `dest` if any chunk exhausts its retries; a
    /// partial stream is never produced. Dropping the returned future
    /// aborts all in-flight chunk downloads.
    pub async fn fetch_stream(
        &self,
        manifest: &StreamManifest,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let kind = manifest.kind;
        let total = manifest.len();
        if total == 0 {
            return Err(FetchError::EmptyManifest { kind });
        }

        debug!(%kind, chunks = total, dest = %dest.display(), "fetching stream");

        // Part files live next to the destination so assembly stays on
        // one filesystem; the directory is removed on every exit path.
        let parts_root = dest.parent().unwrap_or_else(|| Path::new("."));
        let parts = tempfile::Builder::new()
            .prefix("chunks_")
            .tempdir_in(parts_root)?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks: JoinSet<Result<usize, ChunkFailure>> = JoinSet::new();

        for (index, url) in manifest.segments.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let client = self.client.clone();
            let retry = self.config.retry.clone();
            let part_path = parts.path().join(format!("chunk_{index:05}.part"));

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(ChunkFailure {
                            index,
                            url: url.to_string(),
                            attempts: 0,
                            message: "download pool closed".to_string(),
                        })
                    }
                };

                download_chunk(&client, &retry, index, &url, &part_path).await
            });
        }

        let mut completed = vec![false; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(index)) => completed[index] = true,
                Ok(Err(failure)) => {
                    tasks.abort_all();
                    return Err(FetchError::ChunkFailed {
                        kind,
                        index: failure.index,
                        total,
                        url: failure.url,
                        attempts: failure.attempts,
                        message: failure.message,
                    });
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(FetchError::TaskFailed(e.to_string()));
                }
            }
        }

        // Validate completeness before touching the destination
        let got = completed.iter().filter(|c| **c).count();
        if got != total {
            return Err(FetchError::Incomplete {
                kind,
                got,
                expected: total,
            });
        }

        // Assemble in manifest order, regardless of completion order
        let mut out = tokio::fs::File::create(dest).await?;
        for index in 0..total {
            let part_path = parts.path().join(format!("chunk_{index:05}.part"));
            let bytes = tokio::fs::read(&part_path).await?;
            out.write_all(&bytes).await?;
        }
        out.flush().await?;

        info!(%kind, chunks = total, dest = %dest.display(), "stream assembled");
        Ok(())
    }
}

/// Download one chunk with retries into its part file.
async fn download_chunk(
    client: &StreamClient,
    retry: &RetryConfig,
    index: usize,
    url: &Url,
    part_path: &Path,
) -> Result<usize, ChunkFailure> {
    let operation = format!("chunk_{index}");
    let outcome = retry_async(retry, &operation, || async {
        client.get_bytes(url.clone(), None).await
    })
    .await;

    match outcome {
        RetryResult::Success(bytes) => {
            tokio::fs::write(part_path, &bytes)
                .await
                .map_err(|e| ChunkFailure {
                    index,
                    url: url.to_string(),
                    attempts: 1,
                    message: format!("failed to store chunk: {e}"),
                })?;
            Ok(index)
        }
        RetryResult::Failed { error, attempts } => Err(ChunkFailure {
            index,
            url: url.to_string(),
            attempts,
            message: error.to_string(),
        }),
    }
}
