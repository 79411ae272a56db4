//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration.
///
/// Scratch and output locations are provided by the caller; nothing is
/// hard-coded. All knobs can be overridden via `DERUSH_*` environment
/// variables through [`PipelineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Writable root for per-run scratch directories.
    pub scratch_root: PathBuf,
    /// Writable destination for final artifacts.
    pub output_root: PathBuf,
    /// Maximum chunks downloaded concurrently per stream.
    pub chunk_concurrency: usize,
    /// Per-chunk retry count (not including the initial attempt).
    pub chunk_retries: u32,
    /// Base delay for chunk retry backoff.
    pub retry_base_delay: Duration,
    /// Timeout for each external media-engine invocation.
    pub tool_timeout: Duration,
    /// Preferred video variant bandwidth.
    pub preferred_bandwidth: u64,
    /// Optional session cookie for non-public videos.
    pub cookie: Option<String>,
}

impl PipelineConfig {
    /// Create a config with defaults for the given scratch and output
    /// roots.
    pub fn new(scratch_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            output_root: output_root.into(),
            chunk_concurrency: 5,
            chunk_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            tool_timeout: Duration::from_secs(600),
            preferred_bandwidth: 3_200_000,
            cookie: None,
        }
    }

    /// Create a config from environment variables.
    pub fn from_env() -> Self {
        let scratch_root =
            std::env::var("DERUSH_SCRATCH_DIR").unwrap_or_else(|_| "/tmp/derush".to_string());
        let output_root = std::env::var("DERUSH_OUTPUT_DIR").unwrap_or_else(|_| ".".to_string());

        let mut config = Self::new(scratch_root, output_root);

        if let Some(n) = env_parse("DERUSH_CHUNK_CONCURRENCY") {
            config.chunk_concurrency = n;
        }
        if let Some(n) = env_parse("DERUSH_CHUNK_RETRIES") {
            config.chunk_retries = n;
        }
        if let Some(ms) = env_parse("DERUSH_RETRY_BASE_DELAY_MS") {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse("DERUSH_TOOL_TIMEOUT_SECS") {
            config.tool_timeout = Duration::from_secs(secs);
        }
        if let Some(bw) = env_parse("DERUSH_PREFERRED_BANDWIDTH") {
            config.preferred_bandwidth = bw;
        }
        if let Ok(cookie) = std::env::var("DERUSH_COOKIE") {
            if !cookie.is_empty() {
                config.cookie = Some(cookie);
            }
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new("/tmp/scratch", "/tmp/out");
        assert_eq!(config.chunk_concurrency, 5);
        assert_eq!(config.chunk_retries, 3);
        assert_eq!(config.tool_timeout, Duration::from_secs(600));
        assert_eq!(config.preferred_bandwidth, 3_200_000);
        assert!(config.cookie.is_none());
    }
}
