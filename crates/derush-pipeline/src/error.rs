//! Pipeline error taxonomy.
//!
//! Every stage fails fast; the orchestrator wraps the failure with the
//! stage it came from so the caller gets a single actionable message.

use thiserror::Error;

use derush_media::MediaError;
use derush_models::MediaKind;
use derush_stream::{FetchError, ResolveError};

/// Errors from decoding the audio track into a loudness profile.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("audio track could not be decoded: {0}")]
    Decode(#[source] MediaError),

    #[error("no audio data in source")]
    NoAudioData,

    #[error("IO error reading samples: {0}")]
    Io(#[from] std::io::Error),
}

/// The pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Fetch,
    Mux,
    Analyze,
    Plan,
    Cut,
    Concat,
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Mux => "mux",
            Stage::Analyze => "analyze",
            Stage::Plan => "plan",
            Stage::Cut => "cut",
            Stage::Concat => "concat",
            Stage::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage-tagged pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("manifest resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("{kind} stream fetch failed: {source}")]
    Fetch {
        kind: MediaKind,
        #[source]
        source: FetchError,
    },

    #[error("muxing failed: {0}")]
    Mux(#[source] MediaError),

    #[error("audio analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    /// The whole source is silence: a valid outcome, not a crash, but
    /// there is nothing to produce.
    #[error("nothing to keep: the entire source is silence")]
    NoContent,

    #[error("cutting keep range {index} failed: {source}")]
    Cut {
        index: usize,
        #[source]
        source: MediaError,
    },

    #[error("concatenation failed: {0}")]
    Concat(#[source] MediaError),

    #[error("probing media failed: {0}")]
    Probe(#[source] MediaError),

    #[error("pipeline setup failed: {0}")]
    Setup(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The stage this failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Resolution(_) => Stage::Resolve,
            PipelineError::Fetch { .. } => Stage::Fetch,
            PipelineError::Mux(_) => Stage::Mux,
            PipelineError::Analysis(_) | PipelineError::Probe(_) => Stage::Analyze,
            PipelineError::NoContent => Stage::Plan,
            PipelineError::Cut { .. } => Stage::Cut,
            PipelineError::Concat(_) => Stage::Concat,
            PipelineError::Setup(_) | PipelineError::Cancelled | PipelineError::Io(_) => {
                Stage::Finalize
            }
        }
    }

    /// True when the underlying cause was an external tool timeout.
    pub fn is_external_timeout(&self) -> bool {
        match self {
            PipelineError::Mux(e)
            | PipelineError::Cut { source: e, .. }
            | PipelineError::Concat(e)
            | PipelineError::Probe(e) => e.is_timeout(),
            PipelineError::Analysis(AnalysisError::Decode(e)) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tagging() {
        assert_eq!(PipelineError::NoContent.stage(), Stage::Plan);
        assert_eq!(
            PipelineError::Cut {
                index: 2,
                source: MediaError::NoClips
            }
            .stage(),
            Stage::Cut
        );
        assert_eq!(
            PipelineError::Analysis(AnalysisError::NoAudioData).stage(),
            Stage::Analyze
        );
    }

    #[test]
    fn test_timeout_detection() {
        let err = PipelineError::Mux(MediaError::Timeout(600));
        assert!(err.is_external_timeout());
        assert!(!PipelineError::NoContent.is_external_timeout());
    }
}
