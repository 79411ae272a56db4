//! Error types for manifest resolution and segment fetching.

use derush_models::MediaKind;
use thiserror::Error;

/// A single HTTP request failure, distinguishing transport problems from
/// unexpected status codes.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Errors locating the audio/video manifests for a source.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The host page contained no recognizable master playlist URL.
    #[error("no HLS master playlist found in page markup")]
    ManifestNotFound,

    /// The master playlist carries no track of the required kind.
    #[error("no {kind} track in master playlist")]
    MissingTrack { kind: MediaKind },

    /// A playlist document was fetched but could not be understood.
    #[error("unusable playlist at {url}: {message}")]
    BadPlaylist { url: String, message: String },

    /// The host was unreachable or answered with an error status.
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors reassembling an elementary stream from its chunks.
#[derive(Debug, Error)]
pub enum FetchError {
    /// One chunk failed every retry; the whole stream fetch is aborted
    /// rather than desyncing audio from video by skipping it.
    #[error("{kind} chunk {index}/{total} ({url}) failed after {attempts} attempts: {message}")]
    ChunkFailed {
        kind: MediaKind,
        index: usize,
        total: usize,
        url: String,
        attempts: u32,
        message: String,
    },

    /// Completeness validation failed before assembly.
    #[error("{kind} stream incomplete: {got} of {expected} chunks fetched")]
    Incomplete {
        kind: MediaKind,
        got: usize,
        expected: usize,
    },

    #[error("{kind} manifest has no segments")]
    EmptyManifest { kind: MediaKind },

    #[error("chunk download task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// The chunk index this failure refers to, when applicable.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            FetchError::ChunkFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}
