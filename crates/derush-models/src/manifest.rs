//! Stream manifests for chunked adaptive delivery.

use std::fmt;
use url::Url;

/// Which elementary track a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of chunk URLs for one elementary track.
///
/// Chunks are contiguous and gapless in playback time; their order is
/// significant and must be preserved when the stream is reassembled.
/// URLs are absolute and already carry any signing query string.
#[derive(Debug, Clone)]
pub struct StreamManifest {
    pub kind: MediaKind,
    pub segments: Vec<Url>,
}

impl StreamManifest {
    pub fn new(kind: MediaKind, segments: Vec<Url>) -> Self {
        Self { kind, segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(MediaKind::Audio.to_string(), "audio");
        assert_eq!(MediaKind::Video.as_str(), "video");
    }

    #[test]
    fn test_manifest_len() {
        let manifest = StreamManifest::new(
            MediaKind::Video,
            vec![
                Url::parse("https://cdn.example.com/v/0.ts").unwrap(),
                Url::parse("https://cdn.example.com/v/1.ts").unwrap(),
            ],
        );
        assert_eq!(manifest.len(), 2);
        assert!(!manifest.is_empty());
    }
}
