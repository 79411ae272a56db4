//! Manifest resolution: share page -> audio/video chunk manifests.
//!
//! The master playlist URL is embedded somewhere in the host page's
//! markup (script tags, JSON config blobs), not exposed by a clean API,
//! so extraction is a best-effort pattern match. Everything after that is
//! regular HLS: pick a video variant by bandwidth, pick the default audio
//! rendition, expand both media playlists into absolute, signed segment
//! URLs.

use m3u8_rs::{AlternativeMedia, AlternativeMediaType, Playlist, VariantStream};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};
use url::Url;

use derush_models::{MediaKind, StreamManifest};

use crate::client::StreamClient;
use crate::error::ResolveError;

/// Matches a signed HLS master playlist URL inside page markup.
const MASTER_URL_PATTERN: &str = r#"https?://[^"'\s\\]+?/playlist\.m3u8\?[^"'\s\\]+"#;

fn master_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MASTER_URL_PATTERN).expect("master playlist pattern is valid"))
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Preferred video variant BANDWIDTH; falls back to the highest
    /// available when absent. 3.2 Mbit/s selects 1080p on typical hosts.
    pub preferred_bandwidth: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            preferred_bandwidth: 3_200_000,
        }
    }
}

/// The two manifests a source resolves to.
#[derive(Debug, Clone)]
pub struct ResolvedStreams {
    pub audio: StreamManifest,
    pub video: StreamManifest,
}

/// Discovers the audio and video chunk manifests behind a share URL.
pub struct ManifestResolver {
    client: StreamClient,
    config: ResolverConfig,
}

impl ManifestResolver {
    pub fn new(client: StreamClient, config: ResolverConfig) -> Self {
        Self { client, config }
    }

    /// Resolve a share URL into one audio and one video manifest.
    pub async fn resolve(&self, share_url: &str) -> Result<ResolvedStreams, ResolveError> {
        let page_url = Url::parse(share_url)?;
        let referer = origin_of(&page_url);

        debug!(url = share_url, "fetching share page");
        let html = self
            .client
            .get_text(page_url.clone(), Some(&referer))
            .await?;

        let master_url_str = master_url_regex()
            .find(&html)
            .map(|m| m.as_str())
            .ok_or(ResolveError::ManifestNotFound)?;
        let master_url = Url::parse(master_url_str)?;
        // Segment URLs are signed with the master playlist's query string
        let query = master_url.query().map(str::to_owned);

        debug!(url = %master_url, "fetching master playlist");
        let master_text = self
            .client
            .get_text(master_url.clone(), Some(&referer))
            .await?;

        let master = match m3u8_rs::parse_playlist_res(master_text.as_bytes()) {
            Ok(Playlist::MasterPlaylist(pl)) => pl,
            Ok(Playlist::MediaPlaylist(_)) => {
                return Err(ResolveError::BadPlaylist {
                    url: master_url.to_string(),
                    message: "expected a master playlist, found a media playlist".to_string(),
                })
            }
            Err(e) => {
                return Err(ResolveError::BadPlaylist {
                    url: master_url.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let video_uri = select_video_variant(&master.variants, self.config.preferred_bandwidth)
            .ok_or(ResolveError::MissingTrack {
                kind: MediaKind::Video,
            })?
            .uri
            .clone();

        let audio_uri = select_audio_rendition(&master.alternatives)
            .and_then(|m| m.uri.clone())
            .ok_or(ResolveError::MissingTrack {
                kind: MediaKind::Audio,
            })?;

        let video = self
            .load_media_playlist(&master_url, &video_uri, query.as_deref(), MediaKind::Video, &referer)
            .await?;
        let audio = self
            .load_media_playlist(&master_url, &audio_uri, query.as_deref(), MediaKind::Audio, &referer)
            .await?;

        info!(
            video_chunks = video.len(),
            audio_chunks = audio.len(),
            "resolved stream manifests"
        );

        Ok(ResolvedStreams { audio, video })
    }

    /// Fetch one media playlist and expand it into absolute segment URLs.
    async fn load_media_playlist(
        &self,
        base: &Url,
        uri: &str,
        query: Option<&str>,
        kind: MediaKind,
        referer: &str,
    ) -> Result<StreamManifest, ResolveError> {
        let playlist_url = resolve_with_query(base, uri, query)?;

        debug!(%kind, url = %playlist_url, "fetching media playlist");
        let text = self
            .client
            .get_text(playlist_url.clone(), Some(referer))
            .await?;

        let playlist = match m3u8_rs::parse_playlist_res(text.as_bytes()) {
            Ok(Playlist::MediaPlaylist(pl)) => pl,
            Ok(Playlist::MasterPlaylist(_)) => {
                return Err(ResolveError::BadPlaylist {
                    url: playlist_url.to_string(),
                    message: "expected a media playlist, found a master playlist".to_string(),
                })
            }
            Err(e) => {
                return Err(ResolveError::BadPlaylist {
                    url: playlist_url.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let segments = playlist
            .segments
            .iter()
            .map(|seg| resolve_with_query(&playlist_url, &seg.uri, query))
            .collect::<Result<Vec<_>, _>>()?;

        if segments.is_empty() {
            return Err(ResolveError::BadPlaylist {
                url: playlist_url.to_string(),
                message: "playlist contains no segments".to_string(),
            });
        }

        Ok(StreamManifest::new(kind, segments))
    }
}

/// Prefer the configured bandwidth, fall back to the best available.
fn select_video_variant(variants: &[VariantStream], preferred: u64) -> Option<&VariantStream> {
    variants
        .iter()
        .find(|v| v.bandwidth == preferred)
        .or_else(|| variants.iter().max_by_key(|v| v.bandwidth))
}

/// Prefer the default audio rendition, fall back to any audio rendition.
fn select_audio_rendition(alternatives: &[AlternativeMedia]) -> Option<&AlternativeMedia> {
    let audio = |m: &&AlternativeMedia| {
        m.media_type == AlternativeMediaType::Audio && m.uri.is_some()
    };
    alternatives
        .iter()
        .filter(audio)
        .find(|m| m.default)
        .or_else(|| alternatives.iter().find(audio))
}

/// Resolve a possibly relative playlist URI and attach the signing query
/// when the target carries none of its own.
fn resolve_with_query(base: &Url, uri: &str, query: Option<&str>) -> Result<Url, ResolveError> {
    let mut url = if uri.starts_with("http://") || uri.starts_with("https://") {
        Url::parse(uri)?
    } else {
        base.join(uri)?
    };
    if url.query().is_none() {
        url.set_query(query);
    }
    Ok(url)
}

fn origin_of(url: &Url) -> String {
    match url.host_str() {
        Some(host) => format!("{}://{}/", url.scheme(), host),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_url_extraction() {
        let html = r#"<script>{"hls":"https://cdn.example.com/abc/resource/hls/playlist.m3u8?Policy=xyz&Signature=123"}</script>"#;
        let m = master_url_regex().find(html).unwrap();
        assert_eq!(
            m.as_str(),
            "https://cdn.example.com/abc/resource/hls/playlist.m3u8?Policy=xyz&Signature=123"
        );
    }

    #[test]
    fn test_master_url_absent() {
        assert!(master_url_regex().find("<html>nothing here</html>").is_none());
    }

    #[test]
    fn test_resolve_relative_uri_inherits_query() {
        let base = Url::parse("https://cdn.example.com/hls/playlist.m3u8?sig=abc").unwrap();
        let resolved = resolve_with_query(&base, "video-1080p.m3u8", Some("sig=abc")).unwrap();
        assert_eq!(
            resolved.as_str(),
            "https://cdn.example.com/hls/video-1080p.m3u8?sig=abc"
        );
    }

    #[test]
    fn test_resolve_absolute_uri_keeps_own_query() {
        let base = Url::parse("https://cdn.example.com/hls/playlist.m3u8?sig=abc").unwrap();
        let resolved =
            resolve_with_query(&base, "https://other.example.com/seg.ts?tok=9", Some("sig=abc"))
                .unwrap();
        assert_eq!(resolved.as_str(), "https://other.example.com/seg.ts?tok=9");
    }

    fn parse_master(text: &str) -> m3u8_rs::MasterPlaylist {
        match m3u8_rs::parse_playlist_res(text.as_bytes()).expect("playlist should parse") {
            Playlist::MasterPlaylist(pl) => pl,
            Playlist::MediaPlaylist(_) => panic!("expected master playlist"),
        }
    }

    #[test]
    fn test_variant_selection() {
        let master = parse_master(
            "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=1500000\nv720.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=3200000\nv1080.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=800000\nv360.m3u8\n",
        );

        let chosen = select_video_variant(&master.variants, 3_200_000).unwrap();
        assert_eq!(chosen.uri, "v1080.m3u8");

        // Preferred bandwidth missing: fall back to the highest
        let chosen = select_video_variant(&master.variants, 9_999_999).unwrap();
        assert_eq!(chosen.uri, "v1080.m3u8");

        assert!(select_video_variant(&[], 1).is_none());
    }

    #[test]
    fn test_audio_rendition_selection() {
        let master = parse_master(
            "#EXTM3U\n\
             #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"alt\",URI=\"a-low.m3u8\"\n\
             #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"main\",DEFAULT=YES,URI=\"a-main.m3u8\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=3200000,AUDIO=\"audio\"\nv1080.m3u8\n",
        );
        assert_eq!(
            select_audio_rendition(&master.alternatives)
                .unwrap()
                .uri
                .as_deref(),
            Some("a-main.m3u8")
        );

        // No default flagged: any audio rendition with a URI
        let master = parse_master(
            "#EXTM3U\n\
             #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"only\",URI=\"a-only.m3u8\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=3200000,AUDIO=\"audio\"\nv1080.m3u8\n",
        );
        assert_eq!(
            select_audio_rendition(&master.alternatives)
                .unwrap()
                .uri
                .as_deref(),
            Some("a-only.m3u8")
        );

        assert!(select_audio_rendition(&[]).is_none());
    }
}
