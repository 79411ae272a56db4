//! De-rush options.
//!
//! These parameters control how aggressively silence is detected and cut.

use serde::{Deserialize, Serialize};

/// Options for silence detection and keep-range planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerushOptions {
    /// Loudness threshold in dBFS at or below which a window counts as
    /// silent.
    ///
    /// - Higher values (-35): aggressive, quiet speech may be cut
    /// - Default (-45): balanced for voice-over recordings
    /// - Lower values (-55): only near-digital-silence is cut
    pub noise_floor_db: f32,

    /// Optional loudness ceiling in dBFS.
    ///
    /// When set, windows louder than this also count as non-content
    /// (useful against clipped noise bursts). Disabled by default.
    pub max_loudness_db: Option<f32>,

    /// Minimum silent run duration before it becomes a silence interval
    /// (milliseconds).
    pub min_silence_ms: u64,

    /// Time retained just inside each silence boundary, protecting word
    /// onsets and offsets (milliseconds).
    pub padding_ms: u64,

    /// Keep intervals shorter than this are dropped and absorbed into the
    /// surrounding silence (milliseconds).
    pub min_keep_ms: u64,

    /// When true, stop after reconstruction: no silence analysis or
    /// re-cutting is performed.
    pub skip_derush: bool,
}

impl Default for DerushOptions {
    fn default() -> Self {
        Self {
            noise_floor_db: -45.0,
            max_loudness_db: None,
            min_silence_ms: 1_000,
            padding_ms: 500,
            min_keep_ms: 1_000,
            skip_derush: false,
        }
    }
}

impl DerushOptions {
    /// Builder-style setter for the noise floor.
    pub fn with_noise_floor_db(mut self, db: f32) -> Self {
        self.noise_floor_db = db;
        self
    }

    /// Builder-style setter for the minimum silence duration.
    pub fn with_min_silence_ms(mut self, ms: u64) -> Self {
        self.min_silence_ms = ms;
        self
    }

    /// Builder-style setter for boundary padding.
    pub fn with_padding_ms(mut self, ms: u64) -> Self {
        self.padding_ms = ms;
        self
    }

    /// Builder-style setter for the minimum keep duration.
    pub fn with_min_keep_ms(mut self, ms: u64) -> Self {
        self.min_keep_ms = ms;
        self
    }

    /// Builder-style setter for the loudness ceiling.
    pub fn with_max_loudness_db(mut self, db: f32) -> Self {
        self.max_loudness_db = Some(db);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DerushOptions::default();
        assert!((options.noise_floor_db - (-45.0)).abs() < f32::EPSILON);
        assert_eq!(options.min_silence_ms, 1_000);
        assert_eq!(options.padding_ms, 500);
        assert_eq!(options.min_keep_ms, 1_000);
        assert!(options.max_loudness_db.is_none());
        assert!(!options.skip_derush);
    }

    #[test]
    fn test_builder() {
        let options = DerushOptions::default()
            .with_noise_floor_db(-38.0)
            .with_min_silence_ms(400)
            .with_max_loudness_db(-10.0);
        assert!((options.noise_floor_db - (-38.0)).abs() < f32::EPSILON);
        assert_eq!(options.min_silence_ms, 400);
        assert_eq!(options.max_loudness_db, Some(-10.0));
    }
}
