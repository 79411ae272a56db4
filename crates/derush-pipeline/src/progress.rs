//! Run progress reporting.

use std::sync::Arc;

use crate::error::Stage;

/// A coarse progress update for one pipeline run.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// The stage that just advanced.
    pub stage: Stage,
    /// Overall run progress, 0..=100.
    pub percent: u8,
}

/// Callback invoked with progress updates.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Interpolate per-clip progress across the cutting stage's span.
pub(crate) fn cut_percent(done: usize, total: usize) -> u8 {
    const CUT_START: u8 = 60;
    const CUT_END: u8 = 90;
    if total == 0 {
        return CUT_END;
    }
    let span = (CUT_END - CUT_START) as usize;
    CUT_START + ((done * span) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_percent_bounds() {
        assert_eq!(cut_percent(0, 4), 60);
        assert_eq!(cut_percent(2, 4), 75);
        assert_eq!(cut_percent(4, 4), 90);
        assert_eq!(cut_percent(0, 0), 90);
    }
}
