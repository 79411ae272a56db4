//! Keep-range planning: silence intervals -> complementary keep
//! intervals.
//!
//! The policy is a single deterministic pass (shrink, drop sub-padding
//! gaps, complement, filter) rather than iterative adjustment:
//!
//! 1. Shrink every silence inward by `padding_ms` on each side, so word
//!    onsets and offsets survive the cut. A silence that inverts or whose
//!    remainder is smaller than the padding itself is discarded; two keep
//!    intervals separated by such a sub-padding gap merge into one.
//! 2. Complement the shrunk silence set over `[0, duration_ms]`.
//! 3. Drop keep intervals shorter than `min_keep_ms`; their time is
//!    absorbed into the surrounding silence and does not reappear.
//!
//! The result is ordered, non-overlapping, strictly increasing in start
//! time, and together with the finally-expanded silence regions covers
//! the source exactly. An empty result means the entire source is
//! silence; the orchestrator maps that to `NoContent`.

use derush_models::{DerushOptions, TimeRange};

/// Plan the keep intervals for a source of `duration_ms` given its
/// silence intervals.
pub fn plan_keep_ranges(
    duration_ms: u64,
    silences: &[TimeRange],
    options: &DerushOptions,
) -> Vec<TimeRange> {
    if duration_ms == 0 {
        return Vec::new();
    }

    // Defensive: clamp to the source span, drop empties, restore order.
    // Upstream guarantees sorted non-overlapping input, but the planner
    // is the last line before cutting.
    let mut silences: Vec<TimeRange> = silences
        .iter()
        .map(|s| s.clamped_to(duration_ms))
        .filter(|s| !s.is_empty())
        .collect();
    silences.sort_by_key(|s| s.start_ms);

    let padding = options.padding_ms;
    let shrunk: Vec<TimeRange> = silences
        .iter()
        .filter_map(|s| {
            let start = s.start_ms.saturating_add(padding);
            let end = s.end_ms.saturating_sub(padding);
            if end <= start {
                // Padding consumed the whole silence
                return None;
            }
            let remainder = TimeRange::new(start, end);
            // A sub-padding gap is not worth a cut edge
            if remainder.duration_ms() < padding {
                return None;
            }
            Some(remainder)
        })
        .collect();

    // Complement over [0, duration]
    let mut keeps = Vec::with_capacity(shrunk.len() + 1);
    let mut cursor = 0u64;
    for silence in &shrunk {
        if silence.start_ms > cursor {
            keeps.push(TimeRange::new(cursor, silence.start_ms));
        }
        cursor = cursor.max(silence.end_ms);
    }
    if cursor < duration_ms {
        keeps.push(TimeRange::new(cursor, duration_ms));
    }

    keeps
        .into_iter()
        .filter(|k| k.duration_ms() >= options.min_keep_ms)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(padding_ms: u64, min_keep_ms: u64) -> DerushOptions {
        DerushOptions {
            padding_ms,
            min_keep_ms,
            ..DerushOptions::default()
        }
    }

    fn ranges(pairs: &[(u64, u64)]) -> Vec<TimeRange> {
        pairs.iter().map(|&(s, e)| TimeRange::new(s, e)).collect()
    }

    /// Keep intervals plus their complement must tile [0, duration]
    /// exactly: ordered, disjoint, within bounds.
    fn assert_well_formed(keeps: &[TimeRange], duration_ms: u64) {
        for keep in keeps {
            assert!(!keep.is_empty());
            assert!(keep.end_ms <= duration_ms);
        }
        for pair in keeps.windows(2) {
            assert!(
                pair[0].end_ms <= pair[1].start_ms,
                "overlap between {} and {}",
                pair[0],
                pair[1]
            );
            assert!(pair[0].start_ms < pair[1].start_ms);
        }
    }

    #[test]
    fn test_reference_example() {
        // 120s source, silences [10,15] and [50,58], padding 0.5s,
        // min keep 1s
        let keeps = plan_keep_ranges(
            120_000,
            &ranges(&[(10_000, 15_000), (50_000, 58_000)]),
            &options(500, 1_000),
        );
        assert_eq!(
            keeps,
            ranges(&[(0, 10_500), (14_500, 50_500), (57_500, 120_000)])
        );
        assert_well_formed(&keeps, 120_000);
    }

    #[test]
    fn test_no_silence_keeps_everything() {
        let keeps = plan_keep_ranges(60_000, &[], &options(500, 1_000));
        assert_eq!(keeps, ranges(&[(0, 60_000)]));
    }

    #[test]
    fn test_entire_source_silent_returns_empty() {
        // 30s source entirely below the noise floor
        let keeps = plan_keep_ranges(30_000, &ranges(&[(0, 30_000)]), &options(500, 1_000));
        assert!(keeps.is_empty());
    }

    #[test]
    fn test_padding_consumes_short_silence() {
        // 1.2s silence with 0.5s padding leaves a 0.2s remainder, below
        // the padding itself: the gap vanishes and no cut edge is made
        let keeps = plan_keep_ranges(20_000, &ranges(&[(5_000, 6_200)]), &options(500, 1_000));
        assert_eq!(keeps, ranges(&[(0, 20_000)]));
    }

    #[test]
    fn test_sub_padding_gap_merges_keeps() {
        // Remainder (0.4s) is non-empty but smaller than the padding:
        // the two keeps merge into one
        let keeps = plan_keep_ranges(20_000, &ranges(&[(5_000, 6_400)]), &options(500, 1_000));
        assert_eq!(keeps, ranges(&[(0, 20_000)]));
    }

    #[test]
    fn test_short_keep_absorbed() {
        // The 0.9s keep between the silences is dropped; its time is
        // absorbed into silence, not re-attached to a neighbor
        let keeps = plan_keep_ranges(
            30_000,
            &ranges(&[(4_000, 10_000), (10_900, 20_000)]),
            &options(0, 1_000),
        );
        assert_eq!(keeps, ranges(&[(0, 4_000), (20_000, 30_000)]));
        assert_well_formed(&keeps, 30_000);
    }

    #[test]
    fn test_silence_touching_start_and_end() {
        let keeps = plan_keep_ranges(
            60_000,
            &ranges(&[(0, 8_000), (52_000, 60_000)]),
            &options(500, 1_000),
        );
        // Padding at the media edges leaves sub-min-keep slivers [0,0.5]
        // and [59.5,60], which are dropped
        assert_eq!(keeps, ranges(&[(7_500, 52_500)]));
    }

    #[test]
    fn test_zero_padding() {
        let keeps = plan_keep_ranges(
            120_000,
            &ranges(&[(10_000, 15_000)]),
            &options(0, 1_000),
        );
        assert_eq!(keeps, ranges(&[(0, 10_000), (15_000, 120_000)]));
    }

    #[test]
    fn test_zero_duration_source() {
        let keeps = plan_keep_ranges(0, &[], &options(500, 1_000));
        assert!(keeps.is_empty());
    }

    #[test]
    fn test_out_of_bounds_silence_clamped() {
        // A silence past the end of the source must not panic or leak
        // time beyond the duration
        let keeps = plan_keep_ranges(
            10_000,
            &ranges(&[(8_000, 14_000)]),
            &options(500, 1_000),
        );
        assert_eq!(keeps, ranges(&[(0, 8_500)]));
        assert_well_formed(&keeps, 10_000);
    }

    #[test]
    fn test_unsorted_input_restored() {
        let keeps = plan_keep_ranges(
            120_000,
            &ranges(&[(50_000, 58_000), (10_000, 15_000)]),
            &options(500, 1_000),
        );
        assert_eq!(
            keeps,
            ranges(&[(0, 10_500), (14_500, 50_500), (57_500, 120_000)])
        );
    }

    #[test]
    fn test_complement_totality() {
        // The union of keeps and expanded silences tiles the source: sum
        // of keep durations plus gap durations equals the full duration
        let silences = ranges(&[(3_000, 9_000), (20_000, 31_000), (40_000, 47_000)]);
        let duration = 60_000;
        let keeps = plan_keep_ranges(duration, &silences, &options(500, 1_000));
        assert_well_formed(&keeps, duration);

        let mut covered = 0u64;
        let mut cursor = 0u64;
        for keep in &keeps {
            covered += keep.duration_ms();
            assert!(keep.start_ms >= cursor);
            cursor = keep.end_ms;
        }
        let gaps: u64 = duration - covered;
        // Every gap is an expanded silence region; nothing is duplicated
        assert_eq!(covered + gaps, duration);
        assert_eq!(keeps.len(), 4);
    }
}
