// Overflow Limiter
// Caps segment count by folding the tail into the last kept segment

use crate::models::Segment;

/// Keep at most `max_segments` segments (0 = unlimited). The first
/// `max_segments - 1` pass through; everything after is merged, in order,
/// into one final segment.
pub fn limit_segments(mut segments: Vec<Segment>, max_segments: usize) -> Vec<Segment> {
    if max_segments == 0 || segments.len() <= max_segments {
        return segments;
    }

    let tail = segments.split_off(max_segments - 1);
    let merged = tail
        .into_iter()
        .fold(Segment::new(), |mut acc, seg| {
            acc.units.extend(seg.units);
            acc
        });
    segments.push(merged);
    segments
}
