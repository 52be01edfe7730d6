// Segmentation Module
// Turns one reply into an ordered list of delivery segments:
// - tokenizer: delimiter cutting with bracket/quote awareness
// - placement: where non-text units attach
// - assembler: drives both over the unit sequence
// - overflow: caps the number of segments
// - pacing: wait between segment sends

pub mod tokenizer;
pub mod placement;
pub mod assembler;
pub mod overflow;
pub mod pacing;

pub use assembler::assemble_segments;
pub use overflow::limit_segments;
pub use pacing::PacingModel;
pub use placement::{Placement, PlacementTable, SegmentBuffer};
pub use tokenizer::{Chunk, Delimiter, NestingTable, Tokenizer};

use crate::models::{ContentUnit, Segment};
use crate::services::config_store::SegmentationRules;

/// Assemble and cap segments in one step.
pub fn plan_segments(
    units: &[ContentUnit],
    rules: &SegmentationRules,
    keep_reply_markers: bool,
) -> Vec<Segment> {
    let segments = assemble_segments(units, rules, keep_reply_markers);
    limit_segments(segments, rules.max_segments)
}
