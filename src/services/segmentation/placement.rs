// Component Placement
// Decides how non-text units attach to the segments around them

use crate::models::{ContentUnit, Segment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Placement {
    /// Own segment, nothing else in it.
    Standalone,
    /// Joins the content right before it.
    FollowsPrevious,
    /// Joins whatever segment is being built next.
    #[default]
    FollowsNext,
}

/// Placement per non-text unit kind.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementTable {
    pub image: Placement,
    pub mention: Placement,
    pub face_icon: Placement,
    pub other: Placement,
}

impl PlacementTable {
    /// `None` for units that are not placed by kind (text, reply markers).
    pub fn placement_for(&self, unit: &ContentUnit) -> Option<Placement> {
        match unit {
            ContentUnit::Text { .. } | ContentUnit::ReplyMarker { .. } => None,
            ContentUnit::Image { .. } => Some(self.image),
            ContentUnit::Mention { .. } => Some(self.mention),
            ContentUnit::FaceIcon { .. } => Some(self.face_icon),
            ContentUnit::Audio { .. } | ContentUnit::Other { .. } => Some(self.other),
        }
    }
}

/// Emitted segments plus the one still being built.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    segments: Vec<Segment>,
    current: Segment,
    /// The last emitted segment is a standalone unit and takes no followers.
    last_sealed: bool,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the in-progress segment if it holds anything.
    pub fn flush(&mut self) {
        if !self.current.is_empty() {
            self.segments.push(std::mem::take(&mut self.current));
            self.last_sealed = false;
        }
    }

    pub fn push_text(&mut self, text: &str) {
        self.current.push_text(text);
    }

    pub fn push(&mut self, unit: ContentUnit) {
        self.current.push(unit);
    }

    pub fn place(&mut self, unit: ContentUnit, placement: Placement) {
        match placement {
            Placement::Standalone => {
                self.flush();
                self.segments.push(Segment::single(unit));
                self.last_sealed = true;
            }
            Placement::FollowsPrevious => {
                // Pending content is the nearest predecessor; jumping over it
                // to the last emitted segment would reorder the reply.
                match self.segments.last_mut() {
                    Some(last) if self.current.is_empty() && !self.last_sealed => last.push(unit),
                    _ => self.current.push(unit),
                }
            }
            Placement::FollowsNext => self.current.push(unit),
        }
    }

    pub fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_for_units() {
        let table = PlacementTable {
            image: Placement::Standalone,
            mention: Placement::FollowsNext,
            face_icon: Placement::FollowsPrevious,
            other: Placement::FollowsNext,
        };
        assert_eq!(table.placement_for(&ContentUnit::image("a")), Some(Placement::Standalone));
        assert_eq!(table.placement_for(&ContentUnit::face("1")), Some(Placement::FollowsPrevious));
        assert_eq!(table.placement_for(&ContentUnit::audio("x.mp3")), Some(Placement::FollowsNext));
        assert_eq!(table.placement_for(&ContentUnit::text("hi")), None);
        assert_eq!(table.placement_for(&ContentUnit::reply_marker("1")), None);
    }

    #[test]
    fn test_standalone_isolates_unit() {
        let mut buf = SegmentBuffer::new();
        buf.push_text("before");
        buf.place(ContentUnit::image("a.png"), Placement::Standalone);
        buf.push_text("after");
        let segs = buf.finish();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1], Segment::single(ContentUnit::image("a.png")));
    }

    #[test]
    fn test_follows_previous_joins_last_emitted() {
        let mut buf = SegmentBuffer::new();
        buf.push_text("Hello.");
        buf.flush();
        buf.place(ContentUnit::face("14"), Placement::FollowsPrevious);
        buf.push_text("Next");
        let segs = buf.finish();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].units, vec![ContentUnit::text("Hello."), ContentUnit::face("14")]);
    }

    #[test]
    fn test_follows_previous_prefers_pending_content() {
        let mut buf = SegmentBuffer::new();
        buf.push_text("One.");
        buf.flush();
        buf.push_text("Two");
        buf.place(ContentUnit::face("1"), Placement::FollowsPrevious);
        let segs = buf.finish();
        assert_eq!(segs[1].units, vec![ContentUnit::text("Two"), ContentUnit::face("1")]);
    }

    #[test]
    fn test_standalone_segment_takes_no_followers() {
        let mut buf = SegmentBuffer::new();
        buf.push_text("Look.");
        buf.flush();
        buf.place(ContentUnit::image("a.png"), Placement::Standalone);
        buf.place(ContentUnit::face("2"), Placement::FollowsPrevious);
        buf.push_text("Nice");
        let segs = buf.finish();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1], Segment::single(ContentUnit::image("a.png")));
        assert_eq!(segs[2].units, vec![ContentUnit::face("2"), ContentUnit::text("Nice")]);
    }

    #[test]
    fn test_follows_previous_with_nothing_before_starts_segment() {
        let mut buf = SegmentBuffer::new();
        buf.place(ContentUnit::face("1"), Placement::FollowsPrevious);
        buf.push_text("text");
        let segs = buf.finish();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].len(), 2);
    }

    #[test]
    fn test_follows_next_joins_upcoming_text() {
        let mut buf = SegmentBuffer::new();
        buf.push_text("A.");
        buf.flush();
        buf.place(ContentUnit::mention("bob"), Placement::FollowsNext);
        buf.push_text("hi");
        let segs = buf.finish();
        assert_eq!(segs[1].units, vec![ContentUnit::mention("bob"), ContentUnit::text("hi")]);
    }
}
