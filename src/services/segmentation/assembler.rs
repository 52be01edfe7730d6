// Segment Assembler
// Builds delivery segments from a reply's unit sequence

use crate::models::{ContentUnit, Segment};
use crate::services::config_store::SegmentationRules;
use super::placement::SegmentBuffer;
use super::tokenizer::Tokenizer;

/// Partition `units` into segments.
///
/// Text runs are cut at delimiter matches (bracket-aware when the rules carry
/// a nesting table); every other unit is placed per the placement table.
/// Reply markers survive only when `keep_reply_markers` is set. Blank
/// segments are dropped; a reply marker in a dropped segment moves to the
/// front of the next kept one, or to the end of the last kept one when
/// nothing follows.
pub fn assemble_segments(
    units: &[ContentUnit],
    rules: &SegmentationRules,
    keep_reply_markers: bool,
) -> Vec<Segment> {
    let mut buffer = SegmentBuffer::new();

    for unit in units {
        match unit {
            ContentUnit::Text { text } => match rules.delimiter.as_ref() {
                Some(delimiter) => {
                    for chunk in Tokenizer::new(text, delimiter, rules.nesting.as_ref()) {
                        buffer.push_text(chunk.text);
                        if chunk.terminated {
                            buffer.flush();
                        }
                    }
                }
                None => buffer.push_text(text),
            },
            ContentUnit::ReplyMarker { .. } => {
                if keep_reply_markers {
                    buffer.push(unit.clone());
                }
            }
            other => {
                let placement = rules.placement.placement_for(other).unwrap_or_default();
                buffer.place(other.clone(), placement);
            }
        }
    }

    drop_blank_segments(buffer.finish())
}

fn drop_blank_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let mut kept: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut carried: Vec<ContentUnit> = Vec::new();

    for segment in segments {
        if segment.is_blank() {
            carried.extend(segment.units.into_iter().filter(ContentUnit::is_reply_marker));
            continue;
        }
        if carried.is_empty() {
            kept.push(segment);
        } else {
            let mut units = std::mem::take(&mut carried);
            units.extend(segment.units);
            kept.push(Segment::from(units));
        }
    }

    if !carried.is_empty() {
        match kept.last_mut() {
            Some(last) => last.units.extend(carried),
            None => kept.push(Segment::from(carried)),
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config_store::SegmentationConfig;
    use crate::services::segmentation::placement::Placement;

    fn rules_with(pattern: &str, smart: bool) -> SegmentationRules {
        SegmentationConfig {
            mode: crate::services::config_store::SplitMode::Regex,
            regex_delimiter_pattern: pattern.to_string(),
            smart_bracket_aware: smart,
            ..Default::default()
        }
        .compile()
        .unwrap()
    }

    fn plain(segments: &[Segment]) -> Vec<String> {
        segments.iter().map(Segment::plain_text).collect()
    }

    #[test]
    fn test_retains_delimiters() {
        let segs = assemble_segments(&[ContentUnit::text("Hi! Hi")], &rules_with("[!]", false), false);
        assert_eq!(plain(&segs), vec!["Hi!", " Hi"]);
    }

    #[test]
    fn test_quoted_span_is_one_segment() {
        let segs = assemble_segments(
            &[ContentUnit::text("“Hello. World.”")],
            &rules_with("[.]", true),
            false,
        );
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn test_text_continues_across_units() {
        let units = vec![
            ContentUnit::text("Part one "),
            ContentUnit::mention("amy"),
            ContentUnit::text(" still one. Two"),
        ];
        let segs = assemble_segments(&units, &rules_with("[.]", true), false);
        assert_eq!(segs.len(), 2);
        assert_eq!(
            segs[0].units,
            vec![
                ContentUnit::text("Part one "),
                ContentUnit::mention("amy"),
                ContentUnit::text(" still one."),
            ]
        );
        assert_eq!(plain(&segs)[1], " Two");
    }

    #[test]
    fn test_standalone_image_between_text() {
        let mut rules = rules_with("[.]", true);
        rules.placement.image = Placement::Standalone;
        let units = vec![
            ContentUnit::text("Look at"),
            ContentUnit::image("cat.png"),
            ContentUnit::text("this cat."),
        ];
        let segs = assemble_segments(&units, &rules, false);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1], Segment::single(ContentUnit::image("cat.png")));
    }

    #[test]
    fn test_blank_segments_are_dropped() {
        let segs = assemble_segments(
            &[ContentUnit::text("A\n   \n\nB")],
            &rules_with(r"\n", false),
            false,
        );
        assert_eq!(plain(&segs), vec!["A\n", "B"]);
    }

    #[test]
    fn test_reply_marker_kept_or_dropped() {
        let units = vec![ContentUnit::reply_marker("m1"), ContentUnit::text("One. Two.")];
        let rules = rules_with("[.]", true);

        let kept = assemble_segments(&units, &rules, true);
        assert_eq!(kept[0].units[0], ContentUnit::reply_marker("m1"));
        assert_eq!(kept.iter().filter(|s| s.has_reply_marker()).count(), 1);

        let dropped = assemble_segments(&units, &rules, false);
        assert!(dropped.iter().all(|s| !s.has_reply_marker()));
    }

    #[test]
    fn test_reply_marker_carried_past_blank_segment() {
        let units = vec![
            ContentUnit::text("\n"),
            ContentUnit::reply_marker("m1"),
            ContentUnit::text("\nHello"),
        ];
        let segs = assemble_segments(&units, &rules_with(r"\n+", false), true);
        assert_eq!(segs.len(), 1);
        assert_eq!(
            segs[0].units,
            vec![ContentUnit::reply_marker("m1"), ContentUnit::text("Hello")]
        );
    }

    #[test]
    fn test_trailing_reply_marker_stays_in_last_segment() {
        let units = vec![ContentUnit::text("A. B."), ContentUnit::reply_marker("m1")];
        let segs = assemble_segments(&units, &rules_with("[.]", true), true);
        assert_eq!(plain(&segs), vec!["A.", " B."]);
        assert_eq!(
            segs[1].units,
            vec![ContentUnit::text(" B."), ContentUnit::reply_marker("m1")]
        );
        let markers = segs.iter().flat_map(|s| s.units.iter()).filter(|u| u.is_reply_marker()).count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn test_lone_reply_marker_is_kept() {
        let units = vec![ContentUnit::reply_marker("m1"), ContentUnit::text("  ")];
        let segs = assemble_segments(&units, &rules_with("[.]", true), true);
        assert_eq!(segs, vec![Segment::single(ContentUnit::reply_marker("m1"))]);
    }

    #[test]
    fn test_no_delimiter_keeps_text_whole() {
        let mut rules = rules_with("[.]", true);
        rules.delimiter = None;
        let segs = assemble_segments(&[ContentUnit::text("A. B. C.")], &rules, false);
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn test_content_is_preserved_in_order() {
        let units = vec![
            ContentUnit::text("First. Second "),
            ContentUnit::face("3"),
            ContentUnit::image("x.png"),
            ContentUnit::text("(third. still). Fourth!"),
            ContentUnit::mention("z"),
        ];
        let segs = assemble_segments(&units, &rules_with("[.!]", true), false);
        let text: String = segs.iter().map(Segment::plain_text).collect();
        assert_eq!(text, "First. Second (third. still). Fourth!");
        let media: Vec<_> = segs.iter().flat_map(|s| s.units.iter()).filter(|u| u.is_media()).cloned().collect();
        assert_eq!(media, vec![ContentUnit::face("3"), ContentUnit::image("x.png"), ContentUnit::mention("z")]);
    }
}
