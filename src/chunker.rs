//! Paragraph-aware text segmentation for quote extraction.
//!
//! Documents are split on blank-line paragraph boundaries and accumulated
//! into segments under a target size. Segments below a minimum viable
//! length are dropped entirely: too little content to plausibly contain a
//! quote. This filter is lossy by design.

/// Plans bounded-size text segments from a decoded document.
pub struct ChunkPlanner {
    max_chunk_chars: usize,
    min_chunk_chars: usize,
}

impl ChunkPlanner {
    pub fn new() -> Self {
        Self {
            max_chunk_chars: 2000,
            min_chunk_chars: 100,
        }
    }

    #[cfg(test)]
    fn with_limits(max_chunk_chars: usize, min_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            min_chunk_chars,
        }
    }

    /// Split `text` into ordered segments.
    ///
    /// Consecutive paragraphs accumulate until appending the next one would
    /// exceed the target size; a paragraph that alone exceeds the target is
    /// hard-split, preferring sentence boundaries.
    pub fn plan(&self, text: &str) -> Vec<String> {
        let normalized = text.replace("\r\n", "\n");
        let mut segments = Vec::new();
        let mut current = String::new();

        for para in normalized.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            if para.len() > self.max_chunk_chars {
                self.close_segment(&mut segments, &mut current);
                for piece in split_long_paragraph(para, self.max_chunk_chars) {
                    self.push_segment(&mut segments, piece);
                }
                continue;
            }

            if !current.is_empty() && current.len() + 2 + para.len() > self.max_chunk_chars {
                self.close_segment(&mut segments, &mut current);
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }

        self.close_segment(&mut segments, &mut current);
        segments
    }

    fn close_segment(&self, segments: &mut Vec<String>, current: &mut String) {
        if !current.is_empty() {
            let segment = std::mem::take(current);
            self.push_segment(segments, segment);
        }
    }

    fn push_segment(&self, segments: &mut Vec<String>, segment: String) {
        if segment.chars().count() >= self.min_chunk_chars {
            segments.push(segment);
        } else {
            tracing::debug!(len = segment.len(), "dropping segment below minimum length");
        }
    }
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Hard-split an oversized paragraph, breaking at a sentence boundary
/// (". ") within the last fifth of each piece when one exists.
fn split_long_paragraph(para: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < para.len() {
        let mut end = (start + max_chars).min(para.len());
        while end < para.len() && !para.is_char_boundary(end) {
            end -= 1;
        }

        let break_at = if end < para.len() {
            let mut search_start = start + max_chars * 4 / 5;
            while !para.is_char_boundary(search_start) {
                search_start -= 1;
            }
            para[search_start..end]
                .rfind(". ")
                .map(|pos| search_start + pos + 2)
                .unwrap_or(end)
        } else {
            end
        };

        pieces.push(para[start..break_at].trim().to_string());
        if break_at >= para.len() {
            break;
        }
        start = break_at;
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(sentence: &str, n: usize) -> String {
        sentence.repeat(n)
    }

    #[test]
    fn accumulates_paragraphs_under_target() {
        let p1 = para("First paragraph sentence. ", 4); // ~104 chars
        let p2 = para("Second paragraph sentence. ", 4);
        let text = format!("{p1}\n\n{p2}");

        let planner = ChunkPlanner::new();
        let segments = planner.plan(&text);

        assert_eq!(segments.len(), 1, "both paragraphs fit one segment");
        assert!(segments[0].contains("First paragraph"));
        assert!(segments[0].contains("Second paragraph"));
    }

    #[test]
    fn closes_segment_before_exceeding_target() {
        let p1 = para("Alpha sentence with some length to it. ", 30); // > 1000
        let p2 = para("Beta sentence with some length to it too. ", 30);
        let text = format!("{p1}\n\n{p2}");

        let planner = ChunkPlanner::new();
        let segments = planner.plan(&text);

        assert_eq!(segments.len(), 2, "second paragraph starts a new segment");
        for s in &segments {
            assert!(s.len() <= 2000, "segment of {} chars exceeds target", s.len());
        }
    }

    #[test]
    fn short_segments_are_dropped() {
        let planner = ChunkPlanner::new();
        let segments = planner.plan("Too short to matter.");
        assert!(segments.is_empty(), "sub-minimum segment should be dropped");
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let text = para("A fairly long sentence that keeps going for a while. ", 100);
        let planner = ChunkPlanner::new();
        let segments = planner.plan(&text);

        assert!(segments.len() > 1);
        for s in &segments {
            assert!(s.len() <= 2000);
            assert!(s.chars().count() >= 100);
        }
    }

    #[test]
    fn hard_split_prefers_sentence_boundary() {
        let text = para("Sentence ending here. ", 30);
        let pieces = split_long_paragraph(&text, 200);
        assert!(pieces.len() > 1);
        assert!(
            pieces[0].ends_with('.'),
            "expected sentence-boundary break, got: ...{}",
            &pieces[0][pieces[0].len().saturating_sub(20)..]
        );
    }

    #[test]
    fn empty_input_yields_no_segments() {
        let planner = ChunkPlanner::new();
        assert!(planner.plan("").is_empty());
        assert!(planner.plan("\n\n\n\n").is_empty());
    }

    #[test]
    fn windows_line_endings_normalized() {
        let p = para("Some sentence content here for the segment. ", 4);
        let text = format!("{p}\r\n\r\n{p}");
        let planner = ChunkPlanner::with_limits(2000, 100);
        let segments = planner.plan(&text);
        assert!(!segments.is_empty());
        assert!(!segments[0].contains('\r'));
    }

    #[test]
    fn segment_order_follows_document_order() {
        let p1 = para("First block sentence goes here with enough length. ", 25);
        let p2 = para("Second block sentence goes here with enough length. ", 25);
        let text = format!("{p1}\n\n{p2}");
        let planner = ChunkPlanner::new();
        let segments = planner.plan(&text);

        assert!(segments.len() >= 2);
        assert!(segments[0].starts_with("First block"));
        let last = segments.last().unwrap();
        assert!(last.contains("Second block"));
    }
}
