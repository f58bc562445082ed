use thiserror::Error;
use wikiweave_syntax::SourceRange;

use crate::dom::Document;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructError {
    #[error("node source ranges overlap at byte {0}")]
    Overlap(usize),
    #[error("source {start}..{end} is not covered by any node")]
    Uncovered { start: usize, end: usize },
    #[error("range {start}..{end} lies outside the source")]
    OutOfBounds { start: usize, end: usize },
}

/// Rebuild `source` from the source ranges of the body's top-level nodes.
///
/// Fostered nodes are skipped (their source sits inside the table they were
/// moved out of), as are nodes without a range. Gaps between ranges may
/// only hold whitespace.
pub fn reconstruct_source(doc: &Document, source: &str) -> Result<String, ReconstructError> {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    let ranges = doc
        .children(doc.body())
        .iter()
        .filter(|&&c| !doc.data(c).fostered)
        .filter_map(|&c| doc.data(c).dsr)
        .map(|d| d.range());

    for range in ranges {
        if range.start < cursor {
            return Err(ReconstructError::Overlap(range.start));
        }
        out.push_str(gap(source, cursor, range.start)?);
        out.push_str(slice(source, range)?);
        cursor = range.end;
    }
    out.push_str(gap(source, cursor, source.len())?);
    Ok(out)
}

fn slice(source: &str, range: SourceRange) -> Result<&str, ReconstructError> {
    source
        .get(range.start..range.end)
        .ok_or(ReconstructError::OutOfBounds {
            start: range.start,
            end: range.end,
        })
}

fn gap(source: &str, start: usize, end: usize) -> Result<&str, ReconstructError> {
    let text = slice(source, SourceRange::new(start, end))?;
    if text.chars().all(char::is_whitespace) {
        Ok(text)
    } else {
        Err(ReconstructError::Uncovered { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Dsr, Element};
    use pretty_assertions::assert_eq;

    fn with_ranges(ranges: &[(usize, usize)]) -> Document {
        let mut doc = Document::new();
        let body = doc.body();
        for &(start, end) in ranges {
            let p = doc.create_element(Element::new("p"));
            doc.data_mut(p).dsr = Some(Dsr::from(SourceRange::new(start, end)));
            doc.append(body, p);
        }
        doc
    }

    #[test]
    fn whitespace_gaps_are_copied() {
        let doc = with_ranges(&[(0, 3), (5, 8)]);
        assert_eq!(reconstruct_source(&doc, "abc\n\ndef\n"), Ok("abc\n\ndef\n".to_string()));
    }

    #[test]
    fn text_outside_every_range_is_reported() {
        let doc = with_ranges(&[(0, 3)]);
        assert_eq!(
            reconstruct_source(&doc, "abc de"),
            Err(ReconstructError::Uncovered { start: 3, end: 6 })
        );
    }

    #[test]
    fn overlapping_ranges_are_reported() {
        let doc = with_ranges(&[(0, 4), (2, 6)]);
        assert_eq!(
            reconstruct_source(&doc, "abcdef"),
            Err(ReconstructError::Overlap(2))
        );
    }

    #[test]
    fn ranges_past_the_end_are_reported() {
        let doc = with_ranges(&[(0, 9)]);
        assert_eq!(
            reconstruct_source(&doc, "abc"),
            Err(ReconstructError::OutOfBounds { start: 0, end: 9 })
        );
    }
}
