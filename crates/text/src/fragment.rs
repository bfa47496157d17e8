use crate::cursor::{Cursor, CursorPosition, GenerationId};
use crate::error::{Result, TextError};

/// An immutable slice of text plus its start offset in the declared origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    content: String,
    offset: usize,
}

impl TextFragment {
    pub fn new(content: impl Into<String>, offset: usize) -> Self {
        Self {
            content: content.into(),
            offset,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Start offset relative to the declared origin.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// One past the last byte this fragment covers.
    pub fn end(&self) -> usize {
        self.offset + self.content.len()
    }

    /// Split into `(left, right)` at a fragment-local offset. Combined
    /// content and offsets are preserved: `left` keeps this fragment's
    /// offset, `right` starts where `left` ends.
    pub fn split_at(&self, local_offset: usize) -> Result<(TextFragment, TextFragment)> {
        if local_offset > self.content.len() {
            return Err(TextError::SplitOutOfBounds {
                offset: local_offset,
                length: self.content.len(),
            });
        }
        if !self.content.is_char_boundary(local_offset) {
            return Err(TextError::NotACharBoundary { offset: local_offset });
        }
        let (left, right) = self.content.split_at(local_offset);
        Ok((
            TextFragment::new(left, self.offset),
            TextFragment::new(right, self.offset + local_offset),
        ))
    }
}

/// Join fragments into one text, in the order given.
pub fn concat<'a>(fragments: impl IntoIterator<Item = &'a TextFragment>) -> String {
    let mut out = String::new();
    for fragment in fragments {
        out.push_str(fragment.content());
    }
    out
}

/// Resolve a full-text offset to a fragment-local cursor over a contiguous
/// fragment run. Fails with `OutOfRange` past the total length. An offset
/// equal to a fragment boundary resolves into the later fragment, so the
/// total length itself addresses the end of the last fragment.
pub fn fragment_for(fragments: &[TextFragment], full_text_offset: usize, origin: GenerationId) -> Result<Cursor> {
    let total: usize = fragments.iter().map(TextFragment::len).sum();
    if full_text_offset > total {
        return Err(TextError::OutOfRange {
            offset: full_text_offset,
            length: total,
        });
    }

    let mut start = 0usize;
    for (index, fragment) in fragments.iter().enumerate() {
        let end = start + fragment.len();
        let is_last = index + 1 == fragments.len();
        if full_text_offset < end || (is_last && full_text_offset == end) {
            return Ok(Cursor::fragment(index, full_text_offset - start, origin));
        }
        start = end;
    }

    // Empty fragment list with offset 0.
    Ok(Cursor::fragment(0, 0, origin))
}

/// Resolve a cursor back to a full-text offset, refusing cursors minted
/// against any other generation.
pub fn offset_at(fragments: &[TextFragment], cursor: &Cursor, origin: GenerationId) -> Result<usize> {
    if cursor.origin != origin {
        return Err(TextError::StaleCursor {
            expected: origin,
            found: cursor.origin,
        });
    }

    let total: usize = fragments.iter().map(TextFragment::len).sum();
    match cursor.position {
        CursorPosition::FullText { offset } => {
            if offset > total {
                return Err(TextError::OutOfRange { offset, length: total });
            }
            Ok(offset)
        }
        CursorPosition::Fragment { index, local } => {
            let fragment = fragments.get(index).ok_or(TextError::OutOfRange {
                offset: index,
                length: fragments.len(),
            })?;
            if local > fragment.len() {
                return Err(TextError::OutOfRange {
                    offset: local,
                    length: fragment.len(),
                });
            }
            let before: usize = fragments[..index].iter().map(TextFragment::len).sum();
            Ok(before + local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run() -> Vec<TextFragment> {
        vec![
            TextFragment::new("The dragon ", 0),
            TextFragment::new("roared ", 11),
            TextFragment::new("loudly.", 18),
        ]
    }

    #[test]
    fn concat_preserves_order() {
        assert_eq!(concat(&run()), "The dragon roared loudly.");
    }

    #[test]
    fn split_preserves_content_and_offsets() {
        let fragment = TextFragment::new("roared loudly", 11);
        let (left, right) = fragment.split_at(6).unwrap();
        assert_eq!(left.content(), "roared");
        assert_eq!(left.offset(), 11);
        assert_eq!(right.content(), " loudly");
        assert_eq!(right.offset(), 17);
        assert_eq!(left.len() + right.len(), fragment.len());
    }

    #[test]
    fn split_rejects_out_of_bounds() {
        let fragment = TextFragment::new("abc", 0);
        assert_eq!(
            fragment.split_at(4),
            Err(TextError::SplitOutOfBounds { offset: 4, length: 3 })
        );
    }

    #[test]
    fn split_rejects_mid_char() {
        let fragment = TextFragment::new("déjà", 0);
        assert!(matches!(fragment.split_at(2), Err(TextError::NotACharBoundary { .. })));
    }

    #[test]
    fn fragment_for_resolves_boundaries_into_later_fragment() {
        let fragments = run();
        let origin = GenerationId::fresh();

        let cursor = fragment_for(&fragments, 11, origin).unwrap();
        assert_eq!(cursor.position, CursorPosition::Fragment { index: 1, local: 0 });

        let cursor = fragment_for(&fragments, 24, origin).unwrap();
        assert_eq!(cursor.position, CursorPosition::Fragment { index: 2, local: 6 });

        // Total length addresses the end of the last fragment.
        let cursor = fragment_for(&fragments, 25, origin).unwrap();
        assert_eq!(cursor.position, CursorPosition::Fragment { index: 2, local: 7 });
    }

    #[test]
    fn fragment_for_rejects_past_end() {
        let fragments = run();
        let origin = GenerationId::fresh();
        assert_eq!(
            fragment_for(&fragments, 26, origin),
            Err(TextError::OutOfRange { offset: 26, length: 25 })
        );
    }

    #[test]
    fn offset_round_trips_through_cursor() {
        let fragments = run();
        let origin = GenerationId::fresh();
        for offset in [0, 5, 11, 17, 24] {
            let cursor = fragment_for(&fragments, offset, origin).unwrap();
            assert_eq!(offset_at(&fragments, &cursor, origin).unwrap(), offset);
        }
    }

    #[test]
    fn stale_cursor_is_refused() {
        let fragments = run();
        let origin = GenerationId::fresh();
        let other = GenerationId::fresh();
        let cursor = fragment_for(&fragments, 3, origin).unwrap();
        assert_eq!(
            offset_at(&fragments, &cursor, other),
            Err(TextError::StaleCursor {
                expected: other,
                found: origin
            })
        );
    }
}
