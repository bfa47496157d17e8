use crate::error::Result;
use loreweave_protocol::{AssemblySnapshot, OutputSegment, UniqueId};
use loreweave_text::{concat, fragment_for, offset_at, Cursor, CursorPosition, GenerationId, TextFragment};

#[derive(Debug, Clone)]
struct TaggedFragment {
    fragment: TextFragment,
    owner: UniqueId,
    identifier: String,
}

/// Mutable, order-preserving owner of the final text. Tracks consumed
/// tokens against a fixed budget and which source owns which span. Every
/// mutation mints a fresh generation, invalidating outstanding cursors.
#[derive(Debug, Clone)]
pub struct CompoundAssembly {
    generation: GenerationId,
    fragments: Vec<TaggedFragment>,
    budget: usize,
    consumed: usize,
    reserved: usize,
}

impl CompoundAssembly {
    pub fn new(budget: usize, initial_reserved: usize) -> Self {
        Self {
            generation: GenerationId::fresh(),
            fragments: Vec::new(),
            budget,
            consumed: 0,
            reserved: initial_reserved,
        }
    }

    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn consumed_tokens(&self) -> usize {
        self.consumed
    }

    pub fn available_tokens(&self) -> usize {
        self.budget - self.consumed
    }

    /// Outstanding reservations for sources not yet processed.
    pub fn reserved_tokens(&self) -> usize {
        self.reserved
    }

    /// Tokens nobody has consumed or reserved.
    pub fn free_tokens(&self) -> usize {
        self.available_tokens().saturating_sub(self.reserved)
    }

    /// Release a reservation, floored at zero. Each source's reservation is
    /// released exactly once, at insertion or rejection.
    pub fn release_reservation(&mut self, amount: usize) {
        self.reserved = self.reserved.saturating_sub(amount);
    }

    /// Charge consumed tokens. The caller guarantees the charge fits; the
    /// budget invariant is checked here anyway.
    pub fn charge(&mut self, tokens: usize) {
        debug_assert!(self.consumed + tokens <= self.budget, "assembly budget overrun");
        self.consumed += tokens;
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn total_len(&self) -> usize {
        self.fragments.iter().map(|t| t.fragment.len()).sum()
    }

    pub fn full_text(&self) -> String {
        concat(self.fragments.iter().map(|t| &t.fragment))
    }

    /// A full-text cursor for this assembly's current generation.
    pub fn cursor_at(&self, offset: usize) -> Result<Cursor> {
        let fragments: Vec<TextFragment> = self.fragments.iter().map(|t| t.fragment.clone()).collect();
        let cursor = fragment_for(&fragments, offset, self.generation)?;
        Ok(cursor)
    }

    /// Resolve a cursor minted against this assembly back to a full-text
    /// offset. Stale cursors are refused.
    pub fn offset_at(&self, cursor: &Cursor) -> Result<usize> {
        let fragments: Vec<TextFragment> = self.fragments.iter().map(|t| t.fragment.clone()).collect();
        Ok(offset_at(&fragments, cursor, self.generation)?)
    }

    /// Owners in first-appearance (document) order.
    pub fn owners(&self) -> Vec<UniqueId> {
        let mut seen = Vec::new();
        for tagged in &self.fragments {
            if !seen.contains(&tagged.owner) {
                seen.push(tagged.owner);
            }
        }
        seen
    }

    /// Full-text span covered by one owner, from its first fragment's start
    /// to its last fragment's end. Spans of different owners may interleave
    /// when something was inserted inside.
    pub fn owner_range(&self, owner: UniqueId) -> Option<(usize, usize)> {
        let mut start = None;
        let mut end = 0;
        let mut cursor = 0;
        for tagged in &self.fragments {
            let len = tagged.fragment.len();
            if tagged.owner == owner {
                if start.is_none() {
                    start = Some(cursor);
                }
                end = cursor + len;
            }
            cursor += len;
        }
        start.map(|s| (s, end))
    }

    /// Map an offset local to one owner's content onto the full text,
    /// walking only that owner's fragments.
    pub fn resolve_owner_local(&self, owner: UniqueId, local: usize) -> Option<usize> {
        let mut walked = 0;
        let mut cursor = 0;
        for tagged in &self.fragments {
            let len = tagged.fragment.len();
            if tagged.owner == owner {
                if local < walked + len {
                    return Some(cursor + (local - walked));
                }
                walked += len;
            }
            cursor += len;
        }
        None
    }

    /// The content of one owner's fragment covering the given local offset,
    /// plus the offset into that fragment.
    pub fn owner_fragment_at(&self, owner: UniqueId, local: usize) -> Option<(&str, usize)> {
        let mut walked = 0;
        for tagged in &self.fragments {
            if tagged.owner != owner {
                continue;
            }
            let len = tagged.fragment.len();
            if local < walked + len {
                return Some((tagged.fragment.content(), local - walked));
            }
            walked += len;
        }
        None
    }

    /// Insert `content` owned by `owner` at a full-text offset, splitting
    /// the covering fragment when the offset falls inside one. Mints a new
    /// generation.
    pub fn insert(&mut self, full_offset: usize, owner: UniqueId, identifier: &str, content: &str) -> Result<()> {
        let cursor = self.cursor_at(full_offset)?;
        let CursorPosition::Fragment { index, local } = cursor.position else {
            unreachable!("cursor_at always yields fragment cursors");
        };

        let incoming = TaggedFragment {
            fragment: TextFragment::new(content, 0),
            owner,
            identifier: identifier.to_string(),
        };

        if self.fragments.is_empty() {
            self.fragments.push(incoming);
        } else if local == 0 {
            self.fragments.insert(index, incoming);
        } else if local == self.fragments[index].fragment.len() {
            self.fragments.insert(index + 1, incoming);
        } else {
            let host = self.fragments[index].clone();
            let (left, right) = host.fragment.split_at(local)?;
            self.fragments[index] = TaggedFragment {
                fragment: left,
                owner: host.owner,
                identifier: host.identifier.clone(),
            };
            self.fragments.insert(
                index + 1,
                TaggedFragment {
                    fragment: right,
                    owner: host.owner,
                    identifier: host.identifier,
                },
            );
            self.fragments.insert(index + 1, incoming);
        }

        self.renumber();
        self.generation = GenerationId::fresh();
        Ok(())
    }

    /// Recompute fragment offsets so each starts where the previous ends.
    fn renumber(&mut self) {
        let mut cursor = 0;
        for tagged in &mut self.fragments {
            let content = tagged.fragment.content().to_string();
            tagged.fragment = TextFragment::new(content, cursor);
            cursor = tagged.fragment.end();
        }
    }

    /// Non-overlapping `{identifier, text}` segments in output order,
    /// adjacent fragments of one source merged. Finite and restartable:
    /// call again for a fresh pass.
    pub fn segments(&self) -> Vec<OutputSegment> {
        let mut out: Vec<(UniqueId, OutputSegment)> = Vec::new();
        for tagged in &self.fragments {
            match out.last_mut() {
                Some((owner, segment)) if *owner == tagged.owner => {
                    segment.text.push_str(tagged.fragment.content());
                }
                _ => out.push((
                    tagged.owner,
                    OutputSegment {
                        identifier: tagged.identifier.clone(),
                        text: tagged.fragment.content().to_string(),
                    },
                )),
            }
        }
        out.into_iter().map(|(_, segment)| segment).collect()
    }

    pub fn snapshot(&self) -> AssemblySnapshot {
        AssemblySnapshot {
            text: self.full_text(),
            consumed_tokens: self.consumed,
        }
    }
}
