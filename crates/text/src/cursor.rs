use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identity of one layout of fragments. Every mutation of a fragment owner
/// mints a fresh generation, so a cursor can never silently address a
/// layout other than the one it was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationId(u64);

impl GenerationId {
    pub fn fresh() -> Self {
        GenerationId(NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }
}

/// Fragment-local or full-text address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPosition {
    /// `local` is a byte offset inside the fragment at `index`.
    Fragment { index: usize, local: usize },
    FullText { offset: usize },
}

/// A position tied to a specific [`GenerationId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub position: CursorPosition,
    pub origin: GenerationId,
}

impl Cursor {
    pub fn full_text(offset: usize, origin: GenerationId) -> Self {
        Cursor {
            position: CursorPosition::FullText { offset },
            origin,
        }
    }

    pub fn fragment(index: usize, local: usize, origin: GenerationId) -> Self {
        Cursor {
            position: CursorPosition::Fragment { index, local },
            origin,
        }
    }
}
