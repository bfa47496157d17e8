use crate::cursor::GenerationId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TextError>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextError {
    #[error("offset {offset} is past the total length {length}")]
    OutOfRange { offset: usize, length: usize },

    #[error("cursor from generation {found:?} used against generation {expected:?}")]
    StaleCursor { expected: GenerationId, found: GenerationId },

    #[error("split offset {offset} is outside fragment of length {length}")]
    SplitOutOfBounds { offset: usize, length: usize },

    #[error("split offset {offset} is not a char boundary")]
    NotACharBoundary { offset: usize },
}
