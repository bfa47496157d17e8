//! Immutable text fragments and generation-checked cursors.
//!
//! Everything here is pure and side-effect free; all operations are safe to
//! call concurrently. A [`Cursor`] is only meaningful against the exact
//! [`GenerationId`] it was produced for — consumers must check it and refuse
//! stale cursors instead of silently reading a different layout.

mod cursor;
mod error;
mod fragment;

pub use cursor::{Cursor, CursorPosition, GenerationId};
pub use error::{Result, TextError};
pub use fragment::{concat, fragment_for, offset_at, TextFragment};
