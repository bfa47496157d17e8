//! Assembly: sequential, token-budgeted insertion of selected sources into
//! one compound text.
//!
//! Strictly single-threaded by construction; insertion order determines
//! mutable budget state. Each source is attempted exactly once and failures
//! are recoverable, so the process is monotonic.

mod compound;
mod engine;
mod error;
mod trim;

pub use compound::CompoundAssembly;
pub use engine::{Assembler, AssemblyOutcome};
pub use error::{AssemblyError, Result};
