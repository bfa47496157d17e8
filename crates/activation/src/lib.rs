//! Activation: decides, per source, why (if at all) it qualifies for
//! context consideration.
//!
//! All applicable rules are evaluated without short-circuiting, so a record
//! retains every piece of evidence even once qualification is certain.

mod engine;
mod error;
mod record;

pub use engine::{ActivationEngine, ActivationOutcome};
pub use error::{ActivationError, Result};
pub use record::{ActivationRecord, CascadeMatch, Evidence, EvidenceKind};
