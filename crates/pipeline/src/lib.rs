//! The full context pipeline: activation, selection and assembly behind one
//! front door.
//!
//! [`ContextBuilder`] owns the three stage engines and runs a batch of
//! sources through them in order. Hosts plug in their own tokenizer, keyword
//! search and ephemeral-window policy; [`defaults`] provides working
//! in-process implementations of all three.

mod builder;
pub mod defaults;
mod error;

pub use builder::{BuiltContext, ContextBuilder};
pub use error::{PipelineError, Result};
