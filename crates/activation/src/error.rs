use loreweave_protocol::SearchFailure;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ActivationError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("search failed: {0}")]
    Search(#[from] SearchFailure),

    /// The cascade loop activates at least one new entry per continued pass
    /// over a finite set; exceeding the pass bound means that invariant
    /// broke.
    #[error("cascade failed to settle after {passes} passes over {sources} sources")]
    CascadeNonTermination { passes: u32, sources: usize },
}
