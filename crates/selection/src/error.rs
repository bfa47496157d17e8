use loreweave_protocol::CodecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SelectionError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// Unknown name in `selection.insertion_ordering`. Raised at engine
    /// construction, never per item.
    #[error("unknown ordering rule: {0}")]
    UnknownOrderingRule(String),

    /// Unknown name in `weighted_random.weighting`.
    #[error("unknown weigher: {0}")]
    UnknownWeigher(String),

    /// Unknown pool-grouping key in `weighted_random.selection_ordering`.
    #[error("unknown selection grouping key: {0}")]
    UnknownGroupKey(String),

    #[error("token encoding failed: {0}")]
    Encoding(#[from] CodecError),
}
