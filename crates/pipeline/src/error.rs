use loreweave_activation::ActivationError;
use loreweave_assembly::AssemblyError;
use loreweave_selection::SelectionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Any stage failing fails the run; per-source problems surface as rejected
/// reports instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("activation failed: {0}")]
    Activation(#[from] ActivationError),

    #[error("selection failed: {0}")]
    Selection(#[from] SelectionError),

    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
}
