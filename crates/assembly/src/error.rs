use loreweave_protocol::CodecError;
use loreweave_text::TextError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssemblyError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("token encoding failed: {0}")]
    Encoding(#[from] CodecError),

    #[error("fragment arithmetic failed: {0}")]
    Text(#[from] TextError),
}
