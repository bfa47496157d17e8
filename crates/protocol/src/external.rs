use crate::types::EphemeralConfig;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unrecognized input: {0}")]
    Unrecognized(String),
    /// The codec as a whole cannot serve requests. Treated as systemic:
    /// fails the run instead of rejecting one source.
    #[error("codec unavailable: {0}")]
    Unavailable(String),
}

/// Tokenizer boundary. Both directions suspend; hosts typically back this
/// with an out-of-process tokenizer.
#[async_trait]
pub trait TokenCodec: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<u32>, CodecError>;
    async fn decode(&self, tokens: &[u32]) -> Result<String, CodecError>;
}

/// Host-side check deciding whether an ephemeral entry's step window is
/// currently open.
pub trait EphemeralWindow: Send + Sync {
    fn check_activation(&self, config: &EphemeralConfig, current_step: u32) -> bool;
}
