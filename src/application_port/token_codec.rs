use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// Signs claims into opaque wire strings and verifies them back.
///
/// Decoding checks signature and payload shape only. The validity window is
/// left to the caller.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn encode_access(&self, claims: &AccessClaims) -> Result<AccessToken, CodecError>;
    async fn decode_access(&self, token: &str) -> Result<AccessClaims, CodecError>;
    async fn encode_refresh(&self, claims: &RefreshClaims) -> Result<RefreshToken, CodecError>;
    async fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, CodecError>;
}
