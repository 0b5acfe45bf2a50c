use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("token {0} not found")]
    NotFound(TokenId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed map from token id to token status, one instance per token kind.
///
/// Revocations only ever move records from `Active` to `Revoked`; a `set`
/// of `Active` over a revoked record keeps it revoked.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Store or overwrite the record for `identity.token_id`.
    async fn set(&self, identity: &TokenIdentity, status: TokenStatus)
    -> Result<(), TokenStoreError>;

    async fn get_by_id(&self, token_id: TokenId) -> Result<TokenRecord, TokenStoreError>;

    /// Remove the record. Succeeds when it is already absent.
    async fn delete_by_id(&self, token_id: TokenId) -> Result<(), TokenStoreError>;

    /// Revoke every record of the (user, device) slot.
    async fn revoke_by_device(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
    ) -> Result<(), TokenStoreError>;

    /// Revoke every record of the user across all devices.
    async fn revoke_by_user(&self, user_id: UserId) -> Result<(), TokenStoreError>;
}
