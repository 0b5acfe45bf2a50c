use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use std::collections::HashMap;

/// Token store held in process memory.
///
/// Records are bucketed per user so that a revoke holds the user's shard
/// entry for the whole scan; a concurrent `set` for that user either lands
/// before the scan starts or after it ends. `by_id` is the point-lookup index.
#[derive(Debug)]
pub struct MemoryTokenStore {
    kind: TokenKind,
    by_user: DashMap<UserId, HashMap<TokenId, TokenRecord>>,
    by_id: DashMap<TokenId, UserId>,
}

impl MemoryTokenStore {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            by_user: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every record of the user, in no particular order.
    pub fn records_of(&self, user_id: UserId) -> Vec<TokenRecord> {
        self.by_user
            .get(&user_id)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    fn revoke_where<F>(&self, user_id: UserId, matches: F) -> usize
    where
        F: Fn(&TokenIdentity) -> bool,
    {
        let Some(mut bucket) = self.by_user.get_mut(&user_id) else {
            return 0;
        };
        let mut revoked = 0;
        for record in bucket.values_mut() {
            if record.status == TokenStatus::Active && matches(&record.identity) {
                record.status = TokenStatus::Revoked;
                revoked += 1;
            }
        }
        revoked
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set(
        &self,
        identity: &TokenIdentity,
        status: TokenStatus,
    ) -> Result<(), TokenStoreError> {
        // the first write fixes the owner; later writes only merge status
        let owner = *self.by_id.entry(identity.token_id).or_insert(identity.user_id);
        let mut bucket = self.by_user.entry(owner).or_default();
        bucket
            .entry(identity.token_id)
            .and_modify(|record| record.status = record.status.merge(status))
            .or_insert_with(|| TokenRecord {
                identity: TokenIdentity {
                    user_id: owner,
                    ..identity.clone()
                },
                status,
            });
        Ok(())
    }

    async fn get_by_id(&self, token_id: TokenId) -> Result<TokenRecord, TokenStoreError> {
        let user_id = self
            .by_id
            .get(&token_id)
            .map(|entry| *entry.value())
            .ok_or(TokenStoreError::NotFound(token_id))?;

        self.by_user
            .get(&user_id)
            .and_then(|bucket| bucket.get(&token_id).cloned())
            .ok_or(TokenStoreError::NotFound(token_id))
    }

    async fn delete_by_id(&self, token_id: TokenId) -> Result<(), TokenStoreError> {
        let Some((_, user_id)) = self.by_id.remove(&token_id) else {
            return Ok(());
        };
        if let Some(mut bucket) = self.by_user.get_mut(&user_id) {
            bucket.remove(&token_id);
        }
        Ok(())
    }

    async fn revoke_by_device(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
    ) -> Result<(), TokenStoreError> {
        let revoked = self.revoke_where(user_id, |identity| &identity.device_id == device_id);
        tracing::trace!(kind = %self.kind, %user_id, %device_id, revoked, "revoked slot");
        Ok(())
    }

    async fn revoke_by_user(&self, user_id: UserId) -> Result<(), TokenStoreError> {
        let revoked = self.revoke_where(user_id, |_| true);
        tracing::trace!(kind = %self.kind, %user_id, revoked, "revoked user");
        Ok(())
    }
}
