use crate::domain_model::*;
use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use std::collections::HashMap;

const FIELD_USER_ID: &str = "user_id";
const FIELD_DEVICE_ID: &str = "device_id";
const FIELD_STATUS: &str = "status";

// KEYS[1]: token hash, ARGV: key base, token id, user id, device id, status.
// Identity fields are write-once and the indexes follow the stored identity.
// "revoked" always wins over "active".
const SET_SCRIPT: &str = r#"
local key = KEYS[1]
redis.call('HSETNX', key, 'user_id', ARGV[3])
redis.call('HSETNX', key, 'device_id', ARGV[4])
if ARGV[5] == 'revoked' then
  redis.call('HSET', key, 'status', 'revoked')
else
  redis.call('HSETNX', key, 'status', ARGV[5])
end
local user_id = redis.call('HGET', key, 'user_id')
local device_id = redis.call('HGET', key, 'device_id')
redis.call('SADD', ARGV[1] .. ':user:' .. user_id, ARGV[2])
redis.call('SADD', ARGV[1] .. ':device:' .. user_id .. ':' .. device_id, ARGV[2])
return 1
"#;

// KEYS[1]: index set, ARGV[1]: token key prefix. Runs atomically on the server.
const REVOKE_SCRIPT: &str = r#"
local ids = redis.call('SMEMBERS', KEYS[1])
local revoked = 0
for _, id in ipairs(ids) do
  local key = ARGV[1] .. id
  if redis.call('HGET', key, 'status') == 'active' then
    redis.call('HSET', key, 'status', 'revoked')
    revoked = revoked + 1
  end
end
return revoked
"#;

#[derive(Debug, Clone)]
struct Keys {
    base: String,
}

impl Keys {
    fn new(namespace: &str, kind: TokenKind) -> Self {
        Self {
            base: format!("{}:{}", namespace, kind),
        }
    }

    fn token_prefix(&self) -> String {
        format!("{}:token:", self.base)
    }

    fn token(&self, token_id: TokenId) -> String {
        format!("{}{}", self.token_prefix(), token_id)
    }

    fn user(&self, user_id: UserId) -> String {
        format!("{}:user:{}", self.base, user_id)
    }

    fn device(&self, user_id: UserId, device_id: &DeviceId) -> String {
        format!("{}:device:{}:{}", self.base, user_id, device_id)
    }
}

/// Token store in Redis: one hash per token plus index sets per user and per
/// slot. Writes and revocations run as Lua scripts so each sees a consistent view.
pub struct RedisTokenStore {
    conn: ConnectionManager,
    keys: Keys,
    write: Script,
    revoke: Script,
}

impl RedisTokenStore {
    pub fn new(conn: ConnectionManager, namespace: &str, kind: TokenKind) -> Self {
        RedisTokenStore {
            conn,
            keys: Keys::new(namespace, kind),
            write: Script::new(SET_SCRIPT),
            revoke: Script::new(REVOKE_SCRIPT),
        }
    }

    async fn revoke_index(&self, index_key: String) -> Result<i64, TokenStoreError> {
        let mut conn = self.conn.clone();
        self.revoke
            .key(index_key)
            .arg(self.keys.token_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)
    }
}

fn unavailable(e: RedisError) -> TokenStoreError {
    TokenStoreError::Unavailable(e.to_string())
}

fn record_from_fields(
    token_id: TokenId,
    mut fields: HashMap<String, String>,
) -> Result<TokenRecord, TokenStoreError> {
    if fields.is_empty() {
        return Err(TokenStoreError::NotFound(token_id));
    }
    let corrupt = |what: &str| {
        TokenStoreError::Unavailable(format!("corrupt record for token {}: {}", token_id, what))
    };

    let user_id = fields
        .get(FIELD_USER_ID)
        .and_then(|s| s.parse::<UserId>().ok())
        .ok_or_else(|| corrupt(FIELD_USER_ID))?;
    let device_id = fields
        .remove(FIELD_DEVICE_ID)
        .map(DeviceId)
        .ok_or_else(|| corrupt(FIELD_DEVICE_ID))?;
    let status = fields
        .get(FIELD_STATUS)
        .and_then(|s| TokenStatus::parse(s))
        .ok_or_else(|| corrupt(FIELD_STATUS))?;

    Ok(TokenRecord {
        identity: TokenIdentity {
            token_id,
            user_id,
            device_id,
        },
        status,
    })
}

#[async_trait::async_trait]
impl TokenStore for RedisTokenStore {
    async fn set(
        &self,
        identity: &TokenIdentity,
        status: TokenStatus,
    ) -> Result<(), TokenStoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .write
            .key(self.keys.token(identity.token_id))
            .arg(&self.keys.base)
            .arg(identity.token_id.to_string())
            .arg(identity.user_id.to_string())
            .arg(identity.device_id.as_str())
            .arg(status.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get_by_id(&self, token_id: TokenId) -> Result<TokenRecord, TokenStoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.keys.token(token_id))
            .await
            .map_err(unavailable)?;
        record_from_fields(token_id, fields)
    }

    async fn delete_by_id(&self, token_id: TokenId) -> Result<(), TokenStoreError> {
        let record = match self.get_by_id(token_id).await {
            Ok(record) => record,
            Err(TokenStoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let identity = record.identity;
        let member = token_id.to_string();

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(self.keys.token(token_id))
            .ignore()
            .srem(self.keys.user(identity.user_id), &member)
            .ignore()
            .srem(
                self.keys.device(identity.user_id, &identity.device_id),
                &member,
            )
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn revoke_by_device(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
    ) -> Result<(), TokenStoreError> {
        let revoked = self.revoke_index(self.keys.device(user_id, device_id)).await?;
        tracing::trace!(%user_id, %device_id, revoked, "revoked slot");
        Ok(())
    }

    async fn revoke_by_user(&self, user_id: UserId) -> Result<(), TokenStoreError> {
        let revoked = self.revoke_index(self.keys.user(user_id)).await?;
        tracing::trace!(%user_id, revoked, "revoked user");
        Ok(())
    }
}
