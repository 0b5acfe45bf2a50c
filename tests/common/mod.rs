#![allow(dead_code)]

use std::sync::Arc;
use tokenkeeper::application_impl::*;
use tokenkeeper::application_port::*;
use tokenkeeper::domain_model::*;
use tokenkeeper::infra_memory::*;

/// Stores the password verbatim so tests skip the Argon2 work factor.
pub struct PlainHasher;

#[async_trait::async_trait]
impl CredentialHasher for PlainHasher {
    async fn hash_password(&self, password: &str) -> Result<String, IdentityError> {
        Ok(format!("plain${}", password))
    }

    async fn verify_password(
        &self,
        password: &str,
        password_hash: &str,
    ) -> Result<bool, IdentityError> {
        Ok(password_hash.strip_prefix("plain$") == Some(password))
    }
}

pub const PASSWORD: &str = "correct horse";

pub struct Fixture {
    pub service: Arc<TokenLifecycleService>,
    pub identity: Arc<MemoryIdentityProvider>,
    pub access_store: Arc<MemoryTokenStore>,
    pub refresh_store: Arc<MemoryTokenStore>,
    pub alice: User,
    pub bob: User,
}

impl Fixture {
    pub async fn new() -> Self {
        let identity = Arc::new(MemoryIdentityProvider::new(Arc::new(PlainHasher)));
        let alice = identity
            .register("alice", PASSWORD, Role::Admin)
            .await
            .unwrap();
        let bob = identity.register("bob", PASSWORD, Role::User).await.unwrap();

        let codec = Arc::new(JwtCodec::new(JwtConfig {
            issuer: "tokenkeeper.test".to_string(),
            audience: "tests".to_string(),
            signing_key: b"integration-test-key".to_vec(),
        }));
        let access_store = Arc::new(MemoryTokenStore::new(TokenKind::Access));
        let refresh_store = Arc::new(MemoryTokenStore::new(TokenKind::Refresh));

        let service = Arc::new(TokenLifecycleService::new(
            identity.clone(),
            codec,
            access_store.clone(),
            refresh_store.clone(),
            LifecycleConfig::default(),
        ));

        Fixture {
            service,
            identity,
            access_store,
            refresh_store,
            alice,
            bob,
        }
    }

    pub async fn login(&self, login: &str, device: &str) -> IssuedPair {
        self.service
            .login(LoginInput {
                login: login.to_string(),
                password: PASSWORD.to_string(),
                device_id: DeviceId::from(device),
            })
            .await
            .unwrap()
    }

    pub fn active_records(&self, user_id: UserId) -> Vec<TokenRecord> {
        self.access_store
            .records_of(user_id)
            .into_iter()
            .chain(self.refresh_store.records_of(user_id))
            .filter(|r| r.status == TokenStatus::Active)
            .collect()
    }
}
