use crate::application_port::*;
use crate::domain_model::*;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

const DECOY_PASSWORD: &str = "tokenkeeper-decoy-password";

struct Credentials {
    user_id: UserId,
    password_hash: String,
}

/// Identity provider over an in-process user table with Argon2 password hashes.
pub struct MemoryIdentityProvider {
    hasher: Arc<dyn CredentialHasher>,
    credentials: DashMap<String, Credentials>,
    users: DashMap<UserId, User>,
    // verified against when the login is unknown, so both paths cost one hash check
    decoy_hash: OnceCell<String>,
}

impl MemoryIdentityProvider {
    pub fn new(hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            hasher,
            credentials: DashMap::new(),
            users: DashMap::new(),
            decoy_hash: OnceCell::new(),
        }
    }

    /// Add a user whose password is already a PHC hash string.
    pub fn insert_hashed(
        &self,
        id: UserId,
        login: &str,
        role: Role,
        password_hash: String,
    ) -> User {
        let user = User {
            id,
            login: login.to_string(),
            role,
        };
        self.credentials.insert(
            login.to_string(),
            Credentials {
                user_id: user.id,
                password_hash,
            },
        );
        self.users.insert(user.id, user.clone());
        user
    }

    pub async fn register(
        &self,
        login: &str,
        password: &str,
        role: Role,
    ) -> Result<User, IdentityError> {
        let password_hash = self.hasher.hash_password(password).await?;
        Ok(self.insert_hashed(UserId::from_login(login), login, role, password_hash))
    }

    pub fn remove(&self, user_id: UserId) {
        if let Some((_, user)) = self.users.remove(&user_id) {
            self.credentials.remove(&user.login);
        }
    }

    async fn reject_unknown_login(&self, password: &str) -> IdentityError {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.hasher.hash_password(DECOY_PASSWORD))
            .await;
        match decoy {
            Ok(hash) => {
                let _ = self.hasher.verify_password(password, hash).await;
                IdentityError::AuthenticationFailed
            }
            Err(e) => e,
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn validate_credentials(
        &self,
        login: &str,
        password: &str,
    ) -> Result<User, IdentityError> {
        let (user_id, password_hash) = match self.credentials.get(login) {
            Some(entry) => (entry.user_id, entry.password_hash.clone()),
            None => return Err(self.reject_unknown_login(password).await),
        };

        if !self.hasher.verify_password(password, &password_hash).await? {
            return Err(IdentityError::AuthenticationFailed);
        }

        self.users
            .get(&user_id)
            .map(|user| user.clone())
            .ok_or(IdentityError::AuthenticationFailed)
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<User, IdentityError> {
        self.users
            .get(&user_id)
            .map(|user| user.clone())
            .ok_or(IdentityError::NotFound(user_id))
    }
}
