use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("user {0} not found")]
    NotFound(UserId),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Must not reveal whether the login or the password was wrong.
    async fn validate_credentials(&self, login: &str, password: &str)
    -> Result<User, IdentityError>;
    async fn get_user_by_id(&self, user_id: UserId) -> Result<User, IdentityError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, IdentityError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, IdentityError>;
}
