use crate::domain_model::*;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    TokenExpired,
    #[error("token not yet valid")]
    TokenNotYetValid,
    #[error("token revoked")]
    Forbidden,
    #[error("refresh token replay detected for user {user_id}{}", containment_suffix(.containment))]
    SecurityViolation {
        user_id: UserId,
        containment: Option<ErrorList>,
    },
    #[error("user lookup failed: {0}")]
    UserLookupFailed(String),
    #[error("token encoding failed: {0}")]
    Encode(String),
    #[error("store unavailable during {op}: {detail}")]
    StoreUnavailable { op: &'static str, detail: String },
    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),
    #[error("internal error: {0}")]
    InternalError(String),
}

fn containment_suffix(containment: &Option<ErrorList>) -> String {
    match containment {
        Some(errors) => format!(" (containment incomplete: {})", errors),
        None => String::new(),
    }
}

impl AuthError {
    /// Errors a client must answer with "re-authenticate". Kept apart so the
    /// transport can collapse them into one response.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::AuthenticationFailed
                | AuthError::InvalidToken(_)
                | AuthError::TokenExpired
                | AuthError::TokenNotYetValid
                | AuthError::Forbidden
                | AuthError::SecurityViolation { .. }
        )
    }
}

/// Several failures collected from steps that were all attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(pub Vec<String>);

impl ErrorList {
    pub fn push(&mut self, error: impl fmt::Display) {
        self.0.push(error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_option(self) -> Option<ErrorList> {
        if self.is_empty() { None } else { Some(self) }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub login: String,
    pub password: String,
    pub device_id: DeviceId,
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, request: LoginInput) -> Result<IssuedPair, AuthError>;
    /// Rotate a refresh token. `user_id` is the caller's claim and must match the token.
    async fn refresh(&self, user_id: UserId, refresh_token: &str)
    -> Result<IssuedPair, AuthError>;
    async fn validate_access(&self, access_token: &str) -> Result<AccessClaims, AuthError>;
    async fn logout(&self, user_id: UserId, device_id: &DeviceId) -> Result<(), AuthError>;
    async fn logout_all(&self, user_id: UserId) -> Result<(), AuthError>;
}
