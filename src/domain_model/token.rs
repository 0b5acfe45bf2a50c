use crate::domain_model::{Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub uuid::Uuid);

impl TokenId {
    /// 128-bit random identifier, unique for the lifetime of the system.
    pub fn new_random() -> Self {
        TokenId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TokenId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(TokenId)
    }
}

/// Names one logical client installation of a user.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key of an issued token. Immutable once created.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TokenIdentity {
    pub token_id: TokenId,
    pub user_id: UserId,
    pub device_id: DeviceId,
}

impl TokenIdentity {
    pub fn mint(user_id: UserId, device_id: DeviceId) -> Self {
        Self {
            token_id: TokenId::new_random(),
            user_id,
            device_id,
        }
    }

    /// Two identities share a slot when user and device match, whatever the token id.
    pub fn same_slot(&self, other: &TokenIdentity) -> bool {
        self.user_id == other.user_id && self.device_id == other.device_id
    }
}

/// Liveness of a token. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Revoked,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TokenStatus::Active),
            "revoked" => Some(TokenStatus::Revoked),
            _ => None,
        }
    }

    /// Status after writing `next` over `self`; never goes back to `Active`.
    pub fn merge(self, next: TokenStatus) -> TokenStatus {
        match (self, next) {
            (TokenStatus::Revoked, _) => TokenStatus::Revoked,
            (TokenStatus::Active, next) => next,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TokenRecord {
    pub identity: TokenIdentity,
    pub status: TokenStatus,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AccessClaims {
    pub identity: TokenIdentity,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RefreshClaims {
    pub identity: TokenIdentity,
    pub issued_at: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Outcome of checking `issued_at <= now < expires`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValidityWindow {
    Valid,
    Expired,
    NotYetValid,
}

impl ValidityWindow {
    pub fn check(issued_at: DateTime<Utc>, expires: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now >= expires {
            ValidityWindow::Expired
        } else if now < issued_at {
            ValidityWindow::NotYetValid
        } else {
            ValidityWindow::Valid
        }
    }
}

impl AccessClaims {
    pub fn window(&self, now: DateTime<Utc>) -> ValidityWindow {
        ValidityWindow::check(self.issued_at, self.expires, now)
    }
}

impl RefreshClaims {
    pub fn window(&self, now: DateTime<Utc>) -> ValidityWindow {
        ValidityWindow::check(self.issued_at, self.expires, now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct RefreshToken(pub String);

/// A freshly minted access/refresh pair, both `Active` when returned.
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access: AccessClaims,
    pub access_token: AccessToken,
    pub refresh: RefreshClaims,
    pub refresh_token: RefreshToken,
}

impl IssuedPair {
    pub const TOKEN_TYPE: &'static str = "Bearer";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn revoked_status_is_terminal() {
        assert_eq!(TokenStatus::Revoked.merge(TokenStatus::Active), TokenStatus::Revoked);
        assert_eq!(TokenStatus::Active.merge(TokenStatus::Revoked), TokenStatus::Revoked);
        assert_eq!(TokenStatus::Active.merge(TokenStatus::Active), TokenStatus::Active);
    }

    #[test]
    fn window_bounds() {
        let now = Utc::now();
        let issued = now - Duration::seconds(10);
        let expires = now + Duration::seconds(10);

        assert_eq!(ValidityWindow::check(issued, expires, now), ValidityWindow::Valid);
        assert_eq!(ValidityWindow::check(issued, expires, issued), ValidityWindow::Valid);
        assert_eq!(ValidityWindow::check(issued, expires, expires), ValidityWindow::Expired);
        assert_eq!(
            ValidityWindow::check(issued, expires, issued - Duration::seconds(1)),
            ValidityWindow::NotYetValid
        );
    }

    #[test]
    fn rotation_keeps_the_slot() {
        let user = UserId::new_random();
        let a = TokenIdentity::mint(user, DeviceId::from("phone-1"));
        let b = TokenIdentity::mint(user, DeviceId::from("phone-1"));
        let c = TokenIdentity::mint(user, DeviceId::from("laptop"));

        assert_ne!(a.token_id, b.token_id);
        assert!(a.same_slot(&b));
        assert!(!a.same_slot(&c));
    }
}
