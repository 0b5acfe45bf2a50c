use crate::application_port::{CodecError, TokenCodec};
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub signing_key: Vec<u8>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    did: String,
    jti: String,
    typ: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rol: Option<Role>,
    iat: i64,
    nbf: i64,
    exp: i64,
    iss: String,
    aud: String,
}

/// HS256 JSON Web Token codec.
///
/// `exp` and `nbf` are carried but not enforced here: the lifecycle service
/// checks the window after it has looked at the stored status.
pub struct JwtCodec {
    cfg: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtCodec {
    pub fn new(cfg: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_audience(&[cfg.audience.clone()]);
        validation.set_issuer(&[cfg.issuer.clone()]);
        validation.set_required_spec_claims(&["exp", "nbf", "sub", "iss", "aud"]);

        Self {
            encoding_key: EncodingKey::from_secret(&cfg.signing_key),
            decoding_key: DecodingKey::from_secret(&cfg.signing_key),
            validation,
            cfg,
        }
    }

    fn wire(
        &self,
        kind: TokenKind,
        identity: &TokenIdentity,
        role: Option<Role>,
        issued_at: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> WireClaims {
        WireClaims {
            sub: identity.user_id.to_string(),
            did: identity.device_id.0.clone(),
            jti: identity.token_id.to_string(),
            typ: kind,
            rol: role,
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            exp: expires.timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
        }
    }

    fn sign(&self, claims: &WireClaims) -> Result<String, CodecError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<WireClaims, CodecError> {
        let data = decode::<WireClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => CodecError::InvalidSignature,
                _ => CodecError::Malformed(e.to_string()),
            },
        )?;
        if data.claims.typ != kind {
            return Err(CodecError::Malformed(format!(
                "expected {} token, got {}",
                kind, data.claims.typ
            )));
        }
        Ok(data.claims)
    }

    fn identity(claims: &WireClaims) -> Result<TokenIdentity, CodecError> {
        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|e| CodecError::Malformed(format!("sub: {}", e)))?;
        let token_id = claims
            .jti
            .parse::<TokenId>()
            .map_err(|e| CodecError::Malformed(format!("jti: {}", e)))?;
        Ok(TokenIdentity {
            token_id,
            user_id,
            device_id: DeviceId(claims.did.clone()),
        })
    }

    fn timestamp(secs: i64, claim: &str) -> Result<DateTime<Utc>, CodecError> {
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| CodecError::Malformed(format!("{} out of range", claim)))
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtCodec {
    async fn encode_access(&self, claims: &AccessClaims) -> Result<AccessToken, CodecError> {
        let wire = self.wire(
            TokenKind::Access,
            &claims.identity,
            Some(claims.role),
            claims.issued_at,
            claims.expires,
        );
        Ok(AccessToken(self.sign(&wire)?))
    }

    async fn decode_access(&self, token: &str) -> Result<AccessClaims, CodecError> {
        let wire = self.verify(token, TokenKind::Access)?;
        let role = wire
            .rol
            .ok_or_else(|| CodecError::Malformed("access token without role".to_string()))?;
        Ok(AccessClaims {
            identity: Self::identity(&wire)?,
            role,
            issued_at: Self::timestamp(wire.nbf, "nbf")?,
            expires: Self::timestamp(wire.exp, "exp")?,
        })
    }

    async fn encode_refresh(&self, claims: &RefreshClaims) -> Result<RefreshToken, CodecError> {
        let wire = self.wire(
            TokenKind::Refresh,
            &claims.identity,
            None,
            claims.issued_at,
            claims.expires,
        );
        Ok(RefreshToken(self.sign(&wire)?))
    }

    async fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, CodecError> {
        let wire = self.verify(token, TokenKind::Refresh)?;
        Ok(RefreshClaims {
            identity: Self::identity(&wire)?,
            issued_at: Self::timestamp(wire.nbf, "nbf")?,
            expires: Self::timestamp(wire.exp, "exp")?,
        })
    }
}
