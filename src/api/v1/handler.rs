use super::error::*;
use crate::application_port::{AuthService, LoginInput};
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<IssuedPair> for TokenResponse {
    fn from(pair: IssuedPair) -> Self {
        TokenResponse {
            access_token: pair.access_token.0,
            refresh_token: pair.refresh_token.0,
            token_type: IssuedPair::TOKEN_TYPE,
            access_expires_at: pair.access.expires,
            refresh_expires_at: pair.refresh.expires,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
    pub device_id: String,
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let login_input = LoginInput {
        login: body.login,
        password: body.password,
        device_id: DeviceId(body.device_id),
    };
    let pair = auth_service
        .login(login_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(TokenResponse::from(pair))))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub user_id: UserId,
    pub refresh_token: String,
}

pub async fn refresh(
    body: RefreshRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let pair = auth_service
        .refresh(body.user_id, &body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(TokenResponse::from(pair))))
}

pub async fn logout(
    claims: AccessClaims,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    auth_service
        .logout(claims.identity.user_id, &claims.identity.device_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(())))
}

pub async fn logout_all(
    claims: AccessClaims,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    auth_service
        .logout_all(claims.identity.user_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(())))
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

pub async fn session(claims: AccessClaims) -> Result<impl warp::Reply, warp::Rejection> {
    let response = SessionResponse {
        user_id: claims.identity.user_id,
        device_id: claims.identity.device_id,
        role: claims.role,
        expires_at: claims.expires,
    };
    Ok(warp::reply::json(&ApiResponse::ok(response)))
}
