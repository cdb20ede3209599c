use super::error::*;
use crate::application_port::{AccessToken, Identity, LoginInput, SessionService};
use crate::domain_model::{Role, UserId};
use crate::logger::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::header;
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

/// The refresh secret travels only in this cookie, scoped to the auth
/// endpoints and unreadable from scripts.
#[derive(Debug, Clone)]
pub struct RefreshCookie {
    pub path: String,
    pub secure: bool,
    pub max_age_secs: u64,
}

impl RefreshCookie {
    pub const NAME: &'static str = "refresh_token";

    fn set(&self, secret: &str) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}{}",
            Self::NAME,
            secret,
            self.path,
            self.max_age_secs,
            if self.secure { "; Secure" } else { "" },
        )
    }

    fn clear(&self) -> String {
        format!(
            "{}=; HttpOnly; SameSite=Strict; Path={}; Max-Age=0{}",
            Self::NAME,
            self.path,
            if self.secure { "; Secure" } else { "" },
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBody {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

impl From<Identity> for UserBody {
    fn from(identity: Identity) -> Self {
        UserBody {
            id: identity.user_id,
            email: identity.email,
            role: identity.role,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub user: UserBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub status: &'static str,
}

pub async fn login(
    body: LoginRequest,
    sessions: Arc<dyn SessionService>,
    cookie: Arc<RefreshCookie>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = sessions
        .login(LoginInput {
            email: body.email,
            password: body.password,
        })
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let set_cookie = cookie.set(&result.tokens.refresh_secret.0);
    let response = ApiResponse::ok(LoginResponse {
        access_token: result.tokens.access_token,
        access_token_expires_at: result.tokens.access_token_expires_at,
        user: result.user.into(),
    });

    Ok(warp::reply::with_header(
        warp::reply::json(&response),
        header::SET_COOKIE,
        set_cookie,
    ))
}

pub async fn refresh(
    presented: Option<String>,
    sessions: Arc<dyn SessionService>,
    cookie: Arc<RefreshCookie>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let presented = presented.ok_or_else(|| reject::custom(ApiErrorCode::Unauthorized))?;

    let tokens = sessions
        .rotate(&presented)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let set_cookie = cookie.set(&tokens.refresh_secret.0);
    let response = ApiResponse::ok(RefreshResponse {
        access_token: tokens.access_token,
        access_token_expires_at: tokens.access_token_expires_at,
    });

    Ok(warp::reply::with_header(
        warp::reply::json(&response),
        header::SET_COOKIE,
        set_cookie,
    ))
}

pub async fn logout(
    presented: Option<String>,
    sessions: Arc<dyn SessionService>,
    cookie: Arc<RefreshCookie>,
) -> Result<impl warp::Reply, warp::Rejection> {
    // Logout never fails for a token that is already gone.
    if let Some(presented) = presented {
        match sessions.revoke(&presented).await {
            Ok(revoked) => debug!("logout revoked refresh token: {}", revoked),
            Err(e) => warn!("revoking refresh token on logout: {}", e),
        }
    }

    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(LogoutResponse { status: "ok" })),
        header::SET_COOKIE,
        cookie.clear(),
    ))
}

pub async fn me(identity: Identity) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(UserBody::from(
        identity,
    ))))
}
