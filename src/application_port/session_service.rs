use crate::domain_model::{Role, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid refresh token")]
    Unauthorized,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Claims carried by a verified access token. Resolving an identity from a
/// bearer token never touches the session store.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

/// Refresh secret plaintext. Deliberately not `Serialize`: it leaves the
/// process only through the refresh cookie, never through a JSON body.
#[derive(Debug, Clone)]
pub struct RefreshSecret(pub String);

#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_secret: RefreshSecret,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: Identity,
    pub tokens: SessionTokens,
}

#[async_trait::async_trait]
pub trait AccessTokenCodec: Send + Sync {
    async fn issue(&self, identity: &Identity) -> Result<(AccessToken, DateTime<Utc>), AuthError>;
    /// Any verification failure (bad signature, expired, malformed claims)
    /// must come back as the same error.
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Exchange email/password for an access token plus a fresh refresh
    /// secret. Every failure is `InvalidCredentials`.
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    /// Exchange a still-valid refresh secret for a new access/refresh pair,
    /// consuming the presented secret. Every failure is `Unauthorized`.
    async fn rotate(&self, presented: &str) -> Result<SessionTokens, AuthError>;
    /// Mark the record behind the presented secret revoked. Returns whether
    /// this call performed the flip; absent or already-revoked records give
    /// `false`, never an error.
    async fn revoke(&self, presented: &str) -> Result<bool, AuthError>;
    /// Verify a bearer access token and extract the caller identity.
    async fn verify_access(&self, token: &str) -> Result<Identity, AuthError>;
}
