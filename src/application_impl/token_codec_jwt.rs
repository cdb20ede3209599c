use crate::application_port::{AccessToken, AccessTokenCodec, AuthError, Identity};
use crate::domain_model::{Role, UserId};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String, // user id as string
    email: String,
    role: Role,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    fn validation(&self) -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.validate_exp = true;
        v.set_audience(&[self.cfg.audience.clone()]);
        v.set_issuer(&[self.cfg.issuer.clone()]);
        v
    }
}

#[async_trait::async_trait]
impl AccessTokenCodec for JwtHs256Codec {
    async fn issue(&self, identity: &Identity) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        let iat_dt = Utc::now();
        let exp_dt = iat_dt + self.cfg.access_ttl;
        let claims = AccessClaims {
            sub: identity.user_id.to_string(),
            email: identity.email.clone(),
            role: identity.role,
            exp: exp_dt.timestamp(),
            iat: iat_dt.timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.cfg.signing_key),
        )
        .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok((AccessToken(token), exp_dt))
    }

    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        // Expired, tampered, mis-issued: the caller sees one error for all.
        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(&self.cfg.signing_key),
            &self.validation(),
        )
        .map_err(|_| AuthError::Unauthorized)?;

        let user_id = data
            .claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::Unauthorized)?;

        Ok(Identity {
            user_id,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}
