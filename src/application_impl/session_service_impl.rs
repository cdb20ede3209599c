use crate::application_port::{
    AccessToken, AccessTokenCodec, AuthError, CredentialHasher, Identity, LoginInput, LoginResult,
    RefreshSecret, SessionService, SessionTokens,
};
use crate::domain_port::{IdentityRepo, RefreshTokenStore, TxManager};
use crate::logger::*;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub struct Argon2CredentialHasher;

#[async_trait::async_trait]
impl CredentialHasher for Argon2CredentialHasher {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = argon2::password_hash::SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    async fn verify_password(
        &self,
        password: &str,
        password_hash: &str,
    ) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AuthError::Internal(format!("invalid PHC hash: {}", e)))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Internal(format!("verify error: {}", e))),
        }
    }
}

/// Fresh refresh secret plaintext: `n_bytes` of OS entropy, hex-encoded to a
/// fixed-length token. An entropy fault is surfaced, never papered over with
/// a weaker source.
pub fn generate_refresh_secret(n_bytes: usize) -> Result<RefreshSecret, AuthError> {
    let mut buf = vec![0u8; n_bytes];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| AuthError::Internal(format!("entropy source failed: {}", e)))?;
    Ok(RefreshSecret(hex::encode(buf)))
}

/// Digest used both to persist and to look up a refresh secret. The
/// plaintext itself never reaches the store.
pub fn digest_refresh_secret(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub refresh_ttl: Duration,
    pub secret_bytes: usize,
}

struct MintedSession {
    access_token: AccessToken,
    access_token_expires_at: DateTime<Utc>,
    refresh_secret: RefreshSecret,
    token_hash: String,
    refresh_expires_at: DateTime<Utc>,
}

impl MintedSession {
    fn into_tokens(self) -> SessionTokens {
        SessionTokens {
            access_token: self.access_token,
            access_token_expires_at: self.access_token_expires_at,
            refresh_secret: self.refresh_secret,
            refresh_expires_at: self.refresh_expires_at,
        }
    }
}

pub struct RealSessionService {
    identity_repo: Arc<dyn IdentityRepo>,
    store: Arc<dyn RefreshTokenStore>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_codec: Arc<dyn AccessTokenCodec>,
    tx_manager: Arc<dyn TxManager>,
    config: SessionConfig,
}

impl RealSessionService {
    pub fn new(
        identity_repo: Arc<dyn IdentityRepo>,
        store: Arc<dyn RefreshTokenStore>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_codec: Arc<dyn AccessTokenCodec>,
        tx_manager: Arc<dyn TxManager>,
        config: SessionConfig,
    ) -> Self {
        Self {
            identity_repo,
            store,
            credential_hasher,
            token_codec,
            tx_manager,
            config,
        }
    }

    /// Everything except the store writes: access token, fresh secret, its
    /// digest, the expiry instants.
    async fn mint(&self, identity: &Identity) -> Result<MintedSession, AuthError> {
        let (access_token, access_token_expires_at) = self.token_codec.issue(identity).await?;
        let refresh_secret = generate_refresh_secret(self.config.secret_bytes)?;
        let token_hash = digest_refresh_secret(&refresh_secret.0);
        let refresh_expires_at = Utc::now() + self.config.refresh_ttl;
        Ok(MintedSession {
            access_token,
            access_token_expires_at,
            refresh_secret,
            token_hash,
            refresh_expires_at,
        })
    }

    async fn login_flow(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        let account = self
            .identity_repo
            .find_by_email(&request.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !account.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        let ok = self
            .credential_hasher
            .verify_password(&request.password, &account.password_hash)
            .await?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        let identity = Identity {
            user_id: account.user_id,
            email: account.email,
            role: account.role,
        };

        let minted = self.mint(&identity).await?;
        self.store
            .create(&minted.token_hash, identity.user_id, minted.refresh_expires_at)
            .await?;

        Ok(LoginResult {
            user: identity,
            tokens: minted.into_tokens(),
        })
    }

    async fn rotate_flow(&self, presented: &str) -> Result<SessionTokens, AuthError> {
        let token_hash = digest_refresh_secret(presented);
        let record = self
            .store
            .find_by_hash(&token_hash)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !record.is_usable(Utc::now()) {
            return Err(AuthError::Unauthorized);
        }

        let account = self
            .identity_repo
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if !account.is_active {
            return Err(AuthError::Unauthorized);
        }

        let identity = Identity {
            user_id: account.user_id,
            email: account.email,
            role: account.role,
        };
        let minted = self.mint(&identity).await?;

        // Consume-old and issue-new are one transition: both land or
        // neither. A dropped tx rolls back.
        let mut tx = self
            .tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let flipped = self.store.mark_revoked_in_tx(tx.as_mut(), record.id).await?;
        if !flipped {
            // A concurrent rotation consumed this record first.
            return Err(AuthError::Unauthorized);
        }

        self.store
            .create_in_tx(
                tx.as_mut(),
                &minted.token_hash,
                identity.user_id,
                minted.refresh_expires_at,
            )
            .await?;

        tx.commit()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(minted.into_tokens())
    }

    async fn revoke_flow(&self, presented: &str) -> Result<bool, AuthError> {
        let token_hash = digest_refresh_secret(presented);
        match self.store.find_by_hash(&token_hash).await? {
            None => Ok(false),
            Some(record) => self.store.mark_revoked(record.id).await,
        }
    }
}

// The normalizing boundary: internal causes are logged here and nowhere
// else; callers see exactly one failure shape per operation.

fn as_invalid_credentials(err: AuthError) -> AuthError {
    if !matches!(err, AuthError::InvalidCredentials) {
        warn!("login rejected: {}", err);
    }
    AuthError::InvalidCredentials
}

fn as_unauthorized(err: AuthError) -> AuthError {
    if !matches!(err, AuthError::Unauthorized) {
        warn!("refresh token rejected: {}", err);
    }
    AuthError::Unauthorized
}

#[async_trait::async_trait]
impl SessionService for RealSessionService {
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        self.login_flow(request).await.map_err(as_invalid_credentials)
    }

    async fn rotate(&self, presented: &str) -> Result<SessionTokens, AuthError> {
        self.rotate_flow(presented).await.map_err(as_unauthorized)
    }

    async fn revoke(&self, presented: &str) -> Result<bool, AuthError> {
        self.revoke_flow(presented).await.map_err(as_unauthorized)
    }

    async fn verify_access(&self, token: &str) -> Result<Identity, AuthError> {
        self.token_codec.verify(token).await.map_err(as_unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{JwtConfig, JwtHs256Codec};
    use crate::domain_model::{Role, UserId};
    use crate::domain_port::{IdentityRecord, RefreshTokenId, RefreshTokenRecord, StorageTx};
    use crate::infra_memory::{MemoryIdentityRepo, MemoryRefreshTokenStore, MemoryTxManager};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    const EMAIL: &str = "a@a.com";
    const PASSWORD: &str = "correct";
    const SECRET_BYTES: usize = 32;

    fn test_codec() -> Arc<dyn AccessTokenCodec> {
        Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: "registrar.auth".to_string(),
            audience: "registrar-client".to_string(),
            access_ttl: Duration::from_secs(3600),
            signing_key: b"test-signing-key".to_vec(),
        }))
    }

    struct TestEnv {
        service: RealSessionService,
        store: Arc<MemoryRefreshTokenStore>,
        identities: Arc<MemoryIdentityRepo>,
        user_id: UserId,
    }

    async fn seeded_account(identities: &MemoryIdentityRepo, active: bool) -> UserId {
        let user_id = UserId(Uuid::new_v4());
        let password_hash = Argon2CredentialHasher
            .hash_password(PASSWORD)
            .await
            .unwrap();
        identities.insert(IdentityRecord {
            user_id,
            email: EMAIL.to_string(),
            password_hash,
            role: Role::Student,
            is_active: active,
            created_at: Utc::now(),
        });
        user_id
    }

    async fn env() -> TestEnv {
        let identities = Arc::new(MemoryIdentityRepo::new());
        let user_id = seeded_account(&identities, true).await;
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let service = RealSessionService::new(
            identities.clone(),
            store.clone(),
            Arc::new(Argon2CredentialHasher),
            test_codec(),
            Arc::new(MemoryTxManager),
            SessionConfig {
                refresh_ttl: Duration::from_secs(7 * 24 * 3600),
                secret_bytes: SECRET_BYTES,
            },
        );
        TestEnv {
            service,
            store,
            identities,
            user_id,
        }
    }

    fn login_input(password: &str) -> LoginInput {
        LoginInput {
            email: EMAIL.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn secrets_are_fixed_length_hex_and_unique() {
        let a = generate_refresh_secret(SECRET_BYTES).unwrap();
        let b = generate_refresh_secret(SECRET_BYTES).unwrap();

        assert_eq!(a.0.len(), SECRET_BYTES * 2);
        assert!(a.0.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn digest_is_deterministic_and_distinct_from_input() {
        let digest = digest_refresh_secret("some-secret");

        assert_eq!(digest, digest_refresh_secret("some-secret"));
        assert_ne!(digest, digest_refresh_secret("some-secreu"));
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, "some-secret");
    }

    #[tokio::test]
    async fn login_issues_decodable_claims_and_persists_only_the_digest() {
        let env = env().await;

        let result = env.service.login(login_input(PASSWORD)).await.unwrap();

        let identity = env
            .service
            .verify_access(&result.tokens.access_token.0)
            .await
            .unwrap();
        assert_eq!(identity.email, EMAIL);
        assert_eq!(identity.user_id, env.user_id);

        let plaintext = &result.tokens.refresh_secret.0;
        assert_eq!(plaintext.len(), SECRET_BYTES * 2);
        assert!(result.tokens.refresh_expires_at > Utc::now());

        let record = env
            .store
            .find_by_hash(&digest_refresh_secret(plaintext))
            .await
            .unwrap()
            .expect("record for fresh secret");
        assert_eq!(record.user_id, env.user_id);
        assert!(!record.revoked);
        assert_ne!(record.token_hash, *plaintext);
        // The plaintext itself must not work as a lookup key.
        assert!(env.store.find_by_hash(plaintext).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_with_wrong_password_writes_nothing() {
        let env = env().await;

        let err = env.service.login(login_input("nope")).await.unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(env.store.is_empty());
    }

    #[tokio::test]
    async fn login_with_unknown_email_fails_the_same_way() {
        let env = env().await;

        let err = env
            .service
            .login(LoginInput {
                email: "nobody@a.com".to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_with_inactive_account_fails_the_same_way() {
        let identities = Arc::new(MemoryIdentityRepo::new());
        seeded_account(&identities, false).await;
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let service = RealSessionService::new(
            identities,
            store.clone(),
            Arc::new(Argon2CredentialHasher),
            test_codec(),
            Arc::new(MemoryTxManager),
            SessionConfig {
                refresh_ttl: Duration::from_secs(3600),
                secret_bytes: SECRET_BYTES,
            },
        );

        let err = service.login(login_input(PASSWORD)).await.unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rotation_consumes_the_presented_secret() {
        let env = env().await;
        let login = env.service.login(login_input(PASSWORD)).await.unwrap();
        let old_secret = login.tokens.refresh_secret.0.clone();

        let rotated = env.service.rotate(&old_secret).await.unwrap();

        assert_ne!(rotated.refresh_secret.0, old_secret);
        assert_eq!(env.store.len(), 2);

        let old_record = env
            .store
            .find_by_hash(&digest_refresh_secret(&old_secret))
            .await
            .unwrap()
            .unwrap();
        assert!(old_record.revoked);

        let identity = env
            .service
            .verify_access(&rotated.access_token.0)
            .await
            .unwrap();
        assert_eq!(identity.user_id, env.user_id);

        // Replay of the consumed secret.
        assert!(matches!(
            env.service.rotate(&old_secret).await,
            Err(AuthError::Unauthorized)
        ));
        assert_eq!(env.store.len(), 2);
    }

    #[tokio::test]
    async fn rotation_of_an_unknown_secret_leaves_the_store_unchanged() {
        let env = env().await;

        let err = env.service.rotate("never-issued").await.unwrap_err();

        assert!(matches!(err, AuthError::Unauthorized));
        assert!(env.store.is_empty());
    }

    #[tokio::test]
    async fn rotation_of_an_expired_record_is_rejected() {
        let env = env().await;
        let secret = generate_refresh_secret(SECRET_BYTES).unwrap();
        env.store
            .create(
                &digest_refresh_secret(&secret.0),
                env.user_id,
                Utc::now() - ChronoDuration::minutes(1),
            )
            .await
            .unwrap();

        let err = env.service.rotate(&secret.0).await.unwrap_err();

        assert!(matches!(err, AuthError::Unauthorized));
        let record = env
            .store
            .find_by_hash(&digest_refresh_secret(&secret.0))
            .await
            .unwrap()
            .unwrap();
        assert!(!record.revoked, "expired records are rejected, not flipped");
    }

    #[tokio::test]
    async fn rotation_after_the_owner_vanished_is_rejected() {
        let env = env().await;
        let login = env.service.login(login_input(PASSWORD)).await.unwrap();
        env.identities.remove(&env.user_id);

        let err = env
            .service
            .rotate(&login.tokens.refresh_secret.0)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn all_rotation_failures_share_one_shape() {
        let env = env().await;

        // Unknown secret.
        let unknown = env.service.rotate("never-issued").await.unwrap_err();

        // Revoked secret.
        let login = env.service.login(login_input(PASSWORD)).await.unwrap();
        let revoked_secret = login.tokens.refresh_secret.0.clone();
        env.service.revoke(&revoked_secret).await.unwrap();
        let revoked = env.service.rotate(&revoked_secret).await.unwrap_err();

        // Expired secret.
        let stale = generate_refresh_secret(SECRET_BYTES).unwrap();
        env.store
            .create(
                &digest_refresh_secret(&stale.0),
                env.user_id,
                Utc::now() - ChronoDuration::minutes(1),
            )
            .await
            .unwrap();
        let expired = env.service.rotate(&stale.0).await.unwrap_err();

        for err in [unknown, revoked, expired] {
            assert!(matches!(err, AuthError::Unauthorized));
            assert_eq!(err.to_string(), "invalid refresh token");
        }
    }

    #[tokio::test]
    async fn revocation_is_idempotent() {
        let env = env().await;
        let login = env.service.login(login_input(PASSWORD)).await.unwrap();
        let secret = login.tokens.refresh_secret.0.clone();

        assert!(env.service.revoke(&secret).await.unwrap());
        assert!(!env.service.revoke(&secret).await.unwrap());
        assert!(!env.service.revoke("never-issued").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_rotations_settle_on_one_winner() {
        let env = env().await;
        let login = env.service.login(login_input(PASSWORD)).await.unwrap();
        let secret = login.tokens.refresh_secret.0.clone();

        let (a, b) = tokio::join!(env.service.rotate(&secret), env.service.rotate(&secret));

        assert!(
            a.is_ok() ^ b.is_ok(),
            "exactly one rotation may win: {:?} / {:?}",
            a.as_ref().map(|_| ()),
            b.as_ref().map(|_| ())
        );
        // One revoked original plus one replacement from the winner.
        assert_eq!(env.store.len(), 2);
    }

    #[tokio::test]
    async fn garbage_bearer_tokens_are_rejected_uniformly() {
        let env = env().await;

        assert!(matches!(
            env.service.verify_access("not-a-jwt").await,
            Err(AuthError::Unauthorized)
        ));
    }

    // Store failures must not leak through the public surface.

    struct FailingStore;

    #[async_trait::async_trait]
    impl RefreshTokenStore for FailingStore {
        async fn create(
            &self,
            _token_hash: &str,
            _user_id: UserId,
            _expires_at: DateTime<Utc>,
        ) -> Result<(), AuthError> {
            Err(AuthError::Store("backend offline".to_string()))
        }

        async fn create_in_tx<'t>(
            &self,
            _tx: &mut dyn StorageTx<'t>,
            _token_hash: &str,
            _user_id: UserId,
            _expires_at: DateTime<Utc>,
        ) -> Result<(), AuthError> {
            Err(AuthError::Store("backend offline".to_string()))
        }

        async fn find_by_hash(
            &self,
            _token_hash: &str,
        ) -> Result<Option<RefreshTokenRecord>, AuthError> {
            Err(AuthError::Store("backend offline".to_string()))
        }

        async fn mark_revoked(&self, _id: RefreshTokenId) -> Result<bool, AuthError> {
            Err(AuthError::Store("backend offline".to_string()))
        }

        async fn mark_revoked_in_tx<'t>(
            &self,
            _tx: &mut dyn StorageTx<'t>,
            _id: RefreshTokenId,
        ) -> Result<bool, AuthError> {
            Err(AuthError::Store("backend offline".to_string()))
        }

        async fn delete_expired(&self) -> Result<u64, AuthError> {
            Err(AuthError::Store("backend offline".to_string()))
        }
    }

    #[tokio::test]
    async fn internal_failures_collapse_to_the_public_taxonomy() {
        let identities = Arc::new(MemoryIdentityRepo::new());
        seeded_account(&identities, true).await;
        let service = RealSessionService::new(
            identities,
            Arc::new(FailingStore),
            Arc::new(Argon2CredentialHasher),
            test_codec(),
            Arc::new(MemoryTxManager),
            SessionConfig {
                refresh_ttl: Duration::from_secs(3600),
                secret_bytes: SECRET_BYTES,
            },
        );

        assert!(matches!(
            service.login(login_input(PASSWORD)).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            service.rotate("anything").await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            service.revoke("anything").await,
            Err(AuthError::Unauthorized)
        ));
    }
}
