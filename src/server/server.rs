use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::logger::*;
use crate::settings::Settings;
use sqlx::MySqlPool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub session_service: Arc<dyn SessionService>,
    pub cookie_path: String,
    pub cookie_secure: bool,
    pub refresh_ttl: Duration,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<MySqlPool>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let access_ttl = settings.session.access_ttl()?;
        let refresh_ttl = settings.session.refresh_ttl()?;
        let sweep_interval = settings.session.sweep_interval()?;

        let key = std::env::var("JWT_SIGNING_KEY")
            .unwrap_or_else(|_| "registrar-dev-secret".to_string())
            .into_bytes();
        let token_codec: Arc<dyn AccessTokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: "registrar.auth".to_string(),
            audience: "registrar-client".to_string(),
            access_ttl,
            signing_key: key,
        }));
        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2CredentialHasher);
        let session_config = SessionConfig {
            refresh_ttl,
            secret_bytes: settings.session.secret_bytes(),
        };

        let (session_service, store, pool): (
            Arc<dyn SessionService>,
            Arc<dyn RefreshTokenStore>,
            Option<MySqlPool>,
        ) = match settings.session.backend.as_str() {
            "memory" => {
                let identity_repo: Arc<dyn IdentityRepo> = Arc::new(MemoryIdentityRepo::new());
                let store: Arc<dyn RefreshTokenStore> = Arc::new(MemoryRefreshTokenStore::new());
                let tx_manager: Arc<dyn TxManager> = Arc::new(MemoryTxManager);
                let service = Arc::new(RealSessionService::new(
                    identity_repo,
                    store.clone(),
                    credential_hasher,
                    token_codec,
                    tx_manager,
                    session_config,
                ));
                (service, store, None)
            }
            "mysql" => {
                let dsn = settings
                    .database
                    .as_ref()
                    .map(|db| db.dsn.as_str())
                    .ok_or_else(|| {
                        anyhow::anyhow!("mysql session backend requires a [database] section")
                    })?;
                let pool = MySqlPool::connect(dsn).await?;
                let identity_repo: Arc<dyn IdentityRepo> =
                    Arc::new(MySqlIdentityRepo::new(pool.clone()));
                let store: Arc<dyn RefreshTokenStore> =
                    Arc::new(MySqlRefreshTokenStore::new(pool.clone()));
                let tx_manager: Arc<dyn TxManager> = Arc::new(MySqlTxManager::new(pool.clone()));
                let service = Arc::new(RealSessionService::new(
                    identity_repo,
                    store.clone(),
                    credential_hasher,
                    token_codec,
                    tx_manager,
                    session_config,
                ));
                (service, store, Some(pool))
            }
            other => return Err(anyhow::anyhow!("Unknown session backend: {}", other)),
        };

        Ok(Self::assemble(
            session_service,
            store,
            pool,
            settings.cookie.path.clone(),
            settings.cookie.secure,
            refresh_ttl,
            sweep_interval,
        ))
    }

    pub fn assemble(
        session_service: Arc<dyn SessionService>,
        store: Arc<dyn RefreshTokenStore>,
        pool: Option<MySqlPool>,
        cookie_path: String,
        cookie_secure: bool,
        refresh_ttl: Duration,
        sweep_interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();

        // Hygiene only: expiry is re-checked on every rotation, so a missed
        // sweep never extends a session.
        let sweeper_cancel = cancel.clone();
        let sweeper_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = sweeper_cancel.cancelled() => break,
                    _ = ticker.tick() => match store.delete_expired().await {
                        Ok(0) => {}
                        Ok(n) => info!("swept {} expired refresh tokens", n),
                        Err(e) => warn!("sweeping expired refresh tokens: {}", e),
                    },
                }
            }
        });

        info!("server started");

        Self {
            session_service,
            cookie_path,
            cookie_secure,
            refresh_ttl,
            sweeper_handle: Mutex::new(Some(sweeper_handle)),
            cancel,
            pool,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self
            .sweeper_handle
            .lock()
            .ok()
            .and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("sweeper stopped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
