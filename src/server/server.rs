use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use anyhow::anyhow;
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtCodec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            audience: settings.auth.audience.clone(),
            signing_key: settings.auth.signing_key.clone().into_bytes(),
        }));

        let (access_store, refresh_store): (Arc<dyn TokenStore>, Arc<dyn TokenStore>) =
            match settings.store.backend.as_str() {
                "memory" => (
                    Arc::new(MemoryTokenStore::new(TokenKind::Access)),
                    Arc::new(MemoryTokenStore::new(TokenKind::Refresh)),
                ),
                "redis" => {
                    let url = settings
                        .store
                        .redis_url
                        .as_deref()
                        .ok_or_else(|| anyhow!("store.redis_url is required for the redis backend"))?;
                    let redis_client = redis::Client::open(url)?;
                    let redis_manager = redis_client.get_connection_manager().await?;
                    let namespace = settings.store.namespace.as_str();
                    (
                        Arc::new(RedisTokenStore::new(
                            redis_manager.clone(),
                            namespace,
                            TokenKind::Access,
                        )),
                        Arc::new(RedisTokenStore::new(
                            redis_manager,
                            namespace,
                            TokenKind::Refresh,
                        )),
                    )
                }
                other => return Err(anyhow!("Unknown store backend: {}", other)),
            };

        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher);
        let identity_provider = Arc::new(MemoryIdentityProvider::new(credential_hasher));
        for seed in &settings.identity.users {
            let role = seed.role.parse::<Role>()?;
            let id = seed.id.unwrap_or_else(|| UserId::from_login(&seed.login));
            let user =
                identity_provider.insert_hashed(id, &seed.login, role, seed.password_hash.clone());
            info!(login = %user.login, user_id = %user.id, %role, "seeded user");
        }

        let cfg = LifecycleConfig {
            access_ttl: TimeDelta::try_seconds(settings.auth.access_ttl_secs)
                .ok_or_else(|| anyhow!("auth.access_ttl_secs out of range"))?,
            refresh_ttl: TimeDelta::try_seconds(settings.auth.refresh_ttl_secs)
                .ok_or_else(|| anyhow!("auth.refresh_ttl_secs out of range"))?,
            call_timeout: settings.auth.call_timeout_ms.map(Duration::from_millis),
        };

        let auth_service: Arc<dyn AuthService> = Arc::new(TokenLifecycleService::new(
            identity_provider,
            token_codec,
            access_store,
            refresh_store,
            cfg,
        ));

        info!(backend = %settings.store.backend, "server started");

        Ok(Self { auth_service })
    }
}
