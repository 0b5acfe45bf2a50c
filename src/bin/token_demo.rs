/// Walks through a session lifecycle against in-memory stores: login on two
/// devices, one rotation, a replay of the rotated-out refresh token, and the
/// resulting sweep of every session of the user.
///
/// $ cargo run --bin token_demo
use std::sync::Arc;
use tokenkeeper::application_impl::*;
use tokenkeeper::application_port::*;
use tokenkeeper::domain_model::*;
use tokenkeeper::infra_memory::*;
use tokenkeeper::logger::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    logger.reload_from_config(&LogConfig {
        filter: "token_demo=debug,tokenkeeper=debug".to_string(),
    })?;

    let identity = Arc::new(MemoryIdentityProvider::new(Arc::new(Argon2PasswordHasher)));
    let alice = identity.register("alice", "wonderland", Role::Admin).await?;
    info!(user_id = %alice.id, "registered alice");

    let codec = Arc::new(JwtCodec::new(JwtConfig {
        issuer: "tokenkeeper.demo".to_string(),
        audience: "demo".to_string(),
        signing_key: b"demo-signing-key".to_vec(),
    }));
    let access_store = Arc::new(MemoryTokenStore::new(TokenKind::Access));
    let refresh_store = Arc::new(MemoryTokenStore::new(TokenKind::Refresh));

    let service = TokenLifecycleService::new(
        identity,
        codec,
        access_store.clone(),
        refresh_store.clone(),
        LifecycleConfig::default(),
    );

    let login = |device: &str| LoginInput {
        login: "alice".to_string(),
        password: "wonderland".to_string(),
        device_id: DeviceId::from(device),
    };

    let phone = service.login(login("phone-1")).await?;
    let laptop = service.login(login("laptop")).await?;
    let claims = service.validate_access(&phone.access_token.0).await?;
    info!(role = %claims.role, device = %claims.identity.device_id, "phone access token valid");

    let rotated = service.refresh(alice.id, &phone.refresh_token.0).await?;
    info!("phone rotated once");

    match service.refresh(alice.id, &phone.refresh_token.0).await {
        Err(e @ AuthError::SecurityViolation { .. }) => warn!(%e, "replay caught"),
        other => anyhow::bail!("replay was not caught: {:?}", other.map(|_| ())),
    }

    for (name, token) in [("rotated phone", &rotated.access_token), ("laptop", &laptop.access_token)] {
        match service.validate_access(&token.0).await {
            Err(AuthError::Forbidden) => info!(name, "revoked by the sweep"),
            other => anyhow::bail!("{} survived the sweep: {:?}", name, other.map(|_| ())),
        }
    }

    let active = access_store
        .records_of(alice.id)
        .into_iter()
        .chain(refresh_store.records_of(alice.id))
        .filter(|r| r.status == TokenStatus::Active)
        .count();
    info!(active, "active records left for alice");

    Ok(())
}
