use crate::application_impl::{UserLockGuard, UserLocks};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub access_ttl: TimeDelta,
    pub refresh_ttl: TimeDelta,
    /// Upper bound for each identity provider and store call.
    pub call_timeout: Option<Duration>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            access_ttl: TimeDelta::minutes(15),
            refresh_ttl: TimeDelta::days(30),
            call_timeout: None,
        }
    }
}

/// Issues, rotates, validates and revokes access/refresh pairs.
///
/// Mutations for one user run under that user's lock, on a spawned task that
/// owns the guard. A caller that gives up mid-way therefore never leaves a
/// half-written pair or a half-finished theft sweep behind.
pub struct TokenLifecycleService {
    inner: Arc<Lifecycle>,
    locks: UserLocks,
}

struct Lifecycle {
    identity: Arc<dyn IdentityProvider>,
    codec: Arc<dyn TokenCodec>,
    access_store: Arc<dyn TokenStore>,
    refresh_store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    cfg: LifecycleConfig,
}

impl TokenLifecycleService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        codec: Arc<dyn TokenCodec>,
        access_store: Arc<dyn TokenStore>,
        refresh_store: Arc<dyn TokenStore>,
        cfg: LifecycleConfig,
    ) -> Self {
        Self::with_clock(
            identity,
            codec,
            access_store,
            refresh_store,
            cfg,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        identity: Arc<dyn IdentityProvider>,
        codec: Arc<dyn TokenCodec>,
        access_store: Arc<dyn TokenStore>,
        refresh_store: Arc<dyn TokenStore>,
        cfg: LifecycleConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Lifecycle {
                identity,
                codec,
                access_store,
                refresh_store,
                clock,
                cfg,
            }),
            locks: UserLocks::new(),
        }
    }

    async fn run_locked<T, Fut>(
        &self,
        guard: UserLockGuard,
        op: &'static str,
        fut: Fut,
    ) -> Result<T, AuthError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, AuthError>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let _guard = guard;
            fut.await
        });
        task.await
            .map_err(|e| AuthError::InternalError(format!("{} task failed: {}", op, e)))?
    }
}

#[async_trait::async_trait]
impl AuthService for TokenLifecycleService {
    async fn login(&self, request: LoginInput) -> Result<IssuedPair, AuthError> {
        let LoginInput {
            login,
            password,
            device_id,
        } = request;

        let user = self
            .inner
            .deadline(
                "validate credentials",
                self.inner.identity.validate_credentials(&login, &password),
            )
            .await?
            .map_err(|e| match e {
                IdentityError::AuthenticationFailed | IdentityError::NotFound(_) => {
                    debug!(%login, "login rejected");
                    AuthError::AuthenticationFailed
                }
                IdentityError::Unavailable(detail) => AuthError::UserLookupFailed(detail),
            })?;

        let guard = self.locks.lock(user.id).await;
        let inner = self.inner.clone();
        self.run_locked(guard, "login", async move {
            inner.retire_slot(user.id, &device_id).await?;
            inner.issue_pair(&user, &device_id).await
        })
        .await
    }

    async fn refresh(&self, user_id: UserId, refresh_token: &str) -> Result<IssuedPair, AuthError> {
        let claims = self
            .inner
            .codec
            .decode_refresh(refresh_token)
            .await
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if claims.identity.user_id != user_id {
            debug!(%user_id, token_user_id = %claims.identity.user_id, "refresh token belongs to another user");
            return Err(AuthError::AuthenticationFailed);
        }

        let guard = self.locks.lock(user_id).await;
        let inner = self.inner.clone();
        self.run_locked(guard, "refresh", async move { inner.rotate(claims).await })
            .await
    }

    async fn validate_access(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        let claims = self
            .inner
            .codec
            .decode_access(access_token)
            .await
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let record = self
            .inner
            .get_record(&self.inner.access_store, claims.identity.token_id, "get access token")
            .await?;
        if record.status == TokenStatus::Revoked {
            debug!(token_id = %claims.identity.token_id, "access token revoked");
            return Err(AuthError::Forbidden);
        }

        match claims.window(self.inner.clock.now()) {
            ValidityWindow::Expired => Err(AuthError::TokenExpired),
            ValidityWindow::NotYetValid => Err(AuthError::TokenNotYetValid),
            ValidityWindow::Valid => Ok(claims),
        }
    }

    async fn logout(&self, user_id: UserId, device_id: &DeviceId) -> Result<(), AuthError> {
        let guard = self.locks.lock(user_id).await;
        let inner = self.inner.clone();
        let device_id = device_id.clone();
        self.run_locked(guard, "logout", async move {
            inner.retire_slot(user_id, &device_id).await?;
            info!(%user_id, %device_id, "logged out");
            Ok(())
        })
        .await
    }

    async fn logout_all(&self, user_id: UserId) -> Result<(), AuthError> {
        let guard = self.locks.lock(user_id).await;
        let inner = self.inner.clone();
        self.run_locked(guard, "logout all", async move {
            let errors = inner.revoke_user(user_id).await;
            if let Some(errors) = errors.into_option() {
                return Err(AuthError::StoreUnavailable {
                    op: "revoke user",
                    detail: errors.to_string(),
                });
            }
            info!(%user_id, "logged out of every device");
            Ok(())
        })
        .await
    }
}

impl Lifecycle {
    fn now(&self) -> DateTime<Utc> {
        // claims travel with whole-second precision
        self.clock.now().trunc_subsecs(0)
    }

    async fn deadline<F: Future>(&self, op: &'static str, fut: F) -> Result<F::Output, AuthError> {
        match self.cfg.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| AuthError::DeadlineExceeded(op)),
            None => Ok(fut.await),
        }
    }

    async fn store<T, F>(&self, op: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, TokenStoreError>>,
    {
        self.deadline(op, fut).await?.map_err(|e| AuthError::StoreUnavailable {
            op,
            detail: e.to_string(),
        })
    }

    async fn get_record(
        &self,
        store: &Arc<dyn TokenStore>,
        token_id: TokenId,
        op: &'static str,
    ) -> Result<TokenRecord, AuthError> {
        match self.deadline(op, store.get_by_id(token_id)).await? {
            Ok(record) => Ok(record),
            Err(TokenStoreError::NotFound(_)) => {
                Err(AuthError::InvalidToken(format!("token {} was never issued", token_id)))
            }
            Err(e) => Err(AuthError::StoreUnavailable {
                op,
                detail: e.to_string(),
            }),
        }
    }

    /// Refresh state machine, run under the user's lock.
    async fn rotate(&self, claims: RefreshClaims) -> Result<IssuedPair, AuthError> {
        let user_id = claims.identity.user_id;
        let record = self
            .get_record(&self.refresh_store, claims.identity.token_id, "get refresh token")
            .await?;
        if !record.identity.same_slot(&claims.identity) {
            return Err(AuthError::InvalidToken(
                "refresh token does not match its record".to_string(),
            ));
        }

        if record.status == TokenStatus::Revoked {
            warn!(
                %user_id,
                device_id = %claims.identity.device_id,
                token_id = %claims.identity.token_id,
                "revoked refresh token presented again, revoking every session of the user"
            );
            let errors = self.revoke_user(user_id).await;
            if !errors.is_empty() {
                error!(%user_id, %errors, "theft containment incomplete");
            }
            return Err(AuthError::SecurityViolation {
                user_id,
                containment: errors.into_option(),
            });
        }

        match claims.window(self.clock.now()) {
            ValidityWindow::Expired => return Err(AuthError::TokenExpired),
            ValidityWindow::NotYetValid => return Err(AuthError::TokenNotYetValid),
            ValidityWindow::Valid => {}
        }

        let user = self
            .deadline("get user", self.identity.get_user_by_id(user_id))
            .await?
            .map_err(|e| AuthError::UserLookupFailed(e.to_string()))?;

        let device_id = claims.identity.device_id;
        self.retire_slot(user_id, &device_id).await?;
        let pair = self.issue_pair(&user, &device_id).await?;
        info!(%user_id, %device_id, "rotated token pair");
        Ok(pair)
    }

    /// Revoke the slot in both stores. Both are always attempted.
    async fn retire_slot(&self, user_id: UserId, device_id: &DeviceId) -> Result<(), AuthError> {
        let (access, refresh) = tokio::join!(
            self.store(
                "revoke access slot",
                self.access_store.revoke_by_device(user_id, device_id)
            ),
            self.store(
                "revoke refresh slot",
                self.refresh_store.revoke_by_device(user_id, device_id)
            ),
        );
        let mut errors = ErrorList::default();
        if let Err(e) = access {
            errors.push(e);
        }
        if let Err(e) = refresh {
            errors.push(e);
        }
        match errors.into_option() {
            None => Ok(()),
            Some(errors) => Err(AuthError::StoreUnavailable {
                op: "revoke slot",
                detail: errors.to_string(),
            }),
        }
    }

    /// Revoke every token of the user in both stores, collecting failures.
    async fn revoke_user(&self, user_id: UserId) -> ErrorList {
        let (access, refresh) = tokio::join!(
            self.store(
                "revoke access tokens",
                self.access_store.revoke_by_user(user_id)
            ),
            self.store(
                "revoke refresh tokens",
                self.refresh_store.revoke_by_user(user_id)
            ),
        );
        let mut errors = ErrorList::default();
        if let Err(e) = access {
            errors.push(e);
        }
        if let Err(e) = refresh {
            errors.push(e);
        }
        errors
    }

    fn expiry(&self, now: DateTime<Utc>, ttl: TimeDelta) -> Result<DateTime<Utc>, AuthError> {
        now.checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Encode(format!("expiry overflows with ttl {}", ttl)))
    }

    /// Mint, encode, then write refresh before access. A failed access write
    /// undoes the refresh write.
    async fn issue_pair(&self, user: &User, device_id: &DeviceId) -> Result<IssuedPair, AuthError> {
        let now = self.now();
        let access = AccessClaims {
            identity: TokenIdentity::mint(user.id, device_id.clone()),
            role: user.role,
            issued_at: now,
            expires: self.expiry(now, self.cfg.access_ttl)?,
        };
        let refresh = RefreshClaims {
            identity: TokenIdentity::mint(user.id, device_id.clone()),
            issued_at: now,
            expires: self.expiry(now, self.cfg.refresh_ttl)?,
        };

        let access_token = self
            .codec
            .encode_access(&access)
            .await
            .map_err(|e| AuthError::Encode(e.to_string()))?;
        let refresh_token = self
            .codec
            .encode_refresh(&refresh)
            .await
            .map_err(|e| AuthError::Encode(e.to_string()))?;

        self.store(
            "set refresh token",
            self.refresh_store.set(&refresh.identity, TokenStatus::Active),
        )
        .await?;

        if let Err(err) = self
            .store(
                "set access token",
                self.access_store.set(&access.identity, TokenStatus::Active),
            )
            .await
        {
            return Err(self.compensate(&refresh.identity, err).await);
        }

        info!(user_id = %user.id, %device_id, "issued token pair");
        Ok(IssuedPair {
            access,
            access_token,
            refresh,
            refresh_token,
        })
    }

    async fn compensate(&self, refresh: &TokenIdentity, cause: AuthError) -> AuthError {
        warn!(token_id = %refresh.token_id, %cause, "access write failed, deleting refresh token");
        match self
            .store(
                "delete refresh token",
                self.refresh_store.delete_by_id(refresh.token_id),
            )
            .await
        {
            Ok(()) => cause,
            Err(rollback) => {
                error!(token_id = %refresh.token_id, %rollback, "compensation failed");
                let mut errors = ErrorList::default();
                errors.push(&cause);
                errors.push(&rollback);
                AuthError::StoreUnavailable {
                    op: "issue pair",
                    detail: errors.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{JwtCodec, JwtConfig};
    use crate::infra_memory::MemoryTokenStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, by: TimeDelta) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct StaticIdentity {
        user: User,
        present: AtomicBool,
    }

    #[async_trait::async_trait]
    impl IdentityProvider for StaticIdentity {
        async fn validate_credentials(
            &self,
            login: &str,
            password: &str,
        ) -> Result<User, IdentityError> {
            if login == self.user.login && password == "pw" {
                Ok(self.user.clone())
            } else {
                Err(IdentityError::AuthenticationFailed)
            }
        }

        async fn get_user_by_id(&self, user_id: UserId) -> Result<User, IdentityError> {
            if user_id == self.user.id && self.present.load(Ordering::SeqCst) {
                Ok(self.user.clone())
            } else {
                Err(IdentityError::NotFound(user_id))
            }
        }
    }

    /// Memory store whose writes or revocations can be made to fail or stall.
    struct FlakyStore {
        inner: MemoryTokenStore,
        fail_set: AtomicBool,
        fail_delete: AtomicBool,
        fail_revoke: AtomicBool,
        stall_set: AtomicBool,
    }

    impl FlakyStore {
        fn new(kind: TokenKind) -> Self {
            Self {
                inner: MemoryTokenStore::new(kind),
                fail_set: AtomicBool::new(false),
                fail_delete: AtomicBool::new(false),
                fail_revoke: AtomicBool::new(false),
                stall_set: AtomicBool::new(false),
            }
        }

        fn down(flag: &AtomicBool) -> Result<(), TokenStoreError> {
            if flag.load(Ordering::SeqCst) {
                Err(TokenStoreError::Unavailable("injected".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl TokenStore for FlakyStore {
        async fn set(
            &self,
            identity: &TokenIdentity,
            status: TokenStatus,
        ) -> Result<(), TokenStoreError> {
            if self.stall_set.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Self::down(&self.fail_set)?;
            self.inner.set(identity, status).await
        }

        async fn get_by_id(&self, token_id: TokenId) -> Result<TokenRecord, TokenStoreError> {
            self.inner.get_by_id(token_id).await
        }

        async fn delete_by_id(&self, token_id: TokenId) -> Result<(), TokenStoreError> {
            Self::down(&self.fail_delete)?;
            self.inner.delete_by_id(token_id).await
        }

        async fn revoke_by_device(
            &self,
            user_id: UserId,
            device_id: &DeviceId,
        ) -> Result<(), TokenStoreError> {
            Self::down(&self.fail_revoke)?;
            self.inner.revoke_by_device(user_id, device_id).await
        }

        async fn revoke_by_user(&self, user_id: UserId) -> Result<(), TokenStoreError> {
            Self::down(&self.fail_revoke)?;
            self.inner.revoke_by_user(user_id).await
        }
    }

    struct Fixture {
        service: TokenLifecycleService,
        access: Arc<FlakyStore>,
        refresh: Arc<FlakyStore>,
        clock: Arc<ManualClock>,
        identity: Arc<StaticIdentity>,
        codec: Arc<JwtCodec>,
    }

    fn fixture(call_timeout: Option<Duration>) -> Fixture {
        let user = User {
            id: UserId::new_random(),
            login: "alice".to_string(),
            role: Role::User,
        };
        let identity = Arc::new(StaticIdentity {
            user,
            present: AtomicBool::new(true),
        });
        let codec = Arc::new(JwtCodec::new(JwtConfig {
            issuer: "tokenkeeper.test".to_string(),
            audience: "test".to_string(),
            signing_key: b"unit-test-key".to_vec(),
        }));
        let access = Arc::new(FlakyStore::new(TokenKind::Access));
        let refresh = Arc::new(FlakyStore::new(TokenKind::Refresh));
        let clock = Arc::new(ManualClock(Mutex::new(Utc::now().trunc_subsecs(0))));
        let service = TokenLifecycleService::with_clock(
            identity.clone(),
            codec.clone(),
            access.clone(),
            refresh.clone(),
            LifecycleConfig {
                access_ttl: TimeDelta::minutes(5),
                refresh_ttl: TimeDelta::hours(1),
                call_timeout,
            },
            clock.clone(),
        );
        Fixture {
            service,
            access,
            refresh,
            clock,
            identity,
            codec,
        }
    }

    fn login_input(device: &str) -> LoginInput {
        LoginInput {
            login: "alice".to_string(),
            password: "pw".to_string(),
            device_id: DeviceId::from(device),
        }
    }

    #[tokio::test]
    async fn login_then_validate() {
        let f = fixture(None);
        let pair = f.service.login(login_input("phone-1")).await.unwrap();

        let claims = f.service.validate_access(&pair.access_token.0).await.unwrap();
        assert_eq!(claims.identity.user_id, f.identity.user.id);
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.identity.device_id, DeviceId::from("phone-1"));
        assert_eq!(pair.access.expires - pair.access.issued_at, TimeDelta::minutes(5));
        assert_eq!(pair.refresh.expires - pair.refresh.issued_at, TimeDelta::hours(1));
    }

    #[tokio::test]
    async fn wrong_password_is_authentication_failed() {
        let f = fixture(None);
        let mut input = login_input("phone-1");
        input.password = "nope".to_string();
        assert!(matches!(
            f.service.login(input).await,
            Err(AuthError::AuthenticationFailed)
        ));
        assert!(f.access.inner.is_empty());
        assert!(f.refresh.inner.is_empty());
    }

    #[tokio::test]
    async fn validity_window_is_checked_after_status() {
        let f = fixture(None);
        let pair = f.service.login(login_input("phone-1")).await.unwrap();

        f.clock.advance(TimeDelta::minutes(5));
        assert!(matches!(
            f.service.validate_access(&pair.access_token.0).await,
            Err(AuthError::TokenExpired)
        ));

        f.clock.advance(TimeDelta::minutes(-10));
        assert!(matches!(
            f.service.validate_access(&pair.access_token.0).await,
            Err(AuthError::TokenNotYetValid)
        ));
    }

    #[tokio::test]
    async fn expired_refresh_is_rejected_without_rotation() {
        let f = fixture(None);
        let pair = f.service.login(login_input("phone-1")).await.unwrap();
        f.clock.advance(TimeDelta::hours(2));

        let user_id = f.identity.user.id;
        assert!(matches!(
            f.service.refresh(user_id, &pair.refresh_token.0).await,
            Err(AuthError::TokenExpired)
        ));
        assert_eq!(f.refresh.inner.len(), 1);
    }

    #[tokio::test]
    async fn refresh_from_the_future_is_not_yet_valid() {
        let f = fixture(None);
        let now = f.clock.now();
        let claims = RefreshClaims {
            identity: TokenIdentity::mint(f.identity.user.id, DeviceId::from("phone-1")),
            issued_at: now + TimeDelta::minutes(10),
            expires: now + TimeDelta::hours(1),
        };
        f.refresh
            .set(&claims.identity, TokenStatus::Active)
            .await
            .unwrap();
        let token = f.codec.encode_refresh(&claims).await.unwrap();

        assert!(matches!(
            f.service.refresh(f.identity.user.id, &token.0).await,
            Err(AuthError::TokenNotYetValid)
        ));
    }

    #[tokio::test]
    async fn refresh_for_another_user_is_authentication_failed() {
        let f = fixture(None);
        let pair = f.service.login(login_input("phone-1")).await.unwrap();
        assert!(matches!(
            f.service
                .refresh(UserId::new_random(), &pair.refresh_token.0)
                .await,
            Err(AuthError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_invalid() {
        let f = fixture(None);
        let now = f.clock.now();
        let claims = RefreshClaims {
            identity: TokenIdentity::mint(f.identity.user.id, DeviceId::from("phone-1")),
            issued_at: now,
            expires: now + TimeDelta::hours(1),
        };
        let token = f.codec.encode_refresh(&claims).await.unwrap();
        assert!(matches!(
            f.service.refresh(f.identity.user.id, &token.0).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn deleted_user_cannot_rotate() {
        let f = fixture(None);
        let pair = f.service.login(login_input("phone-1")).await.unwrap();
        f.identity.present.store(false, Ordering::SeqCst);

        assert!(matches!(
            f.service
                .refresh(f.identity.user.id, &pair.refresh_token.0)
                .await,
            Err(AuthError::UserLookupFailed(_))
        ));
        // the presented token was not consumed
        assert_eq!(
            f.refresh
                .get_by_id(pair.refresh.identity.token_id)
                .await
                .unwrap()
                .status,
            TokenStatus::Active
        );
    }

    #[tokio::test]
    async fn failed_access_write_removes_the_refresh_record() {
        let f = fixture(None);
        f.access.fail_set.store(true, Ordering::SeqCst);

        let err = f.service.login(login_input("phone-1")).await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable { op: "set access token", .. }));
        assert!(f.refresh.inner.is_empty());
        assert!(f.access.inner.is_empty());
    }

    #[tokio::test]
    async fn failed_compensation_is_reported_with_the_cause() {
        let f = fixture(None);
        f.access.fail_set.store(true, Ordering::SeqCst);
        f.refresh.fail_delete.store(true, Ordering::SeqCst);

        let err = f.service.login(login_input("phone-1")).await.unwrap_err();
        match err {
            AuthError::StoreUnavailable { op, detail } => {
                assert_eq!(op, "issue pair");
                assert!(detail.contains("set access token"));
                assert!(detail.contains("delete refresh token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn access_write_deadline_triggers_compensation() {
        let f = fixture(Some(Duration::from_millis(50)));
        f.access.stall_set.store(true, Ordering::SeqCst);

        let err = f.service.login(login_input("phone-1")).await.unwrap_err();
        assert!(matches!(err, AuthError::DeadlineExceeded("set access token")));
        assert!(f.refresh.inner.is_empty());
    }

    #[tokio::test]
    async fn dropped_caller_does_not_leave_half_a_pair() {
        let f = fixture(None);
        let service = Arc::new(f.service);
        f.access.stall_set.store(true, Ordering::SeqCst);
        f.access.fail_set.store(true, Ordering::SeqCst);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            service.login(login_input("phone-1")),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(f.refresh.inner.len(), 1);

        // the detached critical section still runs its compensation
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(f.refresh.inner.is_empty());
    }

    #[tokio::test]
    async fn replay_sweeps_both_stores_even_when_one_fails() {
        let f = fixture(None);
        let user_id = f.identity.user.id;
        let first = f.service.login(login_input("phone-1")).await.unwrap();
        let laptop = f.service.login(login_input("laptop")).await.unwrap();
        f.service
            .refresh(user_id, &first.refresh_token.0)
            .await
            .unwrap();

        f.access.fail_revoke.store(true, Ordering::SeqCst);
        let err = f
            .service
            .refresh(user_id, &first.refresh_token.0)
            .await
            .unwrap_err();
        match err {
            AuthError::SecurityViolation {
                user_id: violator,
                containment: Some(errors),
            } => {
                assert_eq!(violator, user_id);
                assert_eq!(errors.0.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // the refresh side was still swept
        assert!(
            f.refresh
                .inner
                .records_of(user_id)
                .iter()
                .all(|r| r.status == TokenStatus::Revoked)
        );
        assert!(matches!(
            f.service.refresh(user_id, &laptop.refresh_token.0).await,
            Err(AuthError::SecurityViolation { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_refreshes_of_one_token_rotate_once() {
        let f = fixture(None);
        let user_id = f.identity.user.id;
        let pair = f.service.login(login_input("phone-1")).await.unwrap();
        let service = Arc::new(f.service);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let token = pair.refresh_token.0.clone();
            handles.push(tokio::spawn(async move {
                service.refresh(user_id, &token).await
            }));
        }
        let mut rotated = 0;
        let mut violations = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => rotated += 1,
                Err(AuthError::SecurityViolation { .. }) => violations += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(rotated, 1);
        assert_eq!(violations, 7);
    }

    #[tokio::test]
    async fn logout_revokes_only_that_device() {
        let f = fixture(None);
        let user_id = f.identity.user.id;
        let phone = f.service.login(login_input("phone-1")).await.unwrap();
        let laptop = f.service.login(login_input("laptop")).await.unwrap();

        f.service
            .logout(user_id, &DeviceId::from("phone-1"))
            .await
            .unwrap();

        assert!(matches!(
            f.service.validate_access(&phone.access_token.0).await,
            Err(AuthError::Forbidden)
        ));
        f.service
            .validate_access(&laptop.access_token.0)
            .await
            .unwrap();

        f.service.logout_all(user_id).await.unwrap();
        assert!(matches!(
            f.service.validate_access(&laptop.access_token.0).await,
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn logout_reports_revocation_failures() {
        let f = fixture(None);
        f.refresh.fail_revoke.store(true, Ordering::SeqCst);
        let err = f
            .service
            .logout(f.identity.user.id, &DeviceId::from("phone-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable { op: "revoke slot", .. }));
    }
}
