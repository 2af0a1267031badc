//! Session coordinator.
//!
//! One [`AuthCoordinator`] owns the published [`AuthState`], one
//! [`SessionClock`] and (through the clock) one activity monitor. Every
//! operation that talks to the Auth API suspends only at that boundary; all
//! store + state commits happen under a single commit lock and are checked
//! against a session epoch, so a call that resolves after its session ended
//! never writes anything.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use gatehouse_auth::{
    Action, AuthorizationExplanation, MenuTree, PermissionRecord, PermissionTable, Session, authorize,
    explain_authorization, peek_claims, resolve_for, validate_session,
};
use gatehouse_core::ProfileId;
use tokio::sync::{broadcast, watch};

use crate::activity::{ActivityBus, ActivityMonitor};
use crate::api::{ApiError, AuthApi};
use crate::clock::{ClockConfig, ClockHooks, ExtendHook, Hook, SessionClock};
use crate::config::{ClientConfig, ConfigError};
use crate::error::AuthError;
use crate::navigator::Navigator;
use crate::state::{AuthEvent, AuthState, LogoutReason};
use crate::store::{PersistentStore, StoreError, StoreScope, decode_expiry, encode_expiry, keys};
use crate::time::{SystemTimeSource, TimeSource};
use crate::types::{Credentials, ValidatedProfile};

const EVENT_CAPACITY: usize = 64;

/// External collaborators the coordinator drives.
pub struct Collaborators {
    pub api: Arc<dyn AuthApi>,
    pub store: Arc<dyn PersistentStore>,
    pub navigator: Arc<dyn Navigator>,
    pub activity: Arc<ActivityBus>,
    pub time: Arc<dyn TimeSource>,
}

impl Collaborators {
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<dyn PersistentStore>,
        navigator: Arc<dyn Navigator>,
        activity: Arc<ActivityBus>,
    ) -> Self {
        Self {
            api,
            store,
            navigator,
            activity,
            time: Arc::new(SystemTimeSource),
        }
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }
}

/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    api: Arc<dyn AuthApi>,
    store: Arc<dyn PersistentStore>,
    navigator: Arc<dyn Navigator>,
    time: Arc<dyn TimeSource>,
    clock: SessionClock,
    state: watch::Sender<AuthState>,
    events: broadcast::Sender<AuthEvent>,
    /// Bumped whenever the active session is replaced or torn down. Odd
    /// while a session is live, even once it is being (or has been) torn
    /// down.
    epoch: AtomicU64,
    refreshing: AtomicBool,
    /// Serializes store + state commits.
    commit: tokio::sync::Mutex<()>,
}

/// Single-slot in-flight marker, released on drop.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AuthCoordinator {
    /// Build a coordinator over `parts`.
    ///
    /// One coordinator per [`ActivityBus`]: the clock and monitor of a
    /// coordinator are released when its last clone is dropped, so drop the
    /// previous coordinator before building its replacement on the same bus.
    pub fn new(config: ClientConfig, parts: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;

        let monitor = ActivityMonitor::new(parts.activity, &config.activity_signals);
        let clock = SessionClock::new(
            ClockConfig {
                tick_interval: config.tick_interval,
                renewal_window: config.renewal_window,
            },
            Arc::clone(&parts.time),
            monitor,
        );
        let (state, _) = watch::channel(AuthState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                api: parts.api,
                store: parts.store,
                navigator: parts.navigator,
                time: parts.time,
                clock,
                state,
                events,
                epoch: AtomicU64::new(0),
                refreshing: AtomicBool::new(false),
                commit: tokio::sync::Mutex::new(()),
            }),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Published state
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn permissions(&self) -> Arc<PermissionTable> {
        Arc::clone(&self.inner.state.borrow().permissions)
    }

    pub fn menu(&self) -> Arc<MenuTree> {
        Arc::clone(&self.inner.state.borrow().menu)
    }

    /// Deadline the session clock is currently ticking towards.
    pub fn clock_deadline(&self) -> Option<DateTime<Utc>> {
        self.inner.clock.deadline()
    }

    pub fn clock_running(&self) -> bool {
        self.inner.clock.is_running()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Permission lookups
    // ─────────────────────────────────────────────────────────────────────

    /// Resolve `path` (or the current location when absent/empty) against
    /// the active permission table.
    pub fn find_permission(&self, exact: bool, path: Option<&str>) -> Option<PermissionRecord> {
        let table = self.permissions();
        let location = self.inner.navigator.current_location();
        resolve_for(&table, path, &location, exact)
    }

    pub fn can(&self, action: Action, path: &str) -> bool {
        authorize(&self.permissions(), path, action).is_ok()
    }

    pub fn explain(&self, action: Action, path: &str) -> AuthorizationExplanation {
        explain_authorization(&self.permissions(), path, action)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Authenticate, fetch the profile and start the session clock.
    ///
    /// Nothing is published unless every step succeeds.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let inner = &self.inner;
        tracing::info!(email = %credentials.email, "login requested");

        let response = inner.api.authenticate(credentials).await.map_err(|err| {
            tracing::warn!("authentication failed: {err}");
            AuthError::from_login(err)
        })?;

        let token = response.authorization.token;
        if token.trim().is_empty() {
            return Err(AuthError::Authentication("server returned an empty token".to_string()));
        }

        let snapshot = inner
            .api
            .who_am_i(&token)
            .await
            .map_err(AuthError::from_profile_fetch)?;
        let profile = snapshot
            .validate()
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        let now = inner.time.now();
        let session = self.session_for(token, now);
        validate_session(&session, now).map_err(|e| AuthError::Authentication(e.to_string()))?;

        self.establish(session, profile).await
    }

    /// Re-adopt a session persisted by an earlier page load.
    ///
    /// Returns whether a session was restored. Expired or rejected sessions
    /// are wiped from the store.
    pub async fn restore(&self) -> Result<bool, AuthError> {
        let inner = &self.inner;

        let token = inner.store.get(keys::AUTH_TOKEN).await?;
        let expires_at = inner
            .store
            .get(keys::AUTH_EXP)
            .await?
            .as_deref()
            .and_then(decode_expiry);

        let (Some(token), Some(expires_at)) = (token, expires_at) else {
            tracing::debug!("no persisted session to restore");
            return Ok(false);
        };

        let now = inner.time.now();
        if now >= expires_at {
            tracing::info!(%expires_at, "persisted session already expired");
            self.discard_persisted().await;
            return Ok(false);
        }

        let snapshot = match inner.api.who_am_i(&token).await {
            Ok(snapshot) => snapshot,
            Err(ApiError::Unauthorized) => {
                tracing::info!("persisted session rejected by the server");
                self.discard_persisted().await;
                return Ok(false);
            }
            Err(err) => return Err(AuthError::from_profile_fetch(err)),
        };
        let profile = snapshot
            .validate()
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        let issued_at = peek_claims(&token)
            .and_then(|c| c.issued_at())
            .filter(|iat| *iat < expires_at)
            .unwrap_or(now);
        let wanted_profile = inner
            .store
            .get(keys::AUTH_CURRENT_ROLE)
            .await?
            .and_then(|raw| ProfileId::new(raw).ok());

        self.establish(Session::new(token, issued_at, expires_at), profile)
            .await?;

        if let Some(wanted) = wanted_profile {
            if self.state().active_function.as_ref() != Some(&wanted) {
                if let Err(err) = self.change_profile(&wanted).await {
                    tracing::warn!(profile = %wanted, "could not re-select persisted profile: {err}");
                }
            }
        }

        Ok(true)
    }

    /// Renew the session.
    ///
    /// At most one renewal is in flight: a call made while another is
    /// outstanding returns `Ok(())` without touching the network. A failed
    /// renewal terminates the session.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let inner = &self.inner;

        let Some(_in_flight) = InFlight::acquire(&inner.refreshing) else {
            tracing::debug!("renewal already in flight; coalescing");
            return Ok(());
        };

        let (token, epoch) = self.active_token()?;
        tracing::debug!("renewing session");

        let renewed = match inner.api.refresh(&token).await {
            Ok(resp) => resp
                .exp
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .ok_or_else(|| "response carried no usable expiry".to_string()),
            Err(err) => Err(err.to_string()),
        };

        let expires_at = match renewed {
            Ok(at) => at,
            Err(reason) => {
                tracing::warn!("session renewal failed: {reason}");
                self.terminate(LogoutReason::RenewalFailed, Some(epoch)).await;
                return Err(AuthError::Renewal(reason));
            }
        };

        let _commit = inner.commit.lock().await;
        if !self.is_current(epoch, &token) {
            tracing::debug!("renewal resolved after its session ended; ignoring");
            return Ok(());
        }

        if let Err(err) = inner
            .store
            .set(keys::AUTH_EXP, &encode_expiry(expires_at), StoreScope::Durable)
            .await
        {
            tracing::warn!("failed to persist renewed expiry: {err}");
        }

        let mut effective = expires_at;
        inner.state.send_modify(|state| {
            if let Some(session) = state.session.as_mut() {
                session.extend_to(expires_at);
                effective = session.expires_at;
            }
        });
        inner.clock.reset(effective);

        tracing::info!(expires_at = %effective, "session renewed");
        self.emit(AuthEvent::Refreshed {
            expires_at: effective,
        });
        Ok(())
    }

    /// End the session. Always succeeds locally; the remote call is
    /// best-effort.
    pub async fn logout(&self) {
        self.terminate(LogoutReason::UserRequested, None).await;
    }

    /// Switch to another profile of the same user.
    ///
    /// An empty menu for the new profile aborts the switch with
    /// [`AuthError::EmptyMenu`] and leaves the current profile active.
    pub async fn change_profile(&self, profile: &ProfileId) -> Result<(), AuthError> {
        let inner = &self.inner;
        let (token, epoch) = self.active_token()?;
        tracing::info!(profile = %profile, "changing profile");

        let snapshot = inner
            .api
            .change_profile(&token, profile)
            .await
            .map_err(AuthError::from_profile_fetch)?;
        let mut validated = snapshot
            .validate()
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        if validated.menu.is_empty() {
            tracing::warn!(profile = %profile, "profile has no menu entries; keeping current profile");
            self.emit(AuthEvent::EmptyMenuWarning {
                profile: profile.clone(),
            });
            return Err(AuthError::EmptyMenu(profile.clone()));
        }
        if validated.active_function.is_none() {
            validated.active_function = Some(profile.clone());
        }

        let _commit = inner.commit.lock().await;
        if !self.is_current(epoch, &token) {
            return Err(AuthError::NoSession);
        }

        self.persist_profile(&validated).await?;

        let active = validated.active_function.clone();
        inner.state.send_modify(|state| {
            state.user = Some(validated.user);
            state.permissions = Arc::new(validated.permissions);
            state.menu = Arc::new(validated.menu);
            state.active_function = validated.active_function;
        });

        self.emit(AuthEvent::ProfileChanged { profile: active });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn session_for(&self, token: String, now: DateTime<Utc>) -> Session {
        let claims = peek_claims(&token);
        let ttl = chrono::Duration::from_std(self.inner.config.default_session_ttl)
            .unwrap_or_else(|_| chrono::Duration::zero());

        let issued_at = claims.and_then(|c| c.issued_at()).unwrap_or(now);
        let expires_at = claims
            .and_then(|c| c.expires_at())
            .unwrap_or_else(|| now + ttl);

        Session::new(token, issued_at, expires_at)
    }

    fn active_token(&self) -> Result<(String, u64), AuthError> {
        let state = self.inner.state.borrow();
        let session = state.session.as_ref().ok_or(AuthError::NoSession)?;
        Ok((session.token.clone(), self.inner.epoch.load(Ordering::SeqCst)))
    }

    /// Whether `epoch`/`token` still describe the published session.
    fn is_current(&self, epoch: u64, token: &str) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
            && self
                .inner
                .state
                .borrow()
                .session
                .as_ref()
                .is_some_and(|s| s.token == token)
    }

    /// Persist, publish and start the clock for a freshly obtained session.
    async fn establish(&self, session: Session, profile: ValidatedProfile) -> Result<(), AuthError> {
        let inner = &self.inner;
        let _commit = inner.commit.lock().await;

        self.persist_session(&session, &profile).await?;

        let epoch = next_live(&inner.epoch);
        let expires_at = session.expires_at;
        let user_id = profile.user.id.clone();

        inner.state.send_replace(AuthState {
            user: Some(profile.user),
            session: Some(session),
            permissions: Arc::new(profile.permissions),
            menu: Arc::new(profile.menu),
            active_function: profile.active_function,
        });
        self.start_clock(expires_at, epoch);

        tracing::info!(user = %user_id, %expires_at, "session established");
        self.emit(AuthEvent::LoggedIn {
            user_id,
            expires_at,
        });
        Ok(())
    }

    async fn persist_session(&self, session: &Session, profile: &ValidatedProfile) -> Result<(), StoreError> {
        let store = &self.inner.store;
        store
            .set(keys::AUTH_TOKEN, &session.token, StoreScope::Session)
            .await?;
        store
            .set(keys::AUTH_EXP, &encode_expiry(session.expires_at), StoreScope::Durable)
            .await?;
        self.persist_profile(profile).await
    }

    async fn persist_profile(&self, profile: &ValidatedProfile) -> Result<(), StoreError> {
        let store = &self.inner.store;
        let user = serde_json::to_string(&profile.user)
            .map_err(|e| StoreError::Backend(format!("failed to encode user: {e}")))?;
        store.set(keys::AUTH_USER, &user, StoreScope::Durable).await?;

        match &profile.active_function {
            Some(id) => {
                store
                    .set(keys::AUTH_CURRENT_ROLE, id.as_str(), StoreScope::Durable)
                    .await
            }
            None => store.remove(keys::AUTH_CURRENT_ROLE).await,
        }
    }

    async fn discard_persisted(&self) {
        let _commit = self.inner.commit.lock().await;
        if let Err(err) = self.inner.store.remove_all(&keys::ALL).await {
            tracing::warn!("failed to clear persisted session: {err}");
        }
    }

    /// Tear the session down. With `expected`, only if that epoch is still
    /// the active one. Returns whether this call tore a session down.
    async fn terminate(&self, reason: LogoutReason, expected: Option<u64>) -> bool {
        let inner = &self.inner;

        let live = match expected {
            Some(epoch) => inner
                .epoch
                .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
                .map_err(|_| epoch),
            None => inner
                .epoch
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |e| is_live(e).then_some(e + 1)),
        };
        let ended = match live {
            Ok(epoch) => epoch + 1,
            Err(_) if expected.is_some() => {
                tracing::debug!(?reason, "stale termination ignored");
                return false;
            }
            Err(current) => {
                // No live session: another teardown owns the remote call and
                // the notifications. Still leave nothing behind locally.
                tracing::debug!(?reason, "no live session to terminate");
                self.clear_if_current(current).await;
                return false;
            }
        };

        inner.clock.stop();

        let token = inner.state.borrow().session.as_ref().map(|s| s.token.clone());
        if let Some(token) = token {
            if let Err(err) = inner.api.logout(&token).await {
                tracing::warn!("remote logout failed (ignored): {err}");
            }
        }

        if !self.clear_if_current(ended).await {
            tracing::info!(?reason, "a newer session was established during logout; keeping it");
            return false;
        }

        inner.navigator.to_sign_in();
        tracing::info!(?reason, "session terminated");
        self.emit(AuthEvent::LoggedOut { reason });
        true
    }

    /// Wipe store and state unless a session newer than `epoch` exists.
    async fn clear_if_current(&self, epoch: u64) -> bool {
        let inner = &self.inner;
        let _commit = inner.commit.lock().await;
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        if let Err(err) = inner.store.remove_all(&keys::ALL).await {
            tracing::warn!("failed to clear persisted session: {err}");
        }
        inner.state.send_replace(AuthState::default());
        true
    }

    fn start_clock(&self, expires_at: DateTime<Utc>, epoch: u64) {
        let weak = Arc::downgrade(&self.inner);

        let on_near_expiry: Hook = {
            let weak = Weak::clone(&weak);
            Arc::new(move || {
                let Some(coordinator) = upgrade(&weak, epoch) else {
                    return;
                };
                tokio::spawn(async move {
                    if let Err(err) = coordinator.refresh().await {
                        tracing::warn!("background renewal failed: {err}");
                    }
                });
            })
        };

        let on_expired: Hook = {
            let weak = Weak::clone(&weak);
            Arc::new(move || {
                let Some(coordinator) = upgrade(&weak, epoch) else {
                    return;
                };
                tokio::spawn(async move {
                    coordinator.terminate(LogoutReason::Expired, Some(epoch)).await;
                });
            })
        };

        let on_extended: ExtendHook = Arc::new(move |at: DateTime<Utc>| {
            let Some(coordinator) = upgrade(&weak, epoch) else {
                return;
            };
            let extended = coordinator.inner.state.send_if_modified(|state| {
                state
                    .session
                    .as_mut()
                    .is_some_and(|session| session.extend_to(at))
            });
            if extended {
                coordinator.emit(AuthEvent::SessionExtended { expires_at: at });
            }
        });

        self.inner.clock.start(
            expires_at,
            ClockHooks {
                on_near_expiry,
                on_expired,
                on_extended: Some(on_extended),
            },
        );
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.inner.events.send(event);
    }
}

fn is_live(epoch: u64) -> bool {
    epoch % 2 == 1
}

/// Advance to the next odd (live) epoch and return it.
fn next_live(epoch: &AtomicU64) -> u64 {
    let bump = |e: u64| (e + 1) | 1;
    match epoch.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |e| Some(bump(e))) {
        Ok(previous) | Err(previous) => bump(previous),
    }
}

/// Upgrade a clock hook's back-reference, provided its session is still the
/// active one.
fn upgrade(weak: &Weak<Inner>, epoch: u64) -> Option<AuthCoordinator> {
    let inner = weak.upgrade()?;
    (inner.epoch.load(Ordering::SeqCst) == epoch).then(|| AuthCoordinator { inner })
}

impl std::fmt::Debug for AuthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("AuthCoordinator")
            .field("authenticated", &state.is_authenticated())
            .field("session", &state.session)
            .field("clock_running", &self.inner.clock.is_running())
            .finish()
    }
}
