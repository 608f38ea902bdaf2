//! Session lifecycle: login, logout, token refresh, and profile state.
//!
//! `Session` owns the in-memory token state, mirrors it into a
//! [`CredentialStore`], and coalesces concurrent refresh attempts into a
//! single network call whose outcome every waiter shares.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::{ApiError, AuthApi};
use crate::models::{AuthResponse, Profile, ProfileUpdate, User};

use super::credentials::{CredentialStore, KEY_ACCESS_TOKEN, KEY_EXPIRES_AT, KEY_REFRESH_TOKEN};
use super::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};

/// Leeway before the recorded expiry at which a token already counts as
/// expiring. 60s absorbs clock skew and request latency so a token does not
/// die mid-request.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// Outcome future shared by every caller awaiting one in-flight refresh.
type RefreshHandle = Shared<BoxFuture<'static, bool>>;

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server answered an auth call without both tokens.
    #[error("auth response was missing access or refresh token")]
    MissingTokens,

    /// The operation requires a signed-in session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Transport or server failure, passed through unchanged.
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Default)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    current_user: Option<User>,
    profile: Option<Profile>,
    /// In-flight refresh, if any. Set by whichever caller starts a refresh,
    /// cleared only by the refresh task itself once it settles.
    pending_refresh: Option<RefreshHandle>,
}

/// Authentication and session manager.
///
/// Cheap to clone; every clone shares one state. Construct inside a Tokio
/// runtime, since hydration may spawn a background refresh.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn CredentialStore>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Create a session, hydrating tokens persisted by an earlier run.
    ///
    /// Store read failures downgrade to "nothing stored" with a warning, and
    /// an unparseable expiry counts as expiring. When a refresh token is
    /// recovered and the access token is missing or expiring, a background
    /// refresh starts immediately without blocking construction.
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(SessionInner {
            api,
            store,
            state: Mutex::new(SessionState::default()),
            events,
        });

        {
            let mut state = inner.state();
            inner.hydrate_into(&mut state);
            let stale =
                state.access_token.is_none() || is_expiring_soon(state.expires_at, Utc::now());
            if stale {
                if let Some(refresh_token) = state.refresh_token.clone() {
                    debug!("hydrated tokens need refresh, starting background refresh");
                    SessionInner::spawn_refresh(&inner, &mut state, refresh_token);
                }
            }
        }

        Self { inner }
    }

    /// Authenticate and establish the session.
    ///
    /// On success both tokens and the expiry are held in memory and mirrored
    /// to the store (mirror failures are logged, never fatal). A response
    /// missing either token leaves existing state untouched and fails with
    /// [`SessionError::MissingTokens`].
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let response = self.inner.api.login(email, password).await?;
        self.inner.apply_auth_response(response)
    }

    /// Register an account, then establish a session with the same
    /// credentials.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        self.inner.api.register(name, email, password).await?;
        self.login(email, password).await
    }

    /// End the session. Server-side revocation is best effort; local state
    /// and stored credentials always clear.
    pub async fn logout(&self) {
        let refresh_token = self.inner.state().refresh_token.clone();
        if let Some(token) = refresh_token {
            if let Err(e) = self.inner.api.logout(&token).await {
                debug!(error = %e, "remote logout failed, clearing local session anyway");
            }
        }
        self.inner.clear_session("logout");
    }

    /// Clear local state without calling the server. For forced sign-outs
    /// driven by the app shell.
    pub fn logout_local(&self) {
        self.inner.clear_session("local logout");
    }

    /// Ensure a usable access token, refreshing through a single shared
    /// network call when needed.
    ///
    /// Returns `true` when a non-expiring token is held afterwards. Any
    /// number of concurrent callers coalesce onto one in-flight refresh and
    /// observe its outcome. `false` means the session was cleared: no
    /// refresh token was held, or the server rejected the refresh. The
    /// refresh itself runs detached, so a caller that stops waiting does
    /// not cancel it for the others.
    pub async fn refresh_tokens_if_needed(&self) -> bool {
        let pending = {
            let mut state = self.inner.state();
            if state.access_token.is_some() && !is_expiring_soon(state.expires_at, Utc::now()) {
                return true;
            }
            match state.pending_refresh.clone() {
                Some(handle) => handle,
                None => match state.refresh_token.clone() {
                    Some(refresh_token) => {
                        SessionInner::spawn_refresh(&self.inner, &mut state, refresh_token)
                    }
                    None => {
                        drop(state);
                        self.inner.clear_session("refresh requested without refresh token");
                        return false;
                    }
                },
            }
        };
        pending.await
    }

    /// Fetch `/users/me`, cache it, and reconcile the held user.
    pub async fn load_profile(&self) -> Result<Profile, SessionError> {
        let token = self.require_access_token()?;
        let profile = self.inner.api.fetch_profile(&token).await?;
        self.inner.apply_profile(&profile);
        Ok(profile)
    }

    /// Apply a partial profile update. `name` is trimmed, and an empty trim
    /// sends an explicit null to clear the stored name; `email` is sent only
    /// when provided.
    pub async fn update_profile(
        &self,
        name: &str,
        email: Option<&str>,
    ) -> Result<Profile, SessionError> {
        let token = self.require_access_token()?;
        let trimmed = name.trim();
        let update = ProfileUpdate {
            name: if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            },
            email: email.map(str::to_string),
        };
        let profile = self.inner.api.update_profile(&token, &update).await?;
        self.inner.apply_profile(&profile);
        Ok(profile)
    }

    /// Change the account password. No session state changes on success;
    /// server rejections (wrong current password, weak new one) pass
    /// through untouched.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        let token = self.require_access_token()?;
        self.inner
            .api
            .change_password(&token, current_password, new_password)
            .await?;
        Ok(())
    }

    /// Current bearer token, if one is held. Never blocks on I/O and never
    /// triggers a refresh.
    pub fn access_token(&self) -> Option<String> {
        self.inner.state().access_token.clone()
    }

    /// Whether an access token is held (it may still be expiring).
    pub fn is_authenticated(&self) -> bool {
        self.inner.state().access_token.is_some()
    }

    /// The user recorded at login or refresh time.
    pub fn current_user(&self) -> Option<User> {
        self.inner.state().current_user.clone()
    }

    /// The profile from the last `load_profile`/`update_profile` call.
    pub fn profile(&self) -> Option<Profile> {
        self.inner.state().profile.clone()
    }

    /// Recorded access-token expiry.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state().expires_at
    }

    /// True when the held token is within the expiry leeway of `now`, or
    /// when no expiry was recorded.
    pub fn is_token_expiring_soon(&self, now: DateTime<Utc>) -> bool {
        is_expiring_soon(self.inner.state().expires_at, now)
    }

    /// Subscribe to session change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn require_access_token(&self) -> Result<String, SessionError> {
        self.access_token().ok_or(SessionError::NotAuthenticated)
    }
}

impl SessionInner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        // Recover from poisoning; the state stays usable after a panicked
        // holder.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read whatever a previous run persisted. Failures downgrade to absent
    /// values so a corrupt store never blocks startup.
    fn hydrate_into(&self, state: &mut SessionState) {
        state.access_token = self.read_stored(KEY_ACCESS_TOKEN);
        state.refresh_token = self.read_stored(KEY_REFRESH_TOKEN);
        state.expires_at = self.read_stored(KEY_EXPIRES_AT).and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                Err(e) => {
                    warn!(error = %e, "stored expiry did not parse, treating token as expiring");
                    None
                }
            }
        });
        if state.access_token.is_some() {
            debug!("hydrated session from credential store");
        }
    }

    fn read_stored(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "failed to read stored credential");
                None
            }
        }
    }

    /// Install tokens and user from a login response.
    fn apply_auth_response(&self, response: AuthResponse) -> Result<User, SessionError> {
        let (access_token, refresh_token) =
            match (response.access_token, response.refresh_token) {
                (Some(access), Some(refresh)) => (access, refresh),
                _ => return Err(SessionError::MissingTokens),
            };
        let expires_at = Utc::now() + token_lifetime(response.expires_in);
        let user = response.user;

        {
            let mut state = self.state();
            state.access_token = Some(access_token.clone());
            state.refresh_token = Some(refresh_token.clone());
            state.expires_at = Some(expires_at);
            state.current_user = Some(user.clone());
            // A fresh login invalidates any profile cached for the previous
            // account.
            state.profile = None;
            self.persist_tokens(&access_token, &refresh_token, expires_at);
        }

        debug!(user_id = %user.id, "signed in");
        self.emit(SessionEvent::SignedIn);
        Ok(user)
    }

    /// Start the single network refresh and store the shared handle every
    /// concurrent caller awaits. The task runs detached so callers that stop
    /// waiting do not cancel it. Call with the state lock held and no
    /// refresh pending.
    fn spawn_refresh(
        inner: &Arc<SessionInner>,
        state: &mut SessionState,
        refresh_token: String,
    ) -> RefreshHandle {
        let task_inner = Arc::clone(inner);
        let task = tokio::spawn(async move { task_inner.run_refresh(refresh_token).await });
        let handle: RefreshHandle = async move { task.await.unwrap_or(false) }.boxed().shared();
        state.pending_refresh = Some(handle.clone());
        handle
    }

    /// The single in-flight refresh: exchange `used_token`, apply the
    /// rotation if the session still holds that token, tear the session
    /// down on rejection. Always clears the pending handle.
    async fn run_refresh(self: Arc<Self>, used_token: String) -> bool {
        debug!("refreshing access token");
        match self.api.refresh(&used_token).await {
            Ok(response) => self.apply_refresh(&used_token, response),
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                self.discard_refresh(&used_token);
                false
            }
        }
    }

    /// Install a rotated token pair, unless the session moved on (logout or
    /// re-login) while the request was in flight.
    fn apply_refresh(&self, used_token: &str, response: AuthResponse) -> bool {
        let (access_token, refresh_token) =
            match (response.access_token, response.refresh_token) {
                (Some(access), Some(refresh)) => (access, refresh),
                _ => {
                    warn!("refresh response was missing tokens");
                    self.discard_refresh(used_token);
                    return false;
                }
            };
        let expires_at = Utc::now() + token_lifetime(response.expires_in);

        let rotated = {
            let mut state = self.state();
            let still_current = state.refresh_token.as_deref() == Some(used_token);
            if still_current {
                state.access_token = Some(access_token.clone());
                state.refresh_token = Some(refresh_token.clone());
                state.expires_at = Some(expires_at);
                state.current_user = Some(response.user);
                self.persist_tokens(&access_token, &refresh_token, expires_at);
            }
            state.pending_refresh = None;
            still_current
        };

        if rotated {
            debug!("access token refreshed");
            self.emit(SessionEvent::TokensRefreshed);
            true
        } else {
            debug!("session changed during refresh, discarding rotated tokens");
            false
        }
    }

    /// Rejection path: clear the session the refresh belonged to. A session
    /// that rotated or signed out meanwhile is left alone.
    fn discard_refresh(&self, used_token: &str) {
        let cleared = {
            let mut state = self.state();
            let still_current = state.refresh_token.as_deref() == Some(used_token);
            state.pending_refresh = None;
            if still_current {
                let was_authenticated = Self::clear_state(&mut state);
                self.remove_persisted_tokens();
                Some(was_authenticated)
            } else {
                None
            }
        };

        match cleared {
            Some(was_authenticated) => {
                debug!("refresh rejected, session cleared");
                if was_authenticated {
                    self.emit(SessionEvent::SignedOut);
                }
            }
            None => debug!("session changed during refresh, ignoring rejected refresh"),
        }
    }

    /// Cache the profile and fold its non-null fields into the held user.
    /// A null profile field never clears the corresponding user field.
    fn apply_profile(&self, profile: &Profile) {
        {
            let mut state = self.state();
            match state.current_user.as_mut() {
                Some(user) => {
                    if profile.name.is_some() {
                        user.name = profile.name.clone();
                    }
                    if profile.email.is_some() {
                        user.email = profile.email.clone();
                    }
                }
                None => {
                    state.current_user = Some(User {
                        id: profile.id.clone(),
                        name: profile.name.clone(),
                        email: profile.email.clone(),
                    });
                }
            }
            state.profile = Some(profile.clone());
        }
        self.emit(SessionEvent::ProfileChanged);
    }

    /// Drop all local session state and stored credentials.
    fn clear_session(&self, reason: &str) {
        let was_authenticated = {
            let mut state = self.state();
            let was_authenticated = Self::clear_state(&mut state);
            self.remove_persisted_tokens();
            was_authenticated
        };

        debug!(reason, "session cleared");
        if was_authenticated {
            self.emit(SessionEvent::SignedOut);
        }
    }

    /// Wipe tokens, user, and profile in place, reporting whether an access
    /// token was held. The pending refresh handle is left alone; its task
    /// clears it and re-checks the state before acting.
    fn clear_state(state: &mut SessionState) -> bool {
        let was_authenticated = state.access_token.is_some();
        state.access_token = None;
        state.refresh_token = None;
        state.expires_at = None;
        state.current_user = None;
        state.profile = None;
        was_authenticated
    }

    /// Mirror tokens into the credential store. Failures are logged and
    /// swallowed; memory is already updated and stays authoritative.
    fn persist_tokens(&self, access_token: &str, refresh_token: &str, expires_at: DateTime<Utc>) {
        let expires = expires_at.to_rfc3339();
        let writes = [
            (KEY_ACCESS_TOKEN, access_token),
            (KEY_REFRESH_TOKEN, refresh_token),
            (KEY_EXPIRES_AT, expires.as_str()),
        ];
        for (key, value) in writes {
            if let Err(e) = self.store.set(key, value) {
                warn!(key, error = %e, "failed to persist credential");
            }
        }
    }

    fn remove_persisted_tokens(&self) {
        for key in [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_EXPIRES_AT] {
            if let Err(e) = self.store.delete(key) {
                warn!(key, error = %e, "failed to delete stored credential");
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Err just means no live subscribers.
        let _ = self.events.send(event);
    }
}

/// A token counts as expiring when no expiry is recorded or `now` is within
/// the leeway window of it.
fn is_expiring_soon(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires_at) => now >= expires_at - Duration::seconds(EXPIRY_LEEWAY_SECS),
        None => true,
    }
}

/// Server-reported lifetime as a duration, saturating instead of panicking
/// on nonsense values.
fn token_lifetime(expires_in: i64) -> Duration {
    Duration::try_seconds(expires_in).unwrap_or_else(Duration::zero)
}
