//! Session proxy client: token lifecycle plus the user-session endpoint.
//!
//! A [`SessionClient`] owns the access/refresh tokens for one client
//! identity, mirrors them into a [`KeyValueStore`], keeps at most one
//! refresh task scheduled, and proxies `get`/`update` calls for per-user
//! public and private session data.
//!
//! ```rust,ignore
//! use openauthster::{ClientConfig, FileStore, SessionClient, SessionKind};
//!
//! let client = SessionClient::with_http_issuer(config, FileStore::open("session.json")?)?;
//! let url = client.login().await?;          // redirect the user here
//! client.callback(&current_location).await?; // back on the redirect URI
//! let data = client.get_user_session(SessionKind::Public).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::identity::ClientIdentity;
use crate::issuer::{HttpIssuer, Issuer, Tokens};
use crate::pkce::Challenge;
use crate::store::{CHALLENGE_KEY, KeyValueStore, REFRESH_TOKEN_KEY, TOKEN_KEY};

/// Path of the user-session endpoint, relative to the issuer.
pub const USER_ENDPOINT: &str = "/user-endpoint";

/// Seconds before expiry at which the access token is refreshed.
pub const REFRESH_MARGIN_SECS: u64 = 60;

/// Caller-defined shape of public or private session data.
pub trait SessionPayload: DeserializeOwned + Default + Clone + Send + Sync + 'static {}

impl<T> SessionPayload for T where T: DeserializeOwned + Default + Clone + Send + Sync + 'static {}

/// Which half of the session data a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    Get,
    Update,
}

/// Public and private session data for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData<P, V> {
    pub public: P,
    pub private: V,
}

/// Form body posted to the user-session endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub action: SessionAction,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub id: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// JSON-encoded payload, `update` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "P: DeserializeOwned, V: DeserializeOwned")]
struct UserFetchResponse<P, V> {
    success: bool,
    #[serde(default)]
    data: Option<SessionData<P, V>>,
    #[serde(default)]
    error: Option<String>,
}

/// Token set held by one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub expires_in: Option<u64>,
}

struct State<P, V> {
    identity: ClientIdentity,
    user_id: Option<String>,
    tokens: SessionTokens,
    data: SessionData<P, V>,
    is_loaded: bool,
    is_authenticated: bool,
    // Bumped by every logout; completions started under an older epoch are dropped.
    epoch: u64,
}

struct Inner<I, S, P, V> {
    config: ClientConfig,
    session_url: Url,
    issuer: I,
    store: S,
    http: reqwest::Client,
    state: Mutex<State<P, V>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    callback_in_flight: AtomicBool,
}

impl<I, S, P, V> Drop for Inner<I, S, P, V> {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Client for one composite identity: login/callback, refresh, session data.
pub struct SessionClient<I, S, P = serde_json::Value, V = serde_json::Value> {
    inner: Arc<Inner<I, S, P, V>>,
}

// Manual Clone: avoid derive adding `I: Clone, S: Clone, ...` bounds.
impl<I, S, P, V> Clone for SessionClient<I, S, P, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, P, V> SessionClient<HttpIssuer, S, P, V>
where
    S: KeyValueStore,
    P: SessionPayload,
    V: SessionPayload,
{
    /// Client talking to the configured issuer over HTTP.
    ///
    /// # Errors
    ///
    /// See [`SessionClient::new`].
    pub fn with_http_issuer(config: ClientConfig, store: S) -> Result<Self, Error> {
        let issuer = HttpIssuer::new(&config)?;
        Self::new(config, issuer, store)
    }
}

impl<I, S, P, V> SessionClient<I, S, P, V>
where
    I: Issuer,
    S: KeyValueStore,
    P: SessionPayload,
    V: SessionPayload,
{
    /// Build the client and load any stored tokens.
    ///
    /// Tokens given in the config win over stored ones. A present access
    /// token marks the client authenticated and loaded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClientId`] for an unusable client ID,
    /// [`Error::Config`] if the issuer URL cannot be extended, or a store error.
    pub fn new(config: ClientConfig, issuer: I, store: S) -> Result<Self, Error> {
        let identity = config.identity()?;
        let session_url = config.issuer_endpoint(USER_ENDPOINT)?;

        let access = match config.token.clone() {
            Some(token) => Some(token),
            None => store.get(TOKEN_KEY)?,
        };
        let refresh = match config.refresh_token.clone() {
            Some(token) => Some(token),
            None => store.get(REFRESH_TOKEN_KEY)?,
        };
        let authenticated = access.is_some();

        let state = State {
            identity,
            user_id: config.user_id.clone(),
            tokens: SessionTokens {
                access,
                refresh,
                expires_in: None,
            },
            data: SessionData::default(),
            is_loaded: authenticated,
            is_authenticated: authenticated,
            epoch: 0,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                session_url,
                issuer,
                store,
                http: reqwest::Client::new(),
                state: Mutex::new(state),
                refresh_task: Mutex::new(None),
                callback_in_flight: AtomicBool::new(false),
            }),
        })
    }

    /// Start an authorization: store the challenge, return the URL to navigate to.
    ///
    /// A previous pending challenge is overwritten.
    ///
    /// # Errors
    ///
    /// Propagates issuer and store failures.
    pub async fn login(&self) -> Result<Url, Error> {
        let identity = self.identity();
        let request = self
            .inner
            .issuer
            .authorize(&identity, &self.inner.config.redirect_uri)
            .await?;

        let challenge = serde_json::to_string(&request.challenge)?;
        self.inner.store.set(CHALLENGE_KEY, &challenge)?;

        tracing::debug!(client_id = %identity, "Authorization challenge stored");
        Ok(request.url)
    }

    /// Complete an authorization from the redirect location.
    ///
    /// A location without `code` (and without `error`) is not a callback and
    /// is ignored. Otherwise the stored challenge is consumed and the client
    /// is marked loaded whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::CallbackInProgress`] if another callback is running
    /// - [`Error::OAuth`] if the issuer redirected with an `error`
    /// - [`Error::ChallengeMissing`] if no challenge was stored
    /// - [`Error::StateMismatch`] if the returned `state` differs from the stored one
    /// - [`Error::Exchange`] wrapping the issuer failure
    pub async fn callback(&self, location: &Url) -> Result<(), Error> {
        let params = CallbackParams::from_url(location);
        if params.code.is_none() && params.error.is_none() {
            return Ok(());
        }

        let _guard =
            InFlight::acquire(&self.inner.callback_in_flight).ok_or(Error::CallbackInProgress)?;

        let result = self.complete_callback(params).await;

        if let Err(e) = self.inner.store.remove(CHALLENGE_KEY) {
            tracing::warn!(error = %e, "Failed to remove stored challenge");
        }
        self.inner.state.lock().is_loaded = true;

        result
    }

    async fn complete_callback(&self, params: CallbackParams) -> Result<(), Error> {
        if let Some(error) = params.error {
            let description = params.error_description.unwrap_or_default();
            tracing::warn!(error = %error, description = %description, "OAuth2 error from issuer");
            return Err(Error::OAuth {
                operation: "authorization",
                status: None,
                detail: if description.is_empty() {
                    error
                } else {
                    format!("{error}: {description}")
                },
            });
        }
        let Some(code) = params.code else {
            return Ok(());
        };

        let challenge = self.stored_challenge()?.ok_or(Error::ChallengeMissing)?;
        if params
            .state
            .as_deref()
            .is_some_and(|state| state != challenge.state)
        {
            tracing::warn!("OAuth state mismatch");
            return Err(Error::StateMismatch);
        }

        let (epoch, identity) = self.inner.snapshot();
        let tokens = self
            .inner
            .issuer
            .exchange(
                &identity,
                &code,
                &self.inner.config.redirect_uri,
                &challenge.verifier,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Token exchange failed");
                Error::Exchange(Box::new(e))
            })?;

        let Some(mut state) = self.inner.commit_tokens(epoch, &tokens)? else {
            tracing::debug!("Discarding exchanged tokens, client logged out meanwhile");
            return Ok(());
        };
        state.is_authenticated = true;
        schedule_refresh(&self.inner, tokens.expires_in);
        drop(state);

        tracing::info!(client_id = %identity, "OAuth2 login successful");
        Ok(())
    }

    /// Forget everything: tokens, cached data, the refresh task and all stored entries.
    pub fn logout(&self) {
        // Lock order: state, then refresh_task.
        let mut state = self.inner.state.lock();
        state.epoch += 1;

        if let Some(task) = self.inner.refresh_task.lock().take() {
            task.abort();
        }

        for key in [TOKEN_KEY, REFRESH_TOKEN_KEY, CHALLENGE_KEY] {
            if let Err(e) = self.inner.store.remove(key) {
                tracing::warn!(error = %e, key, "Failed to clear stored session entry");
            }
        }

        state.tokens = SessionTokens::default();
        state.data = SessionData::default();
        state.is_authenticated = false;
        state.is_loaded = true;
    }

    /// Fetch one half of the user's session data; replaces the cached data.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthenticated`] before any I/O when the token or user ID
    /// is missing; [`Error::SessionEndpoint`] when the server reports failure.
    pub async fn get_user_session(&self, kind: SessionKind) -> Result<SessionData<P, V>, Error> {
        let (token, user_id) = self.ensure_ready()?;
        let envelope = self.envelope(SessionAction::Get, kind, user_id, None);
        self.post_session(&token, &envelope, "fetch").await
    }

    /// Write one half of the user's session data; replaces the cached data
    /// with what the server returns.
    ///
    /// # Errors
    ///
    /// Same as [`get_user_session`](Self::get_user_session), plus
    /// [`Error::Json`] if `data` cannot be serialized.
    pub async fn update_user_session<T>(
        &self,
        kind: SessionKind,
        data: &T,
    ) -> Result<SessionData<P, V>, Error>
    where
        T: Serialize + ?Sized,
    {
        let (token, user_id) = self.ensure_ready()?;
        let data = serde_json::to_string(data)?;
        let envelope = self.envelope(SessionAction::Update, kind, user_id, Some(data));
        self.post_session(&token, &envelope, "update").await
    }

    /// Switch to another copy variant. `None` keeps the current one.
    pub fn update_options(&self, copy_id: Option<String>) {
        let Some(copy_id) = copy_id.filter(|c| !c.is_empty()) else {
            return;
        };
        let mut state = self.inner.state.lock();
        state.identity = state.identity.with_variant(Some(copy_id));
    }

    pub fn set_user_id(&self, user_id: Option<String>) {
        self.inner.state.lock().user_id = user_id;
    }

    #[must_use]
    pub fn identity(&self) -> ClientIdentity {
        self.inner.state.lock().identity.clone()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.inner.state.lock().user_id.clone()
    }

    #[must_use]
    pub fn tokens(&self) -> SessionTokens {
        self.inner.state.lock().tokens.clone()
    }

    #[must_use]
    pub fn expires_in(&self) -> Option<u64> {
        self.inner.state.lock().tokens.expires_in
    }

    /// Last session data returned by the endpoint.
    #[must_use]
    pub fn data(&self) -> SessionData<P, V> {
        self.inner.state.lock().data.clone()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().is_loaded
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().is_authenticated
    }

    /// Whether a refresh task is currently waiting or running.
    #[must_use]
    pub fn has_scheduled_refresh(&self) -> bool {
        self.inner
            .refresh_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn ensure_ready(&self) -> Result<(String, String), Error> {
        let state = self.inner.state.lock();
        let token = state
            .tokens
            .access
            .clone()
            .ok_or(Error::NotAuthenticated("Token is missing."))?;
        let user_id = state
            .user_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(Error::NotAuthenticated("User ID is missing."))?;
        Ok((token, user_id))
    }

    fn envelope(
        &self,
        action: SessionAction,
        kind: SessionKind,
        user_id: String,
        data: Option<String>,
    ) -> RequestEnvelope {
        RequestEnvelope {
            action,
            kind,
            id: user_id,
            client_id: self.inner.config.client_id.clone(),
            data,
        }
    }

    async fn post_session(
        &self,
        token: &str,
        envelope: &RequestEnvelope,
        operation: &'static str,
    ) -> Result<SessionData<P, V>, Error> {
        let (epoch, identity) = self.inner.snapshot();

        let mut request = self
            .inner
            .http
            .post(self.inner.session_url.clone())
            .headers(identity.headers(self.inner.config.propagation)?)
            .bearer_auth(token)
            .form(envelope);
        if let Some(secret) = &self.inner.config.secret {
            request = request.header("X-Client-Secret", secret);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let parsed: UserFetchResponse<P, V> =
            serde_json::from_str(&body).map_err(|_| Error::SessionEndpoint {
                operation,
                detail: format!("unexpected response ({status}): {body}"),
            })?;

        if !parsed.success {
            return Err(Error::SessionEndpoint {
                operation,
                detail: parsed
                    .error
                    .unwrap_or_else(|| format!("server returned {status}")),
            });
        }
        let data = parsed.data.ok_or_else(|| Error::SessionEndpoint {
            operation,
            detail: "response carried no data".into(),
        })?;

        let mut state = self.inner.state.lock();
        if state.epoch == epoch {
            state.data = data.clone();
        } else {
            tracing::debug!("Not caching session data, client logged out meanwhile");
        }
        Ok(data)
    }

    fn stored_challenge(&self) -> Result<Option<Challenge>, Error> {
        self.inner
            .store
            .get(CHALLENGE_KEY)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(Into::into)
    }
}

impl<I, S, P, V> Inner<I, S, P, V>
where
    I: Issuer,
    S: KeyValueStore,
    P: SessionPayload,
    V: SessionPayload,
{
    /// Current logout epoch and identity, read together.
    fn snapshot(&self) -> (u64, ClientIdentity) {
        let state = self.state.lock();
        (state.epoch, state.identity.clone())
    }

    /// Persist and adopt `tokens` unless a logout happened since `epoch`.
    ///
    /// The epoch check and every write happen under one state lock, which is
    /// handed back so the caller can finish its update before a logout can
    /// run. `None` means the tokens were discarded.
    fn commit_tokens(
        &self,
        epoch: u64,
        tokens: &Tokens,
    ) -> Result<Option<MutexGuard<'_, State<P, V>>>, Error> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Ok(None);
        }

        self.store.set(TOKEN_KEY, &tokens.access)?;
        if let Some(refresh) = &tokens.refresh {
            self.store.set(REFRESH_TOKEN_KEY, refresh)?;
        }

        state.tokens.access = Some(tokens.access.clone());
        if let Some(refresh) = &tokens.refresh {
            state.tokens.refresh = Some(refresh.clone());
        }
        state.tokens.expires_in = tokens.expires_in;
        Ok(Some(state))
    }

    fn refresh_token(&self) -> Result<Option<String>, Error> {
        let current = self.state.lock().tokens.refresh.clone();
        match current {
            Some(token) => Ok(Some(token)),
            None => self.store.get(REFRESH_TOKEN_KEY),
        }
    }

    /// One refresh round. Returns the lifetime of the new token when another
    /// round should follow.
    async fn refresh_once(&self) -> Option<u64> {
        let refresh_token = match self.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read refresh token");
                return None;
            }
        };

        let (epoch, identity) = self.snapshot();

        let tokens = match self.issuer.refresh(&identity, &refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                let err = Error::Refresh(Box::new(e));
                tracing::warn!(error = ?err, "Failed to refresh token");
                return None;
            }
        };

        match self.commit_tokens(epoch, &tokens) {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!("Discarding refreshed tokens, client logged out meanwhile");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist refreshed tokens");
                return None;
            }
        }

        tracing::debug!(expires_in = ?tokens.expires_in, "Access token refreshed");
        tokens.expires_in.filter(|&secs| secs > 0)
    }
}

fn refresh_delay(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in.saturating_sub(REFRESH_MARGIN_SECS))
}

/// Replace the client's refresh task with one firing a minute before expiry.
///
/// The task keeps refreshing for as long as each new token carries a
/// lifetime, and stops on the first failure.
fn schedule_refresh<I, S, P, V>(inner: &Arc<Inner<I, S, P, V>>, expires_in: Option<u64>)
where
    I: Issuer,
    S: KeyValueStore,
    P: SessionPayload,
    V: SessionPayload,
{
    let Some(mut expires_in) = expires_in.filter(|&secs| secs > 0) else {
        return;
    };
    let weak: Weak<Inner<I, S, P, V>> = Arc::downgrade(inner);

    let mut slot = inner.refresh_task.lock();
    if let Some(previous) = slot.take() {
        previous.abort();
    }

    *slot = Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(refresh_delay(expires_in)).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match inner.refresh_once().await {
                Some(next) => expires_in = next,
                None => return,
            }
        }
    }));
}

#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match &*key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned()).filter(|v| !v.is_empty());
        }
        params
    }
}

/// Marks a callback as running; cleared on drop.
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
