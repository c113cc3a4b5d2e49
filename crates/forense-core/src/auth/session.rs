//! Session lifecycle: mint, reuse, refresh, retry and offline degradation.
//!
//! `SessionManager` owns every piece of credential state. Callers only see
//! `authenticated_request`, which guarantees a live bearer token, and a few
//! lifecycle operations. Creation and refresh are serialized behind a single
//! async gate so overlapping callers never mint duplicate sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::config::Config;

use super::store::{Storage, CUSTOM_KEY_KEY, TOKENS_KEY};
use super::tokens::{CredentialSet, TokenPayload};
use super::usage::{UsageLimits, UsagePayload, UsageSnapshot};

const ANONYMOUS_SESSION_PATH: &str = "/api/auth/anonymous";
const REFRESH_PATH: &str = "/api/auth/refresh";
pub const SESSION_PATH: &str = "/api/auth/session";

/// Side-channel header carrying the caller's own Gemini key
pub const CUSTOM_KEY_HEADER: &str = "x-gemini-key";
const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Refresh transitions allowed during a single initialization
const MAX_REFRESH_ATTEMPTS: u32 = 2;

/// Proof that the caller holds the session gate
type GateGuard<'a> = MutexGuard<'a, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Valid,
    ExpiredWithRefresh,
    ExpiredNoRefresh,
}

impl SessionState {
    fn of(credentials: Option<&CredentialSet>, now: DateTime<Utc>) -> Self {
        match credentials {
            None => SessionState::NoSession,
            Some(c) if c.is_valid_at(now) => SessionState::Valid,
            Some(c) if c.has_refresh_token() => SessionState::ExpiredWithRefresh,
            Some(_) => SessionState::ExpiredNoRefresh,
        }
    }
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    store: Arc<dyn Storage>,
    limits: UsageLimits,
    tokens: RwLock<Option<CredentialSet>>,
    custom_key: RwLock<Option<String>>,
    offline: AtomicBool,
    gate: Mutex<()>,
}

impl SessionManager {
    /// Create a manager, restoring any persisted session and custom key.
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn Storage>) -> Self {
        let tokens = Self::load_tokens(store.as_ref());
        let custom_key = Self::load_custom_key(store.as_ref());
        debug!(
            has_session = tokens.is_some(),
            has_custom_key = custom_key.is_some(),
            "Session state loaded"
        );

        Self {
            transport,
            store,
            limits: UsageLimits::default(),
            tokens: RwLock::new(tokens),
            custom_key: RwLock::new(custom_key),
            offline: AtomicBool::new(false),
            gate: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(config.base_url.clone(), config.request_timeout())?;
        let store = config.open_store()?;
        Ok(Self::new(Arc::new(transport), store).with_usage_limits(config.usage_limits))
    }

    pub fn with_usage_limits(mut self, limits: UsageLimits) -> Self {
        self.limits = limits;
        self
    }

    fn load_tokens(store: &dyn Storage) -> Option<CredentialSet> {
        match store.get(TOKENS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(tokens) => Some(tokens),
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable stored session");
                    if let Err(e) = store.remove(TOKENS_KEY) {
                        warn!(error = %e, "Failed to remove stored session");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to load stored session");
                None
            }
        }
    }

    fn load_custom_key(store: &dyn Storage) -> Option<String> {
        match store.get(CUSTOM_KEY_KEY) {
            Ok(key) => key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to load custom key");
                None
            }
        }
    }

    // ===== State =====

    /// Snapshot of the current credential set
    pub fn credentials(&self) -> Option<CredentialSet> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn access_token(&self) -> Option<String> {
        self.credentials()
            .map(|c| c.access_token)
            .filter(|t| !t.is_empty())
    }

    pub fn session_state(&self) -> SessionState {
        SessionState::of(self.credentials().as_ref(), Utc::now())
    }

    /// True iff an access token is held and it is more than 10s from expiry
    pub fn is_authenticated(&self) -> bool {
        self.session_state() == SessionState::Valid
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn enter_offline(&self) -> UsageSnapshot {
        self.offline.store(true, Ordering::SeqCst);
        UsageSnapshot::offline()
    }

    pub fn custom_key(&self) -> Option<String> {
        self.custom_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn has_custom_key(&self) -> bool {
        self.custom_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Set or clear the custom key. Blank input clears it.
    pub fn set_custom_key(&self, key: Option<&str>) {
        let key = key.map(str::trim).filter(|k| !k.is_empty());

        let persisted = match key {
            Some(k) => self.store.set(CUSTOM_KEY_KEY, k),
            None => self.store.remove(CUSTOM_KEY_KEY),
        };
        if let Err(e) = persisted {
            warn!(error = %e, "Failed to persist custom key");
        }

        *self.custom_key.write().unwrap_or_else(PoisonError::into_inner) = key.map(String::from);
        info!(active = key.is_some(), "Custom key updated");
    }

    fn save_tokens(&self, payload: TokenPayload) {
        let tokens = CredentialSet::issue(payload, Utc::now());
        match serde_json::to_string(&tokens) {
            Ok(raw) => {
                if let Err(e) = self.store.set(TOKENS_KEY, &raw) {
                    warn!(error = %e, "Failed to persist session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session"),
        }
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
    }

    /// Forget the credential set in memory and in storage.
    /// The custom key is left alone.
    pub fn logout(&self) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
        if let Err(e) = self.store.remove(TOKENS_KEY) {
            warn!(error = %e, "Failed to remove stored session");
        }
        debug!("Session cleared");
    }

    // ===== Initialization =====

    /// Make sure a session exists and report its usage.
    ///
    /// Never fails: anything that goes wrong puts the manager in offline
    /// mode and yields the offline snapshot.
    pub async fn initialize_session(&self) -> UsageSnapshot {
        let gate = self.gate.lock().await;
        self.run_initialization(&gate).await
    }

    async fn run_initialization(&self, gate: &GateGuard<'_>) -> UsageSnapshot {
        self.offline.store(false, Ordering::SeqCst);
        match self.initialize_locked(gate).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Session initialization failed, continuing offline");
                self.enter_offline()
            }
        }
    }

    async fn initialize_locked(&self, gate: &GateGuard<'_>) -> Result<UsageSnapshot, ApiError> {
        let mut refreshes = 0;

        loop {
            match self.session_state() {
                SessionState::Valid => {
                    if self.has_custom_key() {
                        debug!("Custom key active with valid token, skipping stats fetch");
                        return Ok(UsageSnapshot::custom_key());
                    }
                    match self.fetch_live_stats(gate).await {
                        Ok(snapshot) => return Ok(snapshot),
                        Err(e) if e.is_rate_limited() || e.is_network_unreachable() => {
                            warn!(error = %e, "Session stats unavailable, continuing offline");
                            return Ok(self.enter_offline());
                        }
                        Err(e) => {
                            warn!(error = %e, "Session stats fetch failed, creating a new session");
                            break;
                        }
                    }
                }
                SessionState::ExpiredWithRefresh if refreshes < MAX_REFRESH_ATTEMPTS => {
                    refreshes += 1;
                    if let Err(e) = self.refresh_locked(gate).await {
                        warn!(error = %e, "Token refresh failed, creating a new session");
                        self.logout();
                        break;
                    }
                }
                SessionState::ExpiredWithRefresh => {
                    warn!(attempts = refreshes, "Refreshed token is still not usable");
                    self.logout();
                    break;
                }
                SessionState::NoSession | SessionState::ExpiredNoRefresh => break,
            }
        }

        self.create_session_locked(gate).await
    }

    /// Mint a new anonymous session unconditionally.
    pub async fn create_anonymous_session(&self) -> Result<UsageSnapshot, ApiError> {
        let gate = self.gate.lock().await;
        self.create_session_locked(&gate).await
    }

    async fn create_session_locked(&self, _gate: &GateGuard<'_>) -> Result<UsageSnapshot, ApiError> {
        let mut request = Self::json_post(ANONYMOUS_SESSION_PATH);
        if let Some(key) = self.custom_key() {
            request = request.header(
                HeaderName::from_static(CUSTOM_KEY_HEADER),
                Self::header_value(&key, "X-Gemini-Key")?,
            );
        }

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(match response.status {
                StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
                status => ApiError::SessionCreation(status.as_u16()),
            });
        }

        let data: Value = response.json()?;
        let payload = TokenPayload::deserialize(&data)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.save_tokens(payload);
        info!("Anonymous session created");

        Ok(self.map_usage(&data))
    }

    // ===== Refresh =====

    /// Exchange the refresh token for a new credential set.
    /// Any failure after the request is sent logs the session out.
    pub async fn refresh_token(&self) -> Result<(), ApiError> {
        let gate = self.gate.lock().await;
        self.refresh_locked(&gate).await
    }

    async fn refresh_locked(&self, _gate: &GateGuard<'_>) -> Result<(), ApiError> {
        let refresh_token = self
            .credentials()
            .filter(CredentialSet::has_refresh_token)
            .map(|c| c.refresh_token)
            .ok_or(ApiError::NoRefreshToken)?;

        match self.request_refresh(&refresh_token).await {
            Ok(payload) => {
                self.save_tokens(payload);
                info!("Session token refreshed");
                Ok(())
            }
            Err(e) => {
                self.logout();
                Err(e)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenPayload, ApiError> {
        let request = Self::json_post(REFRESH_PATH).header(
            HeaderName::from_static(REFRESH_TOKEN_HEADER),
            Self::header_value(refresh_token, "X-Refresh-Token")?,
        );

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(ApiError::RefreshFailed(response.status.as_u16()));
        }
        response.json()
    }

    /// Refresh after a 401, unless another caller already rotated the token.
    async fn renew_locked(&self, rejected_token: &str, gate: &GateGuard<'_>) -> Result<(), ApiError> {
        let rotated = self
            .credentials()
            .map(|c| c.access_token != rejected_token && c.is_valid())
            .unwrap_or(false);
        if rotated {
            debug!("Token already rotated, retrying with the new one");
            return Ok(());
        }
        self.refresh_locked(gate).await
    }

    // ===== Authenticated requests =====

    /// Send `request` with session credentials attached.
    ///
    /// A 401 triggers exactly one refresh and one retry. The response is
    /// returned untouched; interpreting the status is up to the caller.
    pub async fn authenticated_request(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        if self.is_offline() {
            return Err(ApiError::Offline);
        }

        if !self.is_authenticated() {
            self.ensure_session().await;
            if self.is_offline() {
                return Err(ApiError::Offline);
            }
            if !self.is_authenticated() {
                return Err(ApiError::AuthUnavailable);
            }
        }

        self.send_authorized(request, None).await
    }

    async fn ensure_session(&self) {
        let gate = self.gate.lock().await;
        // Another caller may have initialized while we waited
        if self.is_authenticated() {
            return;
        }
        self.run_initialization(&gate).await;
    }

    async fn send_authorized(
        &self,
        request: HttpRequest,
        gate: Option<&GateGuard<'_>>,
    ) -> Result<HttpResponse, ApiError> {
        let token = self.access_token().ok_or(ApiError::AuthUnavailable)?;
        let response = self
            .transport
            .send(self.authorize(request.clone(), &token)?)
            .await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(path = %request.path, "Token rejected (401), attempting refresh");
        let renewed = match gate {
            Some(gate) => self.renew_locked(&token, gate).await,
            None => {
                let gate = self.gate.lock().await;
                self.renew_locked(&token, &gate).await
            }
        };
        if let Err(e) = renewed {
            error!(error = %e, "Token refresh failed");
            self.logout();
            return Err(ApiError::SessionExpired);
        }

        let token = self.access_token().ok_or(ApiError::SessionExpired)?;
        self.transport.send(self.authorize(request, &token)?).await
    }

    /// Attach bearer, accept and custom key headers. Caller headers win.
    fn authorize(&self, mut request: HttpRequest, token: &str) -> Result<HttpRequest, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            Self::header_value(&format!("Bearer {}", token), "Authorization")?,
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = self.custom_key() {
            headers.insert(
                HeaderName::from_static(CUSTOM_KEY_HEADER),
                Self::header_value(&key, "X-Gemini-Key")?,
            );
        }

        headers.extend(std::mem::take(&mut request.headers));
        request.headers = headers;
        Ok(request)
    }

    fn header_value(value: &str, name: &'static str) -> Result<HeaderValue, ApiError> {
        let mut value = HeaderValue::from_str(value).map_err(|_| ApiError::InvalidHeader(name))?;
        value.set_sensitive(true);
        Ok(value)
    }

    fn json_post(path: &str) -> HttpRequest {
        HttpRequest::post(path)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .json(json!({}))
    }

    // ===== Usage =====

    /// Current usage. Offline and custom-key sessions answer locally;
    /// an unreachable API switches to offline mode instead of failing.
    pub async fn fetch_session_stats(&self) -> Result<UsageSnapshot, ApiError> {
        if self.is_offline() {
            return Ok(UsageSnapshot::offline());
        }
        if self.has_custom_key() {
            return Ok(UsageSnapshot::custom_key());
        }

        match self.authenticated_request(Self::stats_request()).await {
            Ok(response) => self.decode_stats(response),
            Err(e) if e.is_network_unreachable() => {
                warn!(error = %e, "Session stats unreachable, continuing offline");
                Ok(self.enter_offline())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_live_stats(&self, gate: &GateGuard<'_>) -> Result<UsageSnapshot, ApiError> {
        let response = self.send_authorized(Self::stats_request(), Some(gate)).await?;
        self.decode_stats(response)
    }

    fn stats_request() -> HttpRequest {
        HttpRequest::get(SESSION_PATH)
            .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .header(header::PRAGMA, HeaderValue::from_static("no-cache"))
    }

    fn decode_stats(&self, response: HttpResponse) -> Result<UsageSnapshot, ApiError> {
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.text()));
        }
        let data: Value = response.json()?;
        Ok(self.map_usage(&data))
    }

    fn map_usage(&self, data: &Value) -> UsageSnapshot {
        UsagePayload::decode(data).into_snapshot(&self.limits, self.has_custom_key())
    }

    // ===== Teardown =====

    /// End the session server-side (best effort), then log out locally.
    pub async fn delete_session(&self) {
        if !self.is_offline() && self.is_authenticated() {
            match self.authenticated_request(HttpRequest::delete(SESSION_PATH)).await {
                Ok(response) if !response.is_success() => {
                    warn!(status = %response.status, "Remote session deletion rejected");
                }
                Ok(_) => debug!("Remote session deleted"),
                Err(e) => warn!(error = %e, "Failed to delete remote session"),
            }
        }
        self.logout();
    }
}
