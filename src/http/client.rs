//! Authenticated request executor.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::{classify_transport, HttpError};
use super::refresh::{RefreshCoordinator, RefreshOutcome};
use super::request::{Body, RequestConfig};
use super::response::{HttpResponse, RawResponse};
use super::session::SessionEvents;
use crate::config::{ApiConfig, MutopiaConfig};
use crate::credentials::{Cipher, TokenPair, TokenStore};
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore};

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// HTTP client that attaches the stored bearer token and recovers from an
/// expired one.
///
/// Cloning is cheap; clones share the token store, the refresh state and the
/// session hook.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    config: ApiConfig,
    tokens: TokenStore,
    refresh: RefreshCoordinator,
    session: SessionEvents,
}

impl HttpClient {
    pub fn new(config: ApiConfig, tokens: TokenStore) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(format!("mutopia/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config,
            tokens,
            refresh: RefreshCoordinator::new(),
            session: SessionEvents::new(),
        })
    }

    /// Builds the token store described by `config` and a client on top of it.
    pub fn from_config(config: &MutopiaConfig) -> Result<Self> {
        let backend: Arc<dyn KeyValueStore> = match &config.storage.path {
            Some(path) => Arc::new(
                SqliteStore::open(path)
                    .with_context(|| format!("Failed to open token store at {path}"))?,
            ),
            None => Arc::new(MemoryStore::new()),
        };
        let tokens = TokenStore::new(backend, Cipher::for_origin(config.origin()));

        Self::new(config.api.clone(), tokens)
    }

    /// Runs `hook` after every forced logout.
    pub fn on_session_expired<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.session.on_session_expired(hook);
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.access_token().is_some()
    }

    // ── Verbs ────────────────────────────────────────────────────────────────

    pub async fn get(&self, target: &str) -> Result<HttpResponse, HttpError> {
        self.request(RequestConfig::get(target)).await
    }

    pub async fn post(&self, target: &str, body: Body) -> Result<HttpResponse, HttpError> {
        self.request(RequestConfig::post(target).body(body)).await
    }

    pub async fn put(&self, target: &str, body: Body) -> Result<HttpResponse, HttpError> {
        self.request(RequestConfig::put(target).body(body)).await
    }

    pub async fn patch(&self, target: &str, body: Body) -> Result<HttpResponse, HttpError> {
        self.request(RequestConfig::patch(target).body(body)).await
    }

    pub async fn delete(&self, target: &str) -> Result<HttpResponse, HttpError> {
        self.request(RequestConfig::delete(target)).await
    }

    /// Sends `config`, retrying transient failures and recovering from a 401.
    ///
    /// A 401 on the first attempt of an authorized request joins (or starts)
    /// the shared token refresh and resends once. Whatever that resend returns
    /// is final. If the session cannot be refreshed, the stored tokens are
    /// cleared, the session-expiry hook runs, and the call fails with
    /// [`ErrorKind::Unauthorized`](super::ErrorKind::Unauthorized).
    pub async fn request(&self, config: RequestConfig) -> Result<HttpResponse, HttpError> {
        let url = self.resolve_url(&config.target);
        let timeout = config.timeout.unwrap_or_else(|| self.config.timeout());
        let retries = config.retry.unwrap_or(self.config.retry);
        let retry_delay = config
            .retry_delay
            .unwrap_or_else(|| self.config.retry_delay());
        let headers = config.body.headers(&config.headers);

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                debug!(url = %url, attempt, retries, "Retrying request");
                tokio::time::sleep(retry_delay).await;
            }

            match self.send_once(&config, &url, &headers, timeout).await {
                Ok((raw, _)) if raw.status.is_success() => return Ok(raw.into_response()),
                Ok((raw, sent_token))
                    if raw.status == StatusCode::UNAUTHORIZED
                        && !config.skip_auth
                        && attempt == 0 =>
                {
                    debug!(url = %url, "Unauthorized, attempting token refresh");
                    return self
                        .resend_after_refresh(&config, &url, &headers, timeout, sent_token)
                        .await;
                }
                Ok((raw, _)) => return Err(raw.into_error()),
                Err(e) if e.is_transient() && attempt < retries => {
                    debug!(url = %url, error = %e, "Request failed, will retry");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ── Session ──────────────────────────────────────────────────────────────

    /// Posts credentials to a login-style endpoint and stores the returned
    /// token pair.
    pub async fn login(&self, target: &str, credentials: Value) -> Result<TokenPair, HttpError> {
        let response = self
            .request(RequestConfig::post(target).json(credentials).skip_auth())
            .await?;
        let pair: TokenPair = response.json()?;

        self.establish_session(&pair).map_err(|e| {
            error!(error = %e, "Failed to store session tokens");
            HttpError::request(format!("Failed to store session tokens: {e:#}"))
        })?;
        info!("Session established");

        Ok(pair)
    }

    /// Stores a token pair obtained elsewhere.
    pub fn establish_session(&self, pair: &TokenPair) -> Result<()> {
        self.tokens.store_pair(pair)
    }

    /// Ends the session at the user's request. The expiry hook does not run.
    pub fn logout(&self) -> Result<()> {
        self.tokens.clear_all()?;
        info!("Session cleared");
        Ok(())
    }

    /// Refreshes the tokens now, sharing any refresh already in flight.
    pub async fn refresh_session(&self) -> Result<(), HttpError> {
        let current = self.tokens.access_token();
        if self.refresh_tokens(current).await.is_refreshed() {
            Ok(())
        } else {
            Err(HttpError::unauthorized())
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn resolve_url(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            return target.to_string();
        }

        let base = self.config.base_url.trim_end_matches('/');
        if target.starts_with('/') {
            format!("{base}{target}")
        } else {
            format!("{base}/{target}")
        }
    }

    /// One send. The bearer token is read here, not when the request was
    /// built, so a resend after a refresh carries the new token. Returns the
    /// token that was sent alongside the fully read response.
    async fn send_once(
        &self,
        config: &RequestConfig,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<(RawResponse, Option<String>), HttpError> {
        let mut headers = headers.clone();
        let token = if config.skip_auth {
            None
        } else {
            self.tokens.access_token()
        };
        if let Some(token) = &token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| HttpError::request("Stored access token is not a valid header value"))?;
            headers.insert(AUTHORIZATION, value);
        }

        let builder = config
            .body
            .apply(self.inner.request(config.method.clone(), url).headers(headers))?;

        debug!(
            method = %config.method,
            url = %url,
            authorized = token.is_some(),
            "Sending request"
        );

        let exchange = async {
            let response = builder.send().await?;
            RawResponse::read(response).await
        };
        let raw = match within(timeout, exchange).await {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => return Err(classify_transport(&e, timeout)),
            None => return Err(HttpError::timeout(timeout)),
        };

        debug!(url = %url, status = raw.status.as_u16(), "Received response");
        Ok((raw, token))
    }

    async fn resend_after_refresh(
        &self,
        config: &RequestConfig,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
        sent_token: Option<String>,
    ) -> Result<HttpResponse, HttpError> {
        if !self.refresh_tokens(sent_token).await.is_refreshed() {
            return Err(HttpError::unauthorized());
        }

        debug!(url = %url, "Token refreshed, resending request");
        let (raw, _) = self.send_once(config, url, headers, timeout).await?;
        if raw.status.is_success() {
            Ok(raw.into_response())
        } else {
            Err(raw.into_error())
        }
    }

    /// Joins or starts a refresh episode. `sent_token` is the access token the
    /// failing request carried.
    ///
    /// The episode ends the session itself on failure, so the hook runs once
    /// however many callers were waiting.
    async fn refresh_tokens(&self, sent_token: Option<String>) -> RefreshOutcome {
        let http = self.inner.clone();
        let tokens = self.tokens.clone();
        let session = self.session.clone();
        let refresh_url = self.resolve_url(&self.config.refresh_path);
        let timeout = self.config.timeout();

        self.refresh
            .join_or_start(move || async move {
                let outcome =
                    exchange_refresh_token(&http, &refresh_url, &tokens, sent_token, timeout)
                        .await;

                if outcome.ends_session() {
                    warn!(?outcome, "Token refresh failed, ending session");
                    if let Err(e) = tokens.clear_all() {
                        error!(error = %e, "Failed to clear stored tokens");
                    }
                    session.notify_expired();
                }
                outcome
            })
            .await
    }
}

async fn exchange_refresh_token(
    http: &reqwest::Client,
    url: &str,
    tokens: &TokenStore,
    sent_token: Option<String>,
    timeout: Duration,
) -> RefreshOutcome {
    let current = tokens.access_token();
    if current.is_some() && current != sent_token {
        debug!("Access token already rotated, skipping refresh");
        return RefreshOutcome::Refreshed;
    }

    let Some(refresh_token) = tokens.refresh_token() else {
        if sent_token.is_some() && current.is_none() {
            debug!("Session already cleared");
            return RefreshOutcome::SessionCleared;
        }
        debug!("No refresh token available");
        return RefreshOutcome::NoRefreshToken;
    };

    info!(url = %url, "Refreshing access token");

    // Body read included: headers followed by a stalled body must still settle
    let exchange = async {
        let response = http
            .post(url)
            .json(&RefreshRequest {
                refresh: &refresh_token,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok::<_, reqwest::Error>(Err(status));
        }
        response.json::<TokenPair>().await.map(Ok)
    };

    let pair = match within(timeout, exchange).await {
        Some(Ok(Ok(pair))) => pair,
        Some(Ok(Err(status))) => {
            warn!(status = status.as_u16(), "Token refresh rejected");
            return RefreshOutcome::Rejected(status.as_u16());
        }
        Some(Err(e)) if e.is_decode() => {
            warn!(error = %e, "Failed to parse token refresh response");
            return RefreshOutcome::Failed;
        }
        Some(Err(e)) => {
            warn!(error = %e, "Token refresh request failed");
            return RefreshOutcome::Failed;
        }
        None => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Token refresh request timed out");
            return RefreshOutcome::Failed;
        }
    };

    if pair.access.is_empty() || pair.refresh.is_empty() {
        warn!("Invalid token refresh response");
        return RefreshOutcome::Failed;
    }

    if let Err(e) = tokens.store_pair(&pair) {
        error!(error = %e, "Failed to store refreshed tokens");
        return RefreshOutcome::Failed;
    }

    info!("Access token refreshed");
    RefreshOutcome::Refreshed
}

/// Runs `fut` with a deadline of `timeout`; zero means no deadline. `None`
/// when the deadline passed first.
async fn within<F: Future>(timeout: Duration, fut: F) -> Option<F::Output> {
    if timeout.is_zero() {
        Some(fut.await)
    } else {
        tokio::time::timeout(timeout, fut).await.ok()
    }
}
