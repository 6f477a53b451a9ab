//! OAuth2 client-credentials token cache with single-flight renewal.
//!
//! Responsibilities:
//! - Serve the cached bearer token while it is outside the refresh margin.
//! - Fetch a new token from `POST {base_url}/oauth/token` otherwise.
//! - Coalesce concurrent cache misses onto one in-flight fetch.
//!
//! The fetch runs in its own task and writes its result into the cache
//! itself, so dropping any waiting caller never cancels it.
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures_util::future::{BoxFuture, FutureExt as _, Shared};
use govbroker_types::{BrokerError, CachedToken, Clock, OAuthClient, Result, SystemClock};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// Tokens are not served within this window of their expiry.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

type InFlight = Shared<BoxFuture<'static, Result<CachedToken>>>;

#[derive(Default)]
struct CacheState {
    token: Option<CachedToken>,
    in_flight: Option<InFlight>,
}

struct Inner {
    http: reqwest::Client,
    token_url: String,
    client: Option<Arc<OAuthClient>>,
    clock: Arc<dyn Clock>,
    margin: Duration,
    state: Mutex<CacheState>,
    fetches: AtomicU64,
}

/// Shared handle to the process-wide token cache. Cloning is cheap.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<Inner>,
}

impl TokenCache {
    /// Start building a cache that fetches from `token_url` over `http`.
    pub fn builder(token_url: impl Into<String>, http: reqwest::Client) -> TokenCacheBuilder {
        TokenCacheBuilder {
            token_url: token_url.into(),
            http,
            client: None,
            clock: Arc::new(SystemClock),
            margin: DEFAULT_REFRESH_MARGIN,
        }
    }

    /// Returns a bearer token, fetching one if the cache is empty or stale.
    ///
    /// Concurrent callers that miss the cache share a single fetch.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::Configuration`] if no OAuth client is configured; no
    ///   request is made.
    /// - [`BrokerError::AuthFetchFailed`] if the token endpoint answers with a
    ///   non-2xx status or an unusable body.
    /// - [`BrokerError::AuthTransport`] if the token endpoint is unreachable.
    pub async fn get_access_token(&self) -> Result<String> {
        let Some(client) = self.inner.client.clone() else {
            return Err(BrokerError::Configuration(
                "oauth client_id/client_secret not configured".into(),
            ));
        };

        let in_flight = {
            let mut state = self.inner.lock_state();
            let now = self.inner.clock.now_millis();
            if let Some(token) = &state.token
                && token.is_fresh(now, self.inner.margin)
            {
                return Ok(token.value.clone());
            }
            if let Some(pending) = &state.in_flight {
                pending.clone()
            } else {
                let pending = self.spawn_fetch(client);
                state.in_flight = Some(pending.clone());
                pending
            }
        };

        in_flight.await.map(|token| token.value)
    }

    /// Drops the cached token; the next call fetches a new one.
    pub fn invalidate(&self) {
        self.inner.lock_state().token = None;
    }

    /// The currently cached token, fresh or not.
    #[must_use]
    pub fn cached(&self) -> Option<CachedToken> {
        self.inner.lock_state().token.clone()
    }

    /// Number of token-endpoint exchanges started since construction.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.client.is_some()
    }

    fn spawn_fetch(&self, client: Arc<OAuthClient>) -> InFlight {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.fetch(&client).await;
            let mut state = inner.lock_state();
            state.in_flight = None;
            if let Ok(token) = &result {
                state.token = Some(token.clone());
            }
            result
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    inner.lock_state().in_flight = None;
                    Err(BrokerError::AuthTransport(format!(
                        "token fetch task aborted: {e}"
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(&self, client: &OAuthClient) -> Result<CachedToken> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(url = %self.token_url, client_id = %client.client_id, "fetching access token");

        let basic = STANDARD.encode(format!("{}:{}", client.client_id, client.client_secret()));
        let resp = self
            .http
            .post(&self.token_url)
            .header(AUTHORIZATION, format!("Basic {basic}"))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| BrokerError::AuthTransport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| BrokerError::AuthTransport(e.to_string()))?;

        if !(200..300).contains(&status) {
            tracing::warn!(status, "token endpoint rejected client credentials");
            return Err(BrokerError::AuthFetchFailed { status, body });
        }

        let parsed = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .as_ref()
            .and_then(parse_token_response);
        let Some((access_token, expires_in)) = parsed else {
            tracing::warn!(status, "token endpoint returned an unusable body");
            return Err(BrokerError::AuthFetchFailed { status, body });
        };

        let token = CachedToken::issued(access_token, self.clock.now_millis(), expires_in);
        if !token.is_fresh(self.clock.now_millis(), self.margin) {
            tracing::warn!(
                expires_in,
                margin_secs = self.margin.as_secs(),
                "issued token lifetime is shorter than the refresh margin"
            );
        }
        tracing::info!(expires_in, "access token renewed");
        Ok(token)
    }
}

/// Extracts `(access_token, expires_in)` from a token endpoint response.
///
/// `expires_in` is accepted as a number or a numeric string.
fn parse_token_response(json: &serde_json::Value) -> Option<(String, u64)> {
    let access_token = json
        .get("access_token")
        .and_then(serde_json::Value::as_str)
        .filter(|t| !t.is_empty())?
        .to_string();
    let expires_in = match json.get("expires_in")? {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some((access_token, expires_in))
}

/// Builder for [`TokenCache`].
pub struct TokenCacheBuilder {
    token_url: String,
    http: reqwest::Client,
    client: Option<Arc<OAuthClient>>,
    clock: Arc<dyn Clock>,
    margin: Duration,
}

impl TokenCacheBuilder {
    /// The OAuth client pair. Leaving it unset makes every call fail with a
    /// configuration error.
    #[must_use]
    pub fn client(mut self, client: Option<Arc<OAuthClient>>) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    #[must_use]
    pub fn build(self) -> TokenCache {
        TokenCache {
            inner: Arc::new(Inner {
                http: self.http,
                token_url: self.token_url,
                client: self.client,
                clock: self.clock,
                margin: self.margin,
                state: Mutex::new(CacheState::default()),
                fetches: AtomicU64::new(0),
            }),
        }
    }
}
