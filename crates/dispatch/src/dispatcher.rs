//! Sends upstream calls with the policy's credentials and a single fallback.
use crate::{
    normalizer::{normalize, normalize_transport_error},
    request::{API_VERSION_HEADER, UpstreamCall},
};
use bytes::Bytes;
use govbroker_auth::{AuthSelector, Selection, TokenCache};
use govbroker_config::Config;
use govbroker_store::CredentialStore;
use govbroker_types::{
    Attempt, BrokerError, Credential, EndpointPolicy, NormalizedResult, PolicyTable, Result,
};
use reqwest::{Method, header::HeaderMap};
use std::sync::Arc;

/// Routes calls to the upstream API. Cheap to share behind an `Arc`.
pub struct Dispatcher {
    base_url: String,
    selector: AuthSelector,
    tokens: TokenCache,
}

impl Dispatcher {
    pub fn new(base_url: impl Into<String>, selector: AuthSelector, tokens: TokenCache) -> Self {
        Self {
            base_url: base_url.into(),
            selector,
            tokens,
        }
    }

    /// Builds the policy table, credential store and token cache from config.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Configuration`] if `upstream.base_url` is unset,
    /// a policy is malformed, or a certificate cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.upstream.base_url.trim().is_empty() {
            return Err(BrokerError::Configuration(
                "upstream.base_url is not set".into(),
            ));
        }
        let policies = Arc::new(config.policy_table()?);
        let store = Arc::new(CredentialStore::from_config(config)?);
        let tokens = TokenCache::builder(config.token_url(), store.plain_transport().clone())
            .client(store.oauth_client())
            .margin(config.refresh_margin())
            .build();
        tracing::info!(
            base_url = %config.upstream.base_url,
            policies = policies.len(),
            certificates = store.certificate_ids().len(),
            oauth = tokens.is_configured(),
            "dispatcher ready"
        );
        Ok(Self::new(
            config.upstream.base_url.clone(),
            AuthSelector::new(policies, store),
            tokens,
        ))
    }

    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        self.selector.policies()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Convenience wrapper over [`Self::dispatch`] taking the call's parts.
    ///
    /// # Errors
    ///
    /// See [`Self::dispatch`].
    #[allow(clippy::too_many_arguments)]
    pub async fn call_upstream(
        &self,
        endpoint: &str,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        body: Option<Bytes>,
        cert_hint: Option<&str>,
    ) -> Result<NormalizedResult> {
        let call = UpstreamCall::builder()
            .endpoint(endpoint)
            .method(method)
            .path(path)
            .query(query)
            .headers(headers)
            .maybe_body(body)
            .maybe_cert_hint(cert_hint)
            .build();
        self.dispatch(call).await
    }

    /// Performs the call with the primary credential and, if the outcome is an
    /// auth-or-version failure and the policy declares one, once more with the
    /// fallback credential.
    ///
    /// Upstream failures come back inside the [`NormalizedResult`]; the result
    /// of the last attempt made is returned with `served_by` set.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] when no request could be formed: unknown
    /// endpoint, unresolvable credential, token fetch failure, or an invalid
    /// path.
    pub async fn dispatch(&self, call: UpstreamCall) -> Result<NormalizedResult> {
        let policy = self.selector.policies().get(&call.endpoint)?;

        let primary = self.attempt(&call, policy, Attempt::Primary).await?;
        if !primary.is_auth_or_version_failure() || policy.fallback_auth.is_none() {
            return Ok(primary);
        }

        tracing::warn!(
            endpoint = %call.endpoint,
            status = primary.status,
            error_kind = ?primary.error_kind,
            "primary credential rejected, retrying with fallback"
        );
        self.attempt(&call, policy, Attempt::Fallback).await
    }

    async fn attempt(
        &self,
        call: &UpstreamCall,
        policy: &EndpointPolicy,
        attempt: Attempt,
    ) -> Result<NormalizedResult> {
        let selection =
            self.selector
                .select_credential(&call.endpoint, attempt, call.cert_hint.as_deref())?;
        let url = call.url(&self.base_url)?;

        let mut req = self
            .transport_for(&selection)?
            .request(call.method.clone(), url)
            .headers(call.forwarded_headers())
            .header(API_VERSION_HEADER, &policy.api_version);
        if !call.query.is_empty() {
            req = req.query(&call.query);
        }
        if selection.uses_oauth() {
            let token = self.tokens.get_access_token().await?;
            req = req.bearer_auth(token);
        }
        if let Some(body) = &call.body {
            req = req.body(body.clone());
        }

        let path = selection.path();
        let credentials: Vec<String> = selection
            .credentials()
            .iter()
            .map(Credential::label)
            .collect();
        tracing::debug!(
            endpoint = %call.endpoint,
            method = %call.method,
            path = %call.path,
            served_by = %path,
            credentials = ?credentials,
            "sending upstream request"
        );

        let result = match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                let headers = resp.headers().clone();
                match resp.bytes().await {
                    Ok(body) => normalize(status, &headers, body, policy),
                    Err(e) => normalize_transport_error(&e),
                }
            }
            Err(e) => normalize_transport_error(&e),
        };

        tracing::debug!(
            endpoint = %call.endpoint,
            served_by = %path,
            status = result.status,
            ok = result.ok,
            error_kind = ?result.error_kind,
            "upstream response"
        );
        Ok(result.with_served_by(path))
    }

    fn transport_for(&self, selection: &Selection) -> Result<&reqwest::Client> {
        let store = self.selector.store();
        match &selection.certificate {
            Some(id) => store.transport(id),
            None => Ok(store.plain_transport()),
        }
    }
}
