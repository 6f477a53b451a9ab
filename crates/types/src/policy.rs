//! Per-route authentication policies.

use crate::{BrokerError, error::Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// The authentication mechanism attached to one outbound attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// Present a client certificate over mutual TLS.
    Certificate,
    /// Send an OAuth2 bearer token.
    #[serde(rename = "oauth")]
    OAuth,
    /// Present a client certificate and send a bearer token on the same request.
    #[serde(rename = "certificate_and_oauth")]
    CertificateAndOAuth,
}

impl AuthKind {
    #[must_use]
    pub fn uses_certificate(self) -> bool {
        matches!(self, Self::Certificate | Self::CertificateAndOAuth)
    }

    #[must_use]
    pub fn uses_oauth(self) -> bool {
        matches!(self, Self::OAuth | Self::CertificateAndOAuth)
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certificate => write!(f, "certificate"),
            Self::OAuth => write!(f, "oauth"),
            Self::CertificateAndOAuth => write!(f, "certificate_and_oauth"),
        }
    }
}

/// Which credential of a policy an outbound attempt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attempt {
    Primary,
    Fallback,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Static declaration of how one upstream route is authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPolicy {
    /// Credential used on the first attempt.
    pub primary_auth: AuthKind,
    /// Credential used on the single retry after an auth-or-version failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_auth: Option<AuthKind>,
    /// Value sent in the `x-api-version` header.
    pub api_version: String,
    /// Whether the route returns structured JSON bodies on errors.
    #[serde(default = "default_true")]
    pub supports_json_error_body: bool,
}

impl EndpointPolicy {
    pub fn new(primary_auth: AuthKind, api_version: impl Into<String>) -> Self {
        Self {
            primary_auth,
            fallback_auth: None,
            api_version: api_version.into(),
            supports_json_error_body: true,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: AuthKind) -> Self {
        self.fallback_auth = Some(fallback);
        self
    }

    #[must_use]
    pub fn without_json_errors(mut self) -> Self {
        self.supports_json_error_body = false;
        self
    }

    /// The auth kind declared for `attempt`, if any.
    #[must_use]
    pub fn auth_for(&self, attempt: Attempt) -> Option<AuthKind> {
        match attempt {
            Attempt::Primary => Some(self.primary_auth),
            Attempt::Fallback => self.fallback_auth,
        }
    }

    fn validate(&self, id: &str) -> Result<()> {
        if self.api_version.trim().is_empty() {
            return Err(BrokerError::Configuration(format!(
                "policy {id}: api_version must not be empty"
            )));
        }
        if self.fallback_auth == Some(self.primary_auth) {
            return Err(BrokerError::Configuration(format!(
                "policy {id}: fallback_auth must differ from primary_auth ({})",
                self.primary_auth
            )));
        }
        Ok(())
    }
}

/// Validated, immutable map from policy id to [`EndpointPolicy`].
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: BTreeMap<String, EndpointPolicy>,
}

impl PolicyTable {
    /// Builds a table, validating every entry.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Configuration`] if any policy has an empty
    /// `api_version` or a fallback identical to its primary.
    pub fn new(policies: BTreeMap<String, EndpointPolicy>) -> Result<Self> {
        for (id, policy) in &policies {
            policy.validate(id)?;
        }
        Ok(Self { policies })
    }

    /// Looks up a policy by id.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownEndpoint`] if no such policy exists.
    pub fn get(&self, id: &str) -> Result<&EndpointPolicy> {
        self.policies
            .get(id)
            .ok_or_else(|| BrokerError::UnknownEndpoint(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EndpointPolicy)> {
        self.policies.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl FromIterator<(String, EndpointPolicy)> for PolicyTable {
    /// Collects without validation; intended for tests and programmatic setup
    /// where entries are known to be well-formed.
    fn from_iter<I: IntoIterator<Item = (String, EndpointPolicy)>>(iter: I) -> Self {
        Self {
            policies: iter.into_iter().collect(),
        }
    }
}
