//! Client identities the broker can authenticate with.

use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Identifier of a configured client-certificate identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CertificateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// OAuth2 client-credentials pair. The secret is redacted from `Debug`.
pub struct OAuthClient {
    pub client_id: String,
    client_secret: SecretString,
}

impl OAuthClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
        }
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// A resolved credential, as handed out by the credential store.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Reference to a client certificate held in the keystore.
    Certificate { id: CertificateId },
    /// The OAuth client used to obtain bearer tokens.
    OAuthClient(Arc<OAuthClient>),
}

impl Credential {
    /// Short label for logs and diagnostics; never contains secret material.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Certificate { id } => format!("certificate:{id}"),
            Self::OAuthClient(client) => format!("oauth:{}", client.client_id),
        }
    }
}
