//! Maps an endpoint policy and attempt number to concrete credentials.
use govbroker_store::CredentialStore;
use govbroker_types::{
    Attempt, AuthKind, BrokerError, CertificateId, Credential, CredentialPath, OAuthClient,
    PolicyTable, Result,
};
use std::sync::Arc;

/// Credentials chosen for one outbound attempt.
#[derive(Debug, Clone)]
pub struct Selection {
    pub kind: AuthKind,
    pub attempt: Attempt,
    /// Certificate to present over mTLS, when `kind` uses one.
    pub certificate: Option<CertificateId>,
    /// OAuth client to obtain a bearer token for, when `kind` uses one.
    pub oauth: Option<Arc<OAuthClient>>,
}

impl Selection {
    #[must_use]
    pub fn uses_oauth(&self) -> bool {
        self.oauth.is_some()
    }

    /// Description of this selection for result attribution.
    #[must_use]
    pub fn path(&self) -> CredentialPath {
        CredentialPath {
            attempt: self.attempt,
            auth: self.kind,
            certificate: self.certificate.as_ref().map(ToString::to_string),
        }
    }

    /// The resolved credentials, certificate first.
    #[must_use]
    pub fn credentials(&self) -> Vec<Credential> {
        let mut out = Vec::with_capacity(2);
        if let Some(id) = &self.certificate {
            out.push(Credential::Certificate { id: id.clone() });
        }
        if let Some(client) = &self.oauth {
            out.push(Credential::OAuthClient(Arc::clone(client)));
        }
        out
    }
}

/// Stateless resolver over the policy table and the credential store.
#[derive(Debug, Clone)]
pub struct AuthSelector {
    policies: Arc<PolicyTable>,
    store: Arc<CredentialStore>,
}

impl AuthSelector {
    pub fn new(policies: Arc<PolicyTable>, store: Arc<CredentialStore>) -> Self {
        Self { policies, store }
    }

    /// Chooses the credentials for `endpoint` on `attempt`.
    ///
    /// `cert_hint` picks among several certificate identities; without one the
    /// store's default is used. A hint must name a configured identity even
    /// when the attempt presents no certificate.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::UnknownEndpoint`] if no policy exists for `endpoint`.
    /// - [`BrokerError::NoCredentialAvailable`] for a fallback attempt on a
    ///   policy without a fallback.
    /// - [`BrokerError::UnknownCredential`] / [`BrokerError::Configuration`]
    ///   if the store cannot resolve the credential the policy names.
    pub fn select_credential(
        &self,
        endpoint: &str,
        attempt: Attempt,
        cert_hint: Option<&str>,
    ) -> Result<Selection> {
        let policy = self.policies.get(endpoint)?;
        let hinted = cert_hint
            .map(|hint| self.store.certificate(Some(hint)))
            .transpose()?;
        let kind = policy
            .auth_for(attempt)
            .ok_or_else(|| BrokerError::NoCredentialAvailable {
                endpoint: endpoint.to_string(),
                attempt,
            })?;

        let certificate = if kind.uses_certificate() {
            Some(match hinted {
                Some(id) => id,
                None => self.store.certificate(None)?,
            })
        } else {
            None
        };
        let oauth = if kind.uses_oauth() {
            Some(self.store.oauth()?)
        } else {
            None
        };

        tracing::trace!(endpoint, %attempt, auth = %kind, "selected credentials");
        Ok(Selection {
            kind,
            attempt,
            certificate,
            oauth,
        })
    }

    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}
