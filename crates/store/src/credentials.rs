//! In-memory credential store backed by immutable maps.

use govbroker_config::Config;
use govbroker_types::{BrokerError, CertificateId, OAuthClient, Result};
use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configured client identities. Pure lookup; never mutated after build.
#[derive(Debug)]
pub struct CredentialStore {
    /// Each identity's transport presents that certificate.
    certificates: HashMap<CertificateId, reqwest::Client>,
    default_certificate: Option<CertificateId>,
    oauth: Option<Arc<OAuthClient>>,
    /// Transport without a client certificate, for OAuth-only calls.
    plain: reqwest::Client,
    timeout: Duration,
}

impl CredentialStore {
    #[must_use]
    pub fn builder() -> CredentialStoreBuilder {
        CredentialStoreBuilder::default()
    }

    /// Loads every configured certificate from disk and builds the store.
    ///
    /// An OAuth section with only one of `client_id` / `client_secret` is
    /// treated as absent; the token cache reports it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Configuration`] if a PEM file cannot be read or
    /// parsed, an id is duplicated, or the default certificate is unknown.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Self::builder().timeout(config.timeout());

        for cert in &config.certificates {
            builder = builder.certificate_files(
                cert.id.clone(),
                &cert.cert_path,
                cert.key_path.as_deref(),
            )?;
        }
        if let Some(default) = &config.default_certificate {
            builder = builder.default_certificate(default.clone());
        }

        match (&config.oauth.client_id, &config.oauth.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                builder = builder.oauth(id.clone(), secret.clone());
            }
            (None, None) => {}
            _ => tracing::warn!("oauth client_id/client_secret incomplete; OAuth disabled"),
        }

        builder.build()
    }

    /// Resolves a certificate identity from an optional caller hint.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::UnknownCredential`] if `hint` names no configured identity.
    /// - [`BrokerError::Configuration`] if there is no hint and no default identity.
    pub fn certificate(&self, hint: Option<&str>) -> Result<CertificateId> {
        match hint {
            Some(h) => {
                let id = CertificateId::from(h);
                if self.certificates.contains_key(&id) {
                    Ok(id)
                } else {
                    Err(BrokerError::UnknownCredential(h.to_string()))
                }
            }
            None => self.default_certificate.clone().ok_or_else(|| {
                BrokerError::Configuration(
                    "no certificate hint given and no default_certificate configured".into(),
                )
            }),
        }
    }

    /// Resolves the OAuth client pair.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Configuration`] if no OAuth client is configured.
    pub fn oauth(&self) -> Result<Arc<OAuthClient>> {
        self.oauth_client().ok_or_else(|| {
            BrokerError::Configuration("oauth client_id/client_secret not configured".into())
        })
    }

    /// The OAuth client pair, if configured.
    #[must_use]
    pub fn oauth_client(&self) -> Option<Arc<OAuthClient>> {
        self.oauth.clone()
    }

    /// Transport presenting the certificate `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownCredential`] if `id` is not configured.
    pub fn transport(&self, id: &CertificateId) -> Result<&reqwest::Client> {
        self.certificates
            .get(id)
            .ok_or_else(|| BrokerError::UnknownCredential(id.to_string()))
    }

    /// Transport that presents no client certificate.
    #[must_use]
    pub fn plain_transport(&self) -> &reqwest::Client {
        &self.plain
    }

    /// Sorted list of configured certificate ids.
    #[must_use]
    pub fn certificate_ids(&self) -> Vec<&CertificateId> {
        let mut ids: Vec<_> = self.certificates.keys().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn default_certificate(&self) -> Option<&CertificateId> {
        self.default_certificate.as_ref()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Builder for [`CredentialStore`].
#[derive(Debug)]
pub struct CredentialStoreBuilder {
    timeout: Duration,
    certificates: Vec<(CertificateId, Vec<u8>)>,
    default_certificate: Option<CertificateId>,
    oauth: Option<OAuthClient>,
}

impl Default for CredentialStoreBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            certificates: Vec::new(),
            default_certificate: None,
            oauth: None,
        }
    }
}

impl CredentialStoreBuilder {
    /// Per-exchange timeout applied to every transport.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds an identity from PEM bytes holding the certificate chain and the
    /// PKCS#8 private key.
    #[must_use]
    pub fn certificate_pem(mut self, id: impl Into<CertificateId>, pem: Vec<u8>) -> Self {
        self.certificates.push((id.into(), pem));
        self
    }

    /// Adds an identity from PEM files. With `key_path` unset, `cert_path`
    /// must contain both the chain and the key.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Configuration`] if a file cannot be read.
    pub fn certificate_files(
        self,
        id: CertificateId,
        cert_path: &Path,
        key_path: Option<&Path>,
    ) -> Result<Self> {
        let mut pem = read_pem(&id, cert_path)?;
        if let Some(key_path) = key_path {
            pem.push(b'\n');
            pem.extend(read_pem(&id, key_path)?);
        }
        Ok(self.certificate_pem(id, pem))
    }

    #[must_use]
    pub fn default_certificate(mut self, id: impl Into<CertificateId>) -> Self {
        self.default_certificate = Some(id.into());
        self
    }

    #[must_use]
    pub fn oauth(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.oauth = Some(OAuthClient::new(client_id, client_secret));
        self
    }

    /// Parses every identity and builds its transport.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Configuration`] on unparsable PEM, duplicate ids,
    /// or a default certificate that is not among the identities.
    pub fn build(self) -> Result<CredentialStore> {
        let mut certificates = HashMap::with_capacity(self.certificates.len());
        for (id, pem) in self.certificates {
            if certificates.contains_key(&id) {
                return Err(BrokerError::Configuration(format!(
                    "certificate {id} configured more than once"
                )));
            }
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                BrokerError::Configuration(format!("certificate {id}: invalid PEM identity: {e}"))
            })?;
            let transport = reqwest::Client::builder()
                .use_rustls_tls()
                .identity(identity)
                .timeout(self.timeout)
                .build()
                .map_err(|e| {
                    BrokerError::Configuration(format!("certificate {id}: transport: {e}"))
                })?;
            tracing::debug!(certificate = %id, "loaded client certificate identity");
            certificates.insert(id, transport);
        }

        if let Some(default) = &self.default_certificate
            && !certificates.contains_key(default)
        {
            return Err(BrokerError::Configuration(format!(
                "default_certificate {default} is not a configured certificate"
            )));
        }

        let plain = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BrokerError::Configuration(format!("http transport: {e}")))?;

        Ok(CredentialStore {
            certificates,
            default_certificate: self.default_certificate,
            oauth: self.oauth.map(Arc::new),
            plain,
            timeout: self.timeout,
        })
    }
}

fn read_pem(id: &CertificateId, path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        BrokerError::Configuration(format!(
            "certificate {id}: cannot read {}: {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use govbroker_config::{CertificateConfig, Config};

    const CERT: &[u8] = include_bytes!("../tests/fixtures/client.crt");
    const KEY: &[u8] = include_bytes!("../tests/fixtures/client.key");

    fn fixture_pem() -> Vec<u8> {
        [CERT, b"\n".as_slice(), KEY].concat()
    }

    fn fixture_dir() -> std::path::PathBuf {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    #[test]
    fn test_certificate_by_hint() {
        let store = CredentialStore::builder()
            .certificate_pem("uen-a", fixture_pem())
            .certificate_pem("uen-b", fixture_pem())
            .default_certificate("uen-a")
            .build()
            .unwrap();
        let id = store.certificate(Some("uen-b")).unwrap();
        assert_eq!(id.as_str(), "uen-b");
        assert!(store.transport(&CertificateId::from("uen-b")).is_ok());
    }

    #[test]
    fn test_certificate_defaults_without_hint() {
        let store = CredentialStore::builder()
            .certificate_pem("uen-a", fixture_pem())
            .default_certificate("uen-a")
            .build()
            .unwrap();
        let id = store.certificate(None).unwrap();
        assert_eq!(id.as_str(), "uen-a");
    }

    #[test]
    fn test_unknown_hint_does_not_fall_back_to_default() {
        let store = CredentialStore::builder()
            .certificate_pem("uen-a", fixture_pem())
            .default_certificate("uen-a")
            .build()
            .unwrap();
        let err = store.certificate(Some("uen-zzz")).unwrap_err();
        assert_eq!(err, BrokerError::UnknownCredential("uen-zzz".into()));
    }

    #[test]
    fn test_no_hint_no_default_is_configuration_error() {
        let store = CredentialStore::builder()
            .certificate_pem("uen-a", fixture_pem())
            .build()
            .unwrap();
        assert!(matches!(
            store.certificate(None),
            Err(BrokerError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_must_exist() {
        let err = CredentialStore::builder()
            .default_certificate("ghost")
            .build()
            .unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(msg) if msg.contains("ghost")));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = CredentialStore::builder()
            .certificate_pem("dup", fixture_pem())
            .certificate_pem("dup", fixture_pem())
            .build()
            .unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(_)));
    }

    #[test]
    fn test_invalid_pem_rejected() {
        let err = CredentialStore::builder()
            .certificate_pem("bad", b"not a pem".to_vec())
            .build()
            .unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(msg) if msg.contains("bad")));
    }

    #[test]
    fn test_oauth_missing_is_configuration_error() {
        let store = CredentialStore::builder().build().unwrap();
        assert!(store.oauth_client().is_none());
        assert!(matches!(store.oauth(), Err(BrokerError::Configuration(_))));
    }

    #[test]
    fn test_from_config_loads_split_files() {
        let mut config = Config::default();
        config.certificates.push(CertificateConfig {
            id: CertificateId::from("primary"),
            cert_path: fixture_dir().join("client.crt"),
            key_path: Some(fixture_dir().join("client.key")),
        });
        config.default_certificate = Some(CertificateId::from("primary"));
        config.oauth.client_id = Some("client-abc".into());
        config.oauth.client_secret = Some("s3cret".into());

        let store = CredentialStore::from_config(&config).unwrap();
        assert_eq!(store.certificate_ids(), vec![&CertificateId::from("primary")]);
        assert_eq!(store.oauth_client().unwrap().client_id, "client-abc");
        assert_eq!(store.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_config_combined_pem_file() {
        let dir = tempfile::tempdir().unwrap();
        let combined = dir.path().join("bundle.pem");
        std::fs::write(&combined, fixture_pem()).unwrap();

        let mut config = Config::default();
        config.certificates.push(CertificateConfig {
            id: CertificateId::from("bundle"),
            cert_path: combined,
            key_path: None,
        });
        let store = CredentialStore::from_config(&config).unwrap();
        assert!(store.certificate(Some("bundle")).is_ok());
        assert!(store.default_certificate().is_none());
    }

    #[test]
    fn test_from_config_missing_file() {
        let mut config = Config::default();
        config.certificates.push(CertificateConfig {
            id: CertificateId::from("primary"),
            cert_path: fixture_dir().join("does-not-exist.crt"),
            key_path: None,
        });
        let err = CredentialStore::from_config(&config).unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(msg) if msg.contains("cannot read")));
    }

    #[test]
    fn test_from_config_partial_oauth_is_absent() {
        let mut config = Config::default();
        config.oauth.client_id = Some("client-abc".into());
        let store = CredentialStore::from_config(&config).unwrap();
        assert!(store.oauth_client().is_none());
    }
}
