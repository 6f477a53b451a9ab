//! Credential store for the govbroker service.
//!
//! Holds the configured client-certificate identities, each with an outbound
//! transport that presents it, and the OAuth client pair. Everything here is
//! built once at start-up and shared without locking.

pub mod credentials;

pub use credentials::{CredentialStore, CredentialStoreBuilder};
