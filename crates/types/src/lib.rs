//! Core types shared across the govbroker workspace.
//!
//! This crate defines the error taxonomy, credential and endpoint-policy
//! representations, the normalized upstream result, and the cached OAuth
//! token together with the clock abstraction its expiry logic runs on.

pub mod credential;
pub mod error;
pub mod policy;
pub mod result;
pub mod token;

pub use credential::{CertificateId, Credential, OAuthClient};
pub use error::{BrokerError, Result};
pub use policy::{Attempt, AuthKind, EndpointPolicy, PolicyTable};
pub use result::{CredentialPath, ErrorKind, NormalizedResult, ResponseBody};
pub use token::{CachedToken, Clock, ManualClock, SystemClock};
