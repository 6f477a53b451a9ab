//! Credential selection and OAuth token lifecycle.
//!
//! [`TokenCache`] owns the client-credentials bearer token: it caches it,
//! renews it before expiry, and coalesces concurrent renewals into a single
//! fetch. [`AuthSelector`] maps an endpoint policy and attempt onto the
//! concrete credentials an outbound request carries.

pub mod selector;
pub mod token_cache;

pub use selector::{AuthSelector, Selection};
pub use token_cache::{DEFAULT_REFRESH_MARGIN, TokenCache, TokenCacheBuilder};
