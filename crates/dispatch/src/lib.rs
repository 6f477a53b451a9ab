//! Outbound request dispatch for govbroker.
//!
//! [`Dispatcher`] turns an [`UpstreamCall`] into one HTTP exchange with the
//! credentials an endpoint policy names, normalizes the response, and retries
//! exactly once with the fallback credential when the first attempt looks like
//! an authentication or API-version mismatch.

pub mod dispatcher;
pub mod normalizer;
pub mod request;

pub use dispatcher::Dispatcher;
pub use normalizer::{normalize, normalize_transport_error};
pub use request::UpstreamCall;
