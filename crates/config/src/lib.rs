//! Configuration loading for the govbroker service.
//!
//! Uses figment to layer compiled-in defaults, an optional YAML file, and
//! `GOVBROKER_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `GOVBROKER_OAUTH__CLIENT_SECRET`).

pub mod schema;

pub use schema::{
    CertificateConfig, Config, ENV_PREFIX, LogConfig, LogFormat, OAuthConfig, UpstreamConfig,
};
