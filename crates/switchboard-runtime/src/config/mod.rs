//! Configuration for the Switchboard runtime.
//!
//! Configuration is layered with figment (defaults, files, environment,
//! programmatic merges) into a [`SwitchboardConfig`] and checked with
//! [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{LoadError, LoadResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, MiddlewareConfig, ServerConfig,
    SpanEventConfig, SwitchboardConfig, WebhookConfig,
};
pub use validation::validate_config;
