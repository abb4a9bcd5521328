//! Unified error types for the Switchboard core.
//!
//! Configuration and registry errors are returned synchronously to the direct
//! caller. Middleware errors are isolated per update and reported through the
//! event hubs instead of unwinding through the caller.

use std::fmt;

use thiserror::Error;

use crate::middleware::Direction;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while validating a middleware registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Neither an incoming nor an outgoing middleware was supplied.
    #[error("invalid middleware type. Type should be either 'incoming' or 'outgoing'")]
    MissingDirection,

    /// Both directions were supplied to a single registration.
    #[error("use should be called with only one of incoming or outgoing. Use use_wrapped instead")]
    BothDirections,

    /// Filter options were provided as something other than a mapping.
    #[error("options can't be of type {found}. It needs to be an object")]
    OptionsNotMapping {
        /// JSON type name of the rejected value.
        found: &'static str,
    },

    /// Both `bot_types_to_include` and `bot_types_to_exclude` were set.
    #[error("Please use only one of bot_types_to_include and bot_types_to_exclude")]
    ConflictingBotTypeFilters,

    /// Filter options could not be decoded.
    #[error("invalid middleware options: {0}")]
    InvalidFilterOptions(String),

    /// A wrapped registration did not pair one incoming with one outgoing middleware.
    #[error("use_wrapped needs exactly one incoming and one outgoing middleware")]
    WrappedDirections,
}

impl From<std::convert::Infallible> for ConfigError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// The same bot instance was added to a registry twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bot '{bot_type}' (#{bot_id}) is already registered")]
pub struct DuplicateBotError {
    /// Platform tag of the rejected bot.
    pub bot_type: String,
    /// Identity of the rejected bot.
    pub bot_id: u64,
}

/// A webhook path is already mounted by another bot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("route '{path}' is already mounted")]
pub struct RouteConflictError {
    /// Normalized mount path.
    pub path: String,
}

// =============================================================================
// Middleware Errors
// =============================================================================

/// What went wrong inside a middleware step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareErrorKind {
    /// The callback returned an error.
    Failed,
    /// The callback panicked.
    Panicked,
    /// The callback did not finish within the configured timeout.
    TimedOut,
}

/// A failure raised by a middleware callback, tagged with the phase it ran in.
///
/// The display form mirrors the message the callback produced, followed by
/// the phase: `"update has no field `blop`". In incoming middleware`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareError {
    phase: Direction,
    kind: MiddlewareErrorKind,
    message: String,
}

impl MiddlewareError {
    /// Creates a new middleware error.
    pub fn new(phase: Direction, kind: MiddlewareErrorKind, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind,
            message: message.into(),
        }
    }

    /// Returns the chain direction the error happened in.
    pub fn phase(&self) -> Direction {
        self.phase
    }

    /// Returns the failure kind.
    pub fn kind(&self) -> MiddlewareErrorKind {
        self.kind
    }

    /// Returns the callback's own message, without the phase suffix.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MiddlewareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\". In {} middleware", self.message, self.phase)
    }
}

impl std::error::Error for MiddlewareError {}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors surfaced to webhook callers or to `send` callers.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// No route is mounted for the requested method and path.
    #[error("Couldn't {method} {path}")]
    RouteNotFound {
        /// HTTP method of the request.
        method: String,
        /// Path as requested.
        path: String,
    },

    /// A platform payload could not be normalized.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The connector failed to deliver a message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The bot does not declare the capability the operation needs.
    #[error("bot does not support sending '{capability}'")]
    Unsupported {
        /// The missing send capability.
        capability: String,
    },

    /// The shared listener could not be bound.
    #[error("failed to bind listener on {addr}: {reason}")]
    Bind {
        /// Requested bind address.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Errors returned from [`Bot::send_message`](crate::bot::Bot::send_message).
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// An outgoing middleware failed; the message was not sent.
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    /// The connector rejected or failed the send.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for outbound sends.
pub type SendResult<T> = Result<T, SendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middleware_error_display_names_phase() {
        let err = MiddlewareError::new(
            Direction::Outgoing,
            MiddlewareErrorKind::Failed,
            "message has no field `blob`",
        );
        assert_eq!(
            err.to_string(),
            "\"message has no field `blob`\". In outgoing middleware"
        );
        assert_eq!(err.message(), "message has no field `blob`");
    }

    #[test]
    fn test_route_not_found_message() {
        let err = TransportError::RouteNotFound {
            method: "POST".into(),
            path: "/mock/express".into(),
        };
        assert_eq!(err.to_string(), "Couldn't POST /mock/express");
    }
}
