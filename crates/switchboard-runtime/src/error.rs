//! Runtime error types.

use thiserror::Error;

use switchboard_core::{DuplicateBotError, RouteConflictError, TransportError};

use crate::config::LoadError;

/// Errors returned by [`Botmaster::add_bot`](crate::Botmaster::add_bot).
///
/// A failed add leaves the registry and the listener untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The same bot instance is already registered.
    #[error(transparent)]
    DuplicateBot(#[from] DuplicateBotError),

    /// The bot's webhook path is owned by another bot.
    #[error(transparent)]
    RouteConflict(#[from] RouteConflictError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while running a registry.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The shared listener failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Load(#[from] LoadError),

    /// Signal handling failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
