//! Filterable middleware for incoming updates and outgoing messages.
//!
//! A middleware is a single async step that receives the bot the traffic
//! belongs to and a mutable record. It returns a [`Step`]: either
//! [`Step::Continue`] to hand the record to the next entry, or
//! [`Step::Halt`] to stop processing. There is no implicit continuation, so
//! a step can never leave an update hanging.
//!
//! ```rust,ignore
//! use switchboard_core::middleware::{MiddlewareSpec, Step, FilterOptions};
//!
//! bot.use_middleware(
//!     MiddlewareSpec::incoming_sync(|_bot, update| {
//!         update.text_mut().push_str(" (seen)");
//!         Ok(Step::Continue)
//!     })
//!     .with_options(FilterOptions::receives("text")),
//! )?;
//! ```

pub mod chain;
pub mod filter;
pub mod spec;

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::bot::Bot;
use crate::update::{OutgoingMessage, Update};

pub use chain::{Chain, Chains, Entry, IncomingChain, OutgoingChain};
pub use filter::{FilterOptions, FilterOptionsBuilder};
pub use spec::{IncomingSpec, MiddlewareSpec, MiddlewareSpecBuilder, OutgoingSpec, WrappedSpec};

/// Boxed error type returned by middleware callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single middleware step.
pub type MiddlewareResult = Result<Step, BoxError>;

/// The pipeline a middleware belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Updates received from a platform.
    Incoming,
    /// Messages about to be sent to a platform.
    Outgoing,
}

impl Direction {
    /// Returns the lowercase name of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a middleware step asks the chain to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Run the next matching entry.
    Continue,
    /// Stop processing this record.
    Halt(String),
}

impl Step {
    /// Creates a [`Step::Halt`] with the given reason.
    pub fn halt(reason: impl Into<String>) -> Self {
        Self::Halt(reason.into())
    }
}

/// How a chain run ended when no step failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Every matching entry continued.
    Completed,
    /// An entry halted the run.
    Halted {
        /// The reason given by the halting step.
        reason: String,
    },
}

impl Flow {
    /// Returns `true` if the run went through the whole chain.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A middleware step for incoming updates.
#[async_trait]
pub trait IncomingMiddleware: Send + Sync + 'static {
    /// Processes (and possibly mutates) an update received by `bot`.
    async fn handle(&self, bot: &Bot, update: &mut Update) -> MiddlewareResult;
}

/// A middleware step for outgoing messages.
///
/// `state` is the update being answered, when the send originated from one.
#[async_trait]
pub trait OutgoingMiddleware: Send + Sync + 'static {
    /// Processes (and possibly mutates) a message about to be sent by `bot`.
    async fn handle(
        &self,
        bot: &Bot,
        state: Option<&Update>,
        message: &mut OutgoingMessage,
    ) -> MiddlewareResult;
}

// ─── Closure adapters ─────────────────────────────────────────────────────────

/// Adapts an async closure into an [`IncomingMiddleware`].
pub struct IncomingFn<F>(pub F);

#[async_trait]
impl<F> IncomingMiddleware for IncomingFn<F>
where
    F: for<'a> Fn(&'a Bot, &'a mut Update) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    async fn handle(&self, bot: &Bot, update: &mut Update) -> MiddlewareResult {
        (self.0)(bot, update).await
    }
}

/// Adapts a synchronous closure into an [`IncomingMiddleware`].
pub struct IncomingSyncFn<F>(pub F);

#[async_trait]
impl<F> IncomingMiddleware for IncomingSyncFn<F>
where
    F: Fn(&Bot, &mut Update) -> MiddlewareResult + Send + Sync + 'static,
{
    async fn handle(&self, bot: &Bot, update: &mut Update) -> MiddlewareResult {
        (self.0)(bot, update)
    }
}

/// Adapts an async closure into an [`OutgoingMiddleware`].
pub struct OutgoingFn<F>(pub F);

#[async_trait]
impl<F> OutgoingMiddleware for OutgoingFn<F>
where
    F: for<'a> Fn(
            &'a Bot,
            Option<&'a Update>,
            &'a mut OutgoingMessage,
        ) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    async fn handle(
        &self,
        bot: &Bot,
        state: Option<&Update>,
        message: &mut OutgoingMessage,
    ) -> MiddlewareResult {
        (self.0)(bot, state, message).await
    }
}

/// Adapts a synchronous closure into an [`OutgoingMiddleware`].
pub struct OutgoingSyncFn<F>(pub F);

#[async_trait]
impl<F> OutgoingMiddleware for OutgoingSyncFn<F>
where
    F: Fn(&Bot, Option<&Update>, &mut OutgoingMessage) -> MiddlewareResult
        + Send
        + Sync
        + 'static,
{
    async fn handle(
        &self,
        bot: &Bot,
        state: Option<&Update>,
        message: &mut OutgoingMessage,
    ) -> MiddlewareResult {
        (self.0)(bot, state, message)
    }
}
