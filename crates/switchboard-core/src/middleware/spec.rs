//! Typed middleware registrations.
//!
//! A [`MiddlewareSpec`] names exactly one direction, so a registration that
//! is neither incoming nor outgoing cannot be expressed. The
//! [`MiddlewareSpecBuilder`] exists for callers assembling a registration
//! piece by piece; its shape is checked when it is converted.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::filter::FilterOptions;
use super::{
    Direction, IncomingFn, IncomingMiddleware, IncomingSyncFn, MiddlewareResult, OutgoingFn,
    OutgoingMiddleware, OutgoingSyncFn,
};
use crate::bot::Bot;
use crate::error::ConfigError;
use crate::update::{OutgoingMessage, Update};

/// An incoming middleware with its filter.
#[derive(Clone)]
pub struct IncomingSpec {
    pub(crate) middleware: Arc<dyn IncomingMiddleware>,
    pub(crate) options: FilterOptions,
}

/// An outgoing middleware with its filter.
#[derive(Clone)]
pub struct OutgoingSpec {
    pub(crate) middleware: Arc<dyn OutgoingMiddleware>,
    pub(crate) options: FilterOptions,
}

/// A single middleware registration.
#[derive(Clone)]
pub enum MiddlewareSpec {
    /// Runs on updates received by a bot.
    Incoming(IncomingSpec),
    /// Runs on messages sent by a bot.
    Outgoing(OutgoingSpec),
}

impl MiddlewareSpec {
    /// Registers an async incoming callback.
    pub fn incoming<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a Bot, &'a mut Update) -> BoxFuture<'a, MiddlewareResult>
            + Send
            + Sync
            + 'static,
    {
        Self::incoming_handler(IncomingFn(f))
    }

    /// Registers a synchronous incoming callback.
    pub fn incoming_sync<F>(f: F) -> Self
    where
        F: Fn(&Bot, &mut Update) -> MiddlewareResult + Send + Sync + 'static,
    {
        Self::incoming_handler(IncomingSyncFn(f))
    }

    /// Registers a struct implementing [`IncomingMiddleware`].
    pub fn incoming_handler(middleware: impl IncomingMiddleware) -> Self {
        Self::Incoming(IncomingSpec {
            middleware: Arc::new(middleware),
            options: FilterOptions::default(),
        })
    }

    /// Registers an async outgoing callback.
    pub fn outgoing<F>(f: F) -> Self
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
        Self::outgoing_handler(OutgoingFn(f))
    }

    /// Registers a synchronous outgoing callback.
    pub fn outgoing_sync<F>(f: F) -> Self
    where
        F: Fn(&Bot, Option<&Update>, &mut OutgoingMessage) -> MiddlewareResult
            + Send
            + Sync
            + 'static,
    {
        Self::outgoing_handler(OutgoingSyncFn(f))
    }

    /// Registers a struct implementing [`OutgoingMiddleware`].
    pub fn outgoing_handler(middleware: impl OutgoingMiddleware) -> Self {
        Self::Outgoing(OutgoingSpec {
            middleware: Arc::new(middleware),
            options: FilterOptions::default(),
        })
    }

    /// Attaches a filter to the registration.
    pub fn with_options(mut self, options: FilterOptions) -> Self {
        match &mut self {
            Self::Incoming(spec) => spec.options = options,
            Self::Outgoing(spec) => spec.options = options,
        }
        self
    }

    /// Returns the direction of the registration.
    pub fn direction(&self) -> Direction {
        match self {
            Self::Incoming(_) => Direction::Incoming,
            Self::Outgoing(_) => Direction::Outgoing,
        }
    }

    /// Returns the filter of the registration.
    pub fn options(&self) -> &FilterOptions {
        match self {
            Self::Incoming(spec) => &spec.options,
            Self::Outgoing(spec) => &spec.options,
        }
    }

    /// Starts an unchecked registration.
    pub fn builder() -> MiddlewareSpecBuilder {
        MiddlewareSpecBuilder::default()
    }
}

impl From<IncomingSpec> for MiddlewareSpec {
    fn from(spec: IncomingSpec) -> Self {
        Self::Incoming(spec)
    }
}

impl From<OutgoingSpec> for MiddlewareSpec {
    fn from(spec: OutgoingSpec) -> Self {
        Self::Outgoing(spec)
    }
}

impl std::fmt::Debug for MiddlewareSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareSpec")
            .field("direction", &self.direction())
            .field("options", self.options())
            .finish()
    }
}

enum PendingOptions {
    Typed(FilterOptions),
    Value(Value),
}

/// Builder for a [`MiddlewareSpec`] whose shape is validated on `build`.
///
/// Exactly one of `incoming` or `outgoing` must be set. Options may be given
/// typed or as a JSON value, which must be an object.
#[derive(Default)]
pub struct MiddlewareSpecBuilder {
    incoming: Option<Arc<dyn IncomingMiddleware>>,
    outgoing: Option<Arc<dyn OutgoingMiddleware>>,
    options: Option<PendingOptions>,
}

impl MiddlewareSpecBuilder {
    /// Sets the incoming middleware.
    pub fn incoming(mut self, middleware: impl IncomingMiddleware) -> Self {
        self.incoming = Some(Arc::new(middleware));
        self
    }

    /// Sets the outgoing middleware.
    pub fn outgoing(mut self, middleware: impl OutgoingMiddleware) -> Self {
        self.outgoing = Some(Arc::new(middleware));
        self
    }

    /// Sets typed filter options.
    pub fn options(mut self, options: FilterOptions) -> Self {
        self.options = Some(PendingOptions::Typed(options));
        self
    }

    /// Sets filter options from a JSON value.
    pub fn options_value(mut self, value: Value) -> Self {
        self.options = Some(PendingOptions::Value(value));
        self
    }

    /// Validates the registration.
    pub fn build(self) -> Result<MiddlewareSpec, ConfigError> {
        let options = match self.options {
            None => FilterOptions::default(),
            Some(PendingOptions::Typed(options)) => options,
            Some(PendingOptions::Value(value)) => FilterOptions::from_value(&value)?,
        };
        match (self.incoming, self.outgoing) {
            (Some(_), Some(_)) => Err(ConfigError::BothDirections),
            (None, None) => Err(ConfigError::MissingDirection),
            (Some(middleware), None) => Ok(MiddlewareSpec::Incoming(IncomingSpec {
                middleware,
                options,
            })),
            (None, Some(middleware)) => Ok(MiddlewareSpec::Outgoing(OutgoingSpec {
                middleware,
                options,
            })),
        }
    }
}

impl TryFrom<MiddlewareSpecBuilder> for MiddlewareSpec {
    type Error = ConfigError;

    fn try_from(builder: MiddlewareSpecBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

/// An incoming and an outgoing middleware registered as a pair.
///
/// The incoming half runs before every incoming middleware registered
/// earlier; the outgoing half runs after every outgoing one.
#[derive(Clone)]
pub struct WrappedSpec {
    pub(crate) incoming: IncomingSpec,
    pub(crate) outgoing: OutgoingSpec,
}

impl WrappedSpec {
    /// Pairs two typed halves.
    pub fn new(incoming: IncomingSpec, outgoing: OutgoingSpec) -> Self {
        Self { incoming, outgoing }
    }

    /// Pairs two registrations, which must have opposite directions.
    pub fn from_specs(first: MiddlewareSpec, second: MiddlewareSpec) -> Result<Self, ConfigError> {
        match (first, second) {
            (MiddlewareSpec::Incoming(incoming), MiddlewareSpec::Outgoing(outgoing))
            | (MiddlewareSpec::Outgoing(outgoing), MiddlewareSpec::Incoming(incoming)) => {
                Ok(Self { incoming, outgoing })
            }
            _ => Err(ConfigError::WrappedDirections),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Step;
    use serde_json::json;

    fn pass_through(_: &Bot, _: &mut Update) -> MiddlewareResult {
        Ok(Step::Continue)
    }

    fn pass_through_outgoing(
        _: &Bot,
        _: Option<&Update>,
        _: &mut OutgoingMessage,
    ) -> MiddlewareResult {
        Ok(Step::Continue)
    }

    fn pass_in() -> MiddlewareSpec {
        MiddlewareSpec::incoming_sync(|_, _| Ok(Step::Continue))
    }

    fn pass_out() -> MiddlewareSpec {
        MiddlewareSpec::outgoing_sync(|_, _, _| Ok(Step::Continue))
    }

    #[test]
    fn test_builder_requires_exactly_one_direction() {
        let err = MiddlewareSpec::builder().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingDirection);
        assert_eq!(
            err.to_string(),
            "invalid middleware type. Type should be either 'incoming' or 'outgoing'"
        );

        let err = MiddlewareSpec::builder()
            .incoming(IncomingSyncFn(pass_through))
            .outgoing(OutgoingSyncFn(pass_through_outgoing))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::BothDirections);
    }

    #[test]
    fn test_builder_validates_options_value() {
        let err = MiddlewareSpec::builder()
            .incoming(IncomingSyncFn(pass_through))
            .options_value(json!("text"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::OptionsNotMapping { found: "string" });

        let spec = MiddlewareSpec::builder()
            .incoming(IncomingSyncFn(pass_through))
            .options_value(json!({ "botReceives": "text" }))
            .build()
            .unwrap();
        assert_eq!(spec.direction(), Direction::Incoming);
        assert_eq!(spec.options().bot_receives(), Some("text"));
    }

    #[test]
    fn test_wrapped_requires_opposite_directions() {
        assert!(WrappedSpec::from_specs(pass_out(), pass_in()).is_ok());
        assert_eq!(
            WrappedSpec::from_specs(pass_in(), pass_in()).err(),
            Some(ConfigError::WrappedDirections)
        );
    }
}
