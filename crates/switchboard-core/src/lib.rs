//! # Switchboard Core
//!
//! Building blocks of the Switchboard bot aggregator.
//!
//! This crate defines everything a registry and a transport need to agree
//! on, without depending on either:
//!
//! - **Records**: normalized [`Update`]s and [`OutgoingMessage`]s
//! - **Middleware**: filterable, ordered chains ([`middleware`])
//! - **Bots**: one platform connection each ([`Bot`], [`Connector`])
//! - **Routing**: the [`RouteBinder`] contract for webhook paths
//! - **Events**: instance-owned hubs with explicit [`Subscription`]s
//!
//! ## Flow
//!
//! ```text
//!  webhook ──▶ Connector ──▶ bot chain ──▶ global chain ──▶ Update event
//!
//!  send    ──▶ global chain ──▶ bot chain ──▶ Connector::send_raw
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use switchboard_core::{Bot, BotSettings, LoopbackConnector, MiddlewareSpec, Step, Update};
//!
//! let bot = Bot::new(BotSettings::new("mock"), LoopbackConnector::new());
//! bot.use_middleware(MiddlewareSpec::incoming_sync(|_bot, update| {
//!     update.set_field("seen", true);
//!     Ok(Step::Continue)
//! }))?;
//!
//! let (_subscription, mut events) = bot.subscribe_channel();
//! bot.emit_update(Update::new().with_text("Hello")).await;
//! ```

pub mod bot;
pub mod capability;
pub mod connector;
pub mod error;
pub mod event;
pub mod middleware;
pub mod route;
pub mod update;

pub use bot::{
    Bot, BotId, BotSettings, BotWebhook, Dispatch, SendOptions, SendOutcome, TYPING_INDICATOR,
};
pub use capability::Capabilities;
pub use connector::{Connector, LoopbackConnector};
pub use error::{
    ConfigError, DuplicateBotError, MiddlewareError, MiddlewareErrorKind, RouteConflictError,
    SendError, SendResult, TransportError, TransportResult,
};
pub use event::{BotEvent, EventHub, Subscription};
pub use middleware::{
    BoxError, Direction, FilterOptions, Flow, IncomingMiddleware, MiddlewareResult,
    MiddlewareSpec, OutgoingMiddleware, Step, WrappedSpec,
};
pub use route::{
    BoxedWebhookHandler, RouteBinder, WebhookHandler, WebhookReply, mount_path, normalize_path,
};
pub use update::{
    Attachment, FieldError, IncomingMessage, OutgoingBody, OutgoingMessage, Participant,
    QuickReply, Update,
};

pub use async_trait::async_trait;
pub use futures::future::BoxFuture;

/// Prelude for common imports.
pub mod prelude {
    pub use super::bot::{Bot, BotSettings, SendOptions, SendOutcome};
    pub use super::capability::Capabilities;
    pub use super::event::{BotEvent, Subscription};
    pub use super::middleware::{
        FilterOptions, IncomingMiddleware, MiddlewareResult, MiddlewareSpec, OutgoingMiddleware,
        Step, WrappedSpec,
    };
    pub use super::update::{OutgoingMessage, Update};
    pub use super::{BoxFuture, async_trait};
}
