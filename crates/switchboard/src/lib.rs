//! # Switchboard
//!
//! Run many chat bots behind one webhook listener, with middleware shared
//! across all of them.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────── Botmaster ────────────────────────┐
//! POST /mock/hook│                                                           │
//! ──────────────▶│ WebhookServer ─▶ Bot ─▶ bot chain ─▶ global chain ─▶ event │
//!                │                                                           │
//!  bot.reply(..) │ global chain ─▶ bot chain ─▶ Connector::send_raw          │
//!                └───────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Bots** wrap one platform [`Connector`](core::Connector) each and
//!   declare what they can receive and send
//! - **Middleware** runs in declaration order, filtered per bot by type and
//!   capabilities
//! - **Botmaster** owns the bots, mounts their webhooks and runs the global
//!   chains
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let botmaster = Botmaster::builder().build()?;
//!     let bot = Bot::new(
//!         BotSettings::new("mock").with_webhook("express"),
//!         LoopbackConnector::new(),
//!     );
//!     botmaster.add_bot(bot)?;
//!
//!     botmaster.use_middleware(
//!         MiddlewareSpec::incoming_sync(|_bot, update| {
//!             update.set_field("received_at", "now");
//!             Ok(Step::Continue)
//!         })
//!         .with_options(FilterOptions::receives("text")),
//!     )?;
//!
//!     botmaster.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: `switchboard.toml` configuration files (default)
//! - `yaml-config`: `switchboard.yaml` configuration files
//! - `json-log`: JSON log output

pub use switchboard_core as core;
pub use switchboard_runtime as runtime;
pub use switchboard_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use switchboard::prelude::*;
/// ```
pub mod prelude {
    // Registry - main entry point
    pub use switchboard_runtime::{Botmaster, BotmasterEvent, BotmasterSettings};

    // Bots and their traffic
    pub use switchboard_core::{
        Bot, BotSettings, Capabilities, Connector, LoopbackConnector, OutgoingMessage,
        SendOptions, SendOutcome, Update,
    };

    // Middleware
    pub use switchboard_core::{
        FilterOptions, IncomingMiddleware, MiddlewareResult, MiddlewareSpec, OutgoingMiddleware,
        Step, WrappedSpec,
    };

    // Events
    pub use switchboard_core::{BotEvent, Subscription};

    // For struct-based middleware and connectors
    pub use switchboard_core::{BoxFuture, async_trait};
}
