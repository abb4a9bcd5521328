//! # Switchboard Transport
//!
//! The shared HTTP listener behind every webhook-driven bot.
//!
//! This crate implements the [`RouteBinder`](switchboard_core::RouteBinder)
//! contract from `switchboard-core` on top of axum. A registry mounts one
//! handler per bot webhook path; all of them share one TCP socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  switchboard-runtime│  (registry mounts/unmounts bot routes)
//! ├─────────────────────┤
//! │  switchboard-core   │  (RouteBinder, WebhookHandler traits)
//! ├─────────────────────┤
//! │  this crate         │  (WebhookServer on axum)
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard_core::RouteBinder;
//! use switchboard_transport::WebhookServer;
//!
//! let server = WebhookServer::new();
//! server.mount("/mock/express", bot.webhook_handler())?;
//! let addr = server.bind("127.0.0.1:3000").await?;
//! ```

pub mod server;

pub use server::WebhookServer;
