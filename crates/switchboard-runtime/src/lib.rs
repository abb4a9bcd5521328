//! Switchboard Runtime: the registry layer of the Switchboard bot aggregator.
//!
//! This crate provides:
//! - The bot registry and dispatcher ([`Botmaster`])
//! - Layered configuration loading ([`config`])
//! - Logging setup ([`logging`])
//!
//! ```ignore
//! use switchboard_runtime::Botmaster;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Loads switchboard.toml and SWITCHBOARD_* variables, sets up logging
//!     let botmaster = Botmaster::builder().build()?;
//!
//!     botmaster.add_bot(my_bot)?;
//!     let (_subscription, mut events) = botmaster.subscribe_channel();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             // ...
//!         }
//!     });
//!
//!     // Serve webhooks until Ctrl+C
//!     botmaster.run().await?;
//!     Ok(())
//! }
//! ```

pub mod botmaster;
pub mod config;
pub mod error;
pub mod logging;

// Re-exports
pub use botmaster::{Botmaster, BotmasterBuilder, BotmasterEvent, BotmasterSettings};
pub use config::{ConfigLoader, LoadError, LoadResult, Profile, SwitchboardConfig};
pub use error::{RegistryError, RegistryResult, RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
