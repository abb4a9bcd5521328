//! The bot registry and dispatcher.
//!
//! A [`Botmaster`] owns a set of bots, mounts their webhooks on one shared
//! [`WebhookServer`], and runs global middleware on the traffic of every bot
//! it holds.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use switchboard_runtime::Botmaster;
//!
//! // Auto-loads switchboard.toml from the current directory
//! let botmaster = Botmaster::builder().build()?;
//!
//! botmaster.add_bot(bot)?;
//! botmaster.use_middleware(MiddlewareSpec::incoming_sync(|_bot, update| {
//!     update.set_field("seen", true);
//!     Ok(Step::Continue)
//! }))?;
//!
//! botmaster.run().await?;
//! ```
//!
//! # Ordering
//!
//! ```text
//! incoming: bot chain ─▶ global chain ─▶ BotmasterEvent::Update
//! outgoing: global chain ─▶ bot chain ─▶ Connector::send_raw
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info};

use switchboard_core::middleware::{Chains, IncomingChain, OutgoingChain};
use switchboard_core::{
    Bot, BotId, ConfigError, Dispatch, DuplicateBotError, EventHub, Flow, MiddlewareError,
    MiddlewareSpec, OutgoingMessage, RouteBinder, Subscription, Update, WrappedSpec, mount_path,
};
use switchboard_transport::WebhookServer;

use crate::config::{ConfigLoader, LoadResult, ServerConfig, SwitchboardConfig, validate_config};
use crate::error::{RegistryResult, RuntimeResult};
use crate::logging;

// =============================================================================
// Settings and events
// =============================================================================

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotmasterSettings {
    /// Address of the shared listener.
    pub server: ServerConfig,
    /// Mount each webhook under `/<bot type>/`.
    pub use_default_mount_path_prepend: bool,
    /// Per-step timeout for every chain run of attached bots.
    pub middleware_timeout: Option<Duration>,
}

impl Default for BotmasterSettings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            use_default_mount_path_prepend: true,
            middleware_timeout: None,
        }
    }
}

impl BotmasterSettings {
    /// Builds settings from a loaded configuration.
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        Self {
            server: config.server.clone(),
            use_default_mount_path_prepend: config.webhooks.use_default_mount_path_prepend,
            middleware_timeout: config.middleware.timeout(),
        }
    }

    /// Returns the `host:port` the listener binds to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Events surfaced by a [`Botmaster`].
#[derive(Debug, Clone)]
pub enum BotmasterEvent {
    /// The shared listener is bound.
    Listening {
        /// Address actually bound.
        addr: SocketAddr,
    },
    /// An update went through both incoming chains.
    Update {
        /// The bot that received it.
        bot: Arc<Bot>,
        /// The processed update.
        update: Update,
    },
    /// A middleware failed while handling a bot's traffic.
    Error {
        /// The bot whose traffic failed.
        bot: Arc<Bot>,
        /// What went wrong.
        error: MiddlewareError,
    },
}

// =============================================================================
// Hub
// =============================================================================

/// State shared with attached bots through [`Dispatch`].
struct Hub {
    bots: RwLock<Vec<Arc<Bot>>>,
    /// Mount path → owning bot.
    routes: RwLock<HashMap<String, BotId>>,
    chains: Chains,
    events: EventHub<BotmasterEvent>,
    middleware_timeout: Option<Duration>,
}

impl Hub {
    fn find(&self, id: BotId) -> Option<Arc<Bot>> {
        self.bots.read().iter().find(|bot| bot.id() == id).cloned()
    }
}

#[async_trait]
impl Dispatch for Hub {
    fn middleware_timeout(&self) -> Option<Duration> {
        self.middleware_timeout
    }

    async fn dispatch_update(&self, bot: &Bot, mut update: Update) {
        let flow = self
            .chains
            .incoming()
            .run_incoming(bot, &mut update, self.middleware_timeout)
            .await;
        match flow {
            Ok(Flow::Completed) => match self.find(bot.id()) {
                Some(bot) => self.events.emit(&BotmasterEvent::Update { bot, update }),
                None => debug!(bot_id = %bot.id(), "Bot removed before its update completed"),
            },
            Ok(Flow::Halted { reason }) => {
                debug!(bot_type = %bot.bot_type(), reason = %reason, "Update halted by global middleware");
            }
            Err(error) => self.report_error(bot, error),
        }
    }

    async fn run_outgoing(
        &self,
        bot: &Bot,
        state: Option<&Update>,
        message: &mut OutgoingMessage,
    ) -> Result<Flow, MiddlewareError> {
        self.chains
            .outgoing()
            .run_outgoing(bot, state, message, self.middleware_timeout)
            .await
    }

    fn report_error(&self, bot: &Bot, error: MiddlewareError) {
        match self.find(bot.id()) {
            Some(bot) => self.events.emit(&BotmasterEvent::Error { bot, error }),
            None => debug!(bot_id = %bot.id(), error = %error, "Dropped error of a removed bot"),
        }
    }
}

// =============================================================================
// Botmaster
// =============================================================================

/// Registry of bots sharing one webhook listener and global middleware.
///
/// Dropping the registry unmounts the routes it owns and detaches the bots
/// still linked to it.
pub struct Botmaster {
    hub: Arc<Hub>,
    server: Arc<WebhookServer>,
    settings: BotmasterSettings,
}

impl Botmaster {
    /// Creates a registry with its own listener.
    pub fn new(settings: BotmasterSettings) -> Self {
        Self::with_server(settings, Arc::new(WebhookServer::new()))
    }

    /// Creates a registry mounting its routes on an existing listener.
    pub fn with_server(settings: BotmasterSettings, server: Arc<WebhookServer>) -> Self {
        let hub = Hub {
            bots: RwLock::new(Vec::new()),
            routes: RwLock::new(HashMap::new()),
            chains: Chains::new(),
            events: EventHub::new(),
            middleware_timeout: settings.middleware_timeout,
        };
        Self {
            hub: Arc::new(hub),
            server,
            settings,
        }
    }

    /// Creates a registry from a loaded configuration.
    ///
    /// Also initializes logging from the `[logging]` section unless a global
    /// subscriber is already installed.
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        logging::init_from_config(&config.logging);
        let settings = BotmasterSettings::from_config(config);
        info!(
            address = %settings.address(),
            prepend = settings.use_default_mount_path_prepend,
            "Botmaster initialized from configuration"
        );
        Self::new(settings)
    }

    /// Creates a builder loading configuration from files and environment.
    pub fn builder() -> BotmasterBuilder {
        BotmasterBuilder::new()
    }

    /// Returns the settings.
    pub fn settings(&self) -> &BotmasterSettings {
        &self.settings
    }

    /// Returns the shared listener.
    pub fn server(&self) -> &Arc<WebhookServer> {
        &self.server
    }

    /// The link handed to attached bots.
    fn link(&self) -> Weak<dyn Dispatch> {
        let hub: Weak<Hub> = Arc::downgrade(&self.hub);
        hub
    }

    // ─── Bots ─────────────────────────────────────────────────────────────────

    /// Adds a bot, mounting its webhook if it needs one.
    ///
    /// Fails without changing anything if the same bot is already present or
    /// its mount path is taken.
    pub fn add_bot(&self, bot: Arc<Bot>) -> RegistryResult<()> {
        let mut bots = self.hub.bots.write();
        if bots.iter().any(|existing| Arc::ptr_eq(existing, &bot)) {
            return Err(DuplicateBotError {
                bot_type: bot.bot_type().to_string(),
                bot_id: bot.id().as_u64(),
            }
            .into());
        }

        if bot.requires_webhook() {
            let path = mount_path(
                bot.bot_type(),
                bot.webhook_endpoint().unwrap_or_default(),
                self.settings.use_default_mount_path_prepend,
            );
            self.server.mount(&path, Arc::new(bot.webhook_handler()))?;
            self.hub.routes.write().insert(path, bot.id());
        }

        bot.attach(self.link());
        info!(bot_type = %bot.bot_type(), bot_id = %bot.id(), "Added bot");
        bots.push(bot);
        Ok(())
    }

    /// Removes a bot and unmounts every route it owns.
    ///
    /// Returns `false` if the bot was not registered.
    pub fn remove_bot(&self, bot: &Arc<Bot>) -> bool {
        let mut bots = self.hub.bots.write();
        let Some(index) = bots.iter().position(|existing| Arc::ptr_eq(existing, bot)) else {
            return false;
        };
        let removed = bots.remove(index);

        let owned: Vec<String> = {
            let mut routes = self.hub.routes.write();
            let owned: Vec<String> = routes
                .iter()
                .filter(|(_, owner)| **owner == removed.id())
                .map(|(path, _)| path.clone())
                .collect();
            for path in &owned {
                routes.remove(path);
            }
            owned
        };
        for path in &owned {
            self.server.unmount(path);
        }

        removed.detach_from(&self.link());
        info!(bot_type = %removed.bot_type(), bot_id = %removed.id(), "Removed bot");
        true
    }

    /// Returns every bot, in insertion order.
    pub fn bots(&self) -> Vec<Arc<Bot>> {
        self.hub.bots.read().clone()
    }

    /// Returns the first bot of the given type.
    pub fn get_bot(&self, bot_type: &str) -> Option<Arc<Bot>> {
        self.hub
            .bots
            .read()
            .iter()
            .find(|bot| bot.bot_type() == bot_type)
            .cloned()
    }

    /// Returns every bot of the given type, in insertion order.
    pub fn get_bots(&self, bot_type: &str) -> Vec<Arc<Bot>> {
        self.hub
            .bots
            .read()
            .iter()
            .filter(|bot| bot.bot_type() == bot_type)
            .cloned()
            .collect()
    }

    /// Returns the paths mounted for this registry's bots, sorted.
    pub fn mounted_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.hub.routes.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Returns the number of webhook routes this registry owns.
    pub fn request_listener_count(&self) -> usize {
        self.hub.routes.read().len()
    }

    // ─── Middleware ───────────────────────────────────────────────────────────

    /// Registers a global middleware, run for every admitted bot.
    ///
    /// Applies to every bot, including bots added later.
    pub fn use_middleware<S>(&self, spec: S) -> Result<(), ConfigError>
    where
        S: TryInto<MiddlewareSpec>,
        ConfigError: From<S::Error>,
    {
        self.hub.chains.register(spec.try_into()?);
        Ok(())
    }

    /// Registers a global incoming/outgoing pair.
    ///
    /// The incoming half runs before every global incoming middleware and the
    /// outgoing half after every global outgoing one.
    pub fn use_wrapped(&self, spec: WrappedSpec) {
        self.hub.chains.register_wrapped(spec);
    }

    /// Returns the global incoming chain.
    pub fn incoming_chain(&self) -> &IncomingChain {
        self.hub.chains.incoming()
    }

    /// Returns the global outgoing chain.
    pub fn outgoing_chain(&self) -> &OutgoingChain {
        self.hub.chains.outgoing()
    }

    // ─── Events ───────────────────────────────────────────────────────────────

    /// Registers an event listener.
    ///
    /// Every listener sees every event; the listener is removed when the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BotmasterEvent) + Send + Sync + 'static,
    {
        self.hub.events.subscribe(listener)
    }

    /// Subscribes through an unbounded channel.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<BotmasterEvent>) {
        self.hub.events.subscribe_channel()
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────────

    /// Binds the shared listener and emits [`BotmasterEvent::Listening`].
    pub async fn start(&self) -> RuntimeResult<SocketAddr> {
        let addr = self.server.bind(&self.settings.address()).await?;
        info!(addr = %addr, bots = self.hub.bots.read().len(), "Botmaster listening");
        self.hub.events.emit(&BotmasterEvent::Listening { addr });
        Ok(addr)
    }

    /// Returns the bound address, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Stops the shared listener. Bots and routes are kept.
    pub fn shutdown(&self) {
        self.server.shutdown();
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Botmaster is now running. Press Ctrl+C to stop.");
        let result = wait_for_shutdown().await;
        self.shutdown();
        Ok(result?)
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.shutdown();
        Ok(())
    }
}

impl Default for Botmaster {
    fn default() -> Self {
        Self::new(BotmasterSettings::default())
    }
}

impl Drop for Botmaster {
    fn drop(&mut self) {
        for path in self.hub.routes.read().keys() {
            self.server.unmount(path);
        }
        let link = self.link();
        for bot in self.hub.bots.read().iter() {
            bot.detach_from(&link);
        }
    }
}

impl std::fmt::Debug for Botmaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Botmaster")
            .field("settings", &self.settings)
            .field("bots", &self.hub.bots.read().len())
            .field("routes", &self.mounted_paths())
            .finish()
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// BotmasterBuilder
// =============================================================================

/// Builder creating a [`Botmaster`] from layered configuration.
///
/// # Example
///
/// ```rust,ignore
/// let botmaster = Botmaster::builder()
///     .config_file("deploy/switchboard.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct BotmasterBuilder {
    config_loader: ConfigLoader,
}

impl BotmasterBuilder {
    /// Creates a builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration programmatically.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration, then builds the registry.
    pub fn build(self) -> LoadResult<Botmaster> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(Botmaster::from_config(&config))
    }
}

impl Default for BotmasterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
