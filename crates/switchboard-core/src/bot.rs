//! Bots: one platform connection with its own middleware and events.
//!
//! A [`Bot`] wraps a [`Connector`] with the settings describing it, two
//! private middleware chains and a standalone event hub. While attached to a
//! registry through [`Bot::attach`], received updates continue into the
//! registry's global chain and events; otherwise they surface as
//! [`BotEvent`]s on the bot itself.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, debug_span, warn};

use crate::capability::Capabilities;
use crate::connector::Connector;
use crate::error::{ConfigError, MiddlewareError, SendError, SendResult, TransportError};
use crate::event::{BotEvent, EventHub, Subscription};
use crate::middleware::{Chains, Flow, IncomingChain, MiddlewareSpec, OutgoingChain, WrappedSpec};
use crate::route::{WebhookHandler, WebhookReply};
use crate::update::{OutgoingMessage, Update};

/// Send capability required by [`Bot::send_is_typing_message_to`].
pub const TYPING_INDICATOR: &str = "typingIndicator";

static NEXT_BOT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a bot instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BotId(u64);

impl BotId {
    fn next() -> Self {
        Self(NEXT_BOT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Static description of a bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Platform tag, also used as the default mount prefix.
    #[serde(rename = "type")]
    pub bot_type: String,
    /// Whether the bot receives updates through a webhook.
    pub requires_webhook: bool,
    /// Webhook endpoint, relative to the mount prefix.
    pub webhook_endpoint: Option<String>,
    /// Capabilities the bot can receive.
    pub receives: Capabilities,
    /// Capabilities the bot can send.
    pub sends: Capabilities,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            bot_type: "mock".to_string(),
            requires_webhook: false,
            webhook_endpoint: None,
            receives: Capabilities::default(),
            sends: Capabilities::default(),
        }
    }
}

impl BotSettings {
    /// Creates settings for a bot of the given type.
    pub fn new(bot_type: impl Into<String>) -> Self {
        Self {
            bot_type: bot_type.into(),
            ..Self::default()
        }
    }

    /// Declares a webhook endpoint.
    pub fn with_webhook(mut self, endpoint: impl Into<String>) -> Self {
        self.requires_webhook = true;
        self.webhook_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the receive capabilities.
    pub fn with_receives(mut self, receives: Capabilities) -> Self {
        self.receives = receives;
        self
    }

    /// Sets the send capabilities.
    pub fn with_sends(mut self, sends: Capabilities) -> Self {
        self.sends = sends;
        self
    }
}

/// Options for [`Bot::send_message`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Skip both outgoing chains.
    pub ignore_middleware: bool,
    /// The update being answered, exposed to outgoing middleware.
    pub update: Option<Update>,
}

impl SendOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips both outgoing chains.
    pub fn ignore_middleware(mut self) -> Self {
        self.ignore_middleware = true;
        self
    }

    /// Marks the send as an answer to `update`.
    pub fn in_reply_to(mut self, update: Update) -> Self {
        self.update = Some(update);
        self
    }
}

/// What happened to a message handed to [`Bot::send_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The connector delivered the message and answered with a receipt.
    Sent(Value),
    /// An outgoing middleware halted the send.
    Halted {
        /// Reason given by the halting middleware.
        reason: String,
    },
}

impl SendOutcome {
    /// Returns the receipt if the message was sent.
    pub fn receipt(&self) -> Option<&Value> {
        match self {
            Self::Sent(receipt) => Some(receipt),
            Self::Halted { .. } => None,
        }
    }

    /// Returns `true` if the message was sent.
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// The registry side of an attached bot.
///
/// Implemented by registries; a bot holds a weak reference to its
/// dispatcher while attached.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Per-step timeout applied to every chain run.
    fn middleware_timeout(&self) -> Option<Duration>;

    /// Continues an update that completed the bot's own incoming chain.
    async fn dispatch_update(&self, bot: &Bot, update: Update);

    /// Runs the global outgoing chain for a message sent by `bot`.
    async fn run_outgoing(
        &self,
        bot: &Bot,
        state: Option<&Update>,
        message: &mut OutgoingMessage,
    ) -> Result<Flow, MiddlewareError>;

    /// Reports a middleware failure involving `bot`.
    fn report_error(&self, bot: &Bot, error: MiddlewareError);
}

/// A platform connection.
pub struct Bot {
    id: BotId,
    settings: BotSettings,
    connector: Arc<dyn Connector>,
    chains: Chains,
    dispatcher: RwLock<Option<Weak<dyn Dispatch>>>,
    events: EventHub<BotEvent>,
    middleware_timeout: RwLock<Option<Duration>>,
}

impl Bot {
    /// Creates a bot.
    pub fn new<C: Connector>(settings: BotSettings, connector: C) -> Arc<Self> {
        Arc::new(Self {
            id: BotId::next(),
            settings,
            connector: Arc::new(connector),
            chains: Chains::new(),
            dispatcher: RwLock::new(None),
            events: EventHub::new(),
            middleware_timeout: RwLock::new(None),
        })
    }

    /// Returns the bot's identity.
    pub fn id(&self) -> BotId {
        self.id
    }

    /// Returns the platform tag.
    pub fn bot_type(&self) -> &str {
        &self.settings.bot_type
    }

    /// Returns the settings the bot was created with.
    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// Returns the receive capabilities.
    pub fn receives(&self) -> &Capabilities {
        &self.settings.receives
    }

    /// Returns the send capabilities.
    pub fn sends(&self) -> &Capabilities {
        &self.settings.sends
    }

    /// Returns whether the bot needs a webhook route.
    pub fn requires_webhook(&self) -> bool {
        self.settings.requires_webhook
    }

    /// Returns the webhook endpoint, if declared.
    pub fn webhook_endpoint(&self) -> Option<&str> {
        self.settings.webhook_endpoint.as_deref()
    }

    /// Returns the connector.
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Returns the bot's own incoming chain.
    pub fn incoming_chain(&self) -> &IncomingChain {
        self.chains.incoming()
    }

    /// Returns the bot's own outgoing chain.
    pub fn outgoing_chain(&self) -> &OutgoingChain {
        self.chains.outgoing()
    }

    // ─── Registry link ────────────────────────────────────────────────────────

    /// Links the bot to a registry.
    pub fn attach(&self, dispatcher: Weak<dyn Dispatch>) {
        *self.dispatcher.write() = Some(dispatcher);
    }

    /// Removes the registry link.
    pub fn detach(&self) {
        *self.dispatcher.write() = None;
    }

    /// Removes the registry link only if it points to `dispatcher`.
    ///
    /// Returns `false` when the bot has since been attached elsewhere.
    pub fn detach_from(&self, dispatcher: &Weak<dyn Dispatch>) -> bool {
        let mut link = self.dispatcher.write();
        if link
            .as_ref()
            .is_some_and(|current| Weak::ptr_eq(current, dispatcher))
        {
            *link = None;
            true
        } else {
            false
        }
    }

    /// Returns whether the bot is linked to a live registry.
    pub fn is_attached(&self) -> bool {
        self.dispatcher().is_some()
    }

    fn dispatcher(&self) -> Option<Arc<dyn Dispatch>> {
        self.dispatcher.read().as_ref().and_then(Weak::upgrade)
    }

    /// Sets the per-step timeout used while the bot is standalone.
    pub fn set_middleware_timeout(&self, timeout: Option<Duration>) {
        *self.middleware_timeout.write() = timeout;
    }

    fn timeout_for(&self, dispatcher: Option<&Arc<dyn Dispatch>>) -> Option<Duration> {
        match dispatcher {
            Some(dispatcher) => dispatcher.middleware_timeout(),
            None => *self.middleware_timeout.read(),
        }
    }

    fn report(&self, dispatcher: Option<&Arc<dyn Dispatch>>, error: MiddlewareError) {
        warn!(bot_type = %self.bot_type(), bot_id = %self.id, error = %error, "Middleware failed");
        match dispatcher {
            Some(dispatcher) => dispatcher.report_error(self, error),
            None => self.events.emit(&BotEvent::Error(error)),
        }
    }

    // ─── Middleware ───────────────────────────────────────────────────────────

    /// Registers a middleware on the bot's own chains.
    ///
    /// Accepts a [`MiddlewareSpec`] or anything convertible into one, such as
    /// a [`MiddlewareSpecBuilder`](crate::middleware::MiddlewareSpecBuilder).
    /// Nothing is registered when the conversion fails.
    pub fn use_middleware<S>(&self, spec: S) -> Result<(), ConfigError>
    where
        S: TryInto<MiddlewareSpec>,
        ConfigError: From<S::Error>,
    {
        self.chains.register(spec.try_into()?);
        Ok(())
    }

    /// Registers an incoming/outgoing pair.
    ///
    /// The incoming half is placed before every incoming middleware and the
    /// outgoing half after every outgoing one.
    pub fn use_wrapped(&self, spec: WrappedSpec) {
        self.chains.register_wrapped(spec);
    }

    // ─── Inbound ──────────────────────────────────────────────────────────────

    /// Runs an update through the bot's incoming chain and hands it on.
    ///
    /// Failures never propagate to the caller; they are reported as error
    /// events.
    pub async fn emit_update(&self, mut update: Update) {
        let dispatcher = self.dispatcher();
        let timeout = self.timeout_for(dispatcher.as_ref());
        let span = debug_span!("emit_update", bot_type = %self.bot_type(), bot_id = %self.id);

        async move {
            match self
                .chains
                .incoming()
                .run_incoming(self, &mut update, timeout)
                .await
            {
                Ok(Flow::Completed) => match &dispatcher {
                    Some(dispatcher) => dispatcher.dispatch_update(self, update).await,
                    None => self.events.emit(&BotEvent::Update(update)),
                },
                Ok(Flow::Halted { reason }) => {
                    debug!(reason = %reason, "Update halted by bot middleware");
                }
                Err(error) => self.report(dispatcher.as_ref(), error),
            }
        }
        .instrument(span)
        .await
    }

    /// Returns a webhook handler feeding request bodies to this bot.
    pub fn webhook_handler(self: &Arc<Self>) -> BotWebhook {
        BotWebhook {
            bot: Arc::clone(self),
        }
    }

    // ─── Outbound ─────────────────────────────────────────────────────────────

    /// Sends a message through the outgoing chains and the connector.
    ///
    /// Global middleware runs first, then the bot's own. A middleware failure
    /// is reported through the error event and returned.
    pub async fn send_message(
        &self,
        mut message: OutgoingMessage,
        options: SendOptions,
    ) -> SendResult<SendOutcome> {
        if !options.ignore_middleware {
            let dispatcher = self.dispatcher();
            let timeout = self.timeout_for(dispatcher.as_ref());
            let state = options.update.as_ref();

            if let Some(global) = &dispatcher {
                match global.run_outgoing(self, state, &mut message).await {
                    Ok(Flow::Completed) => {}
                    Ok(Flow::Halted { reason }) => return Ok(SendOutcome::Halted { reason }),
                    Err(error) => {
                        self.report(dispatcher.as_ref(), error.clone());
                        return Err(error.into());
                    }
                }
            }
            match self
                .chains
                .outgoing()
                .run_outgoing(self, state, &mut message, timeout)
                .await
            {
                Ok(Flow::Completed) => {}
                Ok(Flow::Halted { reason }) => return Ok(SendOutcome::Halted { reason }),
                Err(error) => {
                    self.report(dispatcher.as_ref(), error.clone());
                    return Err(error.into());
                }
            }
        }

        let receipt = self.connector.send_raw(&message).await?;
        debug!(bot_type = %self.bot_type(), recipient = %message.recipient.id, "Message sent");
        Ok(SendOutcome::Sent(receipt))
    }

    /// Answers the sender of `update` with a text message.
    pub async fn reply(&self, update: &Update, text: impl Into<String>) -> SendResult<SendOutcome> {
        let recipient = update.sender_id().ok_or_else(|| {
            SendError::Transport(TransportError::InvalidPayload(
                "update has no sender to reply to".into(),
            ))
        })?;
        let message = OutgoingMessage::text(recipient, text);
        self.send_message(message, SendOptions::new().in_reply_to(update.clone()))
            .await
    }

    /// Sends a text message.
    pub async fn send_text_message_to(
        &self,
        recipient: impl Into<String>,
        text: impl Into<String>,
    ) -> SendResult<SendOutcome> {
        self.send_message(OutgoingMessage::text(recipient, text), SendOptions::new())
            .await
    }

    /// Sends several text messages one after another.
    ///
    /// Stops at the first failure; outcomes of the messages sent so far are
    /// lost in that case.
    pub async fn send_text_cascade_to<I, T>(
        &self,
        texts: I,
        recipient: impl Into<String>,
    ) -> SendResult<Vec<SendOutcome>>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let recipient = recipient.into();
        let mut outcomes = Vec::new();
        for text in texts {
            outcomes.push(self.send_text_message_to(recipient.clone(), text).await?);
        }
        Ok(outcomes)
    }

    /// Sends a typing indicator.
    ///
    /// Requires the `typingIndicator` send capability.
    pub async fn send_is_typing_message_to(
        &self,
        recipient: impl Into<String>,
    ) -> SendResult<SendOutcome> {
        if !self.sends().supports(TYPING_INDICATOR) {
            return Err(TransportError::Unsupported {
                capability: TYPING_INDICATOR.to_string(),
            }
            .into());
        }
        self.send_message(
            OutgoingMessage::sender_action(recipient, "typing_on"),
            SendOptions::new(),
        )
        .await
    }

    // ─── Events ───────────────────────────────────────────────────────────────

    /// Subscribes to events emitted while the bot is standalone.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BotEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Subscribes to standalone events through a channel.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<BotEvent>) {
        self.events.subscribe_channel()
    }
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("incoming", &self.chains.incoming().len())
            .field("outgoing", &self.chains.outgoing().len())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Webhook handler that normalizes request bodies for one bot.
///
/// Each update is processed on its own task; the reply only acknowledges
/// how many updates were accepted.
#[derive(Clone)]
pub struct BotWebhook {
    bot: Arc<Bot>,
}

#[async_trait]
impl WebhookHandler for BotWebhook {
    async fn handle(&self, payload: Value) -> WebhookReply {
        let updates = match self.bot.connector.parse_updates(payload) {
            Ok(updates) => updates,
            Err(e) => {
                debug!(bot_type = %self.bot.bot_type(), error = %e, "Rejected webhook payload");
                return WebhookReply::error(400, e.to_string());
            }
        };
        let count = updates.len();
        for update in updates {
            let bot = Arc::clone(&self.bot);
            tokio::spawn(async move { bot.emit_update(update).await });
        }
        WebhookReply::ok(count)
    }
}
