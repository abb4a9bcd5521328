//! Ordered middleware chains and their guarded execution.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use tracing::trace;

use super::filter::FilterOptions;
use super::spec::{MiddlewareSpec, WrappedSpec};
use super::{Direction, Flow, IncomingMiddleware, MiddlewareResult, OutgoingMiddleware, Step};
use crate::bot::Bot;
use crate::error::{MiddlewareError, MiddlewareErrorKind};
use crate::update::{OutgoingMessage, Update};

/// A middleware with the filter deciding which bots it runs for.
pub struct Entry<M> {
    /// The middleware itself.
    pub middleware: M,
    /// Filter evaluated against the bot on every run.
    pub options: Arc<FilterOptions>,
}

impl<M: Clone> Clone for Entry<M> {
    fn clone(&self) -> Self {
        Self {
            middleware: self.middleware.clone(),
            options: Arc::clone(&self.options),
        }
    }
}

impl<M> Entry<M> {
    /// Creates an entry.
    pub fn new(middleware: M, options: FilterOptions) -> Self {
        Self {
            middleware,
            options: Arc::new(options),
        }
    }
}

/// An ordered list of middleware entries.
///
/// Entries run in insertion order. A run works on a snapshot taken when it
/// starts, so registrations made while a run is in flight apply to later
/// runs only.
pub struct Chain<M> {
    entries: RwLock<Vec<Entry<M>>>,
}

/// Chain of incoming middleware.
pub type IncomingChain = Chain<Arc<dyn IncomingMiddleware>>;

/// Chain of outgoing middleware.
pub type OutgoingChain = Chain<Arc<dyn OutgoingMiddleware>>;

impl<M> Default for Chain<M> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<M: Clone> Chain<M> {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn add(&self, entry: Entry<M>) {
        self.entries.write().push(entry);
    }

    /// Inserts an entry in front of every existing one.
    pub fn prepend(&self, entry: Entry<M>) {
        self.entries.write().insert(0, entry);
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the chain has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copies the current entries.
    pub fn snapshot(&self) -> Vec<Entry<M>> {
        self.entries.read().clone()
    }
}

impl IncomingChain {
    /// Runs every entry admitting `bot` against `update`.
    pub async fn run_incoming(
        &self,
        bot: &Bot,
        update: &mut Update,
        timeout: Option<Duration>,
    ) -> Result<Flow, MiddlewareError> {
        for entry in self.snapshot() {
            if !entry.options.admits(bot) {
                trace!(bot_type = %bot.bot_type(), "Incoming middleware filtered out");
                continue;
            }
            let step = guarded(
                Direction::Incoming,
                timeout,
                entry.middleware.handle(bot, update),
            )
            .await?;
            if let Step::Halt(reason) = step {
                return Ok(Flow::Halted { reason });
            }
        }
        Ok(Flow::Completed)
    }
}

impl OutgoingChain {
    /// Runs every entry admitting `bot` against `message`.
    pub async fn run_outgoing(
        &self,
        bot: &Bot,
        state: Option<&Update>,
        message: &mut OutgoingMessage,
        timeout: Option<Duration>,
    ) -> Result<Flow, MiddlewareError> {
        for entry in self.snapshot() {
            if !entry.options.admits(bot) {
                trace!(bot_type = %bot.bot_type(), "Outgoing middleware filtered out");
                continue;
            }
            let step = guarded(
                Direction::Outgoing,
                timeout,
                entry.middleware.handle(bot, state, message),
            )
            .await?;
            if let Step::Halt(reason) = step {
                return Ok(Flow::Halted { reason });
            }
        }
        Ok(Flow::Completed)
    }
}

/// The incoming and outgoing chains of one owner.
#[derive(Default)]
pub struct Chains {
    incoming: IncomingChain,
    outgoing: OutgoingChain,
}

impl Chains {
    /// Creates two empty chains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the incoming chain.
    pub fn incoming(&self) -> &IncomingChain {
        &self.incoming
    }

    /// Returns the outgoing chain.
    pub fn outgoing(&self) -> &OutgoingChain {
        &self.outgoing
    }

    /// Appends a registration to the chain of its direction.
    pub fn register(&self, spec: MiddlewareSpec) {
        match spec {
            MiddlewareSpec::Incoming(spec) => {
                self.incoming.add(Entry::new(spec.middleware, spec.options))
            }
            MiddlewareSpec::Outgoing(spec) => {
                self.outgoing.add(Entry::new(spec.middleware, spec.options))
            }
        }
    }

    /// Places the incoming half in front of every incoming entry and the
    /// outgoing half after every outgoing entry.
    pub fn register_wrapped(&self, spec: WrappedSpec) {
        let WrappedSpec { incoming, outgoing } = spec;
        self.incoming
            .prepend(Entry::new(incoming.middleware, incoming.options));
        self.outgoing
            .add(Entry::new(outgoing.middleware, outgoing.options));
    }
}

async fn guarded<F>(
    phase: Direction,
    timeout: Option<Duration>,
    step: F,
) -> Result<Step, MiddlewareError>
where
    F: Future<Output = MiddlewareResult>,
{
    let step = AssertUnwindSafe(step).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, step).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(MiddlewareError::new(
                    phase,
                    MiddlewareErrorKind::TimedOut,
                    format!("middleware did not finish within {limit:?}"),
                ));
            }
        },
        None => step.await,
    };
    match outcome {
        Ok(Ok(step)) => Ok(step),
        Ok(Err(err)) => Err(MiddlewareError::new(
            phase,
            MiddlewareErrorKind::Failed,
            err.to_string(),
        )),
        Err(payload) => Err(MiddlewareError::new(
            phase,
            MiddlewareErrorKind::Panicked,
            panic_message(payload.as_ref()),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "middleware panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{Bot, BotSettings};
    use crate::capability::Capabilities;
    use crate::connector::LoopbackConnector;
    use crate::middleware::{IncomingFn, IncomingSyncFn, OutgoingSyncFn};
    use futures::future::BoxFuture;

    fn bot(bot_type: &str) -> Arc<Bot> {
        Bot::new(
            BotSettings::new(bot_type).with_receives(Capabilities::new().with("text", true)),
            LoopbackConnector::new(),
        )
    }

    fn incoming(
        middleware: impl IncomingMiddleware,
        options: FilterOptions,
    ) -> Entry<Arc<dyn IncomingMiddleware>> {
        let middleware: Arc<dyn IncomingMiddleware> = Arc::new(middleware);
        Entry::new(middleware, options)
    }

    fn append(suffix: &'static str, options: FilterOptions) -> Entry<Arc<dyn IncomingMiddleware>> {
        incoming(
            IncomingSyncFn(move |_: &Bot, update: &mut Update| -> MiddlewareResult {
                update.text_mut().push_str(suffix);
                Ok(Step::Continue)
            }),
            options,
        )
    }

    #[tokio::test]
    async fn test_entries_run_in_order_and_see_mutations() {
        let chain = IncomingChain::new();
        chain.add(append("1", FilterOptions::any()));
        chain.add(append("2", FilterOptions::any()));
        chain.prepend(append("0", FilterOptions::any()));

        let bot = bot("mock");
        let mut update = Update::new();
        let flow = chain.run_incoming(&bot, &mut update, None).await.unwrap();
        assert_eq!(flow, Flow::Completed);
        assert_eq!(update.text(), Some("012"));
    }

    #[tokio::test]
    async fn test_filtered_entries_are_skipped() {
        let chain = IncomingChain::new();
        chain.add(append("a", FilterOptions::any()));
        chain.add(append("b", FilterOptions::include_types(["other"])));
        chain.add(append("c", FilterOptions::receives("text")));
        chain.add(append("d", FilterOptions::sends("text")));

        let bot = bot("mock");
        let mut update = Update::new();
        chain.run_incoming(&bot, &mut update, None).await.unwrap();
        assert_eq!(update.text(), Some("ac"));
    }

    #[tokio::test]
    async fn test_halt_stops_the_run() {
        let chain = IncomingChain::new();
        chain.add(append("a", FilterOptions::any()));
        chain.add(incoming(
            IncomingSyncFn(|_: &Bot, _: &mut Update| -> MiddlewareResult {
                Ok(Step::halt("done"))
            }),
            FilterOptions::any(),
        ));
        chain.add(append("b", FilterOptions::any()));

        let bot = bot("mock");
        let mut update = Update::new();
        let flow = chain.run_incoming(&bot, &mut update, None).await.unwrap();
        assert_eq!(
            flow,
            Flow::Halted {
                reason: "done".into()
            }
        );
        assert_eq!(update.text(), Some("a"));
    }

    #[tokio::test]
    async fn test_errors_abandon_the_rest_of_the_chain() {
        let chain = IncomingChain::new();
        chain.add(incoming(
            IncomingSyncFn(|_: &Bot, update: &mut Update| -> MiddlewareResult {
                update.require_field("blop")?;
                Ok(Step::Continue)
            }),
            FilterOptions::any(),
        ));
        chain.add(append("never", FilterOptions::any()));

        let bot = bot("mock");
        let mut update = Update::new();
        let err = chain.run_incoming(&bot, &mut update, None).await.unwrap_err();
        assert_eq!(err.kind(), MiddlewareErrorKind::Failed);
        assert_eq!(
            err.to_string(),
            "\"update has no field `blop`\". In incoming middleware"
        );
        assert_eq!(update.text(), None);
    }

    #[tokio::test]
    async fn test_panics_are_caught() {
        let chain = OutgoingChain::new();
        let middleware: Arc<dyn OutgoingMiddleware> = Arc::new(OutgoingSyncFn(
            |_: &Bot, _: Option<&Update>, _: &mut OutgoingMessage| -> MiddlewareResult {
                panic!("boom")
            },
        ));
        chain.add(Entry::new(middleware, FilterOptions::any()));

        let bot = bot("mock");
        let mut message = OutgoingMessage::text("u1", "hi");
        let err = chain
            .run_outgoing(&bot, None, &mut message, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), MiddlewareErrorKind::Panicked);
        assert_eq!(err.phase(), Direction::Outgoing);
        assert_eq!(err.message(), "boom");
    }

    struct Stall;

    #[async_trait::async_trait]
    impl IncomingMiddleware for Stall {
        async fn handle(&self, _bot: &Bot, _update: &mut Update) -> MiddlewareResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Step::Continue)
        }
    }

    #[tokio::test]
    async fn test_timeout_converts_a_stalled_step() {
        let chain = IncomingChain::new();
        chain.add(incoming(Stall, FilterOptions::any()));

        let bot = bot("mock");
        let mut update = Update::new();
        let err = chain
            .run_incoming(&bot, &mut update, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), MiddlewareErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_async_callbacks_are_accepted() {
        fn tag<'a>(_bot: &'a Bot, update: &'a mut Update) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                update.set_field("tagged", true);
                Ok(Step::Continue)
            })
        }

        let chain = IncomingChain::new();
        chain.add(incoming(IncomingFn(tag), FilterOptions::any()));

        let bot = bot("mock");
        let mut update = Update::new();
        chain.run_incoming(&bot, &mut update, None).await.unwrap();
        assert_eq!(update.field("tagged"), Some(&serde_json::Value::Bool(true)));
    }
}
