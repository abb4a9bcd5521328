//! Echo Bot Example
//!
//! Runs one in-process bot behind the shared webhook listener and answers
//! every text message with the same text.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --port 3000
//!
//! curl -X POST http://127.0.0.1:3000/mock/echo \
//!      -H 'content-type: application/json' \
//!      -d '{"text": "hello", "sender": {"id": "u1"}}'
//! ```
//!
//! Replies are recorded by the loopback connector and logged.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use switchboard::prelude::*;
use switchboard::runtime::config::{ConfigLoader, validate_config};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "Echo every text message back to its sender")]
struct Args {
    /// Configuration file (defaults to ./switchboard.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port of the shared webhook listener.
    #[arg(short, long)]
    port: Option<u16>,

    /// Mount the webhook at `/echo` instead of `/mock/echo`.
    #[arg(long)]
    no_prepend: bool,
}

// ============================================================================
// Middleware
// ============================================================================

/// Drops updates that carry no text.
fn require_text(_bot: &Bot, update: &mut Update) -> MiddlewareResult {
    match update.text() {
        Some(text) if !text.trim().is_empty() => Ok(Step::Continue),
        _ => Ok(Step::halt("no text")),
    }
}

/// Logs every outgoing message.
fn log_outgoing(
    bot: &Bot,
    _state: Option<&Update>,
    message: &mut OutgoingMessage,
) -> MiddlewareResult {
    info!(
        bot_type = %bot.bot_type(),
        recipient = %message.recipient.id,
        text = message.text_content().unwrap_or_default(),
        "Sending reply"
    );
    Ok(Step::Continue)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_current_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_prepend {
        config.webhooks.use_default_mount_path_prepend = false;
    }
    validate_config(&config)?;
    let botmaster = Botmaster::from_config(&config);

    let bot = Bot::new(
        BotSettings::new("mock")
            .with_webhook("echo")
            .with_receives(Capabilities::new().with("text", true))
            .with_sends(Capabilities::new().with("text", true)),
        LoopbackConnector::new(),
    );
    botmaster.add_bot(Arc::clone(&bot))?;

    botmaster.use_middleware(
        MiddlewareSpec::incoming_sync(require_text).with_options(FilterOptions::receives("text")),
    )?;
    botmaster.use_middleware(MiddlewareSpec::outgoing_sync(log_outgoing))?;

    let (_subscription, mut events) = botmaster.subscribe_channel();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                BotmasterEvent::Listening { addr } => {
                    info!(addr = %addr, "Echo bot ready");
                }
                BotmasterEvent::Update { bot, update } => {
                    let text = update.text().unwrap_or_default().to_string();
                    if let Err(e) = bot.reply(&update, text).await {
                        error!(error = %e, "Failed to send echo reply");
                    }
                }
                BotmasterEvent::Error { bot, error } => {
                    error!(bot_type = %bot.bot_type(), error = %error, "Middleware failed");
                }
            }
        }
    });

    botmaster.run().await?;
    Ok(())
}
