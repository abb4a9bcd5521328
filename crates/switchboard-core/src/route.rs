//! Webhook routing contracts shared by the registry and the HTTP listener.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::RouteConflictError;

/// A response produced by a webhook handler.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookReply {
    /// HTTP status code.
    pub status: u16,
    /// JSON response body.
    pub body: Value,
}

impl WebhookReply {
    /// A `200` reply acknowledging `updates` normalized updates.
    pub fn ok(updates: usize) -> Self {
        Self {
            status: 200,
            body: json!({ "status": "ok", "updates": updates }),
        }
    }

    /// An error reply with a `{"message": ...}` body.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "message": message.into() }),
        }
    }
}

/// Handles the JSON body of a webhook request.
#[async_trait]
pub trait WebhookHandler: Send + Sync + 'static {
    /// Processes a decoded request body.
    async fn handle(&self, payload: Value) -> WebhookReply;
}

/// Shared, type-erased webhook handler.
pub type BoxedWebhookHandler = Arc<dyn WebhookHandler>;

/// Mounts and unmounts webhook handlers on a shared listener.
///
/// Paths are normalized with [`normalize_path`] before use.
pub trait RouteBinder: Send + Sync {
    /// Mounts `handler` on `path`.
    ///
    /// Fails if the path already has a handler.
    fn mount(&self, path: &str, handler: BoxedWebhookHandler) -> Result<(), RouteConflictError>;

    /// Removes the handler on `path`, returning whether one was mounted.
    fn unmount(&self, path: &str) -> bool;

    /// Returns whether `path` has a handler.
    fn is_mounted(&self, path: &str) -> bool;
}

/// Normalizes a route path.
///
/// The result starts with `/`, has no repeated `/` and no trailing `/`
/// (except for the root path itself).
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Computes the mount path for a bot's webhook endpoint.
///
/// With `prepend` the path is `/<bot_type>/<endpoint>`, otherwise the
/// endpoint alone.
pub fn mount_path(bot_type: &str, endpoint: &str, prepend: bool) -> String {
    if prepend {
        normalize_path(&format!("{bot_type}/{endpoint}"))
    } else {
        normalize_path(endpoint)
    }
}
