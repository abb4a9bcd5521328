//! Shared HTTP listener with a dynamic webhook route table.
//!
//! One [`WebhookServer`] serves every bot of a registry. It binds a single
//! TCP socket and serves one axum [`Router`] that dispatches each POST to the
//! handler mounted on the request path. Routes can be mounted and unmounted
//! at any time, before or after the listener is bound:
//!
//! ```text
//! 127.0.0.1:3000
//! ├── POST /mock/express     → BotWebhook (mock bot)
//! ├── POST /messenger/hook   → BotWebhook (messenger bot)
//! └── *    anything else     → 404 {"message": "Couldn't <METHOD> <path>"}
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use switchboard_core::{
    BoxedWebhookHandler, RouteBinder, RouteConflictError, TransportError, TransportResult,
    WebhookReply, normalize_path,
};

// ─── Shared runtime state ─────────────────────────────────────────────────────

/// Route table shared between the axum handlers and the binder methods.
#[derive(Default)]
struct SharedState {
    /// Normalized path → handler.
    routes: RwLock<HashMap<String, BoxedWebhookHandler>>,
}

/// A running listener.
struct Listening {
    addr: SocketAddr,
    shutdown_token: CancellationToken,
}

// ─── Server ───────────────────────────────────────────────────────────────────

/// The shared webhook listener.
///
/// Dropping the server stops the listener.
#[derive(Default)]
pub struct WebhookServer {
    state: Arc<SharedState>,
    listening: Mutex<Option<Listening>>,
}

impl WebhookServer {
    /// Creates a server with an empty route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the axum [`Router`] serving the route table.
    ///
    /// * `POST /` and `POST /{*path}` → the handler mounted on the path
    /// * any other method on those paths, or any other path → **404**
    pub fn router(&self) -> Router {
        let dispatch = post(http_dispatch).fallback(not_found);
        Router::new()
            .route("/", dispatch.clone())
            .route("/{*path}", dispatch)
            .fallback(not_found)
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the listener on `addr` and starts serving.
    ///
    /// Returns the address actually bound, which differs from `addr` when an
    /// ephemeral port is requested.
    pub async fn bind(&self, addr: &str) -> TransportResult<SocketAddr> {
        if let Some(listening) = self.listening.lock().as_ref() {
            return Err(TransportError::Bind {
                addr: addr.to_string(),
                reason: format!("already listening on {}", listening.addr),
            });
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let actual_addr = listener.local_addr()?;
        let shutdown_token = CancellationToken::new();

        {
            let mut listening = self.listening.lock();
            if let Some(existing) = listening.as_ref() {
                return Err(TransportError::Bind {
                    addr: addr.to_string(),
                    reason: format!("already listening on {}", existing.addr),
                });
            }
            *listening = Some(Listening {
                addr: actual_addr,
                shutdown_token: shutdown_token.clone(),
            });
        }

        let router = self.router();
        tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_token.clone().cancelled_owned());
            if let Err(e) = server.await {
                error!(error = %e, "Webhook server error");
            }
            info!(addr = %actual_addr, "Webhook server stopped");
        });

        info!(addr = %actual_addr, "Webhook server listening");
        Ok(actual_addr)
    }

    /// Returns the bound address, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().as_ref().map(|l| l.addr)
    }

    /// Stops the listener. Mounted routes are kept.
    pub fn shutdown(&self) {
        if let Some(listening) = self.listening.lock().take() {
            debug!(addr = %listening.addr, "Shutting down webhook server");
            listening.shutdown_token.cancel();
        }
    }

    /// Returns every mounted path, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.state.routes.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Drop for WebhookServer {
    fn drop(&mut self) {
        if let Some(listening) = self.listening.get_mut().take() {
            listening.shutdown_token.cancel();
        }
    }
}

impl RouteBinder for WebhookServer {
    fn mount(&self, path: &str, handler: BoxedWebhookHandler) -> Result<(), RouteConflictError> {
        let path = normalize_path(path);
        let mut routes = self.state.routes.write();
        if routes.contains_key(&path) {
            return Err(RouteConflictError { path });
        }
        routes.insert(path.clone(), handler);
        info!(path = %path, "Mounted webhook route");
        Ok(())
    }

    fn unmount(&self, path: &str) -> bool {
        let path = normalize_path(path);
        let removed = self.state.routes.write().remove(&path).is_some();
        if removed {
            info!(path = %path, "Unmounted webhook route");
        }
        removed
    }

    fn is_mounted(&self, path: &str) -> bool {
        self.state.routes.read().contains_key(&normalize_path(path))
    }
}

// ─── HTTP dispatch ────────────────────────────────────────────────────────────

/// Axum handler for POST requests.
///
/// Looks up the normalized request path and hands the decoded JSON body to
/// the mounted handler, or returns **404** if none is found.
async fn http_dispatch(
    State(state): State<Arc<SharedState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let requested = uri.path();
    let handler = state.routes.read().get(&normalize_path(requested)).cloned();
    let Some(handler) = handler else {
        return not_found(method, uri).await;
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(path = %requested, error = %e, "Rejected webhook body");
            return reply(WebhookReply::error(400, format!("invalid JSON body: {e}")));
        }
    };

    debug!(path = %requested, len = body.len(), "Received webhook POST");
    reply(handler.handle(payload).await)
}

async fn not_found(method: Method, uri: Uri) -> Response {
    let err = TransportError::RouteNotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    };
    reply(WebhookReply::error(404, err.to_string()))
}

fn reply(reply: WebhookReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::json;
    use switchboard_core::WebhookHandler;
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl WebhookHandler for Echo {
        async fn handle(&self, payload: Value) -> WebhookReply {
            WebhookReply {
                status: 200,
                body: payload,
            }
        }
    }

    async fn call(server: &WebhookServer, method: &str, path: &str, body: &str) -> (u16, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = server.router().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_mounted_route_receives_json() {
        let server = WebhookServer::new();
        server.mount("mock/express", Arc::new(Echo)).unwrap();

        let (status, body) = call(&server, "POST", "/mock/express", r#"{"a":1}"#).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "a": 1 }));

        let (status, _) = call(&server, "POST", "/mock/express/", r#"{"a":1}"#).await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let server = WebhookServer::new();
        let (status, body) = call(&server, "POST", "/mock/express", "{}").await;
        assert_eq!(status, 404);
        assert_eq!(body["message"], "Couldn't POST /mock/express");

        server.mount("/mock/express", Arc::new(Echo)).unwrap();
        let (status, body) = call(&server, "GET", "/mock/express", "").await;
        assert_eq!(status, 404);
        assert_eq!(body["message"], "Couldn't GET /mock/express");
    }

    #[tokio::test]
    async fn test_invalid_json_is_400() {
        let server = WebhookServer::new();
        server.mount("/hook", Arc::new(Echo)).unwrap();
        let (status, body) = call(&server, "POST", "/hook", "not json").await;
        assert_eq!(status, 400);
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("invalid JSON body")
        );
    }

    #[tokio::test]
    async fn test_mount_unmount_cycles() {
        let server = WebhookServer::new();
        server.mount("/hook", Arc::new(Echo)).unwrap();
        assert_eq!(
            server.mount("//hook/", Arc::new(Echo)).unwrap_err(),
            RouteConflictError {
                path: "/hook".into()
            }
        );
        assert!(server.unmount("/hook"));
        assert!(!server.unmount("/hook"));
        assert!(!server.is_mounted("/hook"));

        let (status, _) = call(&server, "POST", "/hook", "{}").await;
        assert_eq!(status, 404);

        server.mount("/hook", Arc::new(Echo)).unwrap();
        let (status, _) = call(&server, "POST", "/hook", "{}").await;
        assert_eq!(status, 200);
        assert_eq!(server.routes(), vec!["/hook".to_string()]);
    }

    #[tokio::test]
    async fn test_bind_and_shutdown() {
        let server = WebhookServer::new();
        let addr = server.bind("127.0.0.1:0").await.unwrap();
        assert_eq!(server.local_addr(), Some(addr));
        assert!(matches!(
            server.bind("127.0.0.1:0").await,
            Err(TransportError::Bind { .. })
        ));

        server.shutdown();
        assert_eq!(server.local_addr(), None);
        assert!(server.bind("127.0.0.1:0").await.is_ok());
    }
}
