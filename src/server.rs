//! Live HTTP listener for a [`Registry`].
//!
//! Every request reaches a single fallback handler which hands method, path,
//! query and body to [`Registry::dispatch`] and writes the resulting
//! [`MockResponse`] back.

use crate::config::{GlobalSettings, MockServerConfig};
use crate::error::MockError;
use crate::expectation::MockResponse;
use crate::path;
use crate::registry::{InboundRequest, Registry};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::Deref;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Ask the OS for a currently unused TCP port.
///
/// The port is released before returning, so another process could claim it
/// before the mock API binds.
pub fn free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// A mock HTTP API.
///
/// Register expectations, then [`start`](MockApi::start) the listener:
///
/// ```no_run
/// # async fn run() -> Result<(), http_mock_api::MockError> {
/// let api = http_mock_api::MockApi::new()?;
/// api.get("/hello")?.text("Hello, World!");
/// api.start().await?;
/// println!("listening on {}", api.url());
/// api.stop().await;
/// # Ok(())
/// # }
/// ```
///
/// Registration methods are available directly through `Deref` to the
/// underlying [`Registry`].
pub struct MockApi {
    registry: Arc<Registry>,
    addr: SocketAddr,
    server: Mutex<Option<RunningServer>>,
}

impl MockApi {
    /// Create a mock API on an ephemeral local port.
    pub fn new() -> Result<Self, MockError> {
        Ok(Self::with_port(free_port()?))
    }

    /// Create a mock API on a fixed local port.
    pub fn with_port(port: u16) -> Self {
        Self::bind(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            GlobalSettings::default(),
        )
    }

    /// Create a mock API from a configuration, registering its requests.
    pub fn from_config(config: &MockServerConfig) -> anyhow::Result<Self> {
        let host: IpAddr = config.host.parse()?;
        let port = match config.port {
            Some(port) => port,
            None => free_port()?,
        };
        let api = Self::bind(SocketAddr::new(host, port), config.settings.clone());
        config.register(&api.registry)?;
        Ok(api)
    }

    /// Create a mock API for an explicit address.
    pub fn bind(addr: SocketAddr, settings: GlobalSettings) -> Self {
        Self {
            registry: Arc::new(Registry::with_settings(settings)),
            addr,
            server: Mutex::new(None),
        }
    }

    /// The address the listener binds to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://localhost:8080`.
    pub fn url(&self) -> String {
        let host = if self.addr.ip().is_loopback() || self.addr.ip().is_unspecified() {
            "localhost".to_string()
        } else {
            self.addr.ip().to_string()
        };
        format!("http://{}:{}", host, self.addr.port())
    }

    /// Absolute URL for a path on this API.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.url(), path)
        } else {
            format!("{}/{}", self.url(), path)
        }
    }

    /// Shared handle to the registry.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Whether the listener is running.
    pub async fn is_running(&self) -> bool {
        self.server.lock().await.is_some()
    }

    /// Bind the listener and start serving requests in the background.
    pub async fn start(&self) -> Result<(), MockError> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Err(MockError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.addr).await?;
        let router = router(Arc::clone(&self.registry));
        let (tx, rx) = oneshot::channel::<()>();

        let addr = self.addr;
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(%addr, error = %e, "Mock API server failed");
            }
        });

        info!(url = %self.url(), expectations = self.registry.len(), "Mock API started");
        *server = Some(RunningServer { shutdown: tx, task });
        Ok(())
    }

    /// Stop serving and wait for in-flight requests to finish.
    pub async fn stop(&self) {
        let Some(running) = self.server.lock().await.take() else {
            return;
        };
        let _ = running.shutdown.send(());
        if let Err(e) = running.task.await {
            error!(error = %e, "Mock API server task failed");
        }
        info!(url = %self.url(), "Mock API stopped");
    }
}

impl Deref for MockApi {
    type Target = Registry;

    fn deref(&self) -> &Registry {
        &self.registry
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        if let Some(running) = self.server.get_mut().take() {
            let _ = running.shutdown.send(());
        }
    }
}

fn router(registry: Arc<Registry>) -> Router {
    Router::new().fallback(handle_request).with_state(registry)
}

async fn handle_request(
    State(registry): State<Arc<Registry>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let decoded = path::decode(uri.path());
    let request = InboundRequest {
        method: method.as_str(),
        path: &decoded,
        query: uri.query(),
        body: &body,
    };
    into_http_response(registry.dispatch(&request))
}

fn into_http_response(mock: MockResponse) -> Response {
    let Ok(status) = StatusCode::from_u16(mock.status) else {
        error!(status = mock.status, "Configured status code is not valid");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = &mock.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    let body = mock.body.map(Body::from).unwrap_or_else(Body::empty);

    builder.body(body).unwrap_or_else(|e| {
        error!(error = %e, "Failed to build response");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port() {
        let port = free_port().unwrap();
        assert_ne!(port, 0);
    }

    #[test]
    fn test_urls() {
        let api = MockApi::with_port(8080);
        assert_eq!(api.url(), "http://localhost:8080");
        assert_eq!(api.url_for("/todo/1"), "http://localhost:8080/todo/1");
        assert_eq!(api.url_for("todo/1"), "http://localhost:8080/todo/1");
    }

    #[test]
    fn test_deref_registration() {
        let api = MockApi::new().unwrap();
        let expectation = api.get("/hello").unwrap();
        assert!(api.find("/hello", None, "GET").is_some());
        api.remove(&expectation).unwrap();
        assert!(api.find("/hello", None, "GET").is_none());
    }

    #[test]
    fn test_invalid_status_maps_to_500() {
        let response = into_http_response(MockResponse {
            status: 1000,
            content_type: None,
            body: None,
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_response_headers() {
        let response = into_http_response(MockResponse::text(404, "nope"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_start_twice() {
        let api = MockApi::new().unwrap();
        api.start().await.unwrap();
        assert!(api.is_running().await);
        assert!(matches!(api.start().await, Err(MockError::AlreadyRunning)));
        api.stop().await;
        assert!(!api.is_running().await);
    }
}
