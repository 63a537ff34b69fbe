//! HTTP listener using Axum.
//!
//! Every request is `/<endpoint>/<member path>` with a flat parameter set,
//! taken from the query string (GET) or from the query string plus a
//! form-encoded body (POST). The `~meta` probe is answered here without
//! reaching the handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tws_protocol::{Params, RequestContext, TwsError, TwsResult, Wire};

/// Trait implemented by the hosting endpoint to answer incoming calls.
/// The transport calls this for every request except the `~meta` probe.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle_request(
        &self,
        request: RequestContext,
    ) -> impl std::future::Future<Output = TwsResult<String>> + Send;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// First path segment of every request
    pub endpoint: String,
    /// Host written into the endpoint locator; defaults to the bind host
    pub advertised_host: Option<String>,
    /// Log every request at debug level
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: Wire::DEFAULT_PORT,
            hostname: "127.0.0.1".into(),
            endpoint: "Root".into(),
            advertised_host: None,
            verbose_logging: false,
        }
    }
}

impl TransportConfig {
    /// Bind on all interfaces when external connections are allowed.
    pub fn allow_external(mut self, allow: bool) -> Self {
        self.hostname = if allow { "0.0.0.0" } else { "127.0.0.1" }.into();
        self
    }

    fn locator_host(&self) -> &str {
        match self.advertised_host.as_deref() {
            Some(host) => host,
            None if self.hostname == "0.0.0.0" => "127.0.0.1",
            None => &self.hostname,
        }
    }
}

struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    verbose: bool,
}

/// A bound listener serving one endpoint.
pub struct TransportServer {
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
    port: u16,
    locator: String,
}

impl TransportServer {
    /// Bind the listener without serving yet.
    ///
    /// The endpoint locator is only known once the port is bound, and the
    /// handler usually needs it, so binding and serving are split.
    pub async fn bind(config: TransportConfig) -> TwsResult<BoundListener> {
        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port)
            .parse()
            .map_err(|e| TwsError::Transport(format!("invalid listen address: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TwsError::Transport(format!("failed to bind {addr}: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| TwsError::Transport(e.to_string()))?
            .port();
        let locator = format!("http://{}:{}/{}", config.locator_host(), port, config.endpoint);
        Ok(BoundListener {
            listener,
            config,
            port,
            locator,
        })
    }

    /// Bind and start serving in one step.
    pub async fn start<H: RequestHandler>(config: TransportConfig, handler: H) -> TwsResult<Self> {
        Ok(Self::bind(config).await?.serve(Arc::new(handler)))
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://<host>:<port>/<endpoint>`
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("TinyWebService listener stopped: {}", self.locator);
    }
}

/// A listener whose port and locator are fixed but which is not serving yet.
pub struct BoundListener {
    listener: tokio::net::TcpListener,
    config: TransportConfig,
    port: u16,
    locator: String,
}

impl BoundListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn serve<H: RequestHandler>(self, handler: Arc<H>) -> TransportServer {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            handler,
            verbose: self.config.verbose_logging,
        });

        let app = Router::new()
            .route(
                &format!("/{}/{{*path}}", self.config.endpoint),
                get(get_handler::<H>).post(post_handler::<H>),
            )
            .with_state(state);

        info!("TinyWebService listening on {}", self.locator);

        let listener = self.listener;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        TransportServer {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: self.port,
            locator: self.locator,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn get_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    Path(path): Path<String>,
    Query(params): Query<Params>,
) -> Response {
    dispatch(&state, path, params).await
}

async fn post_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    Path(path): Path<String>,
    Query(mut params): Query<Params>,
    Form(form): Form<Params>,
) -> Response {
    params.extend(form);
    dispatch(&state, path, params).await
}

async fn dispatch<H: RequestHandler>(state: &AppState<H>, path: String, params: Params) -> Response {
    if path == Wire::META {
        return text_response(StatusCode::OK, Wire::META_REPLY.to_string());
    }

    if state.verbose {
        debug!("request {path} ({} params)", params.len());
    }

    match state.handler.handle_request(RequestContext::new(path, params)).await {
        Ok(body) => text_response(StatusCode::OK, body),
        Err(err) => error_response(&err),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn text_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

fn error_response(err: &TwsError) -> Response {
    let kind = err.kind();
    let status = StatusCode::from_u16(kind.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!("call failed: {err}");
    } else {
        debug!("call rejected: {err}");
    }
    let mut response = text_response(status, err.message());
    response
        .headers_mut()
        .insert(Wire::ERROR_HEADER, HeaderValue::from_static(kind.name()));
    response
}
