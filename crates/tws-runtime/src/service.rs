//! Hosting and connecting.
//!
//! [`TinyService::host`] publishes a root object under an endpoint name,
//! over HTTP or an in-process [`LoopbackTransport`]. [`TinyClient`] builds
//! proxies to hosted objects and, when configured with a callback listener,
//! hosts the local objects it passes by reference so servers can call back.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;
use tws_protocol::{Address, TwsError, TwsResult};
use tws_transport::{HttpTransport, LoopbackTransport, Transport, TransportConfig, TransportServer};

use crate::affinity::Affinity;
use crate::config::{CallbackConfig, ClientConfig, DEFAULT_CONNECT_TIMEOUT, HostConfig};
use crate::dispatcher::Dispatcher;
use crate::endpoint::Endpoint;
use crate::interface::{Capability, InterfaceRegistry, Remotable};
use crate::object::LocalObject;
use crate::proxy::Proxy;
use crate::session::Session;

/// Entry point for publishing objects.
pub struct TinyService;

impl TinyService {
    pub fn host<T: Remotable>(root: Arc<T>) -> HostBuilder<T> {
        HostBuilder {
            root,
            config: HostConfig::default(),
            registry: InterfaceRegistry::new(),
        }
    }
}

fn check_endpoint_name(name: &str) -> TwsResult<()> {
    if name.is_empty() || name.contains(['/', '~']) {
        return Err(TwsError::format(format!(
            "'{name}' is not a valid endpoint name"
        )));
    }
    Ok(())
}

enum Listener {
    Http(TransportServer),
    Loopback(LoopbackTransport),
}

impl Listener {
    async fn stop(self, locator: &str) {
        match self {
            Self::Http(mut server) => server.stop().await,
            Self::Loopback(transport) => transport.unmount(locator),
        }
    }
}

// ─── Host ───────────────────────────────────────────────────────────────────

pub struct HostBuilder<T> {
    root: Arc<T>,
    config: HostConfig,
    registry: InterfaceRegistry,
}

impl<T: Remotable> HostBuilder<T> {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn allow_external(mut self, allow: bool) -> Self {
        self.config.allow_external = allow;
        self
    }

    pub fn retention(mut self, retention: std::time::Duration) -> Self {
        self.config.retention = retention;
        self
    }

    pub fn execution_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.execution_timeout = timeout;
        self
    }

    /// Run the root object, and everything it creates, on one worker.
    pub fn with_affinity(mut self, affinity: bool) -> Self {
        self.config.affinity = affinity;
        self
    }

    /// Share interface descriptions with other hosts and clients.
    pub fn registry(mut self, registry: InterfaceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Start serving the root object at `http://<host>:<port>/<name>`.
    pub async fn at_endpoint(self, name: &str) -> TwsResult<ServiceHost> {
        check_endpoint_name(name)?;
        let transport_config = TransportConfig {
            port: self.config.port,
            endpoint: name.to_string(),
            verbose_logging: self.config.verbose_logging,
            ..TransportConfig::default()
        }
        .allow_external(self.config.allow_external);

        let listener = TransportServer::bind(transport_config).await?;
        let outgoing = HttpTransport::new(self.config.execution_timeout, DEFAULT_CONNECT_TIMEOUT)?;
        let address = Address::root(listener.locator())?;
        let (endpoint, session, sweeper) =
            self.start(name, address.clone(), Arc::new(outgoing))?;
        let server = listener.serve(Arc::new(endpoint.clone()));

        Ok(ServiceHost {
            address,
            endpoint,
            session,
            port: Some(server.port()),
            listener: Some(Listener::Http(server)),
            sweeper,
        })
    }

    /// Serve the root object in process, reachable through `transport` at
    /// `loopback://<name>`. Outgoing calls travel over the same transport.
    pub fn in_process(self, transport: &LoopbackTransport, name: &str) -> TwsResult<ServiceHost> {
        check_endpoint_name(name)?;
        let address = Address::root(format!("loopback://{name}"))?;
        let (endpoint, session, sweeper) =
            self.start(name, address.clone(), Arc::new(transport.clone()))?;
        transport.mount(address.endpoint(), endpoint.clone());
        info!("TinyWebService serving {address} in process");

        Ok(ServiceHost {
            address,
            endpoint,
            session,
            port: None,
            listener: Some(Listener::Loopback(transport.clone())),
            sweeper,
        })
    }

    fn start(
        self,
        name: &str,
        address: Address,
        transport: Arc<dyn Transport>,
    ) -> TwsResult<(Endpoint, Arc<Session>, JoinHandle<()>)> {
        let mut root = LocalObject::new(self.root, &self.registry);
        if self.config.affinity && root.affinity().is_none() {
            root = root.with_affinity(Affinity::spawn(format!("tws-{name}"))?);
        }
        let session = Arc::new(Session::new(
            Some(Dispatcher::new(root)),
            self.config.retention,
        ));
        let sweeper = session.spawn_sweeper();
        let endpoint = Endpoint::hosting(address, Arc::clone(&session), self.registry, transport);
        Ok((endpoint, session, sweeper))
    }
}

/// A running host. Dropping it leaves the listener running until the
/// runtime shuts down; call [`shutdown`](Self::shutdown) to stop it.
pub struct ServiceHost {
    address: Address,
    endpoint: Endpoint,
    session: Arc<Session>,
    port: Option<u16>,
    listener: Option<Listener>,
    sweeper: JoinHandle<()>,
}

impl ServiceHost {
    /// Address of the root object.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn locator(&self) -> &str {
        self.address.endpoint()
    }

    /// Bound port; `None` for in-process hosts.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stop accepting calls and dispose every registered instance.
    pub async fn shutdown(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop(self.address.endpoint()).await;
        }
        self.sweeper.abort();
        self.endpoint.shutdown().await;
    }
}

// ─── Client ─────────────────────────────────────────────────────────────────

/// Calls hosted objects through typed proxies.
pub struct TinyClient {
    endpoint: Endpoint,
    listener: Option<Listener>,
    sweeper: Option<JoinHandle<()>>,
}

impl TinyClient {
    pub async fn new(config: ClientConfig) -> TwsResult<Self> {
        Self::with_registry(config, InterfaceRegistry::new()).await
    }

    pub async fn with_registry(config: ClientConfig, registry: InterfaceRegistry) -> TwsResult<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
            config.execution_timeout,
            config.connect_timeout,
        )?);
        let Some(callback) = config.callback else {
            return Ok(Self::over(transport, registry));
        };

        let name = uuid::Uuid::new_v4().simple().to_string();
        let transport_config = TransportConfig {
            port: callback.port,
            endpoint: name,
            ..TransportConfig::default()
        }
        .allow_external(callback.allow_external);
        let listener = TransportServer::bind(transport_config).await?;
        let address = Address::root(listener.locator())?;
        let (endpoint, sweeper) = callback_endpoint(&callback, address, registry, transport);
        let server = listener.serve(Arc::new(endpoint.clone()));

        Ok(Self {
            endpoint,
            listener: Some(Listener::Http(server)),
            sweeper: Some(sweeper),
        })
    }

    /// Client without a callback listener, calling through `transport`.
    pub fn over(transport: Arc<dyn Transport>, registry: InterfaceRegistry) -> Self {
        Self {
            endpoint: Endpoint::client(registry, transport),
            listener: None,
            sweeper: None,
        }
    }

    /// In-process client. With `callback`, local objects it passes are
    /// hosted at `loopback://<callback name>`.
    pub fn in_process(
        transport: &LoopbackTransport,
        registry: InterfaceRegistry,
        callback: Option<(&str, CallbackConfig)>,
    ) -> TwsResult<Self> {
        let outgoing: Arc<dyn Transport> = Arc::new(transport.clone());
        let Some((name, callback)) = callback else {
            return Ok(Self::over(outgoing, registry));
        };
        check_endpoint_name(name)?;
        let address = Address::root(format!("loopback://{name}"))?;
        let (endpoint, sweeper) = callback_endpoint(&callback, address.clone(), registry, outgoing);
        transport.mount(address.endpoint(), endpoint.clone());

        Ok(Self {
            endpoint,
            listener: Some(Listener::Loopback(transport.clone())),
            sweeper: Some(sweeper),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Address of the callback listener, if any.
    pub fn callback_address(&self) -> Option<&Address> {
        self.endpoint.address()
    }

    /// Probe the endpoint with `~meta`, then bind a proxy to `address`.
    pub async fn connect<I: Capability>(&self, address: &Address) -> TwsResult<Proxy<I>> {
        self.endpoint.transport().probe(address).await?;
        Ok(Proxy::bind(&self.endpoint, address.clone()))
    }

    /// Connect to the root object of `http://<host>:<port>/<name>`.
    pub async fn connect_to<I: Capability>(
        &self,
        host: &str,
        port: u16,
        name: &str,
    ) -> TwsResult<Proxy<I>> {
        check_endpoint_name(name)?;
        let address = Address::root(format!("http://{host}:{port}/{name}"))?;
        self.connect(&address).await
    }

    /// Bind a proxy without probing.
    pub fn bind<I: Capability>(&self, address: Address) -> Proxy<I> {
        Proxy::bind(&self.endpoint, address)
    }

    /// Stop the callback listener and dispose the objects it hosts.
    pub async fn shutdown(mut self) {
        if let (Some(listener), Some(address)) = (self.listener.take(), self.endpoint.address()) {
            listener.stop(address.endpoint()).await;
        }
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        self.endpoint.shutdown().await;
    }
}

fn callback_endpoint(
    callback: &CallbackConfig,
    address: Address,
    registry: InterfaceRegistry,
    transport: Arc<dyn Transport>,
) -> (Endpoint, JoinHandle<()>) {
    let session = Arc::new(Session::new(None, callback.retention));
    let sweeper = session.spawn_sweeper();
    (Endpoint::hosting(address, session, registry, transport), sweeper)
}
