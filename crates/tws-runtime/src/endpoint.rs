//! The hosting context shared by dispatchers, stubs and the codec.
//!
//! An [`Endpoint`] owns the outgoing transport and the interface registry,
//! and, when it hosts objects, the [`Session`] and the root address those
//! objects are reachable under. It answers incoming requests as the
//! transport's request handler and serves as codec context: local objects
//! are exported through its session, addresses are imported as stubs over
//! its transport.

use std::sync::Arc;

use tws_protocol::{Address, RequestContext, TwsError, TwsResult};
use tws_transport::{RequestHandler, Transport};

use crate::dispatcher::Dispatcher;
use crate::interface::{InterfaceRegistry, Remotable};
use crate::object::LocalObject;
use crate::session::Session;

struct Hosting {
    address: Address,
    session: Arc<Session>,
}

struct EndpointInner {
    registry: InterfaceRegistry,
    transport: Arc<dyn Transport>,
    hosting: Option<Hosting>,
}

/// Cheap-clone handle; clones share one endpoint.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    /// Endpoint that only makes calls. Local objects cannot be passed from it.
    pub fn client(registry: InterfaceRegistry, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                registry,
                transport,
                hosting: None,
            }),
        }
    }

    /// Endpoint serving `session` under `address`.
    pub fn hosting(
        address: Address,
        session: Arc<Session>,
        registry: InterfaceRegistry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                registry,
                transport,
                hosting: Some(Hosting { address, session }),
            }),
        }
    }

    pub fn registry(&self) -> &InterfaceRegistry {
        &self.inner.registry
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Root address of the hosted objects, if this endpoint hosts any.
    pub fn address(&self) -> Option<&Address> {
        self.inner.hosting.as_ref().map(|h| &h.address)
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.inner.hosting.as_ref().map(|h| &h.session)
    }

    /// Register `object` and return the address it is reachable under.
    pub fn export(&self, object: LocalObject) -> TwsResult<Address> {
        let hosting = self.inner.hosting.as_ref().ok_or_else(|| {
            TwsError::protocol(format!(
                "cannot pass a local {} without a callback listener",
                object.interface_name()
            ))
        })?;
        let id = hosting.session.register_instance(Dispatcher::new(object));
        Ok(hosting.address.with_instance(id))
    }

    /// The local object behind `address`, when this endpoint hosts it.
    pub fn resolve_local<T: Remotable>(&self, address: &Address) -> Option<Arc<T>> {
        let hosting = self.inner.hosting.as_ref()?;
        if address.endpoint() != hosting.address.endpoint() {
            return None;
        }
        hosting
            .session
            .dispatcher(address.instance_id())
            .ok()?
            .object()
            .downcast::<T>()
    }

    /// Dispose every registered instance. Breaks reference cycles between
    /// hosted objects and the stubs they hold.
    pub async fn shutdown(&self) {
        if let Some(session) = self.session() {
            session.clear().await;
        }
    }
}

impl RequestHandler for Endpoint {
    async fn handle_request(&self, request: RequestContext) -> TwsResult<String> {
        match &self.inner.hosting {
            Some(hosting) => hosting.session.execute(request, &hosting.address, self).await,
            None => Err(TwsError::protocol("endpoint hosts no objects")),
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address().map(ToString::to_string))
            .finish()
    }
}
