//! In-process transport.
//!
//! Routes calls straight into mounted request handlers keyed by endpoint
//! locator, with the same error surface as HTTP: an unmounted locator is a
//! connect error and a slow call is a timeout.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tws_protocol::{Address, Params, RequestContext, TwsError, TwsResult, Wire};

use crate::client::{Transport, wire_params};
use crate::server::RequestHandler;

/// Object-safe wrapper for the RequestHandler trait.
trait RequestHandlerDyn: Send + Sync {
    fn handle_dyn(
        &self,
        request: RequestContext,
    ) -> Pin<Box<dyn Future<Output = TwsResult<String>> + Send + '_>>;
}

impl<T: RequestHandler> RequestHandlerDyn for T {
    fn handle_dyn(
        &self,
        request: RequestContext,
    ) -> Pin<Box<dyn Future<Output = TwsResult<String>> + Send + '_>> {
        Box::pin(self.handle_request(request))
    }
}

#[derive(Clone, Default)]
pub struct LoopbackTransport {
    routes: Arc<DashMap<String, Arc<dyn RequestHandlerDyn>>>,
    execution_timeout: Option<Duration>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    /// Serve `locator` from `handler`. Replaces any previous handler.
    pub fn mount<H: RequestHandler>(&self, locator: impl Into<String>, handler: H) {
        self.routes.insert(locator.into(), Arc::new(handler));
    }

    pub fn unmount(&self, locator: &str) {
        self.routes.remove(locator);
    }

    /// The handler mounted at `target`'s locator. A path-extended locator
    /// falls back to its longest mounted prefix; the remainder is returned
    /// as a member path.
    fn route(&self, target: &Address) -> TwsResult<(Arc<dyn RequestHandlerDyn>, String)> {
        let locator = target.endpoint();
        let mut end = locator.len();
        loop {
            if let Some(entry) = self.routes.get(&locator[..end]) {
                let member = locator[end..].trim_start_matches(Wire::PATH_SEPARATOR);
                return Ok((Arc::clone(entry.value()), member.to_string()));
            }
            match locator[..end].rfind(Wire::PATH_SEPARATOR) {
                Some(i) => end = i,
                None => return Err(TwsError::Connect(locator.to_string())),
            }
        }
    }

    async fn send(&self, target: &Address, path: &str, params: Params) -> TwsResult<String> {
        let (handler, member) = self.route(target)?;
        let path = if member.is_empty() {
            path.to_string()
        } else {
            format!("{member}{}{path}", Wire::PATH_SEPARATOR)
        };
        let request = RequestContext::new(path, wire_params(target, params));
        match self.execution_timeout {
            Some(limit) => tokio::time::timeout(limit, handler.handle_dyn(request))
                .await
                .map_err(|_| TwsError::Timeout(limit.as_millis() as u64))?,
            None => handler.handle_dyn(request).await,
        }
    }
}

impl Transport for LoopbackTransport {
    fn execute<'a>(
        &'a self,
        target: &'a Address,
        path: &'a str,
        params: Params,
    ) -> BoxFuture<'a, TwsResult<String>> {
        Box::pin(async move {
            if path == Wire::META {
                self.route(target)?;
                return Ok(Wire::META_REPLY.to_string());
            }
            self.send(target, path, params).await
        })
    }

    fn probe<'a>(&'a self, target: &'a Address) -> BoxFuture<'a, TwsResult<()>> {
        Box::pin(async move { self.route(target).map(|_| ()) })
    }
}
