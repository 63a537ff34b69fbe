//! Outgoing calls.
//!
//! [`Transport`] is the request/response channel the runtime sends calls
//! through. [`HttpTransport`] talks to a [`TransportServer`](crate::TransportServer)
//! over HTTP; [`LoopbackTransport`](crate::LoopbackTransport) routes in-process.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use tracing::debug;
use tws_protocol::{Address, Params, TwsError, TwsResult, Wire};

/// Request/response channel keyed by member path and flat parameters.
pub trait Transport: Send + Sync + 'static {
    /// Invoke `path` on the object at `target`, returning the response text.
    fn execute<'a>(
        &'a self,
        target: &'a Address,
        path: &'a str,
        params: Params,
    ) -> BoxFuture<'a, TwsResult<String>>;

    /// Fail fast with [`TwsError::Connect`] if nothing answers at `target`.
    fn probe<'a>(&'a self, target: &'a Address) -> BoxFuture<'a, TwsResult<()>>;
}

/// Parameters as sent on the wire: arguments plus the instance id, if any.
pub fn wire_params(target: &Address, mut params: Params) -> Params {
    if let Some(id) = target.instance_id() {
        params.insert(Wire::INSTANCE_PARAM.to_string(), id.to_string());
    }
    params
}

/// HTTP transport built on reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    execution_timeout: Duration,
    connect_timeout: Duration,
}

impl HttpTransport {
    pub fn new(execution_timeout: Duration, connect_timeout: Duration) -> TwsResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TwsError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            execution_timeout,
            connect_timeout,
        })
    }

    async fn send(&self, target: &Address, path: &str, params: Params) -> TwsResult<String> {
        let url = target.member_url(path);
        let params = wire_params(target, params);
        debug!("-> {url} ({} params)", params.len());

        // Bodiless form for zero-parameter calls.
        let request = if params.is_empty() {
            self.client.get(&url)
        } else {
            self.client.post(&url).form(&params)
        };

        let response = request
            .timeout(self.execution_timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e, &url))?;

        let status = response.status();
        let kind = response
            .headers()
            .get(Wire::ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| self.map_error(e, &url))?;

        if status.is_success() {
            Ok(body)
        } else if status == StatusCode::NOT_FOUND && kind.is_none() {
            Err(TwsError::protocol(format!("no endpoint at {url}")))
        } else {
            Err(TwsError::from_wire(kind.as_deref(), body))
        }
    }

    async fn send_probe(&self, target: &Address) -> TwsResult<()> {
        let url = target.member_url(Wire::META);
        let response = self
            .client
            .get(&url)
            .timeout(self.connect_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    TwsError::Connect(format!("{url}: {e}"))
                } else {
                    TwsError::Transport(e.to_string())
                }
            })?;
        let body = response
            .text()
            .await
            .map_err(|e| TwsError::Transport(e.to_string()))?;
        if body == Wire::META_REPLY {
            Ok(())
        } else {
            Err(TwsError::Connect(format!("{url} is not a TinyWebService endpoint")))
        }
    }

    fn map_error(&self, err: reqwest::Error, url: &str) -> TwsError {
        if err.is_connect() {
            TwsError::Connect(url.to_string())
        } else if err.is_timeout() {
            TwsError::Timeout(self.execution_timeout.as_millis() as u64)
        } else {
            TwsError::Transport(err.to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        target: &'a Address,
        path: &'a str,
        params: Params,
    ) -> BoxFuture<'a, TwsResult<String>> {
        Box::pin(self.send(target, path, params))
    }

    fn probe<'a>(&'a self, target: &'a Address) -> BoxFuture<'a, TwsResult<()>> {
        Box::pin(self.send_probe(target))
    }
}
