//! TinyWebService Runtime
//!
//! Turns plain Rust objects into remotely callable endpoints and remote
//! endpoints back into typed proxies:
//! - `codec`: the type-directed value codec ([`WireType`])
//! - `interface`: remotable types and their described members
//! - `dispatcher`: member path resolution and overload selection
//! - `affinity`: single-worker execution for thread-bound objects
//! - `session`: registered instances and their sliding expiration
//! - `proxy`: client stubs that check calls before they are sent
//! - `service`: hosts and clients over HTTP or in process

pub mod affinity;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod interface;
pub mod object;
pub mod proxy;
pub mod service;
pub mod session;

// Used by `wire_enum!` and `wire_data!` expansions.
pub use serde_json;
pub use tws_protocol;

pub use affinity::{Affinity, AffinityExecutor};
pub use codec::{WireArgs, WireType, ty};
pub use config::{CallbackConfig, ClientConfig, HostConfig};
pub use dispatcher::{Dispatcher, ObjectDispatcher};
pub use endpoint::Endpoint;
pub use interface::{Capability, InterfaceBuilder, InterfaceRegistry, Remotable, describe_remotable};
pub use object::{LocalObject, Outcome};
pub use proxy::{Call, Proxy, ProxyStub, StubPlan};
pub use service::{HostBuilder, ServiceHost, TinyClient, TinyService};
pub use session::Session;
