//! TinyWebService Transport Layer
//!
//! Moves calls between a caller and a hosted endpoint:
//! - `server`: the Axum listener serving one endpoint name
//! - `client`: the [`Transport`] trait and its reqwest implementation
//! - `loopback`: in-process routing with the same error surface
//!
//! The transport knows nothing about objects or sessions; it is decoupled
//! from the runtime via the `RequestHandler` and `Transport` traits.

pub mod client;
pub mod loopback;
pub mod server;

pub use client::{HttpTransport, Transport};
pub use loopback::LoopbackTransport;
pub use server::{BoundListener, RequestHandler, TransportConfig, TransportServer};
