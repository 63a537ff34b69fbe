//! TinyWebService - Protocol Types
//!
//! Wire vocabulary shared by hosts and clients: object addresses,
//! interface descriptions, reserved path and parameter names, and the
//! error kinds every call can surface. This crate has no runtime; the
//! dispatch and session machinery lives in `tws-runtime`.

pub mod address;
pub mod context;
pub mod error;
pub mod idl;
pub mod wire;

pub use address::Address;
pub use context::{Params, RequestContext};
pub use error::{ErrorKind, TwsError, TwsResult};
pub use idl::{
    InterfaceDesc, InterfaceDescBuilder, MemberDesc, MemberKind, ParamDesc, ScalarKind,
    TypeClass, TypeDesc,
};
pub use wire::Wire;
