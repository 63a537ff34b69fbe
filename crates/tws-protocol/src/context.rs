//! Request context: the path and flat parameter set of one call.
//!
//! The transport builds a [`RequestContext`] per HTTP request and hands it to
//! the request handler. The reserved instance-id parameter is lifted out of
//! the parameter set here so nothing downstream mistakes it for an argument.

use std::collections::BTreeMap;

use crate::wire::{Wire, is_reserved};

/// Flat name → value parameter set.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Slash-separated member path relative to the endpoint.
    pub path: String,
    /// Target instance; `None` addresses the root object.
    pub instance_id: Option<String>,
    /// Call arguments, with reserved keys removed.
    pub params: Params,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, mut params: Params) -> Self {
        let instance_id = params.remove(Wire::INSTANCE_PARAM);
        params.retain(|name, _| !is_reserved(name));
        Self {
            path: path.into(),
            instance_id,
            params,
        }
    }
}
