//! Server-side dispatch of a member path against one bound object.
//!
//! All segments but the last are read as properties that must yield
//! objects. The last segment is `~detach`, a property read or write, or a
//! method call resolved among same-named overloads by the supplied
//! parameter names and by which overloads can decode the supplied values.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::debug;
use tws_protocol::{Params, TwsError, TwsResult, Wire};

use crate::affinity::AffinityExecutor;
use crate::endpoint::Endpoint;
use crate::interface::{Member, remote_error};
use crate::object::{LocalObject, Outcome};

/// Binds one object for its whole lifetime.
pub struct ObjectDispatcher {
    object: LocalObject,
}

impl ObjectDispatcher {
    pub fn new(object: LocalObject) -> Self {
        Self { object }
    }

    pub fn object(&self) -> &LocalObject {
        &self.object
    }

    pub async fn execute(&self, path: &str, params: Params, cx: &Endpoint) -> TwsResult<Outcome> {
        let mut segments: Vec<&str> = path.split(Wire::PATH_SEPARATOR).collect();
        let leaf = segments.pop().unwrap_or_default();

        let mut current = self.object.clone();
        for segment in &segments {
            current = step(&current, segment, cx).await?;
        }

        if leaf == Wire::DETACH {
            // A walked-to object has no address of its own until registered.
            return Ok(if segments.is_empty() {
                Outcome::Detached
            } else {
                Outcome::Object(current)
            });
        }

        invoke_leaf(&current, leaf, params, cx).await
    }

    pub fn dispose(&self) -> TwsResult<()> {
        self.object.dispose().map_err(remote_error)
    }
}

async fn step(object: &LocalObject, segment: &str, cx: &Endpoint) -> TwsResult<LocalObject> {
    let member = object
        .interface()
        .members_named(segment)
        .find(|m| m.desc.is_property())
        .ok_or_else(|| TwsError::path_not_found(segment))?;
    if let Some(err) = &member.rejection {
        return Err(err.clone());
    }
    match run(member, object, Box::new(()), cx).await? {
        Outcome::Object(child) => Ok(child),
        _ => Err(TwsError::protocol(format!(
            "'{segment}' on {} does not yield an object",
            object.interface_name()
        ))),
    }
}

async fn invoke_leaf(
    object: &LocalObject,
    leaf: &str,
    params: Params,
    cx: &Endpoint,
) -> TwsResult<Outcome> {
    let interface = Arc::clone(object.interface());
    let members: Vec<&Member> = interface.members_named(leaf).collect();
    if members.is_empty() {
        return Err(TwsError::path_not_found(leaf));
    }

    if let Some(property) = members.iter().find(|m| m.desc.is_property()) {
        if let Some(err) = &property.rejection {
            return Err(err.clone());
        }
        return access_property(object, property, params, cx).await;
    }

    let named: Vec<&Member> = members
        .iter()
        .copied()
        .filter(|m| m.desc.takes_exactly(params.keys().map(String::as_str)))
        .collect();
    let mut survivors = Vec::new();
    for member in &named {
        if member.desc.is_generic() || member.rejection.is_some() {
            continue;
        }
        if let Ok(args) = member.handler.decode(&params, cx) {
            survivors.push((*member, args));
        }
    }

    match survivors.len() {
        1 => {
            let (member, args) = survivors.remove(0);
            debug!("dispatch {}.{leaf}", object.interface_name());
            run_handler(&member.handler, object, args, cx).await
        }
        0 if generic_only(&named) || generic_only(&members) => {
            Err(TwsError::unsupported(format!(
                "generic member '{leaf}' cannot be invoked remotely"
            )))
        }
        0 => {
            let mut names: Vec<&str> = params.keys().map(String::as_str).collect();
            names.sort_unstable();
            Err(TwsError::protocol(format!(
                "no overload of '{leaf}' accepts ({})",
                names.join(", ")
            )))
        }
        n => Err(TwsError::protocol(format!(
            "call to '{leaf}' is ambiguous between {n} overloads"
        ))),
    }
}

/// True when every member in a non-empty set is generic.
fn generic_only(members: &[&Member]) -> bool {
    !members.is_empty() && members.iter().all(|m| m.desc.is_generic())
}

async fn access_property(
    object: &LocalObject,
    property: &Member,
    params: Params,
    cx: &Endpoint,
) -> TwsResult<Outcome> {
    let name = &property.desc.name;
    if params.is_empty() {
        return run(property, object, Box::new(()), cx).await;
    }
    if params.len() > 1 || !params.contains_key(Wire::VALUE_PARAM) {
        return Err(TwsError::protocol(format!(
            "property '{name}' accepts only a '{}' parameter",
            Wire::VALUE_PARAM
        )));
    }
    let setter = property
        .setter
        .as_ref()
        .ok_or_else(|| TwsError::protocol(format!("property '{name}' is read-only")))?;
    let value = setter.decode(&params, cx)?;
    run_handler(setter, object, value, cx).await
}

async fn run(
    member: &Member,
    object: &LocalObject,
    args: Box<dyn std::any::Any + Send>,
    cx: &Endpoint,
) -> TwsResult<Outcome> {
    run_handler(&member.handler, object, args, cx).await
}

/// Invoke with panics surfaced as remote errors rather than unwinding
/// through the session.
async fn run_handler(
    handler: &crate::interface::Handler,
    object: &LocalObject,
    args: Box<dyn std::any::Any + Send>,
    cx: &Endpoint,
) -> TwsResult<Outcome> {
    let call = handler.invoke(Arc::clone(object.target()), args, cx.clone());
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "target panicked".into());
            Err(TwsError::remote(message))
        }
    }
}

// ─── Dispatcher ─────────────────────────────────────────────────────────────

/// A registered instance's dispatcher: direct, or pinned to a worker.
#[derive(Clone)]
pub enum Dispatcher {
    Direct(Arc<ObjectDispatcher>),
    Affine(AffinityExecutor),
}

impl Dispatcher {
    /// Objects carrying an affinity are wrapped in an [`AffinityExecutor`].
    pub fn new(object: LocalObject) -> Self {
        match object.affinity().cloned() {
            Some(worker) => {
                Self::Affine(AffinityExecutor::new(ObjectDispatcher::new(object), worker))
            }
            None => Self::Direct(Arc::new(ObjectDispatcher::new(object))),
        }
    }

    pub fn object(&self) -> &LocalObject {
        match self {
            Self::Direct(dispatcher) => dispatcher.object(),
            Self::Affine(executor) => executor.dispatcher().object(),
        }
    }

    pub async fn execute(&self, path: String, params: Params, cx: Endpoint) -> TwsResult<Outcome> {
        match self {
            Self::Direct(dispatcher) => dispatcher.execute(&path, params, &cx).await,
            Self::Affine(executor) => executor.execute(path, params, cx).await,
        }
    }

    pub async fn dispose(&self) -> TwsResult<()> {
        match self {
            Self::Direct(dispatcher) => dispatcher.dispose(),
            Self::Affine(executor) => executor.dispose().await,
        }
    }
}
