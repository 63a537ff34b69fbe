//! Type-erased local objects and invocation outcomes.

use std::any::Any;
use std::sync::Arc;

use crate::affinity::Affinity;
use crate::interface::{Interface, InterfaceRegistry, Remotable};

/// Erased target of a dispatcher.
pub type Target = Arc<dyn Any + Send + Sync>;

/// A local object together with the interface used to dispatch to it.
#[derive(Clone)]
pub struct LocalObject {
    target: Target,
    interface: Arc<Interface>,
    affinity: Option<Affinity>,
}

impl LocalObject {
    /// Wrap `target`. An object minted on an affinity worker stays on that
    /// worker unless it declares its own.
    pub fn new<T: Remotable>(target: Arc<T>, registry: &InterfaceRegistry) -> Self {
        let affinity = target.affinity().or_else(Affinity::current);
        Self {
            interface: registry.interface::<T>(),
            target,
            affinity,
        }
    }

    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = Some(affinity);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn interface(&self) -> &Arc<Interface> {
        &self.interface
    }

    pub fn interface_name(&self) -> &str {
        &self.interface.desc().name
    }

    pub fn affinity(&self) -> Option<&Affinity> {
        self.affinity.as_ref()
    }

    /// Downcast to the concrete type, if it is `T`.
    pub fn downcast<T: Remotable>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.target).downcast::<T>().ok()
    }

    pub fn dispose(&self) -> anyhow::Result<()> {
        self.interface.dispose(&self.target)
    }
}

impl std::fmt::Debug for LocalObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalObject")
            .field("interface", &self.interface_name())
            .field("affine", &self.affinity.is_some())
            .finish()
    }
}

/// What an invocation produced.
#[derive(Debug)]
pub enum Outcome {
    /// Serialized value, returned as is.
    Value(String),
    /// Object that must be registered; the caller receives its address.
    Object(LocalObject),
    /// `~detach`: the caller receives the invoked instance's own address.
    Detached,
}
