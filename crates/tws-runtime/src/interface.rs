//! Remotable types, their described interfaces, and the registry caching them.
//!
//! A type opts in to remoting by implementing [`Remotable`] and listing its
//! members on an [`InterfaceBuilder`]. The builder turns each member into a
//! decoder for its named arguments plus an erased invoker, so a dispatcher
//! can resolve overloads without knowing the concrete type. Members whose
//! shapes cannot cross the boundary are recorded with their rejection when
//! the interface is described and never dispatched.

use std::any::{Any, TypeId};
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tws_protocol::{
    InterfaceDesc, MemberDesc, MemberKind, ParamDesc, Params, TwsError, TwsResult, TypeDesc, Wire,
};

use crate::affinity::Affinity;
use crate::codec::{WireArgs, WireType};
use crate::endpoint::Endpoint;
use crate::object::{Outcome, Target};
use crate::proxy::StubPlan;

/// A server-side type whose instances can be invoked remotely.
pub trait Remotable: Send + Sync + 'static {
    /// Interface name carried in type descriptions.
    const NAME: &'static str;

    fn describe(builder: &mut InterfaceBuilder<Self>)
    where
        Self: Sized;

    /// Worker this object must run on. Objects without one inherit the
    /// worker they were created on, if any.
    fn affinity(&self) -> Option<Affinity> {
        None
    }

    /// Called once when the instance is evicted or disposed.
    fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A client's view of a remote interface.
pub trait Capability: Send + Sync + 'static {
    const NAME: &'static str;

    fn describe() -> InterfaceDesc;
}

/// Description of a remotable type, for reusing it as a capability.
pub fn describe_remotable<T: Remotable>() -> InterfaceDesc {
    Interface::of::<T>().desc
}

// ─── Members ────────────────────────────────────────────────────────────────

type Args = Box<dyn Any + Send>;
type DecodeFn = Box<dyn Fn(&Params, &Endpoint) -> TwsResult<Args> + Send + Sync>;
type Invocation = BoxFuture<'static, TwsResult<Outcome>>;
type InvokeFn = Box<dyn Fn(Target, Args, Endpoint) -> Invocation + Send + Sync>;

pub(crate) struct Handler {
    decode: DecodeFn,
    invoke: InvokeFn,
}

impl Handler {
    pub(crate) fn decode(&self, params: &Params, cx: &Endpoint) -> TwsResult<Args> {
        (self.decode)(params, cx)
    }

    pub(crate) fn invoke(&self, target: Target, args: Args, cx: Endpoint) -> Invocation {
        (self.invoke)(target, args, cx)
    }
}

pub(crate) struct Member {
    pub(crate) desc: MemberDesc,
    pub(crate) rejection: Option<TwsError>,
    pub(crate) handler: Handler,
    pub(crate) setter: Option<Handler>,
}

fn downcast<T: Remotable>(target: Target) -> TwsResult<Arc<T>> {
    target
        .downcast::<T>()
        .map_err(|_| TwsError::protocol(format!("target is not a {}", T::NAME)))
}

fn downcast_args<A: 'static>(args: Args) -> TwsResult<A> {
    args.downcast::<A>()
        .map(|boxed| *boxed)
        .map_err(|_| TwsError::protocol("argument shape mismatch"))
}

/// Target failures reach the caller with their message.
pub(crate) fn remote_error(err: anyhow::Error) -> TwsError {
    TwsError::remote(format!("{err:#}"))
}

// ─── Builder ────────────────────────────────────────────────────────────────

pub struct InterfaceBuilder<T> {
    members: Vec<Member>,
    _target: std::marker::PhantomData<fn(&T)>,
}

impl<T: Remotable> InterfaceBuilder<T> {
    fn new() -> Self {
        Self {
            members: Vec::new(),
            _target: std::marker::PhantomData,
        }
    }

    /// Read-only property.
    pub fn property<R, G>(&mut self, name: &'static str, get: G) -> &mut Self
    where
        R: WireType,
        G: Fn(&T) -> R + Send + Sync + 'static,
    {
        let desc = MemberDesc {
            name: name.into(),
            kind: MemberKind::Property {
                ty: R::describe(),
                writable: false,
            },
        };
        self.push(desc, getter(get), None)
    }

    /// Property written by sending a `value` parameter.
    pub fn property_mut<R, G, S>(&mut self, name: &'static str, get: G, set: S) -> &mut Self
    where
        R: WireType,
        G: Fn(&T) -> R + Send + Sync + 'static,
        S: Fn(&T, R) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let desc = MemberDesc {
            name: name.into(),
            kind: MemberKind::Property {
                ty: R::describe(),
                writable: true,
            },
        };
        let set = Arc::new(set);
        let setter = Handler {
            decode: Box::new(|params: &Params, cx: &Endpoint| {
                let text = params
                    .get(Wire::VALUE_PARAM)
                    .ok_or_else(|| TwsError::format("missing parameter 'value'"))?;
                Ok(Box::new(R::decode(text, cx)?) as Args)
            }),
            invoke: Box::new(move |target: Target, args: Args, _cx: Endpoint| -> Invocation {
                let set = Arc::clone(&set);
                Box::pin(async move {
                    let target = downcast::<T>(target)?;
                    let value = downcast_args::<R>(args)?;
                    set(&target, value).map_err(remote_error)?;
                    Ok(Outcome::Value(String::new()))
                })
            }),
        };
        self.push(desc, getter(get), Some(setter))
    }

    /// Synchronous method taking named arguments.
    pub fn method<A, R, F, const N: usize>(
        &mut self,
        name: &'static str,
        params: [&'static str; N],
        f: F,
    ) -> &mut Self
    where
        A: WireArgs<N>,
        R: WireType,
        F: Fn(&T, A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let desc = method_desc::<A, R, N>(name, params, false);
        let f = Arc::new(f);
        let handler = Handler {
            decode: Box::new(move |p: &Params, cx: &Endpoint| {
                Ok(Box::new(A::decode(&params, p, cx)?) as Args)
            }),
            invoke: Box::new(move |target: Target, args: Args, cx: Endpoint| -> Invocation {
                let f = Arc::clone(&f);
                Box::pin(async move {
                    let target = downcast::<T>(target)?;
                    let args = downcast_args::<A>(args)?;
                    f(&target, args).map_err(remote_error)?.into_outcome(&cx)
                })
            }),
        };
        self.push(desc, handler, None)
    }

    /// Method completing asynchronously. The dispatcher awaits it before
    /// the result crosses the boundary.
    pub fn method_async<A, R, F, Fut, const N: usize>(
        &mut self,
        name: &'static str,
        params: [&'static str; N],
        f: F,
    ) -> &mut Self
    where
        A: WireArgs<N>,
        R: WireType,
        F: Fn(Arc<T>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let desc = method_desc::<A, R, N>(name, params, true);
        let f = Arc::new(f);
        let handler = Handler {
            decode: Box::new(move |p: &Params, cx: &Endpoint| {
                Ok(Box::new(A::decode(&params, p, cx)?) as Args)
            }),
            invoke: Box::new(move |target: Target, args: Args, cx: Endpoint| -> Invocation {
                let f = Arc::clone(&f);
                Box::pin(async move {
                    let target = downcast::<T>(target)?;
                    let args = downcast_args::<A>(args)?;
                    f(target, args).await.map_err(remote_error)?.into_outcome(&cx)
                })
            }),
        };
        self.push(desc, handler, None)
    }

    /// Member taking type arguments. Described, never invocable.
    pub fn generic_method<const N: usize>(
        &mut self,
        name: &'static str,
        params: [(&'static str, TypeDesc); N],
        returns: TypeDesc,
    ) -> &mut Self {
        let desc = MemberDesc {
            name: name.into(),
            kind: MemberKind::Method {
                params: params
                    .into_iter()
                    .map(|(name, ty)| ParamDesc {
                        name: name.into(),
                        ty,
                    })
                    .collect(),
                returns,
                generic: true,
                deferred: false,
            },
        };
        let handler = Handler {
            decode: Box::new(move |_: &Params, _: &Endpoint| {
                Err(TwsError::unsupported(format!("generic member '{name}'")))
            }),
            invoke: Box::new(move |_: Target, _: Args, _: Endpoint| -> Invocation {
                Box::pin(async move {
                    Err(TwsError::unsupported(format!("generic member '{name}'")))
                })
            }),
        };
        self.push(desc, handler, None)
    }

    fn push(&mut self, desc: MemberDesc, handler: Handler, setter: Option<Handler>) -> &mut Self {
        let rejection = desc.rejection();
        self.members.push(Member {
            desc,
            rejection,
            handler,
            setter,
        });
        self
    }
}

fn getter<T, R, G>(get: G) -> Handler
where
    T: Remotable,
    R: WireType,
    G: Fn(&T) -> R + Send + Sync + 'static,
{
    let get = Arc::new(get);
    Handler {
        decode: Box::new(|_: &Params, _: &Endpoint| Ok(Box::new(()) as Args)),
        invoke: Box::new(move |target: Target, _args: Args, cx: Endpoint| -> Invocation {
            let get = Arc::clone(&get);
            Box::pin(async move {
                let target = downcast::<T>(target)?;
                get(&target).into_outcome(&cx)
            })
        }),
    }
}

fn method_desc<A, R, const N: usize>(
    name: &'static str,
    params: [&'static str; N],
    deferred: bool,
) -> MemberDesc
where
    A: WireArgs<N>,
    R: WireType,
{
    MemberDesc {
        name: name.into(),
        kind: MemberKind::Method {
            params: A::describe(params)
                .into_iter()
                .map(|(name, ty)| ParamDesc {
                    name: name.into(),
                    ty,
                })
                .collect(),
            returns: R::describe(),
            generic: false,
            deferred,
        },
    }
}

// ─── Interface ──────────────────────────────────────────────────────────────

type ErasedDispose = Box<dyn Fn(&Target) -> anyhow::Result<()> + Send + Sync>;

/// Described members of one remotable type, with their invokers.
pub struct Interface {
    desc: InterfaceDesc,
    members: Vec<Member>,
    dispose: ErasedDispose,
}

impl Interface {
    pub fn of<T: Remotable>() -> Self {
        let mut builder = InterfaceBuilder::<T>::new();
        T::describe(&mut builder);
        let members = builder.members;
        Self {
            desc: InterfaceDesc {
                name: T::NAME.into(),
                members: members.iter().map(|m| m.desc.clone()).collect(),
            },
            members,
            dispose: Box::new(|target: &Target| match target.downcast_ref::<T>() {
                Some(target) => target.dispose(),
                None => Ok(()),
            }),
        }
    }

    pub fn desc(&self) -> &InterfaceDesc {
        &self.desc
    }

    pub(crate) fn members_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Member> + 'a {
        self.members.iter().filter(move |m| m.desc.name == name)
    }

    pub(crate) fn dispose(&self, target: &Target) -> anyhow::Result<()> {
        (self.dispose)(target)
    }
}

// ─── Registry ───────────────────────────────────────────────────────────────

/// Caches one [`Interface`] per remotable type and one [`StubPlan`] per
/// capability. Owned by the hosting application and handed to hosts and
/// clients explicitly.
#[derive(Clone, Default)]
pub struct InterfaceRegistry {
    interfaces: Arc<DashMap<TypeId, Arc<Interface>>>,
    plans: Arc<DashMap<TypeId, Arc<StubPlan>>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interface<T: Remotable>(&self) -> Arc<Interface> {
        self.interfaces
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(Interface::of::<T>()))
            .clone()
    }

    pub fn plan<I: Capability>(&self) -> Arc<StubPlan> {
        self.plans
            .entry(TypeId::of::<I>())
            .or_insert_with(|| Arc::new(StubPlan::new(I::describe())))
            .clone()
    }
}
