//! Client-side stubs.
//!
//! A [`ProxyStub`] is bound to an address and a member path prefix, and
//! checks every call against its capability's description before anything
//! is sent: an unknown member or a signature no overload accepts fails with
//! a protocol error, a generic member with an unsupported-operation error.
//! Stubs hold no open/closed state; only server-side disposal ends their
//! usefulness.

use std::any::TypeId;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use tws_protocol::{
    Address, InterfaceDesc, MemberDesc, MemberKind, Params, TwsError, TwsResult, TypeDesc, Wire,
};

use crate::codec::WireType;
use crate::endpoint::Endpoint;
use crate::interface::Capability;

// ─── Plan ───────────────────────────────────────────────────────────────────

/// A capability description with each member's rejection computed once.
pub struct StubPlan {
    desc: InterfaceDesc,
    rejections: Vec<Option<TwsError>>,
}

impl StubPlan {
    pub fn new(desc: InterfaceDesc) -> Self {
        let rejections = desc.members.iter().map(MemberDesc::rejection).collect();
        Self { desc, rejections }
    }

    pub fn desc(&self) -> &InterfaceDesc {
        &self.desc
    }

    fn members_named<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = (&'a MemberDesc, &'a Option<TwsError>)> {
        self.desc
            .members
            .iter()
            .zip(&self.rejections)
            .filter(move |(m, _)| m.name == name)
    }

    fn property(&self, name: &str) -> TwsResult<&MemberDesc> {
        let (member, rejection) = self
            .members_named(name)
            .find(|(m, _)| m.is_property())
            .ok_or_else(|| self.not_found(name))?;
        match rejection {
            Some(err) => Err(err.clone()),
            None => Ok(member),
        }
    }

    fn method(&self, name: &str, args: &[(String, TypeDesc)]) -> TwsResult<&MemberDesc> {
        let methods: Vec<_> = self
            .members_named(name)
            .filter(|(m, _)| !m.is_property())
            .collect();
        if methods.is_empty() {
            return Err(self.not_found(name));
        }

        let matching: Vec<_> = methods
            .iter()
            .copied()
            .filter(|(m, _)| {
                !m.is_generic()
                    && m.takes_exactly(args.iter().map(|(n, _)| n.as_str()))
                    && args.iter().all(|(arg, ty)| {
                        m.params()
                            .iter()
                            .any(|p| &p.name == arg && compatible(&p.ty, ty))
                    })
            })
            .collect();

        match matching.as_slice() {
            [(member, None)] => Ok(*member),
            [(_, Some(err))] => Err(err.clone()),
            [] => Err(self.no_overload(name, &methods, args)),
            many => Err(TwsError::protocol(format!(
                "call to '{name}' is ambiguous between {} overloads",
                many.len()
            ))),
        }
    }

    fn no_overload(
        &self,
        name: &str,
        methods: &[(&MemberDesc, &Option<TwsError>)],
        args: &[(String, TypeDesc)],
    ) -> TwsError {
        let names: Vec<&str> = args.iter().map(|(n, _)| n.as_str()).collect();
        let named: Vec<_> = methods
            .iter()
            .copied()
            .filter(|(m, _)| m.takes_exactly(names.iter().copied()))
            .collect();
        for set in [named.as_slice(), methods] {
            if !set.is_empty() && set.iter().all(|(m, _)| m.is_generic()) {
                if let Some((_, Some(err))) = set.first() {
                    return err.clone();
                }
            }
        }
        TwsError::protocol(format!(
            "no overload of '{name}' on {} accepts ({})",
            self.desc.name,
            names.join(", ")
        ))
    }

    fn not_found(&self, name: &str) -> TwsError {
        TwsError::protocol(format!("{} has no member '{name}'", self.desc.name))
    }
}

/// Shapes match when equal, treating any two remote references alike.
/// Capabilities are structural: a stub for one interface may stand in for
/// another over the same object.
fn compatible(declared: &TypeDesc, actual: &TypeDesc) -> bool {
    match (strip_remote(declared), strip_remote(actual)) {
        (TypeDesc::Remote { .. }, TypeDesc::Remote { .. }) => true,
        (TypeDesc::Nullable(a), TypeDesc::Nullable(b))
        | (TypeDesc::Collection(a), TypeDesc::Collection(b)) => compatible(a, b),
        (a, b) => a == b,
    }
}

fn strip_remote(ty: &TypeDesc) -> &TypeDesc {
    match ty {
        TypeDesc::Nullable(inner) if matches!(**inner, TypeDesc::Remote { .. }) => inner,
        other => other,
    }
}

// ─── ProxyStub ──────────────────────────────────────────────────────────────

struct StubInner {
    endpoint: Endpoint,
    address: Address,
    prefix: String,
    plan: Arc<StubPlan>,
    children: DashMap<(String, TypeId), ProxyStub>,
}

/// Untyped stub. Clones share one stub, including its child cache.
#[derive(Clone)]
pub struct ProxyStub {
    inner: Arc<StubInner>,
}

impl ProxyStub {
    pub fn new(endpoint: &Endpoint, address: Address, plan: Arc<StubPlan>) -> Self {
        Self::with_prefix(endpoint, address, String::new(), plan)
    }

    fn with_prefix(
        endpoint: &Endpoint,
        address: Address,
        prefix: String,
        plan: Arc<StubPlan>,
    ) -> Self {
        Self {
            inner: Arc::new(StubInner {
                endpoint: endpoint.clone(),
                address,
                prefix,
                plan,
                children: DashMap::new(),
            }),
        }
    }

    /// Address of the bound instance. Property stubs share their parent's;
    /// use [`detach`](Self::detach) for the object's own address, or
    /// [`member_address`](Self::member_address) to route through the parent.
    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    /// The parent's address extended by this stub's member path.
    pub fn member_address(&self) -> Address {
        self.inner.address.member(&self.inner.prefix)
    }

    /// Member path prefix, empty unless this stub was reached through properties.
    pub fn path_prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub fn interface(&self) -> &InterfaceDesc {
        self.inner.plan.desc()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn ptr_eq(&self, other: &ProxyStub) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a property.
    pub async fn get<R: WireType>(&self, name: &str) -> TwsResult<R> {
        let member = self.inner.plan.property(name)?;
        check_result::<R>(member)?;
        let text = self.send(name, Params::new()).await?;
        R::decode(&text, &self.inner.endpoint)
    }

    /// Write a property.
    pub async fn set<V: WireType>(&self, name: &str, value: V) -> TwsResult<()> {
        let member = self.inner.plan.property(name)?;
        match &member.kind {
            MemberKind::Property { writable: true, ty } if compatible(ty, &V::describe()) => {}
            MemberKind::Property { writable: true, ty } => {
                return Err(TwsError::protocol(format!(
                    "property '{name}' holds {}, not {}",
                    ty.label(),
                    V::describe().label()
                )));
            }
            _ => return Err(TwsError::protocol(format!("property '{name}' is read-only"))),
        }
        let mut params = Params::new();
        params.insert(
            Wire::VALUE_PARAM.to_string(),
            value.encode(&self.inner.endpoint)?,
        );
        self.send(name, params).await?;
        Ok(())
    }

    /// Start a method call; add arguments with [`Call::arg`].
    pub fn call(&self, name: &str) -> Call<'_> {
        Call {
            stub: self,
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// Stub for an object-valued property, reached by extending the member
    /// path. Built without a round trip and cached per property.
    pub fn child<I: Capability>(&self, name: &str) -> TwsResult<Proxy<I>> {
        let member = self.inner.plan.property(name)?;
        if !matches!(strip_remote(member.result_type()), TypeDesc::Remote { .. }) {
            return Err(TwsError::protocol(format!(
                "property '{name}' is not an object"
            )));
        }
        let stub = self
            .inner
            .children
            .entry((name.to_string(), TypeId::of::<I>()))
            .or_insert_with(|| {
                ProxyStub::with_prefix(
                    &self.inner.endpoint,
                    self.inner.address.clone(),
                    format!("{}{name}{}", self.inner.prefix, Wire::PATH_SEPARATOR),
                    self.inner.endpoint.registry().plan::<I>(),
                )
            })
            .clone();
        Ok(Proxy::from_stub(stub))
    }

    /// Ask the server for the bound object's own address.
    pub async fn detach(&self) -> TwsResult<Address> {
        let text = self.send(Wire::DETACH, Params::new()).await?;
        Address::parse(&text)
    }

    /// View the same remote object through another capability.
    pub async fn cast<I: Capability>(&self) -> TwsResult<Proxy<I>> {
        let address = self.detach().await?;
        Ok(Proxy::bind(&self.inner.endpoint, address))
    }

    /// Pin the bound object so it is never evicted. An object reached
    /// through properties is given its own instance and pinned there.
    pub async fn keep_alive(&self) -> TwsResult<()> {
        self.send(Wire::KEEPALIVE, Params::new()).await.map(|_| ())
    }

    /// Evict and dispose the bound object now. Never touches the parent of
    /// an object reached through properties.
    pub async fn dispose(&self) -> TwsResult<()> {
        self.send(Wire::DISPOSE, Params::new()).await.map(|_| ())
    }

    async fn send(&self, member: &str, params: Params) -> TwsResult<String> {
        let path = format!("{}{member}", self.inner.prefix);
        self.inner
            .endpoint
            .transport()
            .execute(&self.inner.address, &path, params)
            .await
    }
}

impl std::fmt::Debug for ProxyStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyStub")
            .field("interface", &self.inner.plan.desc().name)
            .field("address", &self.inner.address.to_string())
            .field("prefix", &self.inner.prefix)
            .finish()
    }
}

fn check_result<R: WireType>(member: &MemberDesc) -> TwsResult<()> {
    let requested = R::describe();
    if compatible(member.result_type(), &requested) {
        Ok(())
    } else {
        Err(TwsError::protocol(format!(
            "'{}' yields {}, not {}",
            member.name,
            member.result_type().label(),
            requested.label()
        )))
    }
}

// ─── Calls ──────────────────────────────────────────────────────────────────

type Encoder = Box<dyn FnOnce(&Endpoint) -> TwsResult<String> + Send>;

/// A method call being assembled. Nothing is encoded or sent until it is
/// invoked and has matched exactly one overload.
pub struct Call<'a> {
    stub: &'a ProxyStub,
    name: String,
    args: Vec<(String, TypeDesc, Encoder)>,
}

impl Call<'_> {
    pub fn arg<V: WireType>(mut self, name: &str, value: V) -> Self {
        self.args.push((
            name.to_string(),
            V::describe(),
            Box::new(move |cx: &Endpoint| value.encode(cx)),
        ));
        self
    }

    pub async fn invoke<R: WireType>(self) -> TwsResult<R> {
        let Call { stub, name, args } = self;
        let shapes: Vec<(String, TypeDesc)> = args
            .iter()
            .map(|(name, ty, _)| (name.clone(), ty.clone()))
            .collect();
        let member = stub.inner.plan.method(&name, &shapes)?;
        check_result::<R>(member)?;

        let cx = &stub.inner.endpoint;
        let mut params = Params::new();
        for (arg, _, encode) in args {
            params.insert(arg, encode(cx)?);
        }
        let text = stub.send(&name, params).await?;
        R::decode(&text, cx)
    }

    /// Invoke a method returning nothing.
    pub async fn send(self) -> TwsResult<()> {
        self.invoke::<()>().await
    }
}

// ─── Proxy<I> ───────────────────────────────────────────────────────────────

/// Stub typed by the capability it was built for.
pub struct Proxy<I: Capability> {
    stub: ProxyStub,
    _capability: PhantomData<fn() -> I>,
}

impl<I: Capability> Proxy<I> {
    /// Stub for the object at `address`, calling through `endpoint`.
    pub fn bind(endpoint: &Endpoint, address: Address) -> Self {
        let plan = endpoint.registry().plan::<I>();
        Self::from_stub(ProxyStub::new(endpoint, address, plan))
    }

    fn from_stub(stub: ProxyStub) -> Self {
        Self {
            stub,
            _capability: PhantomData,
        }
    }

    pub fn stub(&self) -> &ProxyStub {
        &self.stub
    }
}

impl<I: Capability> Clone for Proxy<I> {
    fn clone(&self) -> Self {
        Self::from_stub(self.stub.clone())
    }
}

impl<I: Capability> Deref for Proxy<I> {
    type Target = ProxyStub;

    fn deref(&self) -> &ProxyStub {
        &self.stub
    }
}

impl<I: Capability> std::fmt::Debug for Proxy<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.stub.fmt(f)
    }
}
