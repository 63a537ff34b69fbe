//! Objects and wiring shared by the runtime tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tws_protocol::{Address, InterfaceDesc, Params, RequestContext, TwsResult, Wire};
use tws_runtime::{
    Affinity, Capability, InterfaceBuilder, Proxy, Remotable, ServiceHost, TinyService,
    describe_remotable, ty, wire_data, wire_enum,
};
use tws_transport::{LoopbackTransport, RequestHandler};

// ─── Targets ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    Red,
    Green,
}

wire_enum!(Color { Red, Green });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
    pub label: String,
}

wire_data!(Point, Segment);

pub struct Int {
    value: Mutex<i32>,
    disposed: Arc<AtomicUsize>,
}

impl Int {
    pub fn new(value: i32) -> Arc<Self> {
        Self::tracked(value, Arc::default())
    }

    pub fn tracked(value: i32, disposed: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(value),
            disposed,
        })
    }

    pub fn disposals(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> i32 {
        *self.value.lock()
    }
}

impl Remotable for Int {
    const NAME: &'static str = "Int";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder
            .property_mut(
                "Value",
                |int: &Int| int.value(),
                |int: &Int, value: i32| {
                    *int.value.lock() = value;
                    Ok(())
                },
            )
            .method("UpdateValue", ["value"], |int: &Int, (value,): (i32,)| {
                *int.value.lock() = value;
                Ok(())
            })
            .method("Add", ["a", "b"], |_: &Int, (a, b): (i32, i32)| Ok(a + b));
    }

    fn dispose(&self) -> anyhow::Result<()> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reports the affinity worker it runs on.
pub struct Spawned;

impl Remotable for Spawned {
    const NAME: &'static str = "Spawned";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder.method("OnWorker", [], |_: &Spawned, ()| Ok(worker_name()));
    }
}

fn worker_name() -> Option<String> {
    Affinity::current().map(|worker| worker.name().to_string())
}

/// Fails to dispose.
pub struct Brittle;

impl Remotable for Brittle {
    const NAME: &'static str = "Brittle";

    fn describe(_builder: &mut InterfaceBuilder<Self>) {}

    fn dispose(&self) -> anyhow::Result<()> {
        anyhow::bail!("brittle object refused to die")
    }
}

/// Root object exercising every member shape.
pub struct Lab {
    pub int: Arc<Int>,
    pub disposed: Arc<AtomicUsize>,
}

impl Lab {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            int: Int::new(0),
            disposed: Arc::default(),
        })
    }
}

impl Remotable for Lab {
    const NAME: &'static str = "Lab";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder
            .property("Int", |lab: &Lab| Arc::clone(&lab.int))
            .property("Name", |_: &Lab| "lab".to_string())
            .method("Make", ["value"], |lab: &Lab, (value,): (i32,)| {
                Ok(Int::tracked(value, Arc::clone(&lab.disposed)))
            })
            .method("Spawn", [], |_: &Lab, ()| Ok(Arc::new(Spawned)))
            .method("Nest", [], |_: &Lab, ()| Ok(Lab::new()))
            .method("OnWorker", [], |_: &Lab, ()| Ok(worker_name()))
            .method("Pick", ["value"], |_: &Lab, (_,): (i32,)| Ok("int".to_string()))
            .method("Pick", ["value"], |_: &Lab, (_,): (Color,)| Ok("color".to_string()))
            .method("Same", ["value"], |_: &Lab, (_,): (i32,)| Ok(32i32))
            .method("Same", ["value"], |_: &Lab, (_,): (i64,)| Ok(64i32))
            .generic_method("Convert", [("value", ty::<String>())], ty::<String>())
            .method("Convert", ["text"], |_: &Lab, (text,): (String,)| {
                Ok(text.to_uppercase())
            })
            .method("Fail", [], |_: &Lab, ()| -> anyhow::Result<()> {
                anyhow::bail!("boom")
            })
            .method("Panic", [], |_: &Lab, ()| -> anyhow::Result<()> {
                panic!("kaboom")
            })
            .method("Join", ["items"], |_: &Lab, (items,): (Vec<String>,)| {
                Ok(items.join("+"))
            })
            .method("Greet", ["name"], |_: &Lab, (name,): (Option<String>,)| {
                Ok(format!("hello {}", name.as_deref().unwrap_or("nobody")))
            })
            .method("Shift", ["segment", "dx"], |_: &Lab, (mut s, dx): (Segment, i32)| {
                s.from.x += dx;
                s.to.x += dx;
                Ok(s)
            })
            .method("Twice", ["span"], |_: &Lab, (span,): (Duration,)| Ok(span * 2))
            .method_async("Delay", ["ms"], |_: Arc<Lab>, (ms,): (u64,)| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                anyhow::Ok(format!("slept {ms}"))
            })
            .method_async("Read", ["int"], |_: Arc<Lab>, (int,): (Proxy<IntCap>,)| async move {
                int.get::<i32>("Value").await.map_err(anyhow::Error::from)
            })
            .method_async(
                "Visit",
                ["visitor"],
                |_: Arc<Lab>, (visitor,): (Proxy<VisitorCap>,)| async move {
                    visitor
                        .call("Visit")
                        .arg("name", "lab".to_string())
                        .invoke::<String>()
                        .await
                        .map_err(anyhow::Error::from)
                },
            );
    }
}

/// Client-side callback object.
#[derive(Default)]
pub struct Visitor {
    pub seen: Mutex<Vec<String>>,
}

impl Remotable for Visitor {
    const NAME: &'static str = "Visitor";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder.method("Visit", ["name"], |visitor: &Visitor, (name,): (String,)| {
            visitor.seen.lock().push(name.clone());
            Ok(format!("visited {name}"))
        });
    }
}

// ─── Capabilities ───────────────────────────────────────────────────────────

pub struct LabCap;

impl Capability for LabCap {
    const NAME: &'static str = "Lab";

    fn describe() -> InterfaceDesc {
        describe_remotable::<Lab>()
    }
}

pub struct IntCap;

impl Capability for IntCap {
    const NAME: &'static str = "Int";

    fn describe() -> InterfaceDesc {
        describe_remotable::<Int>()
    }
}

/// A narrower, unrelated view of anything with a writable `Value`.
pub struct ValueView;

impl Capability for ValueView {
    const NAME: &'static str = "ValueView";

    fn describe() -> InterfaceDesc {
        InterfaceDesc::builder("ValueView")
            .property_mut("Value", ty::<i32>())
            .build()
    }
}

pub struct VisitorCap;

impl Capability for VisitorCap {
    const NAME: &'static str = "Visitor";

    fn describe() -> InterfaceDesc {
        describe_remotable::<Visitor>()
    }
}

// ─── Wiring ─────────────────────────────────────────────────────────────────

pub const RETENTION: Duration = Duration::from_secs(60);

pub fn host_lab(transport: &LoopbackTransport, name: &str) -> (ServiceHost, Arc<Lab>) {
    let lab = Lab::new();
    let host = TinyService::host(Arc::clone(&lab))
        .retention(RETENTION)
        .in_process(transport, name)
        .unwrap();
    (host, lab)
}

pub fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Raw call against the host's root object.
pub async fn call(host: &ServiceHost, path: &str, pairs: &[(&str, &str)]) -> TwsResult<String> {
    host.endpoint()
        .handle_request(RequestContext::new(path, params(pairs)))
        .await
}

/// Raw call against a registered instance.
pub async fn call_instance(
    host: &ServiceHost,
    instance_id: &str,
    path: &str,
    pairs: &[(&str, &str)],
) -> TwsResult<String> {
    let mut params = params(pairs);
    params.insert(Wire::INSTANCE_PARAM.to_string(), instance_id.to_string());
    host.endpoint()
        .handle_request(RequestContext::new(path, params))
        .await
}

/// Instance id of an address returned by a call.
pub fn instance_of(address_text: &str) -> String {
    Address::parse(address_text)
        .unwrap()
        .instance_id()
        .expect("address carries an instance id")
        .to_string()
}
