//! End-to-end integration tests: typed clients calling a host over real
//! HTTP on an OS-assigned port, including callbacks into the client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tws_protocol::{ErrorKind, InterfaceDesc};
use tws_runtime::{
    CallbackConfig, Capability, ClientConfig, InterfaceBuilder, Proxy, Remotable, ServiceHost,
    TinyClient, TinyService, describe_remotable, ty,
};

// ─── Hosted objects ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Store {
    value: Mutex<i32>,
}

impl Remotable for Store {
    const NAME: &'static str = "Store";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder
            .property_mut(
                "Value",
                |s: &Store| *s.value.lock(),
                |s: &Store, value: i32| {
                    *s.value.lock() = value;
                    Ok(())
                },
            )
            .method("Make", ["label"], |_: &Store, (label,): (String,)| {
                Ok(Arc::new(Item {
                    label: Mutex::new(label),
                }))
            })
            .method("Fail", [], |_: &Store, ()| -> anyhow::Result<()> {
                anyhow::bail!("disk on fire")
            })
            .method_async("Delay", ["ms"], |_: Arc<Store>, (ms,): (u64,)| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                anyhow::Ok(ms)
            })
            .method_async(
                "Greet",
                ["visitor"],
                |_: Arc<Store>, (visitor,): (Proxy<VisitorCap>,)| async move {
                    visitor
                        .call("Hello")
                        .arg("from", "store".to_string())
                        .invoke::<String>()
                        .await
                        .map_err(anyhow::Error::from)
                },
            );
    }
}

struct Item {
    label: Mutex<String>,
}

impl Remotable for Item {
    const NAME: &'static str = "Item";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder.property_mut(
            "Label",
            |i: &Item| i.label.lock().clone(),
            |i: &Item, label: String| {
                *i.label.lock() = label;
                Ok(())
            },
        );
    }
}

#[derive(Default)]
struct Visitor {
    greeted_by: Mutex<Vec<String>>,
}

impl Remotable for Visitor {
    const NAME: &'static str = "Visitor";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder.method("Hello", ["from"], |v: &Visitor, (from,): (String,)| {
            v.greeted_by.lock().push(from.clone());
            Ok(format!("hello back, {from}"))
        });
    }
}

// ─── Capabilities ───────────────────────────────────────────────────────────

struct StoreCap;

impl Capability for StoreCap {
    const NAME: &'static str = "Store";

    fn describe() -> InterfaceDesc {
        describe_remotable::<Store>()
    }
}

struct ItemCap;

impl Capability for ItemCap {
    const NAME: &'static str = "Item";

    fn describe() -> InterfaceDesc {
        describe_remotable::<Item>()
    }
}

/// Unrelated view of anything with a writable string `Label`.
struct Labeled;

impl Capability for Labeled {
    const NAME: &'static str = "Labeled";

    fn describe() -> InterfaceDesc {
        InterfaceDesc::builder("Labeled")
            .property_mut("Label", ty::<String>())
            .build()
    }
}

struct VisitorCap;

impl Capability for VisitorCap {
    const NAME: &'static str = "Visitor";

    fn describe() -> InterfaceDesc {
        describe_remotable::<Visitor>()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

async fn start_host(retention: Duration) -> ServiceHost {
    TinyService::host(Arc::new(Store::default()))
        .port(0)
        .retention(retention)
        .at_endpoint("Store")
        .await
        .unwrap()
}

async fn connect(host: &ServiceHost, config: ClientConfig) -> (TinyClient, Proxy<StoreCap>) {
    let client = TinyClient::new(config).await.unwrap();
    let store = client
        .connect_to::<StoreCap>("127.0.0.1", host.port().unwrap(), "Store")
        .await
        .unwrap();
    (client, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn end_to_end_over_http() {
        let host = start_host(Duration::from_secs(60)).await;
        let port = host.port().unwrap();
        assert!(port > 0);
        assert_eq!(host.locator(), format!("http://127.0.0.1:{port}/Store"));

        let (_client, store) = connect(&host, ClientConfig::default()).await;
        store.set("Value", 41).await.unwrap();
        assert_eq!(store.get::<i32>("Value").await.unwrap(), 41);

        // Form encoding must carry separators and reserved URL characters.
        let label = "a, b & c=d / ~e?".to_string();
        let item: Proxy<ItemCap> = store
            .call("Make")
            .arg("label", label.clone())
            .invoke()
            .await
            .unwrap();
        assert_eq!(item.get::<String>("Label").await.unwrap(), label);
        assert_eq!(item.address().endpoint(), host.locator());
        assert!(item.address().instance_id().is_some());
        assert_eq!(host.session().len(), 1);

        host.shutdown().await;
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let host = start_host(Duration::from_secs(60)).await;
        let config = ClientConfig {
            execution_timeout: Duration::from_millis(100),
            ..ClientConfig::default()
        };
        let (_client, store) = connect(&host, config).await;

        let err = store
            .call("Delay")
            .arg("ms", 1000u64)
            .invoke::<u64>()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        assert_eq!(
            store.call("Delay").arg("ms", 5u64).invoke::<u64>().await.unwrap(),
            5
        );
        host.shutdown().await;
    }

    #[tokio::test]
    async fn remote_failure_keeps_its_message() {
        let host = start_host(Duration::from_secs(60)).await;
        let (_client, store) = connect(&host, ClientConfig::default()).await;

        let err = store.call("Fail").send().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteExecution);
        assert_eq!(err.message(), "disk on fire");
        host.shutdown().await;
    }

    #[tokio::test]
    async fn missing_listener_fails_fast() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = TinyClient::new(ClientConfig::default()).await.unwrap();

        let started = Instant::now();
        let err = client
            .connect_to::<StoreCap>("127.0.0.1", port, "Store")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn stopped_host_refuses_calls() {
        let host = start_host(Duration::from_secs(60)).await;
        let (_client, store) = connect(&host, ClientConfig::default()).await;
        host.shutdown().await;

        // A pooled keep-alive connection may be torn down mid-request.
        let err = store.get::<i32>("Value").await.unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Connect | ErrorKind::Transport
        ));
    }

    #[tokio::test]
    async fn cast_and_dispose_over_http() {
        let host = start_host(Duration::from_secs(60)).await;
        let (_client, store) = connect(&host, ClientConfig::default()).await;

        let item: Proxy<ItemCap> = store
            .call("Make")
            .arg("label", "first".to_string())
            .invoke()
            .await
            .unwrap();
        let labeled = item.cast::<Labeled>().await.unwrap();
        labeled.set("Label", "second".to_string()).await.unwrap();
        assert_eq!(item.get::<String>("Label").await.unwrap(), "second");

        item.dispose().await.unwrap();
        let err = labeled.get::<String>("Label").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        host.shutdown().await;
    }

    #[tokio::test]
    async fn server_calls_back_into_client() {
        let host = start_host(Duration::from_secs(60)).await;
        let config = ClientConfig {
            callback: Some(CallbackConfig {
                port: 0,
                ..CallbackConfig::default()
            }),
            ..ClientConfig::default()
        };
        let (client, store) = connect(&host, config).await;
        assert!(client.callback_address().is_some());

        let visitor = Arc::new(Visitor::default());
        let reply: String = store
            .call("Greet")
            .arg("visitor", Arc::clone(&visitor))
            .invoke()
            .await
            .unwrap();
        assert_eq!(reply, "hello back, store");
        assert_eq!(*visitor.greeted_by.lock(), vec!["store".to_string()]);

        client.shutdown().await;
        host.shutdown().await;
    }

    #[tokio::test]
    async fn idle_instances_expire_on_short_retention() {
        let host = start_host(Duration::from_millis(50)).await;
        let (_client, store) = connect(&host, ClientConfig::default()).await;

        let idle: Proxy<ItemCap> = store
            .call("Make")
            .arg("label", "idle".to_string())
            .invoke()
            .await
            .unwrap();
        let pinned: Proxy<ItemCap> = store
            .call("Make")
            .arg("label", "pinned".to_string())
            .invoke()
            .await
            .unwrap();
        pinned.keep_alive().await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;

        let err = idle.get::<String>("Label").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(pinned.get::<String>("Label").await.unwrap(), "pinned");
        // The root object never expires.
        assert_eq!(store.get::<i32>("Value").await.unwrap(), 0);
        host.shutdown().await;
    }
}
