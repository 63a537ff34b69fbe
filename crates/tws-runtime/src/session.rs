//! Instance registry with sliding expiration.
//!
//! Expiry is measured on a logical clock that only advances when the sweep
//! ticks. Each entry records the tick after which it may be evicted; every
//! access pushes that tick to `now + window`. With `window >= 1`, an instance
//! touched between two sweeps survives the second, and one left alone is
//! evicted `window + 1` ticks after its last access. An instance with a
//! call in flight is never evicted, however long the call takes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tws_protocol::wire::is_session_leaf;
use tws_protocol::{Address, Params, RequestContext, TwsError, TwsResult, Wire};

use crate::dispatcher::Dispatcher;
use crate::endpoint::Endpoint;
use crate::object::Outcome;

/// Upper bound on the sweep interval, whatever the retention.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Expiry of a pinned instance.
const NEVER: u64 = u64::MAX;

struct Entry {
    dispatcher: Dispatcher,
    expiry: AtomicU64,
    in_flight: AtomicUsize,
}

impl Entry {
    fn touch(&self, now: u64, window: u64) {
        self.expiry
            .fetch_max(now.saturating_add(window), Ordering::AcqRel);
    }

    fn is_expired(&self, now: u64) -> bool {
        self.in_flight.load(Ordering::Acquire) == 0 && self.expiry.load(Ordering::Acquire) < now
    }
}

/// Marks a call in flight on an entry until dropped, so a cancelled call
/// releases its instance too.
struct InFlight(Arc<Entry>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Live instances of one hosted endpoint, plus its optional root object.
pub struct Session {
    root: Option<Dispatcher>,
    instances: DashMap<String, Arc<Entry>>,
    clock: AtomicU64,
    retention: Duration,
    sweep_interval: Duration,
    window: u64,
}

impl Session {
    pub fn new(root: Option<Dispatcher>, retention: Duration) -> Self {
        let sweep_interval = retention.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        let window = retention
            .as_nanos()
            .div_ceil(sweep_interval.as_nanos())
            .clamp(1, u64::MAX as u128) as u64;
        Self {
            root,
            instances: DashMap::new(),
            clock: AtomicU64::new(0),
            retention,
            sweep_interval,
            window,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Retention window, in sweep ticks.
    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.instances.contains_key(instance_id)
    }

    fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Store `dispatcher` under a fresh id, expiring one retention window from now.
    pub fn register_instance(&self, dispatcher: Dispatcher) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        debug!(
            "registered {} as {id}",
            dispatcher.object().interface_name()
        );
        self.instances.insert(
            id.clone(),
            Arc::new(Entry {
                dispatcher,
                expiry: AtomicU64::new(self.now().saturating_add(self.window)),
                in_flight: AtomicUsize::new(0),
            }),
        );
        id
    }

    pub fn dispatcher(&self, instance_id: Option<&str>) -> TwsResult<Dispatcher> {
        match instance_id {
            Some(id) => Ok(self.entry(id)?.dispatcher.clone()),
            None => self.root_dispatcher(),
        }
    }

    fn root_dispatcher(&self) -> TwsResult<Dispatcher> {
        self.root
            .clone()
            .ok_or_else(|| TwsError::protocol("must specify instance id"))
    }

    fn entry(&self, instance_id: &str) -> TwsResult<Arc<Entry>> {
        self.instances
            .get(instance_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TwsError::instance_not_found(instance_id))
    }

    /// Enter a call on an instance. The count is raised under the map's
    /// shard lock, so a concurrent sweep either sees it or has already
    /// removed the entry.
    fn enter(&self, instance_id: &str) -> TwsResult<InFlight> {
        let entry = self
            .instances
            .get(instance_id)
            .map(|entry| {
                entry.in_flight.fetch_add(1, Ordering::AcqRel);
                Arc::clone(entry.value())
            })
            .ok_or_else(|| TwsError::instance_not_found(instance_id))?;
        entry.touch(self.now(), self.window);
        Ok(InFlight(entry))
    }

    /// Run one call. `~keepalive` and `~dispose` are handled here; anything
    /// else refreshes the instance's expiry before and after dispatch.
    /// `endpoint` is the address of the root object, used to answer with
    /// the addresses of newly registered instances.
    pub async fn execute(
        &self,
        request: RequestContext,
        endpoint: &Address,
        cx: &Endpoint,
    ) -> TwsResult<String> {
        let RequestContext {
            path,
            instance_id,
            params,
        } = request;

        let (member, leaf) = split_leaf(&path);
        if is_session_leaf(leaf) {
            self.session_leaf(leaf, member, instance_id.as_deref(), cx)
                .await?;
            return Ok(String::new());
        }

        let (dispatcher, guard) = match instance_id.as_deref() {
            None => (self.root_dispatcher()?, None),
            Some(id) => {
                let guard = self.enter(id)?;
                (guard.0.dispatcher.clone(), Some(guard))
            }
        };

        let outcome = dispatcher.execute(path, params, cx.clone()).await;
        // Long-running calls must not let their instance lapse.
        if let Some(guard) = guard {
            guard.0.touch(self.now(), self.window);
        }

        match outcome? {
            Outcome::Value(text) => Ok(text),
            Outcome::Object(object) => {
                let id = self.register_instance(Dispatcher::new(object));
                Ok(endpoint.with_instance(id).to_string())
            }
            Outcome::Detached => Ok(match instance_id {
                Some(id) => endpoint.with_instance(id),
                None => endpoint.clone(),
            }
            .to_string()),
        }
    }

    /// `~keepalive` or `~dispose`, addressed to the bound instance or, under
    /// a member path, to the object reached through it. Such an object gets
    /// an instance of its own first.
    async fn session_leaf(
        &self,
        leaf: &str,
        member: Option<&str>,
        instance_id: Option<&str>,
        cx: &Endpoint,
    ) -> TwsResult<()> {
        let id = match (member, instance_id) {
            (Some(member), _) => {
                let path = format!("{member}{}{}", Wire::PATH_SEPARATOR, Wire::DETACH);
                let dispatcher = self.dispatcher(instance_id)?;
                match dispatcher.execute(path, Params::new(), cx.clone()).await? {
                    Outcome::Object(object) => self.register_instance(Dispatcher::new(object)),
                    _ => {
                        return Err(TwsError::protocol(format!(
                            "'{member}' does not yield an object"
                        )));
                    }
                }
            }
            (None, Some(id)) => id.to_string(),
            (None, None) if leaf == Wire::DISPOSE => {
                return Err(TwsError::protocol("the root object cannot be disposed"));
            }
            (None, None) => {
                self.root_dispatcher()?;
                return Ok(());
            }
        };
        if leaf == Wire::KEEPALIVE {
            self.keep_alive(&id)
        } else {
            self.dispose(&id).await
        }
    }

    /// Pin an instance so the sweep never evicts it.
    pub fn keep_alive(&self, instance_id: &str) -> TwsResult<()> {
        self.entry(instance_id)?.expiry.store(NEVER, Ordering::Release);
        debug!("pinned {instance_id}");
        Ok(())
    }

    /// Remove and dispose an instance now. Disposal failures reach the caller.
    pub async fn dispose(&self, instance_id: &str) -> TwsResult<()> {
        let (_, entry) = self
            .instances
            .remove(instance_id)
            .ok_or_else(|| TwsError::instance_not_found(instance_id))?;
        debug!("disposing {instance_id}");
        entry.dispatcher.dispose().await
    }

    /// Advance the logical clock one tick and evict every instance whose
    /// expiry has passed. Returns the number evicted.
    pub async fn tick(&self) -> usize {
        let now = self.clock.fetch_add(1, Ordering::AcqRel) + 1;

        let expired: Vec<String> = self
            .instances
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for id in expired {
            // Re-check under the shard lock: the instance may have been entered since.
            let Some((_, entry)) = self.instances.remove_if(&id, |_, entry| entry.is_expired(now))
            else {
                continue;
            };
            evicted += 1;
            if let Err(e) = entry.dispatcher.dispose().await {
                warn!("failed to dispose expired instance {id}: {e}");
            }
        }

        if evicted > 0 {
            info!("evicted {evicted} expired instances ({} live)", self.len());
        }
        evicted
    }

    /// Dispose every registered instance. The root object is left alone.
    pub async fn clear(&self) {
        let ids: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, entry)) = self.instances.remove(&id) {
                if let Err(e) = entry.dispatcher.dispose().await {
                    warn!("failed to dispose instance {id}: {e}");
                }
            }
        }
    }

    /// Tick every sweep interval until the session is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::downgrade(self);
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                session.tick().await;
            }
        })
    }
}

/// `(member path, leaf)` of a slash-separated path.
fn split_leaf(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once(Wire::PATH_SEPARATOR) {
        Some((member, leaf)) => (Some(member), leaf),
        None => (None, path),
    }
}
