//! Single-worker affinity.
//!
//! An [`Affinity`] is a dedicated OS thread running a single-threaded tokio
//! runtime that drains a FIFO channel. Jobs start strictly in arrival order
//! and run on that thread only; a job that awaits lets later jobs start, the
//! way an event loop interleaves posted work. Results travel back to the
//! submitting task through a oneshot channel.

use std::cell::RefCell;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use tws_protocol::{Params, TwsError, TwsResult};

use crate::dispatcher::ObjectDispatcher;
use crate::endpoint::Endpoint;
use crate::object::Outcome;

type Job = BoxFuture<'static, ()>;

struct Worker {
    name: String,
    thread_id: ThreadId,
    jobs: mpsc::UnboundedSender<Job>,
}

thread_local! {
    static CURRENT: RefCell<Weak<Worker>> = const { RefCell::new(Weak::new()) };
}

/// Handle to a dedicated worker thread. Clones share the worker; it stops
/// once every handle is dropped.
#[derive(Clone)]
pub struct Affinity {
    worker: Arc<Worker>,
}

impl Affinity {
    pub fn spawn(name: impl Into<String>) -> TwsResult<Self> {
        let name = name.into();
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Weak<Worker>>();

        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        warn!("affinity worker {thread_name} failed to start: {e}");
                        return;
                    }
                };
                if let Ok(worker) = ready_rx.recv() {
                    CURRENT.with(|current| *current.borrow_mut() = worker);
                }
                let local = tokio::task::LocalSet::new();
                local.block_on(&runtime, async move {
                    while let Some(job) = queue.recv().await {
                        tokio::task::spawn_local(job);
                    }
                });
                debug!("affinity worker {thread_name} stopped");
            })
            .map_err(|e| TwsError::Transport(format!("failed to spawn worker {name}: {e}")))?;

        let worker = Arc::new(Worker {
            name,
            thread_id: handle.thread().id(),
            jobs,
        });
        // The worker only learns its own handle weakly, so it never keeps itself alive.
        let _ = ready_tx.send(Arc::downgrade(&worker));
        Ok(Self { worker })
    }

    /// The worker running the current thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT
            .with(|current| current.borrow().upgrade())
            .map(|worker| Self { worker })
    }

    pub fn name(&self) -> &str {
        &self.worker.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.worker.thread_id
    }

    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.worker.thread_id
    }

    pub fn same_worker(&self, other: &Affinity) -> bool {
        Arc::ptr_eq(&self.worker, &other.worker)
    }

    /// Queue `job` behind everything already submitted and await its result.
    pub async fn run<F, T>(&self, job: F) -> TwsResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.worker
            .jobs
            .send(Box::pin(async move {
                let _ = tx.send(job.await);
            }))
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> TwsError {
        TwsError::Transport(format!("affinity worker {} stopped", self.worker.name))
    }
}

impl std::fmt::Debug for Affinity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Affinity")
            .field("name", &self.worker.name)
            .finish()
    }
}

/// Dispatcher whose calls and disposal all run on one worker, FIFO.
#[derive(Clone)]
pub struct AffinityExecutor {
    dispatcher: Arc<ObjectDispatcher>,
    worker: Affinity,
}

impl AffinityExecutor {
    pub fn new(dispatcher: ObjectDispatcher, worker: Affinity) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            worker,
        }
    }

    pub fn worker(&self) -> &Affinity {
        &self.worker
    }

    pub fn dispatcher(&self) -> &ObjectDispatcher {
        &self.dispatcher
    }

    pub async fn execute(&self, path: String, params: Params, cx: Endpoint) -> TwsResult<Outcome> {
        let dispatcher = Arc::clone(&self.dispatcher);
        self.worker
            .run(async move { dispatcher.execute(&path, params, &cx).await })
            .await?
    }

    pub async fn dispose(&self) -> TwsResult<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        self.worker.run(async move { dispatcher.dispose() }).await?
    }
}
