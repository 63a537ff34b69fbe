//! tws-host: TinyWebService demo host
//!
//! Publishes a small calculator object graph over HTTP so it can be driven
//! from any TinyWebService client (or by hand with curl).
//!
//! Usage:
//!   tws-host                                  # Port 14048, endpoint "Calculator"
//!   tws-host --port 0 --endpoint Calc         # OS-assigned port
//!   tws-host --config host.json --verbose     # Load HostConfig from JSON
//!   tws-host --affinity                       # Run the graph on one worker
//!
//!   curl 'http://127.0.0.1:14048/Calculator/Add?value=2'
//!   curl 'http://127.0.0.1:14048/Calculator/Memory/Value'

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tws_protocol::Wire;
use tws_runtime::{HostConfig, InterfaceBuilder, Remotable, TinyService};

#[derive(Parser, Debug)]
#[command(name = "tws-host", about = "TinyWebService demo host")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value_t = Wire::DEFAULT_PORT)]
    port: u16,

    /// Accept connections from other machines
    #[arg(long)]
    allow_external: bool,

    /// Endpoint name, the first path segment of every call
    #[arg(long, default_value = "Calculator")]
    endpoint: String,

    /// Retention window of created instances, in milliseconds
    #[arg(long)]
    retention_ms: Option<u64>,

    /// Timeout of calls to callback objects, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Run the hosted object graph on one dedicated worker
    #[arg(long)]
    affinity: bool,

    /// Host configuration file (JSON); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn host_config(&self) -> anyhow::Result<HostConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid host config {}", path.display()))?
            }
            None => HostConfig::default(),
        };
        if self.config.is_none() || self.port != Wire::DEFAULT_PORT {
            config.port = self.port;
        }
        config.allow_external |= self.allow_external;
        config.affinity |= self.affinity;
        config.verbose_logging |= self.verbose;
        if let Some(ms) = self.retention_ms {
            config.retention = Duration::from_millis(ms);
        }
        if let Some(ms) = self.timeout_ms {
            config.execution_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

// ─── Demo object graph ──────────────────────────────────────────────────────

struct Calculator {
    accumulator: Mutex<f64>,
    history: Mutex<Vec<f64>>,
    memory: Arc<MemoryCell>,
    started: Instant,
}

impl Calculator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            accumulator: Mutex::new(0.0),
            history: Mutex::new(Vec::new()),
            memory: Arc::new(MemoryCell::default()),
            started: Instant::now(),
        })
    }

    fn apply(&self, op: impl FnOnce(f64) -> f64) -> f64 {
        let mut acc = self.accumulator.lock();
        *acc = op(*acc);
        self.history.lock().push(*acc);
        *acc
    }
}

impl Remotable for Calculator {
    const NAME: &'static str = "Calculator";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder
            .property_mut(
                "Accumulator",
                |c: &Calculator| *c.accumulator.lock(),
                |c: &Calculator, value: f64| {
                    *c.accumulator.lock() = value;
                    Ok(())
                },
            )
            .property("History", |c: &Calculator| c.history.lock().clone())
            .property("Memory", |c: &Calculator| Arc::clone(&c.memory))
            .property("Uptime", |c: &Calculator| c.started.elapsed())
            .method("Add", ["value"], |c: &Calculator, (value,): (f64,)| {
                Ok(c.apply(|acc| acc + value))
            })
            .method("Multiply", ["value"], |c: &Calculator, (value,): (f64,)| {
                Ok(c.apply(|acc| acc * value))
            })
            .method("Divide", ["value"], |c: &Calculator, (value,): (f64,)| {
                if value == 0.0 {
                    anyhow::bail!("division by zero");
                }
                Ok(c.apply(|acc| acc / value))
            })
            .method("Clear", [], |c: &Calculator, ()| {
                *c.accumulator.lock() = 0.0;
                c.history.lock().clear();
                Ok(())
            })
            .method("NewCounter", ["start"], |_: &Calculator, (start,): (i64,)| {
                Ok(Arc::new(Counter {
                    value: Mutex::new(start),
                }))
            })
            .method_async(
                "Sleep",
                ["duration"],
                |_: Arc<Calculator>, (duration,): (Duration,)| async move {
                    tokio::time::sleep(duration).await;
                    anyhow::Ok(duration)
                },
            );
    }
}

#[derive(Default)]
struct MemoryCell {
    value: Mutex<f64>,
}

impl Remotable for MemoryCell {
    const NAME: &'static str = "MemoryCell";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder.property_mut(
            "Value",
            |m: &MemoryCell| *m.value.lock(),
            |m: &MemoryCell, value: f64| {
                *m.value.lock() = value;
                Ok(())
            },
        );
    }
}

struct Counter {
    value: Mutex<i64>,
}

impl Remotable for Counter {
    const NAME: &'static str = "Counter";

    fn describe(builder: &mut InterfaceBuilder<Self>) {
        builder
            .property("Value", |c: &Counter| *c.value.lock())
            .method("Increment", ["by"], |c: &Counter, (by,): (i64,)| {
                let mut value = c.value.lock();
                *value += by;
                Ok(*value)
            });
    }

    fn dispose(&self) -> anyhow::Result<()> {
        info!("counter disposed at {}", *self.value.lock());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.host_config()?;
    let retention = config.retention;
    let host = TinyService::host(Calculator::new())
        .config(config)
        .at_endpoint(&cli.endpoint)
        .await
        .with_context(|| format!("failed to host endpoint {}", cli.endpoint))?;

    println!();
    println!("  TinyWebService host");
    println!("  Root object: {}", host.address());
    println!("  Retention:   {} ms", retention.as_millis());
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await?;

    println!();
    println!("  Shutting down...");
    host.shutdown().await;
    Ok(())
}
