// # edgednsd - Edge DNS Reconciliation Daemon
//
// This daemon is a THIN integration layer. All task handling, diffing and
// provider logic lives in edgedns-core and the provider crates; the daemon
// only wires them together:
//
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Registering providers
// 4. Opening the shared store (tasks, locks, counters, inventory)
// 5. Running the task executor and the cache sweeper until a signal arrives
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Executor
// - `EDGEDNS_POLL_INTERVAL_SECS`: Seconds between ticks (default 10)
// - `EDGEDNS_LOCK_KEY`: Tick election lock key (default `dns_task_executor`)
//
// ### Store
// - `EDGEDNS_STORE_TYPE`: Type of store (file, memory; default file)
// - `EDGEDNS_STORE_PATH`: Path to the state file (for file store)
//
// ### Cache
// - `EDGEDNS_CACHE_TTL_SECS`: Lifetime of a cached record list (default 86400)
// - `EDGEDNS_CACHE_CLEAN_INTERVAL_SECS`: Seconds between expiry sweeps (default 3600)
//
// ### Logging
// - `EDGEDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export EDGEDNS_STORE_TYPE=file
// export EDGEDNS_STORE_PATH=/var/lib/edgedns/state.json
// export EDGEDNS_POLL_INTERVAL_SECS=10
//
// edgednsd
// ```

use anyhow::{Context, Result};
use edgedns_core::traits::{Inventory, LockStore, TaskStore};
use edgedns_core::{
    CacheConfig, DnsTaskExecutor, DomainRecordsCache, EdgeDnsConfig, ExecutorConfig,
    FileStore, MemoryStore, ProviderRegistry, StoreConfig,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum EdgeDnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<EdgeDnsExitCode> for ExitCode {
    fn from(code: EdgeDnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration: the library configuration plus the log level
#[derive(Debug)]
struct Config {
    engine: EdgeDnsConfig,
    log_level: String,
}

/// Parse an optional numeric variable, failing on malformed values
fn env_number<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a number, got '{}': {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let executor_defaults = ExecutorConfig::default();
        let executor = ExecutorConfig {
            poll_interval_secs: env_number(
                "EDGEDNS_POLL_INTERVAL_SECS",
                executor_defaults.poll_interval_secs,
            )?,
            lock_key: env::var("EDGEDNS_LOCK_KEY").unwrap_or(executor_defaults.lock_key),
            ..ExecutorConfig::default()
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            ttl_secs: env_number("EDGEDNS_CACHE_TTL_SECS", cache_defaults.ttl_secs)?,
            clean_interval_secs: env_number(
                "EDGEDNS_CACHE_CLEAN_INTERVAL_SECS",
                cache_defaults.clean_interval_secs,
            )?,
        };

        let store_type = env::var("EDGEDNS_STORE_TYPE").unwrap_or_else(|_| "file".to_string());
        let store = match store_type.as_str() {
            "file" => StoreConfig::File {
                path: env::var("EDGEDNS_STORE_PATH").context(
                    "EDGEDNS_STORE_PATH is required when EDGEDNS_STORE_TYPE=file. \
                    Set it via: export EDGEDNS_STORE_PATH=/var/lib/edgedns/state.json",
                )?,
            },
            "memory" => StoreConfig::Memory,
            other => anyhow::bail!(
                "EDGEDNS_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        };

        Ok(Self {
            engine: EdgeDnsConfig {
                executor,
                cache,
                store,
            },
            log_level: env::var("EDGEDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        if !(1..=3600).contains(&self.engine.executor.poll_interval_secs) {
            anyhow::bail!(
                "EDGEDNS_POLL_INTERVAL_SECS must be between 1 and 3600 seconds. Got: {}",
                self.engine.executor.poll_interval_secs
            );
        }

        if self.engine.executor.lock_key.trim().is_empty() {
            anyhow::bail!("EDGEDNS_LOCK_KEY cannot be empty");
        }

        if let StoreConfig::File { path } = &self.engine.store
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "EDGEDNS_STORE_PATH parent directory does not exist: {}. \
                Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "EDGEDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return EdgeDnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return EdgeDnsExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return EdgeDnsExitCode::ConfigError.into();
    }

    info!("Starting edgednsd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return EdgeDnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config.engine).await {
            error!("Daemon error: {:#}", e);
            EdgeDnsExitCode::RuntimeError
        } else {
            EdgeDnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// The store seen through each of the traits the engine needs
struct Stores {
    tasks: Arc<dyn TaskStore>,
    locks: Arc<dyn LockStore>,
    inventory: Arc<dyn Inventory>,
}

impl Stores {
    fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: TaskStore + LockStore + Inventory + 'static,
    {
        Self {
            tasks: store.clone(),
            locks: store.clone(),
            inventory: store,
        }
    }
}

async fn open_store(config: &StoreConfig) -> Result<Stores> {
    match config {
        StoreConfig::File { path } => {
            info!("Using file store: {}", path);
            let store = FileStore::new(path)
                .await
                .with_context(|| format!("Failed to open state file {}", path))?;
            Ok(Stores::from_shared(Arc::new(store)))
        }
        StoreConfig::Memory => {
            info!("Using in-memory store (state is lost on exit)");
            Ok(Stores::from_shared(Arc::new(MemoryStore::new())))
        }
    }
}

/// Run the daemon
async fn run_daemon(config: EdgeDnsConfig) -> Result<()> {
    let registry = Arc::new(ProviderRegistry::new());

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        edgedns_provider_cloudflare::register(&registry);
    }

    info!("Registered providers: {:?}", registry.list_providers());

    let stores = open_store(&config.store).await?;
    let cache = Arc::new(DomainRecordsCache::with_ttl(
        stores.locks.clone(),
        config.cache.ttl(),
    ));

    let (executor, mut events) = DnsTaskExecutor::new(
        stores.tasks,
        stores.locks,
        stores.inventory,
        registry,
        cache.clone(),
        config.executor.clone(),
    )?;
    let executor = Arc::new(executor);

    // Executor events are for embedders; the daemon only traces them
    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Executor event: {:?}", event);
        }
    });

    let clean_interval = config.cache.clean_interval();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(clean_interval);
        // the first tick completes immediately and there is nothing to sweep yet
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = cache.clean();
            debug!("Cache sweep evicted {} zone(s)", evicted);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut executor_handle = tokio::spawn(executor.run_with_shutdown(Some(shutdown_rx)));

    info!("Daemon initialized successfully");

    let finished_early = tokio::select! {
        signal = wait_for_shutdown() => {
            let signal = signal?;
            info!("Received shutdown signal: {}", signal);
            let _ = shutdown_tx.send(());
            None
        }
        // the executor only returns early on its own failure
        joined = &mut executor_handle => Some(joined),
    };
    let outcome = match finished_early {
        Some(joined) => joined,
        None => executor_handle.await,
    };

    sweeper.abort();
    event_logger.abort();

    match outcome {
        Ok(result) => result.context("Executor failed")?,
        Err(e) => anyhow::bail!("Executor task failed: {}", e),
    }

    info!("Shutting down daemon");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
