// # File Store
//
// File-based implementation of TaskStore, LockStore and Inventory with crash
// recovery.
//
// ## Purpose
//
// Keeps pending tasks, lock leases, cache version counters and the inventory
// across daemon restarts. A task created before a crash is still pending
// after it, which is what makes "retry until success" hold.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "state": {
//     "last_task_id": 3,
//     "tasks": {
//       "3": { "id": 3, "type": "domainChange", "domainId": 2, "attempts": 0, ... }
//     },
//     "counters": { "1@example.com": 7 },
//     "locks": { "dns_task_executor": "2025-01-09T12:00:09Z" },
//     "servers": {}, "nodes": {}, "clusters": {}, "domains": {}, "providers": {}
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::PlatformState;
use crate::Error;
use crate::config::ProviderConfig;
use crate::record::Record;
use crate::traits::{
    ClusterDnsInfo, DnsDomain, DnsTask, DnsTaskKind, Inventory, LockStore, NodeDnsInfo,
    ServerDnsInfo, TaskStore,
};

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based store with crash recovery
///
/// Every mutation is written through before the call returns.
///
/// # Crash Recovery
///
/// - **Atomic writes**: New state written to temporary file, then renamed
/// - **Backup**: Last known good state kept in `.backup` file
/// - **Corruption detection**: JSON validation on load
/// - **Automatic recovery**: Falls back to backup if main file corrupted
///
/// # Example
///
/// ```rust,no_run
/// use edgedns_core::state::FileStore;
/// use edgedns_core::traits::TaskStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/edgedns/state.json").await?;
///
///     // Atomically written to disk
///     store.create_cluster_task(7).await?;
///
///     assert!(!store.find_pending_tasks().await?.is_empty());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    state: Arc<RwLock<PlatformState>>,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    state: PlatformState,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load existing state file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty state
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let state = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main state file
    /// 2. If JSON parse error, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_state_with_recovery(path: &Path) -> Result<PlatformState, Error> {
        let e = match Self::load_state(path).await {
            Ok(state) => {
                tracing::debug!(
                    "Loaded state from file: {} pending tasks",
                    state.tasks.len()
                );
                return Ok(state);
            }
            // Anything but a parse failure is an environment problem, not corruption
            Err(e @ Error::Json(_)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            e
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty state.");
            return Ok(PlatformState::default());
        }

        match Self::load_state(&backup_path).await {
            Ok(state) => {
                tracing::info!(
                    "Recovered state from backup: {} pending tasks",
                    state.tasks.len()
                );

                if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!("Failed to restore state file from backup: {}", restore_err);
                }

                Ok(state)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty state.",
                    backup_err
                );
                Ok(PlatformState::default())
            }
        }
    }

    /// Load state from file
    async fn load_state(path: &Path) -> Result<PlatformState, Error> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(PlatformState::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.state)
    }

    /// Write state to file atomically
    ///
    /// Callers hold the state write guard, so writes never interleave.
    async fn write_state(&self, state: &PlatformState) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            state: state.clone(),
        };

        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::store(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Apply a mutation and write the result through
    async fn mutate<T>(&self, f: impl FnOnce(&mut PlatformState) -> T) -> Result<T, Error> {
        let mut guard = self.state.write().await;
        let out = f(&mut *guard);
        self.write_state(&guard).await?;
        Ok(out)
    }

    /// Force immediate write to disk
    pub async fn sync(&self) -> Result<(), Error> {
        let guard = self.state.write().await;
        self.write_state(&guard).await
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> PlatformState {
        self.state.read().await.clone()
    }

    /// Insert or replace a server
    pub async fn put_server(&self, server: ServerDnsInfo) -> Result<(), Error> {
        self.mutate(|s| {
            s.servers.insert(server.id, server);
        })
        .await
    }

    /// Insert or replace a node
    pub async fn put_node(&self, node: NodeDnsInfo) -> Result<(), Error> {
        self.mutate(|s| {
            s.nodes.insert(node.id, node);
        })
        .await
    }

    /// Insert or replace a cluster
    pub async fn put_cluster(&self, cluster: ClusterDnsInfo) -> Result<(), Error> {
        self.mutate(|s| {
            s.clusters.insert(cluster.id, cluster);
        })
        .await
    }

    /// Insert or replace a domain
    pub async fn put_domain(&self, domain: DnsDomain) -> Result<(), Error> {
        self.mutate(|s| {
            s.domains.insert(domain.id, domain);
        })
        .await
    }

    /// Insert or replace a provider account
    pub async fn put_provider(&self, provider: ProviderConfig) -> Result<(), Error> {
        self.mutate(|s| {
            s.providers.insert(provider.id, provider);
        })
        .await
    }
}

#[async_trait]
impl TaskStore for FileStore {
    async fn create_task(&self, kind: DnsTaskKind) -> Result<i64, Error> {
        self.mutate(|s| s.create_task(kind)).await
    }

    async fn find_pending_tasks(&self) -> Result<Vec<DnsTask>, Error> {
        Ok(self.state.read().await.pending_tasks())
    }

    async fn delete_task(&self, task_id: i64) -> Result<(), Error> {
        self.mutate(|s| s.delete_task(task_id)).await.map(|_| ())
    }

    async fn update_task_error(&self, task_id: i64, error: &str) -> Result<(), Error> {
        self.mutate(|s| s.record_task_error(task_id, error))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl LockStore for FileStore {
    async fn lock(&self, key: &str, ttl_secs: u64) -> Result<bool, Error> {
        let now = chrono::Utc::now();
        self.mutate(|s| s.try_lock(key, ttl_secs, now)).await
    }

    async fn increase(&self, key: &str, delta: i64) -> Result<i64, Error> {
        self.mutate(|s| s.increase(key, delta)).await
    }

    async fn read(&self, key: &str) -> Result<i64, Error> {
        Ok(self.state.read().await.read_counter(key))
    }
}

#[async_trait]
impl Inventory for FileStore {
    async fn find_server(&self, server_id: i64) -> Result<Option<ServerDnsInfo>, Error> {
        Ok(self.state.read().await.servers.get(&server_id).cloned())
    }

    async fn find_node(&self, node_id: i64) -> Result<Option<NodeDnsInfo>, Error> {
        Ok(self.state.read().await.nodes.get(&node_id).cloned())
    }

    async fn find_cluster(&self, cluster_id: i64) -> Result<Option<ClusterDnsInfo>, Error> {
        Ok(self.state.read().await.clusters.get(&cluster_id).cloned())
    }

    async fn find_cluster_nodes(&self, cluster_id: i64) -> Result<Vec<NodeDnsInfo>, Error> {
        Ok(self.state.read().await.cluster_nodes(cluster_id))
    }

    async fn find_domain(&self, domain_id: i64) -> Result<Option<DnsDomain>, Error> {
        Ok(self.state.read().await.domains.get(&domain_id).cloned())
    }

    async fn find_provider(&self, provider_id: i64) -> Result<Option<ProviderConfig>, Error> {
        Ok(self.state.read().await.providers.get(&provider_id).cloned())
    }

    async fn update_domain_records(&self, domain_id: i64, records: &[Record]) -> Result<(), Error> {
        let found = self
            .mutate(|s| s.set_domain_records(domain_id, records))
            .await?;
        if !found {
            tracing::debug!("Domain {} vanished before its snapshot was saved", domain_id);
        }
        Ok(())
    }
}
