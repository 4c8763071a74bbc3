//! # Tenant connection pool
//!
//! Maps a tenant id to a live database handle, creating it lazily on first
//! use, caching it, and reclaiming it after inactivity. At most one
//! connection establishment per tenant id is ever in flight: concurrent
//! callers for an uncached tenant coalesce onto a single attempt and all
//! observe the same outcome.
//!
//! Eviction policy: soft eviction with deferred close. Handles are
//! internally reference counted, so the sweep removes the cache entry and
//! issues a graceful close; clones held by in-flight operations drain
//! before the underlying sockets are released, and the next `acquire`
//! establishes a fresh connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crypto::CredentialCipher;
use crate::directory::{TenantDirectory, TenantStatus};

/// Pool failure modes. Cloneable so a single establishment outcome can be
/// broadcast to every coalesced waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Tenant missing from the directory or not in `active` status.
    #[error("tenant {tenant_id} is unavailable")]
    TenantUnavailable { tenant_id: String },
    /// Establishing the underlying connection failed. Surfaced untouched;
    /// retry policy belongs to the caller.
    #[error("failed to connect to tenant {tenant_id} database: {message}")]
    ConnectionFailed { tenant_id: String, message: String },
    /// Stored credentials could not be decrypted. A data-integrity fault:
    /// logged loudly, tenant treated as unavailable at the API boundary.
    #[error("stored credentials for tenant {tenant_id} are unreadable")]
    Decryption { tenant_id: String },
    /// The directory itself failed to answer.
    #[error("tenant directory lookup failed: {message}")]
    Directory { message: String },
}

/// Abstraction over "establish a database connection from a connection
/// string", so tests can substitute a counting or failing factory.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, connection_string: &str) -> Result<DatabaseConnection, String>;
}

/// Production factory backed by SeaORM.
pub struct SeaOrmConnectionFactory;

#[async_trait]
impl ConnectionFactory for SeaOrmConnectionFactory {
    async fn connect(&self, connection_string: &str) -> Result<DatabaseConnection, String> {
        let mut options = ConnectOptions::new(connection_string);
        options
            .max_connections(5)
            .sqlx_logging(true)
            .sqlx_logging_level(log::LevelFilter::Debug);

        Database::connect(options).await.map_err(|e| e.to_string())
    }
}

/// Pool timing policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Cached handles idle longer than this are reclaimed.
    pub idle_timeout: Duration,
    /// Interval between reclamation sweeps.
    pub sweep_interval: Duration,
    /// Ceiling on a single connection establishment attempt.
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

struct CachedConn {
    conn: DatabaseConnection,
    last_used_at: Instant,
}

enum Slot {
    /// Live handle plus its idle clock.
    Ready(CachedConn),
    /// Establishment in flight; waiters subscribe for the shared outcome.
    Creating(broadcast::Sender<Result<DatabaseConnection, PoolError>>),
}

struct PoolInner {
    directory: Arc<dyn TenantDirectory>,
    cipher: Arc<CredentialCipher>,
    factory: Arc<dyn ConnectionFactory>,
    config: PoolConfig,
    entries: Mutex<HashMap<String, Slot>>,
    shutdown: CancellationToken,
}

/// Process-wide tenant connection cache with an explicit lifecycle:
/// construct, [`TenantPool::start`], [`TenantPool::acquire`],
/// [`TenantPool::shutdown`]. Injected by reference, never an ambient
/// singleton.
#[derive(Clone)]
pub struct TenantPool {
    inner: Arc<PoolInner>,
}

impl TenantPool {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        cipher: Arc<CredentialCipher>,
        factory: Arc<dyn ConnectionFactory>,
        config: PoolConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                directory,
                cipher,
                factory,
                config,
                entries: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Spawn the idle-reclamation sweep. Runs until [`TenantPool::shutdown`].
    pub fn start(&self) {
        let pool = self.clone();
        tokio::spawn(async move {
            info!("Starting tenant pool sweep");
            let interval = pool.inner.config.sweep_interval;
            loop {
                tokio::select! {
                    _ = pool.inner.shutdown.cancelled() => {
                        info!("Tenant pool sweep shutdown requested");
                        break;
                    }
                    _ = sleep(interval) => {
                        pool.sweep_once().await;
                    }
                }
            }
        });
    }

    /// Resolve a tenant id to a live handle.
    ///
    /// Cache hits refresh the idle clock and return without I/O. On a miss
    /// the caller that wins the race performs the directory lookup,
    /// credential decryption and connection establishment; everyone else
    /// awaits the broadcast outcome. The entries lock is only ever held
    /// for map operations, never across I/O, so unrelated tenants are
    /// never blocked.
    pub async fn acquire(&self, tenant_id: &str) -> Result<DatabaseConnection, PoolError> {
        loop {
            let tx = {
                let mut entries = self.inner.entries.lock().await;
                match entries.get_mut(tenant_id) {
                    Some(Slot::Ready(cached)) => {
                        cached.last_used_at = Instant::now();
                        return Ok(cached.conn.clone());
                    }
                    Some(Slot::Creating(tx)) => {
                        let mut rx = tx.subscribe();
                        drop(entries);

                        // Waiters bound their wait; if the creating task
                        // vanished, clear the stale marker and retry so
                        // the tenant is never wedged.
                        let grace = self.inner.config.connect_timeout * 2;
                        match timeout(grace, rx.recv()).await {
                            Ok(Ok(result)) => return result,
                            Ok(Err(_)) | Err(_) => {
                                let mut entries = self.inner.entries.lock().await;
                                if let Some(Slot::Creating(_)) = entries.get(tenant_id) {
                                    entries.remove(tenant_id);
                                }
                                continue;
                            }
                        }
                    }
                    None => {
                        let (tx, _rx) = broadcast::channel(1);
                        entries.insert(tenant_id.to_string(), Slot::Creating(tx.clone()));
                        tx
                    }
                }
            };

            let result = self.establish(tenant_id).await;

            {
                let mut entries = self.inner.entries.lock().await;
                match &result {
                    Ok(conn) => {
                        entries.insert(
                            tenant_id.to_string(),
                            Slot::Ready(CachedConn {
                                conn: conn.clone(),
                                last_used_at: Instant::now(),
                            }),
                        );
                    }
                    Err(_) => {
                        entries.remove(tenant_id);
                    }
                }
                gauge!("tenant_pool_cached_connections").set(entries.len() as f64);
            }

            // No receivers is fine; the winning caller already has the result.
            let _ = tx.send(result.clone());
            return result;
        }
    }

    async fn establish(&self, tenant_id: &str) -> Result<DatabaseConnection, PoolError> {
        let record = self
            .inner
            .directory
            .lookup(tenant_id)
            .await
            .map_err(|e| PoolError::Directory {
                message: e.to_string(),
            })?
            .ok_or_else(|| PoolError::TenantUnavailable {
                tenant_id: tenant_id.to_string(),
            })?;

        if record.status != TenantStatus::Active {
            debug!(
                tenant_id,
                status = record.status.as_str(),
                "Refusing connection to non-active tenant"
            );
            return Err(PoolError::TenantUnavailable {
                tenant_id: tenant_id.to_string(),
            });
        }

        let connection_string = self
            .inner
            .cipher
            .decrypt(&record.encrypted_connection_string)
            .map_err(|e| {
                error!(
                    tenant_id,
                    error = %e,
                    "Stored tenant credentials failed to decrypt; data integrity fault"
                );
                PoolError::Decryption {
                    tenant_id: tenant_id.to_string(),
                }
            })?;

        let connect = self.inner.factory.connect(&connection_string);
        let conn = match timeout(self.inner.config.connect_timeout, connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(message)) => {
                return Err(PoolError::ConnectionFailed {
                    tenant_id: tenant_id.to_string(),
                    message,
                });
            }
            Err(_) => {
                return Err(PoolError::ConnectionFailed {
                    tenant_id: tenant_id.to_string(),
                    message: format!(
                        "connection attempt timed out after {:?}",
                        self.inner.config.connect_timeout
                    ),
                });
            }
        };

        counter!("tenant_pool_connections_established_total").increment(1);
        info!(tenant_id, db_name = %record.db_name, "Established tenant database connection");
        Ok(conn)
    }

    /// Run one reclamation pass: evict and close every cached handle idle
    /// beyond the threshold.
    pub async fn sweep_once(&self) {
        let idle_timeout = self.inner.config.idle_timeout;
        let now = Instant::now();

        let evicted: Vec<(String, DatabaseConnection)> = {
            let mut entries = self.inner.entries.lock().await;
            let stale: Vec<String> = entries
                .iter()
                .filter_map(|(tenant_id, slot)| match slot {
                    Slot::Ready(cached)
                        if now.duration_since(cached.last_used_at) > idle_timeout =>
                    {
                        Some(tenant_id.clone())
                    }
                    _ => None,
                })
                .collect();

            let evicted = stale
                .into_iter()
                .filter_map(|tenant_id| match entries.remove(&tenant_id) {
                    Some(Slot::Ready(cached)) => Some((tenant_id, cached.conn)),
                    _ => None,
                })
                .collect();
            gauge!("tenant_pool_cached_connections").set(entries.len() as f64);
            evicted
        };

        for (tenant_id, conn) in evicted {
            counter!("tenant_pool_evictions_total").increment(1);
            debug!(tenant_id = %tenant_id, "Evicting idle tenant connection");
            if let Err(e) = conn.close().await {
                warn!(tenant_id = %tenant_id, error = %e, "Failed to close evicted connection");
            }
        }
    }

    /// Stop the sweep and close every cached handle. Safe to call more
    /// than once; all exit paths must release the underlying sockets.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let drained: Vec<(String, Slot)> = {
            let mut entries = self.inner.entries.lock().await;
            gauge!("tenant_pool_cached_connections").set(0.0);
            entries.drain().collect()
        };

        for (tenant_id, slot) in drained {
            if let Slot::Ready(cached) = slot {
                if let Err(e) = cached.conn.close().await {
                    warn!(tenant_id = %tenant_id, error = %e, "Failed to close connection at shutdown");
                }
            }
        }
        info!("Tenant pool shut down");
    }

    /// Number of cached handles, for health reporting.
    pub async fn cached_count(&self) -> usize {
        self.inner.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryError, TenantRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDirectory {
        records: HashMap<String, TenantRecord>,
    }

    impl FakeDirectory {
        fn with_tenant(cipher: &CredentialCipher, tenant_id: &str, status: TenantStatus) -> Self {
            let record = TenantRecord {
                tenant_id: tenant_id.to_string(),
                name: tenant_id.to_string(),
                status,
                db_name: format!("tenant_{tenant_id}"),
                encrypted_connection_string: cipher
                    .encrypt(&format!("sqlite://tenant_{tenant_id}"))
                    .unwrap(),
            };
            let mut records = HashMap::new();
            records.insert(tenant_id.to_string(), record);
            Self { records }
        }
    }

    #[async_trait]
    impl TenantDirectory for FakeDirectory {
        async fn lookup(&self, tenant_id: &str) -> Result<Option<TenantRecord>, DirectoryError> {
            Ok(self.records.get(tenant_id).cloned())
        }
    }

    struct CountingFactory {
        connects: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingFactory {
        fn new(delay: Duration, fail: bool) -> Self {
            Self {
                connects: AtomicUsize::new(0),
                delay,
                fail,
            }
        }

        fn count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConnectionFactory for CountingFactory {
        async fn connect(&self, _connection_string: &str) -> Result<DatabaseConnection, String> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.fail {
                Err("connection refused".to_string())
            } else {
                Ok(DatabaseConnection::default())
            }
        }
    }

    fn test_cipher() -> Arc<CredentialCipher> {
        Arc::new(CredentialCipher::from_secret("pool-secret", b"pool-salt-16byte").unwrap())
    }

    fn pool_with(
        directory: FakeDirectory,
        cipher: Arc<CredentialCipher>,
        factory: Arc<CountingFactory>,
        config: PoolConfig,
    ) -> TenantPool {
        TenantPool::new(Arc::new(directory), cipher, factory, config)
    }

    #[tokio::test]
    async fn test_acquire_caches_handle() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        let factory = Arc::new(CountingFactory::new(Duration::ZERO, false));
        let pool = pool_with(directory, cipher, factory.clone(), PoolConfig::default());

        pool.acquire("acme").await.expect("first acquire");
        pool.acquire("acme").await.expect("second acquire");

        assert_eq!(factory.count(), 1);
        assert_eq!(pool.cached_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_coalesce_to_one_establishment() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        let factory = Arc::new(CountingFactory::new(Duration::from_millis(50), false));
        let pool = pool_with(directory, cipher, factory.clone(), PoolConfig::default());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.acquire("acme").await }));
        }

        for handle in handles {
            handle.await.unwrap().expect("acquire succeeds");
        }
        assert_eq!(factory.count(), 1);
    }

    #[tokio::test]
    async fn test_coalesced_waiters_see_same_failure() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        let factory = Arc::new(CountingFactory::new(Duration::from_millis(50), true));
        let pool = pool_with(directory, cipher, factory.clone(), PoolConfig::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.acquire("acme").await }));
        }

        for handle in handles {
            let err = handle.await.unwrap().expect_err("acquire fails");
            assert!(matches!(err, PoolError::ConnectionFailed { .. }));
        }
        // One shared attempt for the whole burst.
        assert_eq!(factory.count(), 1);

        // The failed entry was removed; a later caller retries fresh.
        let err = pool.acquire("acme").await.expect_err("still failing");
        assert!(matches!(err, PoolError::ConnectionFailed { .. }));
        assert_eq!(factory.count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tenant_unavailable() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        let factory = Arc::new(CountingFactory::new(Duration::ZERO, false));
        let pool = pool_with(directory, cipher, factory.clone(), PoolConfig::default());

        let err = pool.acquire("globex").await.expect_err("unknown tenant");
        assert_eq!(
            err,
            PoolError::TenantUnavailable {
                tenant_id: "globex".to_string()
            }
        );
        assert_eq!(factory.count(), 0);
    }

    #[tokio::test]
    async fn test_suspended_tenant_unavailable() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Suspended);
        let factory = Arc::new(CountingFactory::new(Duration::ZERO, false));
        let pool = pool_with(directory, cipher, factory.clone(), PoolConfig::default());

        let err = pool.acquire("acme").await.expect_err("suspended tenant");
        assert!(matches!(err, PoolError::TenantUnavailable { .. }));
        assert_eq!(factory.count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_credentials_are_decryption_error() {
        let cipher = test_cipher();
        let mut directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        directory
            .records
            .get_mut("acme")
            .unwrap()
            .encrypted_connection_string = "not-hex-at-all".to_string();
        let factory = Arc::new(CountingFactory::new(Duration::ZERO, false));
        let pool = pool_with(directory, cipher, factory.clone(), PoolConfig::default());

        let err = pool.acquire("acme").await.expect_err("bad ciphertext");
        assert!(matches!(err, PoolError::Decryption { .. }));
        assert_eq!(factory.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_handle_is_reclaimed_and_reestablished() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        let factory = Arc::new(CountingFactory::new(Duration::ZERO, false));
        let pool = pool_with(directory, cipher, factory.clone(), PoolConfig::default());

        pool.acquire("acme").await.expect("first acquire");
        assert_eq!(factory.count(), 1);

        // Past the idle threshold: the sweep reclaims the handle.
        tokio::time::advance(Duration::from_secs(31)).await;
        pool.sweep_once().await;
        assert_eq!(pool.cached_count().await, 0);

        pool.acquire("acme").await.expect("re-acquire");
        assert_eq!(factory.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_use_survives_sweep() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        let factory = Arc::new(CountingFactory::new(Duration::ZERO, false));
        let pool = pool_with(directory, cipher, factory.clone(), PoolConfig::default());

        pool.acquire("acme").await.expect("first acquire");
        tokio::time::advance(Duration::from_secs(20)).await;
        // Refreshes the idle clock.
        pool.acquire("acme").await.expect("refresh");
        tokio::time::advance(Duration::from_secs(20)).await;
        pool.sweep_once().await;

        assert_eq!(pool.cached_count().await, 1);
        pool.acquire("acme").await.expect("still cached");
        assert_eq!(factory.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_releases_in_flight_marker() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        // Slower than the configured connect timeout.
        let factory = Arc::new(CountingFactory::new(Duration::from_secs(120), false));
        let config = PoolConfig {
            connect_timeout: Duration::from_secs(30),
            ..PoolConfig::default()
        };
        let pool = pool_with(directory, cipher, factory.clone(), config);

        let err = pool.acquire("acme").await.expect_err("times out");
        assert!(matches!(err, PoolError::ConnectionFailed { .. }));

        // The marker was released; the next caller gets a fresh attempt.
        let err = pool.acquire("acme").await.expect_err("times out again");
        assert!(matches!(err, PoolError::ConnectionFailed { .. }));
        assert_eq!(factory.count(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_empties_cache() {
        let cipher = test_cipher();
        let directory = FakeDirectory::with_tenant(&cipher, "acme", TenantStatus::Active);
        let factory = Arc::new(CountingFactory::new(Duration::ZERO, false));
        let pool = pool_with(directory, cipher, factory, PoolConfig::default());

        pool.acquire("acme").await.expect("acquire");
        pool.shutdown().await;
        assert_eq!(pool.cached_count().await, 0);

        // Idempotent.
        pool.shutdown().await;
    }
}
