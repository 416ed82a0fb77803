//! Database manager: driver registry, configuration index, pool cache
//!
//! The manager owns the registered drivers and the named connection
//! configurations, builds connections and pools on demand, and memoises
//! pools by a canonical (configuration, options) key so equal requests share
//! one pool. Failures are recorded in `last_error` and per-kind counters.

use super::driver::{Connection, Driver};
use super::error::{DbError, DbErrorKind, ErrorCounters, Result};
use super::logging::{log_db_error, LogLevel};
use super::pool::{ConnectionPool, PoolOptions};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

struct ManagerState {
    drivers: HashMap<String, Arc<dyn Driver>>,
    configs: serde_json::Map<String, Value>,
    pool_cache: HashMap<String, Weak<ConnectionPool>>,
    last_error: String,
    error_counters: ErrorCounters,
}

/// Process-scoped registry of drivers, configurations and memoised pools.
///
/// Usable as a caller-owned instance or through the lazily initialised
/// [`DatabaseManager::global`] convenience. Managers are always shared
/// (`Arc`): pool factories call back into the manager that built them. The
/// internal mutex guards registry mutation only; it is never held across
/// driver factory calls or pool construction.
pub struct DatabaseManager {
    state: Mutex<ManagerState>,
    // Captured by pool factories so they can call back into this manager.
    self_ref: Weak<DatabaseManager>,
}

impl DatabaseManager {
    /// Create an empty manager
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| DatabaseManager {
            state: Mutex::new(ManagerState {
                drivers: HashMap::new(),
                configs: serde_json::Map::new(),
                pool_cache: HashMap::new(),
                last_error: String::new(),
                error_counters: ErrorCounters::default(),
            }),
            self_ref: weak.clone(),
        })
    }

    /// The process-wide default manager, initialised on first use
    pub fn global() -> &'static Arc<DatabaseManager> {
        static GLOBAL: OnceLock<Arc<DatabaseManager>> = OnceLock::new();
        GLOBAL.get_or_init(DatabaseManager::new)
    }

    /// Register a driver under its own name; a driver registered earlier
    /// under the same name is overwritten (last-registered wins)
    pub fn register_driver(&self, driver: Arc<dyn Driver>) -> Result<()> {
        let name = driver.name().to_string();
        if name.is_empty() {
            return Err(self.record_error(
                "db_manager_register_driver",
                DbError::invalid_argument("Driver name must not be empty"),
            ));
        }
        let mut state = self.state.lock();
        state.drivers.insert(name, driver);
        state.last_error.clear();
        Ok(())
    }

    /// Ingest a parsed configuration document.
    ///
    /// The document must carry a top-level `connections` object mapping
    /// connection names to driver-specific property bags. The previous
    /// configuration set is replaced atomically.
    pub fn load_config(&self, document: &Value) -> Result<()> {
        let Some(connections) = document.get("connections").and_then(Value::as_object) else {
            return Err(self.record_error(
                "db_manager_load_config",
                DbError::configuration(
                    "Invalid config document: missing object key 'connections'",
                ),
            ));
        };

        let mut state = self.state.lock();
        state.configs = connections.clone();
        state.last_error.clear();
        Ok(())
    }

    /// Read and parse a JSON configuration file, then [`Self::load_config`]
    pub fn load_config_file(&self, path: &str) -> Result<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            self.record_error(
                "db_manager_load_config",
                DbError::configuration(format!("Cannot open config file {}: {}", path, e)),
            )
        })?;
        let document: Value = serde_json::from_str(&contents).map_err(|e| {
            self.record_error(
                "db_manager_load_config",
                DbError::configuration(format!("JSON parse error: {}", e)),
            )
        })?;
        self.load_config(&document)
    }

    /// Create a fresh unopened connection for a named configuration
    pub fn create_connection(&self, name: &str) -> Result<Box<dyn Connection>> {
        const EVENT: &str = "db_manager_create_connection";

        let looked_up = {
            let state = self.state.lock();
            match state.configs.get(name) {
                None => Err(DbError::not_found(format!(
                    "Connection config not found: {}",
                    name
                ))),
                Some(config) => match config.get("driver").and_then(Value::as_str) {
                    None => Err(DbError::configuration(format!(
                        "Missing required field 'driver' for connection: {}",
                        name
                    ))),
                    Some(driver_name) => match state.drivers.get(driver_name) {
                        None => Err(DbError::not_found(format!(
                            "Driver not supported or registered: {}",
                            driver_name
                        ))),
                        Some(driver) => Ok((Arc::clone(driver), config.clone())),
                    },
                },
            }
        };

        let (driver, config) = match looked_up {
            Ok(found) => found,
            Err(err) => return Err(self.record_error(EVENT, err)),
        };
        self.invoke_factory(EVENT, driver.as_ref(), &config)
    }

    /// Create a fresh unopened connection from an explicit driver name and
    /// configuration bag, bypassing the configuration index
    pub fn create_connection_raw(
        &self,
        driver_name: &str,
        config: &Value,
    ) -> Result<Box<dyn Connection>> {
        const EVENT: &str = "db_manager_create_connection_raw";

        let looked_up = {
            let state = self.state.lock();
            state.drivers.get(driver_name).map(Arc::clone)
        };

        let Some(driver) = looked_up else {
            return Err(self.record_error(
                EVENT,
                DbError::not_found(format!("Driver not found: {}", driver_name)),
            ));
        };
        self.invoke_factory(EVENT, driver.as_ref(), config)
    }

    /// Create or fetch the memoised pool for a named configuration
    pub fn create_pool(&self, name: &str, options: PoolOptions) -> Result<Arc<ConnectionPool>> {
        const EVENT: &str = "db_manager_create_pool";

        let options = normalize_options(options);
        if options.max_size == 0 {
            return Err(self.record_error(
                EVENT,
                DbError::invalid_argument("ConnectionPool maxSize must be greater than 0"),
            ));
        }

        let key = pool_key_for_name(name, &options);
        if let Some(cached) = self.cached_pool(&key) {
            return Ok(cached);
        }

        let manager = self.shared(EVENT)?;
        let conn_name = name.to_string();
        let factory: super::pool::ConnectionFactory =
            Box::new(move || manager.create_connection(&conn_name));

        self.build_and_publish(key, factory, options)
    }

    /// Create or fetch the memoised pool for an explicit driver name and
    /// configuration bag
    pub fn create_pool_raw(
        &self,
        driver_name: &str,
        config: &Value,
        options: PoolOptions,
    ) -> Result<Arc<ConnectionPool>> {
        const EVENT: &str = "db_manager_create_pool_raw";

        let options = normalize_options(options);
        if options.max_size == 0 {
            return Err(self.record_error(
                EVENT,
                DbError::invalid_argument("ConnectionPool maxSize must be greater than 0"),
            ));
        }

        let key = pool_key_for_raw(driver_name, config, &options);
        {
            if let Some(cached) = self.cached_pool(&key) {
                return Ok(cached);
            }
            let state = self.state.lock();
            if !state.drivers.contains_key(driver_name) {
                drop(state);
                return Err(self.record_error(
                    EVENT,
                    DbError::not_found(format!("Driver not found: {}", driver_name)),
                ));
            }
        }

        let manager = self.shared(EVENT)?;
        let driver_name = driver_name.to_string();
        let config = config.clone();
        let factory: super::pool::ConnectionFactory =
            Box::new(move || manager.create_connection_raw(&driver_name, &config));

        self.build_and_publish(key, factory, options)
    }

    /// Last observed failure message, for diagnostics
    pub fn last_error(&self) -> String {
        self.state.lock().last_error.clone()
    }

    /// Snapshot of the per-kind error counters
    pub fn error_counters(&self) -> ErrorCounters {
        self.state.lock().error_counters.clone()
    }

    /// Zero the per-kind error counters
    pub fn reset_error_counters(&self) {
        self.state.lock().error_counters = ErrorCounters::default();
    }

    fn invoke_factory(
        &self,
        event: &str,
        driver: &dyn Driver,
        config: &Value,
    ) -> Result<Box<dyn Connection>> {
        match driver.create_connection(config) {
            Ok(conn) => {
                self.state.lock().last_error.clear();
                Ok(conn)
            }
            Err(mut err) => {
                if err.kind == DbErrorKind::Unknown {
                    err.kind = DbErrorKind::Internal;
                }
                err.retryable = true;
                Err(self.record_error(event, err))
            }
        }
    }

    fn shared(&self, event: &str) -> Result<Arc<DatabaseManager>> {
        self.self_ref.upgrade().ok_or_else(|| {
            self.record_error(
                event,
                DbError::internal("Manager is being torn down").retryable(),
            )
        })
    }

    fn build_and_publish(
        &self,
        key: String,
        factory: super::pool::ConnectionFactory,
        options: PoolOptions,
    ) -> Result<Arc<ConnectionPool>> {
        // Options were validated by the caller, so construction cannot
        // fail on them; factory is always present.
        let pool = ConnectionPool::with_factory(factory, options)?;

        // Double-check under the lock; a racing publisher wins and the
        // freshly built pool is discarded.
        let mut state = self.state.lock();
        if let Some(existing) = state.pool_cache.get(&key).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        state.pool_cache.insert(key, Arc::downgrade(&pool));
        state.last_error.clear();
        Ok(pool)
    }

    fn cached_pool(&self, key: &str) -> Option<Arc<ConnectionPool>> {
        let mut state = self.state.lock();
        match state.pool_cache.get(key).and_then(Weak::upgrade) {
            Some(pool) => {
                state.last_error.clear();
                Some(pool)
            }
            None => {
                state.pool_cache.remove(key);
                None
            }
        }
    }

    fn record_error(&self, event: &str, err: DbError) -> DbError {
        {
            let mut state = self.state.lock();
            state.last_error = err.message.clone();
            state.error_counters.increment(err.kind);
        }
        let level = if err.kind == DbErrorKind::Configuration {
            LogLevel::Error
        } else {
            LogLevel::Warn
        };
        log_db_error(level, event, &err);
        err
    }
}

fn normalize_options(mut options: PoolOptions) -> PoolOptions {
    if options.min_size > options.max_size && options.max_size > 0 {
        options.min_size = options.max_size;
    }
    options
}

fn options_key(options: &PoolOptions) -> String {
    format!(
        "min={};max={};wait={};borrow={};return={}",
        options.min_size,
        options.max_size,
        options.wait_timeout.as_millis(),
        u8::from(options.test_on_borrow),
        u8::from(options.test_on_return),
    )
}

fn pool_key_for_name(name: &str, options: &PoolOptions) -> String {
    format!("name:{}|{}", name, options_key(options))
}

/// `serde_json`'s object map is BTree-backed, so serialising a `Value`
/// object yields key-sorted, stable bytes: same logical config, same key.
fn pool_key_for_raw(driver_name: &str, config: &Value, options: &PoolOptions) -> String {
    format!(
        "raw:{}|{}|{}",
        driver_name,
        config,
        options_key(options)
    )
}
