//! connection
//!
//! Connection producer: configuration state plus a lazily created, cached
//! PlanetScale client.
//!
//! # Concurrency
//!
//! One `Mutex` guards the whole producer state. Reading the cached client,
//! constructing it when absent, and dropping it on `close` each happen
//! entirely under that lock, so concurrent callers observe at most one
//! construction and `close` cannot interleave with a lazy create.
//!
//! The lock is released before the caller uses the client. Outbound calls
//! therefore run concurrently; they hold their own `Arc` to the client, so
//! a concurrent `close` only affects later callers.
//!
//! Re-initialization is two-phase: [`ConnectionProducer::prepare`] validates
//! and builds a client without the lock, and [`ConnectionProducer::commit`]
//! swaps it in under the lock. Nothing is replaced until commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::DbPluginError;
use crate::planetscale::{ClientFactory, HttpClientFactory, PasswordApi};
use crate::redact::secret_values;

/// A consistent snapshot of the client and the database it targets.
#[derive(Clone)]
pub struct Connection {
    pub client: Arc<dyn PasswordApi>,
    pub organization: String,
    pub database: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("client", &self.client.name())
            .field("organization", &self.organization)
            .field("database", &self.database)
            .finish()
    }
}

/// A validated configuration and a client built from it, not yet installed.
///
/// Produced by [`ConnectionProducer::prepare`]; installing it with
/// [`ConnectionProducer::commit`] replaces the producer state in one step.
pub struct PreparedConnection {
    config: ConnectionConfig,
    client: Arc<dyn PasswordApi>,
}

impl PreparedConnection {
    /// The freshly built client, usable before commit.
    pub fn client(&self) -> &Arc<dyn PasswordApi> {
        &self.client
    }

    pub fn organization(&self) -> &str {
        &self.config.organization
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }
}

#[derive(Default)]
struct ProducerState {
    initialized: bool,
    config: ConnectionConfig,
    client: Option<Arc<dyn PasswordApi>>,
}

/// Owns the connection configuration and the cached client.
pub struct ConnectionProducer {
    factory: Box<dyn ClientFactory>,
    state: Mutex<ProducerState>,
}

impl Default for ConnectionProducer {
    fn default() -> Self {
        Self::new(Box::new(HttpClientFactory))
    }
}

impl ConnectionProducer {
    /// Create an uninitialized producer that builds clients with `factory`.
    pub fn new(factory: Box<dyn ClientFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(ProducerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProducerState> {
        // State is only replaced wholesale, so a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate `config`, build and cache a client, and mark the producer
    /// initialized.
    ///
    /// Replaces any previous configuration and client. On failure the
    /// previous state is left untouched.
    ///
    /// Returns the raw configuration map for the host to persist.
    pub fn init(&self, config: ConnectionConfig) -> Result<Map<String, Value>, DbPluginError> {
        let prepared = self.prepare(config)?;
        Ok(self.commit(prepared))
    }

    /// Validate `config` and build a client for it without touching the
    /// current state.
    pub fn prepare(&self, config: ConnectionConfig) -> Result<PreparedConnection, DbPluginError> {
        config.validate()?;

        let client = self
            .factory
            .create_client(&config)
            .map_err(|e| DbPluginError::client("failed to initialize connection", e))?;

        debug!(
            organization = %config.organization,
            database = %config.database,
            client = client.name(),
            "constructed planetscale client"
        );
        Ok(PreparedConnection { config, client })
    }

    /// Install a prepared connection, replacing configuration and client.
    ///
    /// Returns the raw configuration map for the host to persist.
    pub fn commit(&self, prepared: PreparedConnection) -> Map<String, Value> {
        let PreparedConnection { config, client } = prepared;
        let raw = config.raw.clone();
        *self.lock() = ProducerState {
            initialized: true,
            config,
            client: Some(client),
        };
        raw
    }

    /// Whether `init` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Return the cached client, constructing it if absent.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` if `init` never succeeded
    /// - `Client` if construction fails
    pub fn get_client(&self) -> Result<Arc<dyn PasswordApi>, DbPluginError> {
        self.connection().map(|c| c.client)
    }

    /// Like [`get_client`](Self::get_client), together with the configured
    /// organization and database, read under the same lock.
    pub fn connection(&self) -> Result<Connection, DbPluginError> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(DbPluginError::NotInitialized);
        }

        let client = match state.client.clone() {
            Some(client) => client,
            None => {
                let client = self
                    .factory
                    .create_client(&state.config)
                    .map_err(|e| DbPluginError::client("unable to get client", e))?;
                debug!(client = client.name(), "recreated planetscale client");
                state.client = Some(client.clone());
                client
            }
        };

        Ok(Connection {
            client,
            organization: state.config.organization.clone(),
            database: state.config.database.clone(),
        })
    }

    /// Drop the cached client. Idempotent; does not reset initialization.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.client.take().is_some() {
            debug!("dropped cached planetscale client");
        }
    }

    /// Map of live secret values to their placeholders.
    ///
    /// Empty values are never included.
    pub fn secret_values(&self) -> HashMap<String, String> {
        secret_values(&self.lock().config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::planetscale::mock::{MockClientFactory, MockPasswordApi};
    use crate::planetscale::ApiError;
    use crate::redact::{PASSWORD_PLACEHOLDER, SERVICE_TOKEN_PLACEHOLDER};

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("acme", "db1", "tok", "name")
    }

    fn producer() -> (ConnectionProducer, MockClientFactory) {
        let factory = MockClientFactory::new(MockPasswordApi::new());
        (ConnectionProducer::new(Box::new(factory.clone())), factory)
    }

    #[test]
    fn get_client_before_init_fails() {
        let (producer, factory) = producer();
        let err = producer.get_client().err().expect("expected error");
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
        assert_eq!(factory.constructed(), 0);
    }

    #[test]
    fn init_builds_and_caches_client() {
        let (producer, factory) = producer();
        let raw = producer.init(config()).unwrap();
        assert_eq!(raw.get("organization").and_then(|v| v.as_str()), Some("acme"));
        assert!(producer.is_initialized());

        producer.get_client().unwrap();
        producer.get_client().unwrap();
        assert_eq!(factory.constructed(), 1);
    }

    #[test]
    fn invalid_config_caches_nothing() {
        let (producer, factory) = producer();
        let mut cfg = config();
        cfg.token_name.clear();

        let err = producer.init(cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigValidation);
        assert!(!producer.is_initialized());
        assert_eq!(factory.constructed(), 0);
    }

    #[test]
    fn construction_failure_fails_init() {
        let producer = ConnectionProducer::new(Box::new(MockClientFactory::failing(
            ApiError::Construction("bad header".into()),
        )));
        let err = producer.init(config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Client);
        assert!(!producer.is_initialized());
    }

    #[test]
    fn prepare_leaves_state_untouched() {
        let (producer, factory) = producer();
        producer.init(config()).unwrap();

        let prepared = producer
            .prepare(ConnectionConfig::new("other", "db2", "tok2", "name2"))
            .unwrap();
        assert_eq!(prepared.organization(), "other");
        assert_eq!(prepared.database(), "db2");
        assert_eq!(factory.constructed(), 2);

        drop(prepared);
        assert_eq!(producer.connection().unwrap().organization, "acme");
        assert!(producer.secret_values().contains_key("tok"));
    }

    #[test]
    fn commit_installs_prepared_client() {
        let (producer, factory) = producer();
        let prepared = producer.prepare(config()).unwrap();
        assert!(!producer.is_initialized());

        let raw = producer.commit(prepared);
        assert_eq!(raw.get("database").and_then(|v| v.as_str()), Some("db1"));
        assert!(producer.is_initialized());
        producer.get_client().unwrap();
        assert_eq!(factory.constructed(), 1);
    }

    #[test]
    fn close_then_get_recreates() {
        let (producer, factory) = producer();
        producer.init(config()).unwrap();

        producer.close();
        producer.close();
        assert!(producer.is_initialized());

        producer.get_client().unwrap();
        assert_eq!(factory.constructed(), 2);
    }

    #[test]
    fn close_without_client_is_noop() {
        let (producer, _) = producer();
        producer.close();
        assert!(!producer.is_initialized());
    }

    #[test]
    fn connection_snapshot_carries_target() {
        let (producer, _) = producer();
        producer.init(config()).unwrap();
        let conn = producer.connection().unwrap();
        assert_eq!(conn.organization, "acme");
        assert_eq!(conn.database, "db1");
        assert_eq!(conn.client.name(), "mock");
    }

    #[test]
    fn reinit_replaces_configuration() {
        let (producer, _) = producer();
        producer.init(config()).unwrap();
        producer
            .init(ConnectionConfig::new("other", "db2", "tok2", "name2"))
            .unwrap();
        assert_eq!(producer.connection().unwrap().organization, "other");
        assert!(producer.secret_values().contains_key("tok2"));
        assert!(!producer.secret_values().contains_key("tok"));
    }

    #[test]
    fn secret_values_cover_token_and_password() {
        let (producer, _) = producer();
        assert!(producer.secret_values().is_empty());

        let mut cfg = config();
        cfg.password = Some("pw".into());
        producer.init(cfg).unwrap();

        let secrets = producer.secret_values();
        assert_eq!(secrets.get("tok").map(String::as_str), Some(SERVICE_TOKEN_PLACEHOLDER));
        assert_eq!(secrets.get("pw").map(String::as_str), Some(PASSWORD_PLACEHOLDER));
    }

    #[test]
    fn empty_password_not_redacted() {
        let (producer, _) = producer();
        let mut cfg = config();
        cfg.password = Some(String::new());
        producer.init(cfg).unwrap();
        assert_eq!(producer.secret_values().len(), 1);
    }
}
