//! In-memory database server simulation.
//!
//! Stands in for a `PostgreSQL` server in tests and local runs. Databases are
//! keyed by `host:port/name` so two pools opened against the same database
//! see the same rows, while different databases never share state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ems_core::{AccessToken, AccessTokenStore, ConnectionParams, DataStore, NewAccessToken};
use parking_lot::{Mutex, RwLock};

use super::ConnectionFactory;

/// Token table of one simulated database.
#[derive(Debug)]
pub struct MemoryAccessTokenStore {
    next_id: AtomicI64,
    rows: Mutex<BTreeMap<i64, AccessToken>>,
}

impl MemoryAccessTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAccessTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessTokenStore for MemoryAccessTokenStore {
    async fn insert(&self, token: NewAccessToken) -> anyhow::Result<AccessToken> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let row = AccessToken {
            id,
            owner: token.owner,
            name: token.name,
            token_hash: token.token_hash,
            created_at: Utc::now(),
            last_used_at: None,
        };
        self.rows.lock().insert(id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<AccessToken>> {
        Ok(self.rows.lock().get(&id).cloned())
    }

    async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<AccessToken>> {
        Ok(self
            .rows
            .lock()
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn touch(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(row) = self.rows.lock().get_mut(&id) {
            row.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.rows.lock().remove(&id).is_some())
    }
}

/// One simulated logical database.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tokens: Arc<MemoryAccessTokenStore>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(MemoryAccessTokenStore::new()),
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<MemoryAccessTokenStore> {
        &self.tokens
    }
}

/// A "pool" opened against a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryDataStore {
    label: String,
    params: Option<ConnectionParams>,
    database: Arc<MemoryDatabase>,
    closed: AtomicBool,
}

impl MemoryDataStore {
    /// The central catalog database.
    #[must_use]
    pub fn central() -> Self {
        Self {
            label: "catalog".to_string(),
            params: None,
            database: Arc::new(MemoryDatabase::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn open(params: ConnectionParams, database: Arc<MemoryDatabase>) -> Self {
        Self {
            label: params.database.clone(),
            params: Some(params),
            database,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }

    async fn ping(&self) -> anyhow::Result<()> {
        if self.is_closed() {
            anyhow::bail!("pool for {} is closed", self.label);
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn access_tokens(&self) -> Arc<dyn AccessTokenStore> {
        Arc::clone(&self.database.tokens) as Arc<dyn AccessTokenStore>
    }
}

/// Simulated database server(s) handing out [`MemoryDataStore`] pools.
///
/// By default connecting to an unknown database fails, as it would against a
/// real server. [`auto_create`](Self::auto_create) switches that off for
/// local runs.
#[derive(Debug, Default)]
pub struct MemoryConnectionFactory {
    databases: DashMap<String, Arc<MemoryDatabase>>,
    logins: RwLock<HashMap<(String, String), String>>,
    unreachable: RwLock<HashSet<String>>,
    connect_delay: RwLock<Option<Duration>>,
    auto_create: bool,
    connects: AtomicUsize,
}

impl MemoryConnectionFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory that creates databases on first connect.
    #[must_use]
    pub fn auto_create() -> Self {
        Self {
            auto_create: true,
            ..Self::default()
        }
    }

    /// Creates (or returns) the database `name` on `host:port`.
    pub fn create_database(&self, host: &str, port: u16, name: &str) -> Arc<MemoryDatabase> {
        Arc::clone(
            self.databases
                .entry(database_key(host, port, name))
                .or_insert_with(|| Arc::new(MemoryDatabase::new()))
                .value(),
        )
    }

    /// The database a set of parameters points at, if it exists.
    #[must_use]
    pub fn database(&self, params: &ConnectionParams) -> Option<Arc<MemoryDatabase>> {
        self.databases
            .get(&key_of(params))
            .map(|d| Arc::clone(d.value()))
    }

    /// Requires `password` for `username` on `host`.
    pub fn require_login(&self, host: &str, username: &str, password: &str) {
        self.logins
            .write()
            .insert((host.to_string(), username.to_string()), password.to_string());
    }

    /// Makes every connection attempt to `host` fail.
    pub fn set_unreachable(&self, host: &str) {
        self.unreachable.write().insert(host.to_string());
    }

    /// Delays every connection attempt.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.write() = Some(delay);
    }

    /// Number of successful connections opened so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    async fn reach_server(&self, params: &ConnectionParams) -> anyhow::Result<()> {
        let delay = *self.connect_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.read().contains(&params.host) {
            anyhow::bail!("could not connect to server at {}:{}", params.host, params.port);
        }
        let login = (params.host.clone(), params.username.clone());
        if let Some(expected) = self.logins.read().get(&login) {
            if *expected != params.password {
                anyhow::bail!("password authentication failed for user \"{}\"", params.username);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn connect(&self, params: &ConnectionParams) -> anyhow::Result<Arc<dyn DataStore>> {
        self.reach_server(params).await?;
        let database = if self.auto_create {
            self.create_database(&params.host, params.port, &params.database)
        } else {
            self.database(params)
                .ok_or_else(|| anyhow::anyhow!("database \"{}\" does not exist", params.database))?
        };
        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryDataStore::open(params.clone(), database)))
    }

    async fn database_exists(&self, params: &ConnectionParams) -> anyhow::Result<bool> {
        self.reach_server(params).await?;
        Ok(self.databases.contains_key(&key_of(params)))
    }
}

fn database_key(host: &str, port: u16, name: &str) -> String {
    format!("{host}:{port}/{name}")
}

fn key_of(params: &ConnectionParams) -> String {
    database_key(&params.host, params.port, &params.database)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(db: &str) -> ConnectionParams {
        ConnectionParams {
            host: "127.0.0.1".to_string(),
            port: 5432,
            database: db.to_string(),
            username: "app".to_string(),
            password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn unknown_database_is_rejected() {
        let factory = MemoryConnectionFactory::new();
        let err = factory.connect(&params("missing_db")).await.err().unwrap();
        assert!(err.to_string().contains("does not exist"));
        assert_eq!(factory.connect_count(), 0);
    }

    #[tokio::test]
    async fn pools_on_same_database_share_rows() {
        let factory = MemoryConnectionFactory::new();
        factory.create_database("127.0.0.1", 5432, "alpha_db");

        let first = factory.connect(&params("alpha_db")).await.unwrap();
        let second = factory.connect(&params("alpha_db")).await.unwrap();
        first
            .access_tokens()
            .insert(NewAccessToken {
                owner: "u1".to_string(),
                name: "web".to_string(),
                token_hash: "h".to_string(),
            })
            .await
            .unwrap();

        assert!(second.access_tokens().find_by_hash("h").await.unwrap().is_some());
        assert_eq!(factory.connect_count(), 2);
    }

    #[tokio::test]
    async fn wrong_password_fails_login() {
        let factory = MemoryConnectionFactory::auto_create();
        factory.require_login("127.0.0.1", "app", "right");
        let err = factory.connect(&params("alpha_db")).await.err().unwrap();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[tokio::test]
    async fn closed_store_fails_ping() {
        let factory = MemoryConnectionFactory::auto_create();
        let store = factory.connect(&params("alpha_db")).await.unwrap();
        assert!(store.ping().await.is_ok());
        store.close().await;
        assert!(store.is_closed());
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn token_rows_round_trip() {
        let tokens = MemoryAccessTokenStore::new();
        let row = tokens
            .insert(NewAccessToken {
                owner: "u1".to_string(),
                name: "cli".to_string(),
                token_hash: "abc".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(row.id, 1);

        let now = Utc::now();
        tokens.touch(row.id, now).await.unwrap();
        let found = tokens.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(found.last_used_at, Some(now));

        assert!(tokens.delete(row.id).await.unwrap());
        assert!(tokens.is_empty());
    }
}
