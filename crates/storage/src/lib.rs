use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use crisis_core::PlanningState;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::info;

const UPDATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Owner of the current planning snapshot.
///
/// Readers get an `Arc` to an immutable snapshot; `replace` swaps in a new one
/// wholesale, so queries already holding a snapshot never observe a partial
/// update.
pub trait PlanningStateRepository: Send + Sync {
    async fn snapshot(&self) -> Result<Arc<PlanningState>>;
    async fn replace(&self, outputs: PlanningState) -> Result<Arc<PlanningState>>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    current: Arc<RwLock<Arc<PlanningState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanningStateRepository for MemoryStore {
    async fn snapshot(&self) -> Result<Arc<PlanningState>> {
        Ok(self.current.read().clone())
    }

    async fn replace(&self, outputs: PlanningState) -> Result<Arc<PlanningState>> {
        let mut guard = self.current.write();
        let next = Arc::new(stamp(outputs, guard.version + 1));
        *guard = next.clone();
        Ok(next)
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    // replace reads the version before writing; two deferred transactions
    // doing that at once deadlock on the write lock and one fails with SQLITE_BUSY
    writes: Arc<Mutex<()>>,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url {}", database_url))?
            .create_if_missing(true);
        // every connection to an in-memory database would see its own copy
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self {
            pool,
            writes: Arc::new(Mutex::new(())),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS planning_stages (
              stage TEXT PRIMARY KEY,
              payload TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS planning_meta (
              id INTEGER PRIMARY KEY CHECK (id = 1),
              version INTEGER NOT NULL,
              updated_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl PlanningStateRepository for SqliteStore {
    async fn snapshot(&self) -> Result<Arc<PlanningState>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query("SELECT stage, payload FROM planning_stages")
            .fetch_all(&mut *tx)
            .await?;

        let mut document = Map::new();
        for row in rows {
            let stage: String = row.get("stage");
            let payload: String = row.get("payload");
            let value: Value = serde_json::from_str(&payload)
                .with_context(|| format!("stored payload for stage {} is not valid json", stage))?;
            document.insert(stage, value);
        }

        let meta = sqlx::query("SELECT version, updated_at FROM planning_meta WHERE id = 1")
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        if let Some(meta) = meta {
            document.insert(
                "version".to_string(),
                Value::from(meta.get::<i64, _>("version").max(0)),
            );
            document.insert(
                "updatedAt".to_string(),
                meta.get::<Option<String>, _>("updated_at")
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            );
        }

        let state = serde_json::from_value(Value::Object(document))
            .context("stored planning state does not decode")?;
        Ok(Arc::new(state))
    }

    async fn replace(&self, outputs: PlanningState) -> Result<Arc<PlanningState>> {
        let _write = self.writes.lock().await;
        let mut tx = self.pool.begin().await?;

        let version = sqlx::query("SELECT version FROM planning_meta WHERE id = 1")
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get::<i64, _>("version").max(0) as u64)
            .unwrap_or(0)
            + 1;
        let next = stamp(outputs, version);

        sqlx::query("DELETE FROM planning_stages")
            .execute(&mut *tx)
            .await?;

        for stage in PlanningState::STAGES {
            let Some(payload) = next.stage(stage) else {
                continue;
            };
            sqlx::query("INSERT INTO planning_stages (stage, payload) VALUES (?1, ?2)")
                .bind(stage)
                .bind(serde_json::to_string(payload)?)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO planning_meta (id, version, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
              version=excluded.version,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(next.version as i64)
        .bind(&next.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(version = next.version, "planning state persisted");

        Ok(Arc::new(next))
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }
}

impl PlanningStateRepository for Store {
    async fn snapshot(&self) -> Result<Arc<PlanningState>> {
        match self {
            Store::Memory(store) => store.snapshot().await,
            Store::Sqlite(store) => store.snapshot().await,
        }
    }

    async fn replace(&self, outputs: PlanningState) -> Result<Arc<PlanningState>> {
        match self {
            Store::Memory(store) => store.replace(outputs).await,
            Store::Sqlite(store) => store.replace(outputs).await,
        }
    }
}

/// Reads planning outputs from a JSON file shaped like `GET /state`.
pub fn read_state_file(path: &Path) -> Result<PlanningState> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading planning state from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid planning state", path.display()))
}

fn stamp(outputs: PlanningState, version: u64) -> PlanningState {
    PlanningState {
        version,
        updated_at: Some(Utc::now().format(UPDATED_AT_FORMAT).to_string()),
        ..outputs
    }
}
