//! # Local Store
//!
//! The embedded offline database. It holds the cached domain entities, the
//! AI-tutor response cache and the outbox of mutations the remote server has not
//! acknowledged yet.
//!
//! The store is backed by Turso. When the engine cannot be opened the store
//! degrades to an *inert* instance: reads return empty results and writes are
//! dropped, so callers never need to detect the environment themselves.

mod records;
pub mod sql;

pub use records::{Record, Table};
pub use sql::SCHEMA_VERSION;

use crate::errors::StoreError;
use crate::types::{AiCacheEntry, AiCacheKey, OutboxItem, OutboxKind};
use chrono::{DateTime, Utc};
use std::fmt::{self, Debug};
use std::path::Path;
use tracing::{debug, info, warn};
use turso::{params, Connection, Database, Rows, Value as TursoValue};
use uuid::Uuid;

const IN_MEMORY: &str = ":memory:";

/// A handle to the offline database.
///
/// Cloning the handle shares the same underlying database, so one store can be
/// handed to every service of a running client.
#[derive(Clone)]
pub struct LocalStore {
    db: Option<Database>,
    location: String,
}

impl LocalStore {
    /// Opens (or creates) the store at `path` and migrates it to `SCHEMA_VERSION`.
    ///
    /// Use ":memory:" for an isolated in-memory store.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Self::open_with_schema(path, SCHEMA_VERSION).await
    }

    /// Opens the store and migrates it up to `target_version` only.
    ///
    /// Opening a store persisted at a newer version than `target_version` leaves
    /// it untouched.
    pub async fn open_with_schema(path: &str, target_version: u32) -> Result<Self, StoreError> {
        if path != IN_MEMORY {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let db = turso::Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        if path != IN_MEMORY {
            // PRAGMA returns a row, so it goes through `query`.
            conn.query("PRAGMA journal_mode=WAL;", ()).await?;
        }

        let version = migrate(&conn, target_version).await?;
        info!(path = %path, version, "Local store opened.");

        Ok(Self {
            db: Some(db),
            location: path.to_string(),
        })
    }

    /// Opens the store, falling back to an inert instance if the engine is unavailable.
    pub async fn open_or_inert(path: &str) -> Self {
        match Self::open(path).await {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path, error = %e, "Storage engine unavailable, using an inert store.");
                Self::inert()
            }
        }
    }

    /// A store with no engine behind it.
    pub fn inert() -> Self {
        Self {
            db: None,
            location: String::new(),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.db.is_none()
    }

    fn connect(&self) -> Result<Option<Connection>, StoreError> {
        match &self.db {
            Some(db) => Ok(Some(db.connect()?)),
            None => Ok(None),
        }
    }

    /// The schema version persisted in the database (0 for an inert store).
    pub async fn schema_version(&self) -> Result<u32, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(0);
        };
        read_schema_version(&conn).await
    }

    // --- Keyed tables ---

    /// Inserts the record or replaces the row with the same key.
    pub async fn put<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let Some(conn) = self.connect()? else {
            debug!(table = R::TABLE.name(), "Inert store, dropping put.");
            return Ok(());
        };

        let table = R::TABLE;
        let index_columns = table.index_columns();
        let columns = std::iter::once("id")
            .chain(index_columns.iter().copied())
            .chain(std::iter::once("data"))
            .collect::<Vec<_>>();
        let placeholders = columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let update_set_clause = columns
            .iter()
            .skip(1)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})
             ON CONFLICT(id) DO UPDATE SET {update_set_clause}",
            table.name(),
            columns.join(", ")
        );

        let mut params: Vec<TursoValue> = vec![TursoValue::Text(record.key().to_string())];
        params.extend(record.index_values().into_iter().map(text_or_null));
        params.push(TursoValue::Text(serde_json::to_string(record)?));

        conn.execute(&sql, params).await?;
        Ok(())
    }

    /// Point lookup by primary key.
    pub async fn get<R: Record>(&self, key: &str) -> Result<Option<R>, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(None);
        };
        let sql = format!("SELECT data FROM {} WHERE id = ?", R::TABLE.name());
        let rows = conn.query(&sql, params![key]).await?;
        Ok(collect_records::<R>(rows).await?.into_iter().next())
    }

    /// Range scan over a declared secondary index, in insertion order.
    pub async fn scan_by_index<R: Record>(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Vec<R>, StoreError> {
        check_index::<R>(column)?;
        let Some(conn) = self.connect()? else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT data FROM {} WHERE {column} = ? ORDER BY rowid ASC",
            R::TABLE.name()
        );
        let rows = conn.query(&sql, params![value]).await?;
        collect_records(rows).await
    }

    /// Every row of the record's table, in insertion order.
    pub async fn scan_all<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(Vec::new());
        };
        let sql = format!("SELECT data FROM {} ORDER BY rowid ASC", R::TABLE.name());
        let rows = conn.query(&sql, ()).await?;
        collect_records(rows).await
    }

    /// Deletes the row with `key`. Returns whether a row was removed.
    pub async fn delete<R: Record>(&self, key: &str) -> Result<bool, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(false);
        };
        let sql = format!("DELETE FROM {} WHERE id = ?", R::TABLE.name());
        Ok(conn.execute(&sql, params![key]).await? > 0)
    }

    /// Deletes every row whose indexed `column` equals `value`.
    pub async fn delete_by_index<R: Record>(
        &self,
        column: &str,
        value: &str,
    ) -> Result<u64, StoreError> {
        check_index::<R>(column)?;
        let Some(conn) = self.connect()? else {
            return Ok(0);
        };
        let sql = format!("DELETE FROM {} WHERE {column} = ?", R::TABLE.name());
        Ok(conn.execute(&sql, params![value]).await?)
    }

    pub async fn count<R: Record>(&self) -> Result<usize, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(0);
        };
        let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE.name());
        count_rows(&conn, &sql).await
    }

    // --- Outbox ---

    /// Appends a mutation to the outbox.
    pub async fn enqueue_outbox(
        &self,
        kind: OutboxKind,
        payload: &serde_json::Value,
    ) -> Result<OutboxItem, StoreError> {
        let mut item = OutboxItem {
            seq: 0,
            id: Uuid::new_v4().to_string(),
            kind,
            payload: payload.clone(),
            created_at: Utc::now(),
            retry_count: 0,
        };
        let Some(conn) = self.connect()? else {
            debug!(kind = %kind, "Inert store, outbox item not persisted.");
            return Ok(item);
        };

        conn.execute(
            "INSERT INTO outbox (id, kind, payload, created_at, retry_count) VALUES (?, ?, ?, ?, 0)",
            params![
                item.id.clone(),
                kind.as_str(),
                serde_json::to_string(payload)?,
                item.created_at.to_rfc3339()
            ],
        )
        .await?;

        let mut rows = conn
            .query("SELECT seq FROM outbox WHERE id = ?", params![item.id.clone()])
            .await?;
        if let Some(row) = rows.next().await? {
            item.seq = row.get(0)?;
        }
        debug!(id = %item.id, seq = item.seq, kind = %kind, "Mutation queued in the outbox.");
        Ok(item)
    }

    /// All outbox items in insertion (FIFO) order.
    pub async fn outbox_items(&self) -> Result<Vec<OutboxItem>, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(Vec::new());
        };
        let mut rows = conn
            .query(
                "SELECT seq, id, kind, payload, created_at, retry_count FROM outbox ORDER BY seq ASC",
                (),
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            let seq: i64 = row.get(0)?;
            let kind: String = row.get(2)?;
            let Ok(kind) = kind.parse::<OutboxKind>() else {
                warn!(seq, kind = %kind, "Skipping outbox row with an unknown kind.");
                continue;
            };
            let payload: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            let retry_count: i64 = row.get(5)?;
            items.push(OutboxItem {
                seq,
                id: row.get(1)?,
                kind,
                payload: serde_json::from_str(&payload)?,
                created_at: parse_timestamp(&created_at),
                retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            });
        }
        Ok(items)
    }

    pub async fn outbox_len(&self) -> Result<usize, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(0);
        };
        count_rows(&conn, "SELECT COUNT(*) FROM outbox").await
    }

    pub async fn set_outbox_retry_count(&self, seq: i64, retry_count: u32) -> Result<(), StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(());
        };
        conn.execute(
            "UPDATE outbox SET retry_count = ? WHERE seq = ?",
            params![i64::from(retry_count), seq],
        )
        .await?;
        Ok(())
    }

    pub async fn delete_outbox_item(&self, seq: i64) -> Result<(), StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(());
        };
        conn.execute("DELETE FROM outbox WHERE seq = ?", params![seq])
            .await?;
        Ok(())
    }

    // --- AI response cache ---

    /// Exact-match lookup on the composite key. A hit becomes the most recently used entry.
    pub async fn ai_cache_lookup(&self, key: &AiCacheKey) -> Result<Option<AiCacheEntry>, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(None);
        };
        let mut rows = conn
            .query(
                "SELECT id, response, created_at FROM ai_cache
                 WHERE query = ? AND course_id = ? AND lesson_id = ?
                 ORDER BY last_accessed DESC LIMIT 1",
                ai_key_params(key),
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let id: i64 = row.get(0)?;
        let response: String = row.get(1)?;
        let created_at: String = row.get(2)?;
        drop(rows);

        let tick = next_access_tick(&conn).await?;
        conn.execute(
            "UPDATE ai_cache SET last_accessed = ? WHERE id = ?",
            params![tick, id],
        )
        .await?;

        Ok(Some(AiCacheEntry {
            key: key.clone(),
            response,
            created_at: parse_timestamp(&created_at),
        }))
    }

    /// Stores a response under its key and evicts least recently used entries
    /// beyond `capacity`. Returns the number of evicted entries.
    pub async fn ai_cache_insert(
        &self,
        entry: &AiCacheEntry,
        capacity: usize,
    ) -> Result<usize, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(0);
        };
        conn.execute(
            "DELETE FROM ai_cache WHERE query = ? AND course_id = ? AND lesson_id = ?",
            ai_key_params(&entry.key),
        )
        .await?;

        let tick = next_access_tick(&conn).await?;
        let mut params = ai_key_params(&entry.key);
        params.push(TursoValue::Text(entry.response.clone()));
        params.push(TursoValue::Text(entry.created_at.to_rfc3339()));
        params.push(TursoValue::Integer(tick));
        conn.execute(
            "INSERT INTO ai_cache (query, course_id, lesson_id, response, created_at, last_accessed)
             VALUES (?, ?, ?, ?, ?, ?)",
            params,
        )
        .await?;

        let len = count_rows(&conn, "SELECT COUNT(*) FROM ai_cache").await?;
        if len <= capacity {
            return Ok(0);
        }
        let excess = len - capacity;
        let mut rows = conn
            .query(
                &format!("SELECT id FROM ai_cache ORDER BY last_accessed ASC, id ASC LIMIT {excess}"),
                (),
            )
            .await?;
        let mut victims: Vec<i64> = Vec::with_capacity(excess);
        while let Some(row) = rows.next().await? {
            victims.push(row.get(0)?);
        }
        drop(rows);

        for id in &victims {
            conn.execute("DELETE FROM ai_cache WHERE id = ?", params![*id])
                .await?;
        }
        debug!(evicted = victims.len(), capacity, "Evicted least recently used AI responses.");
        Ok(victims.len())
    }

    pub async fn ai_cache_len(&self) -> Result<usize, StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(0);
        };
        count_rows(&conn, "SELECT COUNT(*) FROM ai_cache").await
    }

    /// Removes every cached row and queued mutation.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let Some(conn) = self.connect()? else {
            return Ok(());
        };
        for table in sql::ALL_TABLES {
            conn.execute(&format!("DELETE FROM {table}"), ()).await?;
        }
        info!(location = %self.location, "Local store cleared.");
        Ok(())
    }
}

impl Debug for LocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("location", &self.location)
            .field("inert", &self.is_inert())
            .finish()
    }
}

/// Applies every migration newer than the persisted version, up to `target_version`.
async fn migrate(conn: &Connection, target_version: u32) -> Result<u32, StoreError> {
    conn.execute(sql::CREATE_SCHEMA_META_TABLE, ()).await?;
    let current = read_schema_version(conn).await?;
    if current >= target_version {
        if current > target_version {
            warn!(current, target_version, "Store was written by a newer schema; leaving it as is.");
        }
        return Ok(current);
    }

    for migration in sql::MIGRATIONS
        .iter()
        .filter(|m| m.version > current && m.version <= target_version)
    {
        info!(version = migration.version, "Applying local store migration.");
        for statement in migration.statements {
            conn.execute(statement, ())
                .await
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        }
        conn.execute(
            sql::UPSERT_SCHEMA_VERSION,
            params![i64::from(migration.version)],
        )
        .await?;
    }
    Ok(target_version)
}

async fn read_schema_version(conn: &Connection) -> Result<u32, StoreError> {
    let mut rows = conn.query(sql::SELECT_SCHEMA_VERSION, ()).await?;
    match rows.next().await? {
        Some(row) => {
            let version: i64 = row.get(0)?;
            Ok(u32::try_from(version).unwrap_or(0))
        }
        None => Ok(0),
    }
}

fn check_index<R: Record>(column: &str) -> Result<(), StoreError> {
    if R::TABLE.has_index(column) {
        Ok(())
    } else {
        Err(StoreError::UnknownIndex {
            table: R::TABLE.name(),
            column: column.to_string(),
        })
    }
}

async fn collect_records<R: Record>(mut rows: Rows) -> Result<Vec<R>, StoreError> {
    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        let data: String = row.get(0)?;
        records.push(serde_json::from_str(&data)?);
    }
    Ok(records)
}

async fn count_rows(conn: &Connection, sql: &str) -> Result<usize, StoreError> {
    let mut rows = conn.query(sql, ()).await?;
    let count: i64 = match rows.next().await? {
        Some(row) => row.get(0)?,
        None => 0,
    };
    Ok(usize::try_from(count).unwrap_or(0))
}

/// A logical clock for LRU ordering; strictly increases with every access.
async fn next_access_tick(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(last_accessed), 0) FROM ai_cache", ())
        .await?;
    let max: i64 = match rows.next().await? {
        Some(row) => row.get(0)?,
        None => 0,
    };
    Ok(max + 1)
}

/// Optional key parts are stored as '' so equality matching works for absent values.
fn ai_key_params(key: &AiCacheKey) -> Vec<TursoValue> {
    vec![
        TursoValue::Text(key.query.clone()),
        TursoValue::Text(key.course_id.clone().unwrap_or_default()),
        TursoValue::Text(key.lesson_id.clone().unwrap_or_default()),
    ]
}

fn text_or_null(value: Option<String>) -> TursoValue {
    match value {
        Some(text) => TursoValue::Text(text),
        None => TursoValue::Null,
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
