//! SQLite-backed report backend.

use super::traits::{MetadataReport, RecordKind};
use crate::config::ReportDefaults;
use crate::error::{MetasyncError, Result};
use crate::identifier::{MetadataIdentifier, SubscriberMetadataIdentifier};
use crate::info::MetadataRecord;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Report backend storing JSON records in a SQLite file.
///
/// Every process on a host can point at the same file; WAL mode keeps
/// concurrent readers and the single writer out of each other's way.
/// Thread-safe via internal mutex on the connection.
#[derive(Clone)]
pub struct SqliteMetadataReport {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataReport {
    /// Open (or create) the report database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MetasyncError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| MetasyncError::Database {
            message: format!("Failed to open report database {}: {}", db_path.display(), e),
            source: Some(Arc::new(e)),
        })?;
        Self::from_connection(conn)
    }

    /// In-memory database, private to this handle and its clones.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            ReportDefaults::SQLITE_BUSY_TIMEOUT_MS,
        ))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metadata_reports (
                kind TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (kind, key)
            );
            "#,
        )
        .map_err(|e| MetasyncError::Database {
            message: format!("Failed to initialize report schema: {}", e),
            source: Some(Arc::new(e)),
        })?;

        debug!("Report schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.conn)
    }

    /// Run a statement on the blocking pool so a busy database file never
    /// stalls a runtime worker.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            op(&guard)
        })
            .await
            .map_err(|e| MetasyncError::Other(format!("Report database task failed: {}", e)))?
    }

    async fn put(&self, kind: RecordKind, key: String, value: String) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO metadata_reports (kind, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(kind, key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![kind.as_str(), key, value, Utc::now().to_rfc3339()],
            )?;
            debug!("Stored {} report {}", kind, key);
            Ok(())
        })
        .await
    }

    async fn get(&self, kind: RecordKind, key: String) -> Result<String> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM metadata_reports WHERE kind = ?1 AND key = ?2",
                params![kind.as_str(), key],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| MetasyncError::not_found(key.as_str()))
        })
        .await
    }

    /// Number of stored records of a kind.
    pub fn count(&self, kind: RecordKind) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM metadata_reports WHERE kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| MetasyncError::Database {
        message: "Failed to acquire report connection lock".to_string(),
        source: None,
    })
}

#[async_trait]
impl MetadataReport for SqliteMetadataReport {
    async fn publish_app_metadata(
        &self,
        id: &SubscriberMetadataIdentifier,
        record: &MetadataRecord,
    ) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.put(RecordKind::App, id.identifier_key(), json).await
    }

    async fn get_app_metadata(&self, id: &SubscriberMetadataIdentifier) -> Result<MetadataRecord> {
        let json = self.get(RecordKind::App, id.identifier_key()).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn store_provider_metadata(
        &self,
        id: &MetadataIdentifier,
        definition: &str,
    ) -> Result<()> {
        self.put(RecordKind::Provider, id.identifier_key(), definition.to_string())
            .await
    }

    async fn store_consumer_metadata(
        &self,
        id: &MetadataIdentifier,
        parameters: &str,
    ) -> Result<()> {
        self.put(RecordKind::Consumer, id.identifier_key(), parameters.to_string())
            .await
    }

    async fn get_service_metadata(&self, id: &MetadataIdentifier) -> Result<String> {
        self.get(RecordKind::from(id.side), id.identifier_key())
            .await
    }
}
