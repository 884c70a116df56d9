//! SQLite backend.
//!
//! One writer connection serializes write transactions (`BEGIN IMMEDIATE`).
//! A file-backed database in WAL mode additionally opens a small pool of
//! read-only connections, so readers see the last committed snapshot without
//! waiting for a writer.

use super::{Backend, BackendTxn, TxnMode};
use crate::config::SqliteConfig;
use crate::error::{BackendError, BackendResult};
use crate::types::{Scope, StorageKey, StoredRow};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::sync::atomic::{AtomicUsize, Ordering};

/// SQL text for one table, built once at open.
struct Statements {
    create_table: String,
    get: String,
    put: String,
    delete: String,
    delete_scope: String,
    scan_scope: String,
    list_gateways: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    network_id TEXT NOT NULL,
                    gateway_id TEXT NOT NULL,
                    imsi TEXT NOT NULL,
                    value BLOB NOT NULL,
                    PRIMARY KEY (network_id, gateway_id, imsi)
                ) WITHOUT ROWID"
            ),
            get: format!(
                "SELECT value FROM {table} WHERE network_id = ?1 AND gateway_id = ?2 AND imsi = ?3"
            ),
            put: format!(
                "INSERT OR REPLACE INTO {table} (network_id, gateway_id, imsi, value) VALUES (?1, ?2, ?3, ?4)"
            ),
            delete: format!(
                "DELETE FROM {table} WHERE network_id = ?1 AND gateway_id = ?2 AND imsi = ?3"
            ),
            delete_scope: format!("DELETE FROM {table} WHERE network_id = ?1 AND gateway_id = ?2"),
            scan_scope: format!(
                "SELECT imsi, value FROM {table} WHERE network_id = ?1 AND gateway_id = ?2 ORDER BY imsi"
            ),
            list_gateways: format!(
                "SELECT DISTINCT gateway_id FROM {table} WHERE network_id = ?1 ORDER BY gateway_id"
            ),
        }
    }
}

fn validate_table_name(name: &str) -> BackendResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidTableName(name.to_string()))
    }
}

/// SQLite-backed key -> bytes store.
///
/// All read-write transactions share one writer connection, so writers on
/// different scopes run one at a time. Read-only transactions use the pool.
pub struct SqliteBackend {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    sql: Statements,
}

impl SqliteBackend {
    /// Open (or create) the database described by `config`.
    pub fn open(config: &SqliteConfig) -> BackendResult<Self> {
        validate_table_name(&config.table_name)?;

        let writer = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
                )?
            }
            None => Connection::open_in_memory()?,
        };
        writer.busy_timeout(config.busy_timeout)?;

        let mut readers = Vec::new();
        if let Some(path) = &config.path {
            if config.wal_mode {
                writer.pragma_update(None, "journal_mode", "WAL")?;
                writer.pragma_update(None, "synchronous", "NORMAL")?;

                for _ in 0..config.read_pool_size {
                    let conn = Connection::open_with_flags(
                        path,
                        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                    )?;
                    conn.busy_timeout(config.busy_timeout)?;
                    readers.push(Mutex::new(conn));
                }
            }
        }

        tracing::debug!(
            path = ?config.path,
            table = %config.table_name,
            readers = readers.len(),
            "opened sqlite backend"
        );

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            sql: Statements::for_table(&config.table_name),
        })
    }

    /// A private in-memory database with the default table name.
    pub fn in_memory() -> BackendResult<Self> {
        Self::open(&SqliteConfig::default())
    }

    /// Number of read-only connections in the pool.
    pub fn read_pool_size(&self) -> usize {
        self.readers.len()
    }

    fn reader(&self) -> MutexGuard<'_, Connection> {
        if self.readers.is_empty() {
            return self.writer.lock();
        }
        let start = self.next_reader.fetch_add(1, Ordering::Relaxed);
        let n = self.readers.len();
        for i in 0..n {
            if let Some(guard) = self.readers[(start + i) % n].try_lock() {
                return guard;
            }
        }
        self.readers[start % n].lock()
    }
}

impl Backend for SqliteBackend {
    type Txn<'a> = SqliteTxn<'a>;

    fn create_table(&self) -> BackendResult<()> {
        let conn = self.writer.lock();
        conn.execute(&self.sql.create_table, [])?;
        Ok(())
    }

    fn begin(&self, mode: TxnMode) -> BackendResult<SqliteTxn<'_>> {
        let (conn, begin) = match mode {
            TxnMode::ReadWrite => (self.writer.lock(), "BEGIN IMMEDIATE"),
            TxnMode::ReadOnly => (self.reader(), "BEGIN DEFERRED"),
        };
        conn.execute_batch(begin)?;

        Ok(SqliteTxn {
            conn,
            sql: &self.sql,
            mode,
            in_txn: true,
        })
    }
}

/// An open [`SqliteBackend`] transaction.
pub struct SqliteTxn<'a> {
    conn: MutexGuard<'a, Connection>,
    sql: &'a Statements,
    mode: TxnMode,
    in_txn: bool,
}

impl SqliteTxn<'_> {
    fn check_writable(&self) -> BackendResult<()> {
        match self.mode {
            TxnMode::ReadWrite => Ok(()),
            TxnMode::ReadOnly => Err(BackendError::ReadOnlyTransaction),
        }
    }
}

impl BackendTxn for SqliteTxn<'_> {
    fn get(&mut self, key: &StorageKey) -> BackendResult<Option<Vec<u8>>> {
        let mut stmt = self.conn.prepare_cached(&self.sql.get)?;
        let value = stmt
            .query_row(
                params![key.scope.network_id, key.scope.gateway_id, key.imsi],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_many(&mut self, scope: &Scope, imsis: &[String]) -> BackendResult<Vec<StoredRow>> {
        let mut stmt = self.conn.prepare_cached(&self.sql.get)?;
        let mut rows = Vec::with_capacity(imsis.len());
        for imsi in imsis {
            let value: Option<Vec<u8>> = stmt
                .query_row(params![scope.network_id, scope.gateway_id, imsi], |row| row.get(0))
                .optional()?;
            if let Some(value) = value {
                rows.push(StoredRow {
                    imsi: imsi.clone(),
                    value,
                });
            }
        }
        rows.sort_by(|a, b| a.imsi.cmp(&b.imsi));
        rows.dedup_by(|a, b| a.imsi == b.imsi);
        Ok(rows)
    }

    fn put(&mut self, key: &StorageKey, value: &[u8]) -> BackendResult<()> {
        self.check_writable()?;
        let mut stmt = self.conn.prepare_cached(&self.sql.put)?;
        stmt.execute(params![
            key.scope.network_id,
            key.scope.gateway_id,
            key.imsi,
            value
        ])?;
        Ok(())
    }

    fn delete(&mut self, key: &StorageKey) -> BackendResult<bool> {
        self.check_writable()?;
        let mut stmt = self.conn.prepare_cached(&self.sql.delete)?;
        let changed = stmt.execute(params![key.scope.network_id, key.scope.gateway_id, key.imsi])?;
        Ok(changed > 0)
    }

    fn delete_scope(&mut self, scope: &Scope) -> BackendResult<usize> {
        self.check_writable()?;
        let mut stmt = self.conn.prepare_cached(&self.sql.delete_scope)?;
        Ok(stmt.execute(params![scope.network_id, scope.gateway_id])?)
    }

    fn scan_scope(&mut self, scope: &Scope) -> BackendResult<Vec<StoredRow>> {
        let mut stmt = self.conn.prepare_cached(&self.sql.scan_scope)?;
        let rows = stmt
            .query_map(params![scope.network_id, scope.gateway_id], |row| {
                Ok(StoredRow {
                    imsi: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn list_gateways(&mut self, network_id: &str) -> BackendResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(&self.sql.list_gateways)?;
        let gateways = stmt
            .query_map(params![network_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(gateways)
    }

    fn commit(mut self) -> BackendResult<()> {
        self.in_txn = false;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
        Ok(())
    }

    fn rollback(mut self) {
        self.in_txn = false;
        let _ = self.conn.execute_batch("ROLLBACK");
    }
}

impl Drop for SqliteTxn<'_> {
    fn drop(&mut self) {
        if self.in_txn {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
