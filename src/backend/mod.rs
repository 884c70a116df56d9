//! Transactional blob backends.
//!
//! The store only needs row-level get/put/delete plus scope-prefix queries,
//! all run inside one atomic transaction. Two implementations ship:
//! an in-memory map for embedding and tests, and SQLite.

mod memory;
mod sqlite;

pub use memory::{MemoryBackend, MemoryTxn};
pub use sqlite::{SqliteBackend, SqliteTxn};

use crate::error::BackendResult;
use crate::types::{Scope, StorageKey, StoredRow};

/// Whether a transaction may write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnMode {
    ReadOnly,
    ReadWrite,
}

/// A generic transactional key -> bytes store.
pub trait Backend: Send + Sync {
    type Txn<'a>: BackendTxn
    where
        Self: 'a;

    /// Create the backing table if it does not exist.
    fn create_table(&self) -> BackendResult<()>;

    /// Start a transaction.
    ///
    /// Readers never observe writes of a transaction that has not committed.
    fn begin(&self, mode: TxnMode) -> BackendResult<Self::Txn<'_>>;
}

/// Operations run inside a single backend transaction.
///
/// Dropping a transaction without calling [`BackendTxn::commit`] discards
/// every write made through it.
pub trait BackendTxn {
    fn get(&mut self, key: &StorageKey) -> BackendResult<Option<Vec<u8>>>;

    /// Fetch several imsis of one scope. Missing imsis are skipped.
    fn get_many(&mut self, scope: &Scope, imsis: &[String]) -> BackendResult<Vec<StoredRow>>;

    /// Insert or overwrite one row.
    fn put(&mut self, key: &StorageKey, value: &[u8]) -> BackendResult<()>;

    /// Delete one row, returning whether it existed.
    fn delete(&mut self, key: &StorageKey) -> BackendResult<bool>;

    /// Delete every row of a scope, returning the number removed.
    fn delete_scope(&mut self, scope: &Scope) -> BackendResult<usize>;

    /// All rows of a scope, ordered by imsi.
    fn scan_scope(&mut self, scope: &Scope) -> BackendResult<Vec<StoredRow>>;

    /// Distinct gateway ids holding at least one row in a network.
    fn list_gateways(&mut self, network_id: &str) -> BackendResult<Vec<String>>;

    fn commit(self) -> BackendResult<()>;

    fn rollback(self);
}
