//! Store and backend configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default table holding subscriber state rows.
pub const DEFAULT_TABLE_NAME: &str = "subscriber_state";

/// What to do when one snapshot carries the same imsi more than once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Fail the call with `StoreError::DuplicateImsi` before writing anything.
    #[default]
    Reject,
    /// Keep the last occurrence in input order.
    LastWins,
}

/// Store configuration.
#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    /// Handling of repeated imsis within one snapshot.
    pub duplicate_policy: DuplicatePolicy,
}

/// SQLite backend configuration.
#[derive(Clone, Debug)]
pub struct SqliteConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,

    /// Table name; ASCII alphanumerics and `_` only.
    pub table_name: String,

    /// Enable WAL journaling (file-backed databases only).
    pub wal_mode: bool,

    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,

    /// Read-only connections opened alongside the writer. Only used for
    /// file-backed databases in WAL mode.
    pub read_pool_size: usize,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            wal_mode: true,
            busy_timeout: Duration::from_secs(5),
            read_pool_size: 4,
        }
    }
}

impl SqliteConfig {
    /// File-backed configuration with defaults for everything else.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }
}
