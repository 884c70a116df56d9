//! # Subscriber State Store
//!
//! Persists, for every (network, gateway) pair, the full set of subscriber
//! session-state documents the gateway last reported.
//!
//! ## Core Concepts
//!
//! - **Scope**: a (network id, gateway id) pair; the unit of bulk operations
//! - **Snapshot**: everything a gateway reports at once, replacing the previous set
//! - **Document**: an opaque nested value describing one subscriber's sessions
//! - **Backend**: a transactional key -> bytes store (in-memory or SQLite)
//!
//! ## Example
//!
//! ```ignore
//! use subscriber_state::{SqliteConfig, StoreConfig, SubscriberState, SubscriberStateStore};
//! use serde_json::json;
//!
//! let store = SubscriberStateStore::open_sqlite(
//!     &SqliteConfig::file("./subscribers.db"),
//!     StoreConfig::default(),
//! )?;
//!
//! // A gateway reports its full snapshot
//! store.set_all_subscribers_for_gateway("net1", "gw1", &[
//!     SubscriberState::new("IMSI001010000000123", json!({"apn": "magma.ipv4"})),
//! ])?;
//!
//! let states = store.get_subscribers_for_gateway("net1", "gw1")?;
//!
//! // Gateway deregistered
//! store.delete_subscribers_for_gateway("net1", "gw1")?;
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod store;
pub mod types;

// Re-exports
pub use backend::{Backend, BackendTxn, MemoryBackend, MemoryTxn, SqliteBackend, SqliteTxn, TxnMode};
pub use config::{DuplicatePolicy, SqliteConfig, StoreConfig, DEFAULT_TABLE_NAME};
pub use document::Document;
pub use error::{BackendError, BackendResult, Result, StoreError};
pub use store::SubscriberStateStore;
pub use types::*;
