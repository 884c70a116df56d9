//! The subscriber state store.

use crate::backend::{Backend, BackendTxn, MemoryBackend, SqliteBackend, TxnMode};
use crate::codec;
use crate::config::{DuplicatePolicy, SqliteConfig, StoreConfig};
use crate::error::{BackendResult, Result, StoreError};
use crate::types::{Scope, StoredRow, SubscriberState};
use std::collections::{HashMap, HashSet};

/// Per-gateway subscriber state, keyed by (network, gateway, imsi).
///
/// Each gateway periodically reports a full snapshot of its subscribers'
/// session state. [`set_all_subscribers_for_gateway`] replaces the stored set
/// for that gateway wholesale inside one backend transaction; readers see
/// either the previous snapshot or the new one, never a mix.
///
/// There is no cache and no internal retry. Every call is one fresh backend
/// transaction, and all operations are idempotent, so a caller that gets a
/// retryable error can simply repeat the call.
///
/// [`set_all_subscribers_for_gateway`]: SubscriberStateStore::set_all_subscribers_for_gateway
pub struct SubscriberStateStore<B: Backend> {
    backend: B,
    config: StoreConfig,
}

impl SubscriberStateStore<MemoryBackend> {
    /// A store over a fresh in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl SubscriberStateStore<SqliteBackend> {
    /// Open a SQLite-backed store and make sure its table exists.
    pub fn open_sqlite(sqlite: &SqliteConfig, config: StoreConfig) -> Result<Self> {
        let backend = SqliteBackend::open(sqlite).map_err(StoreError::Schema)?;
        let store = Self::with_config(backend, config);
        store.initialize()?;
        Ok(store)
    }
}

impl<B: Backend> SubscriberStateStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Create the backing table if absent. Safe to call on every start.
    pub fn initialize(&self) -> Result<()> {
        self.backend.create_table().map_err(StoreError::Schema)?;
        tracing::info!("subscriber state schema ready");
        Ok(())
    }

    /// Replace every stored state of a gateway with `states`.
    ///
    /// Deletes the scope and inserts the new rows in one transaction. On any
    /// failure the transaction is rolled back and the previous snapshot stays
    /// in place. An empty `states` clears the gateway.
    pub fn set_all_subscribers_for_gateway(
        &self,
        network_id: &str,
        gateway_id: &str,
        states: &[SubscriberState],
    ) -> Result<()> {
        let scope = scope(network_id, gateway_id)?;
        let rows = self.encode_snapshot(states)?;

        let mut txn = self.backend.begin(TxnMode::ReadWrite)?;
        match replace_scope(&mut txn, &scope, &rows) {
            Ok(removed) => {
                txn.commit()?;
                tracing::debug!(%scope, removed, inserted = rows.len(), "replaced subscriber snapshot");
                Ok(())
            }
            Err(e) => {
                txn.rollback();
                tracing::warn!(%scope, error = %e, "snapshot write failed, rolled back");
                Err(e.into())
            }
        }
    }

    /// All states currently stored for a gateway.
    ///
    /// An unknown gateway yields an empty list. Callers must not rely on the
    /// order of the result.
    pub fn get_subscribers_for_gateway(
        &self,
        network_id: &str,
        gateway_id: &str,
    ) -> Result<Vec<SubscriberState>> {
        let scope = scope(network_id, gateway_id)?;

        let mut txn = self.backend.begin(TxnMode::ReadOnly)?;
        let rows = txn.scan_scope(&scope)?;
        txn.commit()?;

        tracing::debug!(%scope, count = rows.len(), "read subscriber snapshot");
        decode_rows(&scope, rows)
    }

    /// Remove every state stored for a gateway. A no-op for an empty scope.
    pub fn delete_subscribers_for_gateway(&self, network_id: &str, gateway_id: &str) -> Result<()> {
        let scope = scope(network_id, gateway_id)?;

        let mut txn = self.backend.begin(TxnMode::ReadWrite)?;
        let removed = txn.delete_scope(&scope)?;
        txn.commit()?;

        tracing::debug!(%scope, removed, "deleted subscriber snapshot");
        Ok(())
    }

    /// One subscriber's state, if the gateway currently reports it.
    pub fn get_subscriber(
        &self,
        network_id: &str,
        gateway_id: &str,
        imsi: &str,
    ) -> Result<Option<SubscriberState>> {
        let scope = scope(network_id, gateway_id)?;
        let key = scope.key(imsi);

        let mut txn = self.backend.begin(TxnMode::ReadOnly)?;
        let value = txn.get(&key)?;
        txn.commit()?;

        match value {
            Some(value) => {
                let row = StoredRow {
                    imsi: key.imsi,
                    value,
                };
                Ok(decode_rows(&scope, vec![row])?.pop())
            }
            None => Ok(None),
        }
    }

    /// States of the given imsis within a gateway. Imsis with no stored state
    /// are skipped.
    pub fn get_subscribers(
        &self,
        network_id: &str,
        gateway_id: &str,
        imsis: &[String],
    ) -> Result<Vec<SubscriberState>> {
        let scope = scope(network_id, gateway_id)?;
        if imsis.is_empty() {
            return Ok(Vec::new());
        }

        let mut txn = self.backend.begin(TxnMode::ReadOnly)?;
        let rows = txn.get_many(&scope, imsis)?;
        txn.commit()?;

        decode_rows(&scope, rows)
    }

    /// Number of states stored for a gateway.
    pub fn count_subscribers_for_gateway(&self, network_id: &str, gateway_id: &str) -> Result<usize> {
        let scope = scope(network_id, gateway_id)?;

        let mut txn = self.backend.begin(TxnMode::ReadOnly)?;
        let count = txn.scan_scope(&scope)?.len();
        txn.commit()?;

        Ok(count)
    }

    /// Gateways of a network that currently hold at least one state.
    pub fn list_gateways(&self, network_id: &str) -> Result<Vec<String>> {
        if network_id.is_empty() {
            return Err(StoreError::InvalidScope("empty network id".into()));
        }

        let mut txn = self.backend.begin(TxnMode::ReadOnly)?;
        let gateways = txn.list_gateways(network_id)?;
        txn.commit()?;

        Ok(gateways)
    }

    /// Encode a snapshot, applying the duplicate imsi policy.
    ///
    /// Runs before any transaction is opened, so an unencodable document or
    /// a rejected duplicate never touches stored state.
    fn encode_snapshot(&self, states: &[SubscriberState]) -> Result<Vec<(String, Vec<u8>)>> {
        let states: Vec<&SubscriberState> = match self.config.duplicate_policy {
            DuplicatePolicy::Reject => {
                let mut seen = HashSet::with_capacity(states.len());
                for state in states {
                    if !seen.insert(state.imsi.as_str()) {
                        return Err(StoreError::DuplicateImsi(state.imsi.clone()));
                    }
                }
                states.iter().collect()
            }
            DuplicatePolicy::LastWins => {
                let last: HashMap<&str, usize> = states
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (s.imsi.as_str(), i))
                    .collect();
                states
                    .iter()
                    .enumerate()
                    .filter(|(i, s)| last.get(s.imsi.as_str()) == Some(i))
                    .map(|(_, s)| s)
                    .collect()
            }
        };

        states
            .into_iter()
            .map(|state| codec::encode(&state.value).map(|bytes| (state.imsi.clone(), bytes)))
            .collect()
    }
}

fn scope(network_id: &str, gateway_id: &str) -> Result<Scope> {
    if network_id.is_empty() {
        return Err(StoreError::InvalidScope("empty network id".into()));
    }
    if gateway_id.is_empty() {
        return Err(StoreError::InvalidScope("empty gateway id".into()));
    }
    Ok(Scope::new(network_id, gateway_id))
}

fn replace_scope<T: BackendTxn>(txn: &mut T, scope: &Scope, rows: &[(String, Vec<u8>)]) -> BackendResult<usize> {
    let removed = txn.delete_scope(scope)?;
    for (imsi, value) in rows {
        txn.put(&scope.key(imsi.as_str()), value)?;
    }
    Ok(removed)
}

fn decode_rows(scope: &Scope, rows: Vec<StoredRow>) -> Result<Vec<SubscriberState>> {
    rows.into_iter()
        .map(|row| match codec::decode(&row.value) {
            Ok(value) => Ok(SubscriberState {
                imsi: row.imsi,
                value,
            }),
            Err(StoreError::CorruptDocument { reason }) => {
                tracing::warn!(%scope, imsi = %row.imsi, %reason, "corrupt subscriber document");
                Err(StoreError::corrupt(format!("{}/{}: {}", scope, row.imsi, reason)))
            }
            Err(e) => Err(e),
        })
        .collect()
}
