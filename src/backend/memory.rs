//! In-memory backend.

use super::{Backend, BackendTxn, TxnMode};
use crate::error::{BackendError, BackendResult};
use crate::types::{Scope, StorageKey, StoredRow};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

type Rows = BTreeMap<StorageKey, Vec<u8>>;

/// A write staged by an open transaction.
#[derive(Clone, Debug)]
enum PendingOp {
    Put(StorageKey, Vec<u8>),
    Delete(StorageKey),
    DeleteScope(Scope),
}

impl PendingOp {
    fn apply(&self, rows: &mut Rows) {
        match self {
            PendingOp::Put(key, value) => {
                rows.insert(key.clone(), value.clone());
            }
            PendingOp::Delete(key) => {
                rows.remove(key);
            }
            PendingOp::DeleteScope(scope) => {
                let doomed: Vec<StorageKey> = scope_range(rows, scope).map(|(k, _)| k.clone()).collect();
                for key in doomed {
                    rows.remove(&key);
                }
            }
        }
    }
}

/// Rows of one scope, in imsi order.
fn scope_range<'a>(rows: &'a Rows, scope: &'a Scope) -> impl Iterator<Item = (&'a StorageKey, &'a Vec<u8>)> {
    rows.range((Bound::Included(scope.key("")), Bound::Unbounded))
        .take_while(move |(k, _)| &k.scope == scope)
}

/// Rows of one network, ordered by gateway then imsi.
fn network_range<'a>(rows: &'a Rows, network_id: &'a str) -> impl Iterator<Item = (&'a StorageKey, &'a Vec<u8>)> {
    rows.range((Bound::Included(StorageKey::new(network_id, "", "")), Bound::Unbounded))
        .take_while(move |(k, _)| k.scope.network_id == network_id)
}

/// Transactional in-memory key -> bytes store.
///
/// Transactions stage writes and replay them under a short exclusive lock at
/// commit. Nothing is held between statements, so transactions on unrelated
/// scopes never wait on each other, and a reader sees a scope either entirely
/// before or entirely after a commit.
#[derive(Default)]
pub struct MemoryBackend {
    rows: RwLock<Rows>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed rows across all scopes.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl Backend for MemoryBackend {
    type Txn<'a> = MemoryTxn<'a>;

    fn create_table(&self) -> BackendResult<()> {
        Ok(())
    }

    fn begin(&self, mode: TxnMode) -> BackendResult<MemoryTxn<'_>> {
        Ok(MemoryTxn {
            backend: self,
            mode,
            pending: Vec::new(),
        })
    }
}

/// An open [`MemoryBackend`] transaction.
pub struct MemoryTxn<'a> {
    backend: &'a MemoryBackend,
    mode: TxnMode,
    pending: Vec<PendingOp>,
}

impl MemoryTxn<'_> {
    fn check_writable(&self) -> BackendResult<()> {
        match self.mode {
            TxnMode::ReadWrite => Ok(()),
            TxnMode::ReadOnly => Err(BackendError::ReadOnlyTransaction),
        }
    }

    /// Committed rows of a scope with this transaction's own writes applied.
    fn visible_scope(&self, scope: &Scope) -> Rows {
        let mut view: Rows = {
            let rows = self.backend.rows.read();
            scope_range(&rows, scope)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        for op in &self.pending {
            let touches = match op {
                PendingOp::Put(key, _) | PendingOp::Delete(key) => &key.scope == scope,
                PendingOp::DeleteScope(s) => s == scope,
            };
            if touches {
                op.apply(&mut view);
            }
        }
        view
    }
}

impl BackendTxn for MemoryTxn<'_> {
    fn get(&mut self, key: &StorageKey) -> BackendResult<Option<Vec<u8>>> {
        let mut value = self.backend.rows.read().get(key).cloned();
        for op in &self.pending {
            match op {
                PendingOp::Put(k, v) if k == key => value = Some(v.clone()),
                PendingOp::Delete(k) if k == key => value = None,
                PendingOp::DeleteScope(s) if s == &key.scope => value = None,
                _ => {}
            }
        }
        Ok(value)
    }

    fn get_many(&mut self, scope: &Scope, imsis: &[String]) -> BackendResult<Vec<StoredRow>> {
        let view = self.visible_scope(scope);
        let wanted: BTreeSet<&String> = imsis.iter().collect();
        Ok(view
            .into_iter()
            .filter(|(k, _)| wanted.contains(&k.imsi))
            .map(|(k, value)| StoredRow { imsi: k.imsi, value })
            .collect())
    }

    fn put(&mut self, key: &StorageKey, value: &[u8]) -> BackendResult<()> {
        self.check_writable()?;
        self.pending.push(PendingOp::Put(key.clone(), value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &StorageKey) -> BackendResult<bool> {
        self.check_writable()?;
        let existed = self.get(key)?.is_some();
        self.pending.push(PendingOp::Delete(key.clone()));
        Ok(existed)
    }

    fn delete_scope(&mut self, scope: &Scope) -> BackendResult<usize> {
        self.check_writable()?;
        let removed = self.visible_scope(scope).len();
        self.pending.push(PendingOp::DeleteScope(scope.clone()));
        Ok(removed)
    }

    fn scan_scope(&mut self, scope: &Scope) -> BackendResult<Vec<StoredRow>> {
        Ok(self
            .visible_scope(scope)
            .into_iter()
            .map(|(k, value)| StoredRow { imsi: k.imsi, value })
            .collect())
    }

    fn list_gateways(&mut self, network_id: &str) -> BackendResult<Vec<String>> {
        let mut keys: BTreeSet<StorageKey> = {
            let rows = self.backend.rows.read();
            network_range(&rows, network_id).map(|(k, _)| k.clone()).collect()
        };
        for op in &self.pending {
            match op {
                PendingOp::Put(k, _) if k.scope.network_id == network_id => {
                    keys.insert(k.clone());
                }
                PendingOp::Delete(k) => {
                    keys.remove(k);
                }
                PendingOp::DeleteScope(s) if s.network_id == network_id => {
                    keys.retain(|k| &k.scope != s);
                }
                _ => {}
            }
        }

        let gateways: BTreeSet<String> = keys.into_iter().map(|k| k.scope.gateway_id).collect();
        Ok(gateways.into_iter().collect())
    }

    fn commit(self) -> BackendResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut rows = self.backend.rows.write();
        for op in &self.pending {
            op.apply(&mut rows);
        }
        Ok(())
    }

    fn rollback(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_committed(backend: &MemoryBackend, key: &StorageKey, value: &[u8]) {
        let mut txn = backend.begin(TxnMode::ReadWrite).unwrap();
        txn.put(key, value).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn test_uncommitted_writes_are_invisible() {
        let backend = MemoryBackend::new();
        let key = StorageKey::new("net1", "gw1", "IMSI1");

        let mut writer = backend.begin(TxnMode::ReadWrite).unwrap();
        writer.put(&key, b"v1").unwrap();
        assert_eq!(writer.get(&key).unwrap(), Some(b"v1".to_vec()));

        let mut reader = backend.begin(TxnMode::ReadOnly).unwrap();
        assert_eq!(reader.get(&key).unwrap(), None);

        writer.commit().unwrap();
        assert_eq!(reader.get(&key).unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let backend = MemoryBackend::new();
        let key = StorageKey::new("net1", "gw1", "IMSI1");

        let mut txn = backend.begin(TxnMode::ReadWrite).unwrap();
        txn.put(&key, b"v1").unwrap();
        txn.rollback();

        assert!(backend.is_empty());
    }

    #[test]
    fn test_drop_discards_writes() {
        let backend = MemoryBackend::new();
        {
            let mut txn = backend.begin(TxnMode::ReadWrite).unwrap();
            txn.put(&StorageKey::new("net1", "gw1", "IMSI1"), b"v1").unwrap();
        }
        assert!(backend.is_empty());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let backend = MemoryBackend::new();
        let mut txn = backend.begin(TxnMode::ReadOnly).unwrap();
        let result = txn.put(&StorageKey::new("net1", "gw1", "IMSI1"), b"v1");
        assert!(matches!(result, Err(BackendError::ReadOnlyTransaction)));
    }

    #[test]
    fn test_delete_scope_leaves_neighbours() {
        let backend = MemoryBackend::new();
        put_committed(&backend, &StorageKey::new("net1", "gw1", "IMSI1"), b"a");
        put_committed(&backend, &StorageKey::new("net1", "gw1", "IMSI2"), b"b");
        put_committed(&backend, &StorageKey::new("net1", "gw2", "IMSI1"), b"c");
        put_committed(&backend, &StorageKey::new("net2", "gw1", "IMSI1"), b"d");

        let mut txn = backend.begin(TxnMode::ReadWrite).unwrap();
        assert_eq!(txn.delete_scope(&Scope::new("net1", "gw1")).unwrap(), 2);
        txn.commit().unwrap();

        assert_eq!(backend.len(), 2);
        let mut txn = backend.begin(TxnMode::ReadOnly).unwrap();
        assert!(txn.scan_scope(&Scope::new("net1", "gw1")).unwrap().is_empty());
        assert_eq!(txn.scan_scope(&Scope::new("net1", "gw2")).unwrap().len(), 1);
        assert_eq!(txn.scan_scope(&Scope::new("net2", "gw1")).unwrap().len(), 1);
    }

    #[test]
    fn test_scope_delete_then_put_in_one_txn() {
        let backend = MemoryBackend::new();
        let scope = Scope::new("net1", "gw1");
        put_committed(&backend, &scope.key("IMSI1"), b"old");
        put_committed(&backend, &scope.key("IMSI2"), b"old");

        let mut txn = backend.begin(TxnMode::ReadWrite).unwrap();
        txn.delete_scope(&scope).unwrap();
        txn.put(&scope.key("IMSI2"), b"new").unwrap();
        txn.put(&scope.key("IMSI3"), b"new").unwrap();

        let rows = txn.scan_scope(&scope).unwrap();
        let imsis: Vec<&str> = rows.iter().map(|r| r.imsi.as_str()).collect();
        assert_eq!(imsis, vec!["IMSI2", "IMSI3"]);
        txn.commit().unwrap();

        let mut txn = backend.begin(TxnMode::ReadOnly).unwrap();
        assert_eq!(txn.get(&scope.key("IMSI1")).unwrap(), None);
        assert_eq!(txn.get(&scope.key("IMSI2")).unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_scope_delete_applies_to_rows_committed_meanwhile() {
        let backend = MemoryBackend::new();
        let scope = Scope::new("net1", "gw1");

        let mut first = backend.begin(TxnMode::ReadWrite).unwrap();
        first.delete_scope(&scope).unwrap();
        first.put(&scope.key("IMSI1"), b"first").unwrap();

        let mut second = backend.begin(TxnMode::ReadWrite).unwrap();
        second.delete_scope(&scope).unwrap();
        second.put(&scope.key("IMSI2"), b"second").unwrap();

        second.commit().unwrap();
        first.commit().unwrap();

        let mut txn = backend.begin(TxnMode::ReadOnly).unwrap();
        let rows = txn.scan_scope(&scope).unwrap();
        assert_eq!(rows, vec![StoredRow { imsi: "IMSI1".into(), value: b"first".to_vec() }]);
    }

    #[test]
    fn test_list_gateways_sees_pending_writes() {
        let backend = MemoryBackend::new();
        put_committed(&backend, &StorageKey::new("net1", "gw1", "IMSI1"), b"a");
        put_committed(&backend, &StorageKey::new("net1", "gw2", "IMSI1"), b"b");
        put_committed(&backend, &StorageKey::new("net2", "gw9", "IMSI1"), b"c");

        let mut txn = backend.begin(TxnMode::ReadWrite).unwrap();
        txn.delete_scope(&Scope::new("net1", "gw1")).unwrap();
        txn.put(&StorageKey::new("net1", "gw3", "IMSI1"), b"d").unwrap();

        assert_eq!(txn.list_gateways("net1").unwrap(), vec!["gw2", "gw3"]);
        assert_eq!(txn.list_gateways("net2").unwrap(), vec!["gw9"]);
        assert!(txn.list_gateways("net3").unwrap().is_empty());
    }

    #[test]
    fn test_get_many_skips_missing() {
        let backend = MemoryBackend::new();
        let scope = Scope::new("net1", "gw1");
        put_committed(&backend, &scope.key("IMSI1"), b"a");
        put_committed(&backend, &scope.key("IMSI3"), b"c");

        let mut txn = backend.begin(TxnMode::ReadOnly).unwrap();
        let rows = txn
            .get_many(&scope, &["IMSI3".to_string(), "IMSI2".to_string(), "IMSI1".to_string()])
            .unwrap();
        let imsis: Vec<&str> = rows.iter().map(|r| r.imsi.as_str()).collect();
        assert_eq!(imsis, vec!["IMSI1", "IMSI3"]);
    }
}
