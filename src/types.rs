//! Core types for the subscriber state store.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (network, gateway) pair: the unit of every bulk operation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub network_id: String,
    pub gateway_id: String,
}

impl Scope {
    pub fn new(network_id: impl Into<String>, gateway_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            gateway_id: gateway_id.into(),
        }
    }

    /// Storage key for one subscriber inside this scope.
    pub fn key(&self, imsi: impl Into<String>) -> StorageKey {
        StorageKey {
            scope: self.clone(),
            imsi: imsi.into(),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({}/{})", self.network_id, self.gateway_id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network_id, self.gateway_id)
    }
}

/// Full row key. Ordering groups keys by scope, then imsi.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    pub scope: Scope,
    pub imsi: String,
}

impl StorageKey {
    pub fn new(
        network_id: impl Into<String>,
        gateway_id: impl Into<String>,
        imsi: impl Into<String>,
    ) -> Self {
        Scope::new(network_id, gateway_id).key(imsi)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({}/{})", self.scope, self.imsi)
    }
}

/// One subscriber's last reported session state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriberState {
    pub imsi: String,
    pub value: Document,
}

impl SubscriberState {
    pub fn new(imsi: impl Into<String>, value: impl Into<Document>) -> Self {
        Self {
            imsi: imsi.into(),
            value: value.into(),
        }
    }
}

/// A raw row as returned by a backend scan: imsi plus the encoded document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRow {
    pub imsi: String,
    pub value: Vec<u8>,
}
