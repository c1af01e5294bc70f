// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Error, Result};
use crate::signer::KeyReference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Lifecycle state of an issuer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssuerState {
    /// Name reserved, key or certificate not yet in place.
    Requested,
    /// Usable for issuance.
    Active,
    /// Tombstone; the custody key has been deleted.
    Deleted,
}

/// How an issuer came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssuerOrigin {
    /// Key generated in custody, certificate self-signed here.
    Generated,
    /// Key and certificate imported from a PKCS#12 container.
    Imported,
}

/// Inventory entry of an issuer.
#[derive(Clone, Debug)]
pub struct IssuerRecord {
    pub name: String,
    pub state: IssuerState,
    pub origin: IssuerOrigin,
    /// Custody reference, set once the key exists and cleared on delete.
    pub key: Option<KeyReference>,
    /// DER of the issuer certificate, set once active.
    pub certificate: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl IssuerRecord {
    /// A fresh reservation for `name`.
    pub fn requested(name: impl Into<String>, origin: IssuerOrigin) -> Self {
        Self {
            name: name.into(),
            state: IssuerState::Requested,
            origin,
            key: None,
            certificate: None,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of [`IssuerStore::insert_if_vacant`].
#[derive(Clone, Debug)]
pub enum Reservation {
    /// The record was stored. Holds the tombstone it displaced, if any.
    Reserved(Option<IssuerRecord>),
    /// A live record holds the name.
    Taken,
}

/// Record a [`IssuerStore::transition`] expects to find under a name.
#[derive(Clone, Copy, Debug)]
pub struct Expected<'a> {
    pub state: IssuerState,
    pub key: Option<&'a KeyReference>,
}

impl Expected<'_> {
    fn matches(&self, record: &IssuerRecord) -> bool {
        record.state == self.state && record.key.as_ref() == self.key
    }
}

/// Repository of issuer records keyed by name.
///
/// Implementations must allow concurrent readers and serialize writers.
/// Every write is conditional on what the writer last read, since the
/// caller holds no lock across its custody calls.
#[async_trait]
pub trait IssuerStore: Send + Sync {
    /// Fetches a record, tombstones included.
    async fn get(&self, name: &str) -> Result<Option<IssuerRecord>>;

    /// Returns every record in name order, tombstones included.
    async fn list(&self) -> Result<Vec<IssuerRecord>>;

    /// Stores `record` unless a live (non-deleted) record holds its name.
    async fn insert_if_vacant(&self, record: IssuerRecord) -> Result<Reservation>;

    /// Replaces the record under `name` with `next`, or drops it when `next`
    /// is `None`, provided the stored record is still in the expected state
    /// holding the expected key. Returns whether the swap happened.
    async fn transition(
        &self,
        name: &str,
        expected: Expected<'_>,
        next: Option<IssuerRecord>,
    ) -> Result<bool>;
}

/// In-process issuer inventory.
#[derive(Default)]
pub struct MemoryIssuerStore {
    records: RwLock<BTreeMap<String, IssuerRecord>>,
}

impl MemoryIssuerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssuerStore for MemoryIssuerStore {
    async fn get(&self, name: &str) -> Result<Option<IssuerRecord>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<IssuerRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn insert_if_vacant(&self, record: IssuerRecord) -> Result<Reservation> {
        let mut records = self.records.write().await;
        if records
            .get(&record.name)
            .is_some_and(|existing| existing.state != IssuerState::Deleted)
        {
            return Ok(Reservation::Taken);
        }
        Ok(Reservation::Reserved(
            records.insert(record.name.clone(), record),
        ))
    }

    async fn transition(
        &self,
        name: &str,
        expected: Expected<'_>,
        next: Option<IssuerRecord>,
    ) -> Result<bool> {
        if next.as_ref().is_some_and(|record| record.name != name) {
            return Err(Error::Store {
                details: format!("record for {name} filed under another name"),
            });
        }
        let mut records = self.records.write().await;
        if !records.get(name).is_some_and(|record| expected.matches(record)) {
            return Ok(false);
        }
        match next {
            Some(record) => records.insert(name.to_string(), record),
            None => records.remove(name),
        };
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(version: &str) -> KeyReference {
        KeyReference::new(format!("memory://keys/root/{version}"))
    }

    fn active(name: &str, key: KeyReference) -> IssuerRecord {
        let mut record = IssuerRecord::requested(name, IssuerOrigin::Generated);
        record.state = IssuerState::Active;
        record.key = Some(key);
        record
    }

    fn tombstone(name: &str) -> IssuerRecord {
        let mut record = IssuerRecord::requested(name, IssuerOrigin::Generated);
        record.state = IssuerState::Deleted;
        record
    }

    /// Verifies that live names are reserved while tombstones can be reused,
    /// and that the displaced tombstone is handed back.
    #[tokio::test]
    async fn test_insert_if_vacant() {
        let store = MemoryIssuerStore::new();
        let record = IssuerRecord::requested("root", IssuerOrigin::Generated);

        assert!(matches!(
            store.insert_if_vacant(record.clone()).await.unwrap(),
            Reservation::Reserved(None)
        ));
        assert!(matches!(
            store.insert_if_vacant(record.clone()).await.unwrap(),
            Reservation::Taken
        ));

        let requested = Expected {
            state: IssuerState::Requested,
            key: None,
        };
        assert!(store
            .transition("root", requested, Some(tombstone("root")))
            .await
            .unwrap());

        let fresh = IssuerRecord::requested("root", IssuerOrigin::Imported);
        let Reservation::Reserved(Some(previous)) = store.insert_if_vacant(fresh).await.unwrap()
        else {
            panic!("tombstone not displaced");
        };
        assert_eq!(previous.state, IssuerState::Deleted);

        let stored = store.get("root").await.unwrap().unwrap();
        assert_eq!(stored.state, IssuerState::Requested);
        assert_eq!(stored.origin, IssuerOrigin::Imported);
    }

    /// Verifies that a transition only applies while the stored record still
    /// holds the expected key.
    #[tokio::test]
    async fn test_transition_guards_key() {
        let store = MemoryIssuerStore::new();
        store
            .insert_if_vacant(IssuerRecord::requested("root", IssuerOrigin::Generated))
            .await
            .unwrap();
        let requested = Expected {
            state: IssuerState::Requested,
            key: None,
        };
        assert!(store
            .transition("root", requested, Some(active("root", key("v2"))))
            .await
            .unwrap());

        // A writer that last saw an older key must not touch the record
        let (v1, v2) = (key("v1"), key("v2"));
        let stale = Expected {
            state: IssuerState::Active,
            key: Some(&v1),
        };
        assert!(!store
            .transition("root", stale, Some(tombstone("root")))
            .await
            .unwrap());
        assert!(!store.transition("root", requested, None).await.unwrap());
        assert_eq!(
            store.get("root").await.unwrap().unwrap().key,
            Some(v2.clone())
        );

        let current = Expected {
            state: IssuerState::Active,
            key: Some(&v2),
        };
        assert!(store
            .transition("root", current, Some(tombstone("root")))
            .await
            .unwrap());
        assert_eq!(
            store.get("root").await.unwrap().unwrap().state,
            IssuerState::Deleted
        );

        assert!(matches!(
            store
                .transition("root", requested, Some(tombstone("other")))
                .await,
            Err(Error::Store { .. })
        ));
        assert!(!store.transition("missing", requested, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_and_drop() {
        let store = MemoryIssuerStore::new();
        for name in ["b", "a", "c"] {
            let record = IssuerRecord::requested(name, IssuerOrigin::Generated);
            store.insert_if_vacant(record).await.unwrap();
        }
        let requested = Expected {
            state: IssuerState::Requested,
            key: None,
        };
        assert!(store.transition("b", requested, None).await.unwrap());

        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["a", "c"]);
        assert!(store.get("b").await.unwrap().is_none());
    }
}
