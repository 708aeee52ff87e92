// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory host datastore and query catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use livequery_core::{
    Host, HostDatastore, HostId, HostLookup, LabelId, LiveQueryError, QueryCatalog, QueryId,
    SavedQuery,
};

#[derive(Default)]
struct Inventory {
    hosts: BTreeMap<HostId, Host>,
    labels: BTreeMap<LabelId, Label>,
    queries: BTreeMap<QueryId, SavedQuery>,
}

struct Label {
    name: String,
    members: BTreeSet<HostId>,
}

/// Hosts, labels, and saved queries held in memory.
///
/// Build one with the `with_*` methods, or mutate a shared instance with
/// the async `add_*` methods. [`MemoryDatastore::set_failing`] makes every
/// lookup return an internal error.
#[derive(Default)]
pub struct MemoryDatastore {
    inventory: Mutex<Inventory>,
    failing: AtomicBool,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host that last checked in at `last_seen`.
    pub fn with_host(mut self, id: u64, identifier: &str, last_seen: DateTime<Utc>) -> Self {
        let host = Host {
            id: HostId(id),
            identifier: identifier.to_string(),
            last_seen,
        };
        self.inventory.get_mut().hosts.insert(host.id, host);
        self
    }

    /// Adds a label with the given members.
    pub fn with_label(mut self, id: u64, name: &str, members: &[u64]) -> Self {
        self.inventory.get_mut().labels.insert(
            LabelId(id),
            Label {
                name: name.to_string(),
                members: members.iter().copied().map(HostId).collect(),
            },
        );
        self
    }

    /// Adds a saved query.
    pub fn with_query(mut self, id: u64, name: &str, text: &str) -> Self {
        self.inventory.get_mut().queries.insert(
            QueryId(id),
            SavedQuery {
                id: QueryId(id),
                name: name.to_string(),
                text: text.to_string(),
            },
        );
        self
    }

    pub async fn add_host(&self, host: Host) {
        self.inventory.lock().await.hosts.insert(host.id, host);
    }

    /// Adds `host` to an existing label. Unknown labels are ignored.
    pub async fn add_label_member(&self, label: LabelId, host: HostId) {
        if let Some(label) = self.inventory.lock().await.labels.get_mut(&label) {
            label.members.insert(host);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), LiveQueryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LiveQueryError::Internal("datastore unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl HostDatastore for MemoryDatastore {
    async fn lookup_hosts_by_ids(&self, ids: &[HostId]) -> Result<HostLookup, LiveQueryError> {
        self.check()?;
        let inventory = self.inventory.lock().await;
        let mut lookup = HostLookup::default();
        for id in ids {
            match inventory.hosts.get(id) {
                Some(host) => lookup.found.push(host.clone()),
                None => lookup.missing.push(id.to_string()),
            }
        }
        Ok(lookup)
    }

    async fn lookup_hosts_by_identifiers(
        &self,
        identifiers: &[String],
    ) -> Result<HostLookup, LiveQueryError> {
        self.check()?;
        let inventory = self.inventory.lock().await;
        let mut lookup = HostLookup::default();
        for identifier in identifiers {
            match inventory
                .hosts
                .values()
                .find(|host| &host.identifier == identifier)
            {
                Some(host) => lookup.found.push(host.clone()),
                None => lookup.missing.push(identifier.clone()),
            }
        }
        Ok(lookup)
    }

    async fn lookup_hosts_by_label(&self, label: LabelId) -> Result<Vec<Host>, LiveQueryError> {
        self.check()?;
        let inventory = self.inventory.lock().await;
        let Some(label) = inventory.labels.get(&label) else {
            return Ok(Vec::new());
        };
        Ok(label
            .members
            .iter()
            .filter_map(|id| inventory.hosts.get(id).cloned())
            .collect())
    }

    async fn lookup_label_ids_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<LabelId>, LiveQueryError> {
        self.check()?;
        let inventory = self.inventory.lock().await;
        Ok(names
            .iter()
            .filter_map(|name| {
                inventory
                    .labels
                    .iter()
                    .find(|(_, label)| &label.name == name)
                    .map(|(id, _)| *id)
            })
            .collect())
    }
}

#[async_trait]
impl QueryCatalog for MemoryDatastore {
    async fn lookup_query(&self, id: QueryId) -> Result<Option<SavedQuery>, LiveQueryError> {
        self.check()?;
        Ok(self.inventory.lock().await.queries.get(&id).cloned())
    }
}
