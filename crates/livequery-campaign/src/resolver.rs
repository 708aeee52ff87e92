// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Target resolution: turns a target spec into a concrete host set.
//!
//! Resolution reads the datastore once and never mutates anything. The
//! resulting [`HostTarget`] is frozen; later label membership changes do
//! not reach campaigns that were already created.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::debug;

use livequery_core::{
    Host, HostDatastore, HostId, HostLookup, HostTarget, HostTargets, LiveQueryError, Metrics,
};

/// Resolves target specs against a [`HostDatastore`].
pub struct TargetResolver {
    datastore: Arc<dyn HostDatastore>,
    online_threshold: chrono::Duration,
}

impl TargetResolver {
    /// A host is online if it checked in less than `online_threshold` ago.
    pub fn new(datastore: Arc<dyn HostDatastore>, online_threshold: Duration) -> Self {
        Self {
            datastore,
            online_threshold: chrono::Duration::from_std(online_threshold)
                .unwrap_or(chrono::TimeDelta::MAX),
        }
    }

    /// Resolves `targets` as of `now`.
    ///
    /// Fails with [`LiveQueryError::EmptyTarget`] when the spec is empty or
    /// references nothing at all (for example a single label with no
    /// members). Datastore errors abort resolution unmodified.
    pub async fn resolve(
        &self,
        targets: &HostTargets,
        now: DateTime<Utc>,
    ) -> Result<(HostTarget, Metrics), LiveQueryError> {
        if targets.is_empty() {
            return Err(LiveQueryError::EmptyTarget);
        }

        let ids: Vec<HostId> = unique(targets.host_ids.iter().copied());
        let names: Vec<String> = unique(targets.host_names.iter().cloned());
        let labels = unique(targets.label_ids.iter().copied());

        let by_id = if ids.is_empty() {
            HostLookup::default()
        } else {
            self.datastore.lookup_hosts_by_ids(&ids).await?
        };
        let by_name = if names.is_empty() {
            HostLookup::default()
        } else {
            self.datastore.lookup_hosts_by_identifiers(&names).await?
        };
        let label_members = try_join_all(
            labels
                .iter()
                .map(|label| self.datastore.lookup_hosts_by_label(*label)),
        )
        .await?;

        let mut hosts: BTreeMap<HostId, Host> = BTreeMap::new();
        for host in by_id
            .found
            .into_iter()
            .chain(by_name.found)
            .chain(label_members.into_iter().flatten())
        {
            hosts.entry(host.id).or_insert(host);
        }

        let missing_ids: BTreeSet<String> = by_id.missing.into_iter().collect();
        let missing_names: BTreeSet<String> = by_name.missing.into_iter().collect();
        let missing = missing_ids.len() + missing_names.len();

        if hosts.is_empty() && missing == 0 {
            debug!(labels = labels.len(), "target spec matched no hosts");
            return Err(LiveQueryError::EmptyTarget);
        }

        let online = hosts
            .values()
            .filter(|host| host.is_online(now, self.online_threshold))
            .count();
        let metrics = Metrics {
            total_hosts: count(hosts.len() + missing),
            online_hosts: count(online),
            offline_hosts: count(hosts.len() - online),
            missing_hosts: count(missing),
            active_hosts: 0,
        };

        debug!(
            total = metrics.total_hosts,
            online = metrics.online_hosts,
            offline = metrics.offline_hosts,
            missing = metrics.missing_hosts,
            "resolved campaign targets"
        );

        let target = HostTarget::new(targets.clone(), hosts.into_keys().collect());
        Ok((target, metrics))
    }
}

fn unique<T: Ord>(items: impl Iterator<Item = T>) -> Vec<T> {
    items.collect::<BTreeSet<T>>().into_iter().collect()
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
