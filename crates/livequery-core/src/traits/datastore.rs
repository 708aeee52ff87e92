// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host, label, and saved-query lookups.

use async_trait::async_trait;

use crate::error::LiveQueryError;
use crate::types::{Host, HostId, HostLookup, LabelId, QueryId, SavedQuery};

/// Read access to managed hosts and label membership.
#[async_trait]
pub trait HostDatastore: Send + Sync + 'static {
    /// Looks hosts up by ID. Unknown IDs are reported in `missing`.
    async fn lookup_hosts_by_ids(&self, ids: &[HostId]) -> Result<HostLookup, LiveQueryError>;

    /// Looks hosts up by human-readable identifier. Unknown identifiers are
    /// reported in `missing`.
    async fn lookup_hosts_by_identifiers(
        &self,
        identifiers: &[String],
    ) -> Result<HostLookup, LiveQueryError>;

    /// Current members of a label. An unknown label has no members.
    async fn lookup_hosts_by_label(&self, label: LabelId) -> Result<Vec<Host>, LiveQueryError>;

    /// Maps label names to IDs, skipping names that match no label.
    async fn lookup_label_ids_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<LabelId>, LiveQueryError>;
}

/// Read access to saved queries.
#[async_trait]
pub trait QueryCatalog: Send + Sync + 'static {
    async fn lookup_query(&self, id: QueryId) -> Result<Option<SavedQuery>, LiveQueryError>;
}
