// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for distributed query campaigns.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Unique, monotonically assigned campaign identifier.
    CampaignId
);
numeric_id!(
    /// Identifier of a managed host.
    HostId
);
numeric_id!(
    /// Identifier of a label (a dynamic group of hosts).
    LabelId
);
numeric_id!(
    /// Identifier of a saved query.
    QueryId
);

/// The acting user, passed explicitly into every campaign operation.
///
/// Used for authorization and logging; never affects campaign semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewer {
    pub username: String,
}

impl Viewer {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl fmt::Display for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// A managed host as reported by the host datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    /// Human-readable identifier (hostname, UUID, or serial).
    pub identifier: String,
    /// Last time the host checked in.
    pub last_seen: DateTime<Utc>,
}

impl Host {
    /// Whether the host checked in less than `threshold` before `now`.
    pub fn is_online(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) < threshold
    }
}

/// Result of looking hosts up by ID or identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostLookup {
    pub found: Vec<Host>,
    /// Requested references that matched no host.
    pub missing: Vec<String>,
}

/// A saved query known to the query catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub id: QueryId,
    pub name: String,
    pub text: String,
}

/// What a campaign should run: an optional saved query plus its text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRef {
    #[serde(default)]
    pub id: Option<QueryId>,
    #[serde(default)]
    pub text: String,
}

/// A target spec as submitted by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTargets {
    #[serde(default)]
    pub host_ids: Vec<HostId>,
    #[serde(default)]
    pub host_names: Vec<String>,
    #[serde(default)]
    pub label_ids: Vec<LabelId>,
}

impl HostTargets {
    pub fn is_empty(&self) -> bool {
        self.host_ids.is_empty() && self.host_names.is_empty() && self.label_ids.is_empty()
    }
}

/// The resolved addressing of a campaign. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTarget {
    requested: HostTargets,
    hosts: BTreeSet<HostId>,
}

impl HostTarget {
    pub fn new(requested: HostTargets, hosts: BTreeSet<HostId>) -> Self {
        Self { requested, hosts }
    }

    /// The target spec this set was resolved from.
    pub fn requested(&self) -> &HostTargets {
        &self.requested
    }

    /// Deduplicated concrete hosts addressed by the campaign.
    pub fn hosts(&self) -> &BTreeSet<HostId> {
        &self.hosts
    }

    pub fn contains(&self, host: HostId) -> bool {
        self.hosts.contains(&host)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Campaign counters.
///
/// `total_hosts == online_hosts + offline_hosts + missing_hosts` at
/// resolution time; `active_hosts <= total_hosts` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_hosts: u32,
    pub online_hosts: u32,
    pub offline_hosts: u32,
    pub missing_hosts: u32,
    /// Hosts that have responded at least once.
    pub active_hosts: u32,
}

/// Campaign lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CampaignStatus {
    /// Created, no viewer has attached yet.
    Waiting,
    /// At least one viewer has attached.
    Running,
    /// Terminal.
    Completed,
}

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Completed)
    }
}

/// Why a campaign was closed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CloseReason {
    /// Closed by an operator.
    Explicit,
    /// Closed by the expiration sweep.
    Expired,
}

/// One live query execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub query_id: Option<QueryId>,
    /// Query text, denormalized for display.
    pub query_text: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub status: CampaignStatus,
    pub metrics: Metrics,
    pub target: HostTarget,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub close_reason: Option<CloseReason>,
}

/// One result row: column name to value.
pub type Row = BTreeMap<String, String>;

/// What a host produced for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOutcome {
    Rows(Vec<Row>),
    /// The query failed on the host. Routine data, not a system fault.
    Error(String),
}

/// One host's contribution to a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    pub campaign_id: CampaignId,
    pub host_id: HostId,
    pub outcome: ResultOutcome,
    pub received_at: DateTime<Utc>,
}

/// Progress summary pushed to viewers alongside totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub expected_results: u32,
    pub actual_results: u32,
    pub status: CampaignStatus,
}

/// Application-level messages sent to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Result(HostResult),
    Totals(Metrics),
    Status(StatusReport),
    Heartbeat,
    Error { message: String },
    /// The campaign terminated; no more results will follow.
    EndOfStream { reason: CloseReason },
}

/// Viewer-initiated events observed on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerSignal {
    /// The viewer asked to stop streaming.
    Cancel,
    /// Inbound traffic (a pong, any frame) showing the peer is still there.
    Alive,
    /// The peer went away.
    Disconnected,
}

/// Protected resources for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The campaign collection (creation).
    Campaigns,
    Campaign(CampaignId),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Campaigns => f.write_str("campaigns"),
            Resource::Campaign(id) => write!(f, "campaign {id}"),
        }
    }
}

/// Actions checked by the authorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Close,
}
