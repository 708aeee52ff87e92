// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for livequery.
//!
//! Holds the domain types, the error taxonomy, and the collaborator traits
//! (host datastore, query catalog, persistence, authorization, viewer
//! connection) that the campaign engine is written against.

pub mod error;
pub mod traits;
pub mod types;

pub use error::LiveQueryError;
pub use types::{
    Action, Campaign, CampaignId, CampaignStatus, CloseReason, Host, HostId, HostLookup,
    HostResult, HostTarget, HostTargets, LabelId, Metrics, QueryId, QueryRef, Resource,
    ResultOutcome, Row, SavedQuery, StatusReport, StreamMessage, Viewer, ViewerSignal,
};

pub use traits::{
    Authorizer, CampaignPersistence, HostDatastore, QueryCatalog, ViewerConnection,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_render() {
        assert_eq!(
            LiveQueryError::campaign_not_found(CampaignId(12)).to_string(),
            "campaign not found: 12"
        );
        assert_eq!(
            LiveQueryError::CampaignClosed(CampaignId(3)).to_string(),
            "campaign 3 is closed"
        );
        let err = LiveQueryError::persistence(std::io::Error::other("disk full"));
        assert!(err.to_string().contains("disk full"));
        assert!(LiveQueryError::EmptyTarget.to_string().contains("no hosts"));
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _assert_datastore(_: &dyn HostDatastore) {}
        fn _assert_catalog(_: &dyn QueryCatalog) {}
        fn _assert_persistence(_: &dyn CampaignPersistence) {}
        fn _assert_authorizer(_: &dyn Authorizer) {}
        fn _assert_connection(_: &dyn ViewerConnection) {}
    }
}
