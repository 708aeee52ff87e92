// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits consumed by the campaign engine.
//!
//! Every trait uses `#[async_trait]` so implementations can be held as
//! `Arc<dyn Trait>` behind the campaign manager.

pub mod auth;
pub mod connection;
pub mod datastore;
pub mod persistence;

pub use auth::Authorizer;
pub use connection::ViewerConnection;
pub use datastore::{HostDatastore, QueryCatalog};
pub use persistence::CampaignPersistence;
