// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Distributed query campaign engine.
//!
//! - [`resolver`] turns target specs into concrete host sets with metrics
//! - [`store`] owns campaign lifecycle records and their durability
//! - [`session`] drives one viewer's streaming connection
//! - [`manager`] composes them behind [`CampaignService`]
//! - [`logging`] wraps any [`CampaignService`] with structured logs
//! - [`sweep`] expires idle campaigns in the background
//!
//! Results flow through the per-campaign [`livequery_bus::ResultBus`].

pub mod logging;
pub mod manager;
pub mod recording;
pub mod resolver;
pub mod service;
pub mod session;
pub mod store;
pub mod sweep;

pub use logging::LoggingCampaignService;
pub use manager::{CampaignManager, Collaborators};
pub use resolver::TargetResolver;
pub use service::{CampaignService, IngestOutcome};
pub use session::{SessionEnd, SessionReport, SessionSettings, SessionState, StreamingSession};
pub use store::{CampaignStore, ResponseOutcome, status_report};
