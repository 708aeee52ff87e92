// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for livequery.
//!
//! In-memory implementations of every collaborator trait so campaign tests
//! run without SQLite or a network.
//!
//! # Components
//!
//! - [`MemoryDatastore`] - hosts, labels, and saved queries held in memory
//! - [`MemoryPersistence`] - campaign records with an injectable write failure
//! - [`AllowAll`] / [`DenyAll`] - fixed authorization decisions
//! - [`ScriptedConnection`] - viewer connection driven from a [`ConnectionHandle`]

pub mod auth;
pub mod connection;
pub mod datastore;
pub mod persistence;

pub use auth::{AllowAll, DenyAll};
pub use connection::{ConnectionHandle, ScriptedConnection};
pub use datastore::MemoryDatastore;
pub use persistence::MemoryPersistence;
