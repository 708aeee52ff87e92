// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP and WebSocket gateway for livequery.
//!
//! Operators create, inspect and close campaigns over a small JSON API and
//! watch results over a WebSocket per campaign. Hosts post their results to
//! the same API. Every `/v1` route requires a bearer token that maps to a
//! viewer identity.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use server::{GatewayState, HealthState, Sessions, router, serve, start_server};
pub use ws::WsConnection;
