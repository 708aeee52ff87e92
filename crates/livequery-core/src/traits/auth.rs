// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorization collaborator.

use async_trait::async_trait;

use crate::error::LiveQueryError;
use crate::types::{Action, Resource, Viewer};

/// Decides whether a viewer may perform an action on a resource.
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    /// Returns `Err(LiveQueryError::Authorization)` when the action is denied.
    async fn authorize(
        &self,
        viewer: &Viewer,
        resource: Resource,
        action: Action,
    ) -> Result<(), LiveQueryError>;
}
