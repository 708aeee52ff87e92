// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-decision authorizers.

use async_trait::async_trait;

use livequery_core::{Action, Authorizer, LiveQueryError, Resource, Viewer};

/// Permits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(
        &self,
        _viewer: &Viewer,
        _resource: Resource,
        _action: Action,
    ) -> Result<(), LiveQueryError> {
        Ok(())
    }
}

/// Denies everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

#[async_trait]
impl Authorizer for DenyAll {
    async fn authorize(
        &self,
        viewer: &Viewer,
        resource: Resource,
        action: Action,
    ) -> Result<(), LiveQueryError> {
        Err(LiveQueryError::Authorization(format!(
            "{viewer} may not {action} {resource}"
        )))
    }
}
