// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer token authentication for the gateway.
//!
//! Each configured token maps to a viewer name. A request carrying a known
//! token (`Authorization: Bearer <token>`) runs with that [`Viewer`] in its
//! extensions. When no tokens are configured, all requests are rejected
//! (fail-closed).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use livequery_core::{Action, Authorizer, LiveQueryError, Resource, Viewer};

/// Authentication configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    tokens: Arc<BTreeMap<String, String>>,
}

impl AuthConfig {
    /// `tokens` maps bearer token to viewer name.
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The viewer a token authenticates as.
    pub fn viewer_for(&self, token: &str) -> Option<Viewer> {
        self.tokens.get(token).map(Viewer::new)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &format!("[{} redacted]", self.tokens.len()))
            .finish()
    }
}

/// Grants every action to viewers that own a configured token.
#[async_trait]
impl Authorizer for AuthConfig {
    async fn authorize(
        &self,
        viewer: &Viewer,
        resource: Resource,
        action: Action,
    ) -> Result<(), LiveQueryError> {
        if self.tokens.values().any(|name| *name == viewer.username) {
            Ok(())
        } else {
            Err(LiveQueryError::Authorization(format!(
                "{viewer} may not {action} {resource}"
            )))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware resolving the bearer token to a [`Viewer`] extension.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.is_empty() {
        tracing::error!("gateway has no bearer tokens configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let Some(viewer) = bearer_token(request.headers()).and_then(|t| auth.viewer_for(t)) else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    request.extensions_mut().insert(viewer);
    Ok(next.run(request).await)
}
