//! Mutating admission webhook for the airlift agent
//!
//! The agent intercepts resource creation/update requests and rewrites
//! embedded references to point at the cluster-local mirror:
//!
//! - `POST /mutate/flux-gitrepository` - GitRepository custom resources
//!   ([`gitrepository`])
//! - `POST /mutate/pod` - Pod container images ([`pod`])
//!
//! Each hook is a pure function of the admission request plus one read of
//! the mounted mirror state; there is no cross-request mutable state and no
//! kube client. A hook either returns a [`MutationResult`] or an error, and
//! every error is translated into a denied admission response at this
//! boundary - partial patch sets are never returned.

pub mod gitrepository;
pub mod pod;

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use json_patch::PatchOperation;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use kube::core::DynamicObject;
use tracing::{error, info};

/// Shared state for webhook handlers
///
/// Holds only the location of the mirror state file; the file itself is
/// re-read on every request so a refreshed mirror address takes effect
/// without a restart.
#[derive(Debug, Clone)]
pub struct AgentState {
    /// Path of the mounted mirror state file
    pub state_path: PathBuf,
}

impl AgentState {
    /// Create webhook state reading mirror configuration from `state_path`
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }
}

/// Outcome of a successful hook invocation
///
/// Constructed only once every fallible step has passed; errors abort
/// before a result exists.
#[derive(Debug)]
pub struct MutationResult {
    /// Whether the request should be admitted
    pub allowed: bool,
    /// Ordered JSON Patch operations to apply to the object
    pub patches: Vec<PatchOperation>,
}

impl MutationResult {
    /// Admit the request with the given patch operations
    pub fn patched(patches: Vec<PatchOperation>) -> Self {
        Self {
            allowed: true,
            patches,
        }
    }

    /// Admit the request without touching the object
    pub fn unchanged() -> Self {
        Self {
            allowed: true,
            patches: Vec::new(),
        }
    }
}

/// Create the webhook router with all mutation endpoints
pub fn webhook_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route(
            "/mutate/flux-gitrepository",
            post(gitrepository::mutate_handler),
        )
        .route("/mutate/pod", post(pod::mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Start the admission webhook server on `port`
///
/// TLS is terminated in front of the agent (the webhook Service); the
/// server itself speaks plain HTTP.
pub async fn start_agent_server(port: u16, state: Arc<AgentState>) {
    let app = webhook_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => {
            info!(addr = %addr, "Admission webhook started");
            l
        }
        Err(e) => {
            error!(error = %e, port, "Failed to bind admission webhook port");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Admission webhook server error");
    }
}

/// Convert a hook result into the admission response for `request`
fn admission_response(
    request: &AdmissionRequest<DynamicObject>,
    result: MutationResult,
) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);
    if !result.allowed {
        return response.deny("mutation rejected the request");
    }
    if result.patches.is_empty() {
        return response;
    }
    match response.with_patch(json_patch::Patch(result.patches)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_state_carries_the_configured_path() {
        let state = AgentState::new("/etc/airlift-state/state");
        assert_eq!(
            state.state_path,
            PathBuf::from("/etc/airlift-state/state")
        );
    }

    #[test]
    fn unchanged_result_is_allowed_with_no_patches() {
        let result = MutationResult::unchanged();
        assert!(result.allowed);
        assert!(result.patches.is_empty());
    }
}
