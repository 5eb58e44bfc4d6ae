//! Airlift - airgap mirror admission agent
//!
//! Airlift is the in-cluster agent of an airgapped Kubernetes package
//! manager. Workloads deployed into the cluster reference container images
//! and git repositories by their original public locations; the agent runs a
//! mutating admission webhook that intercepts create/update requests and
//! deterministically rewrites those references to point at the cluster-local
//! mirror instead.
//!
//! The rewrite must be idempotent (an already-mirrored reference is never
//! mutated a second time) and collision-resistant (two different upstream
//! sources never alias to the same mirrored name). Collision resistance
//! comes from a content hash of the canonical reference: CRC32 for git
//! repository names, SHA-1 for container image references.
//!
//! # Modules
//!
//! - [`git`] - git URL parsing, deterministic renaming, and rewriting
//! - [`image`] - container image reference renaming
//! - [`urls`] - hostname comparison used as the mutation idempotency guard
//! - [`state`] - mirror configuration read from the mounted state file
//! - [`webhook`] - admission server, per-kind mutation hooks, patch building
//! - [`error`] - error types for the agent

#![deny(missing_docs)]

pub mod error;
pub mod git;
pub mod image;
pub mod state;
pub mod urls;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default port for the admission webhook server
///
/// Port 8443 is used instead of 443 to avoid requiring root privileges; the
/// webhook Service maps 443 onto it.
pub const DEFAULT_AGENT_PORT: u16 = 8443;

/// Default path of the mirror state file mounted into the agent pod
pub const DEFAULT_STATE_PATH: &str = "/etc/airlift-state/state";
